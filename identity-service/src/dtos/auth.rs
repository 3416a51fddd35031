use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::services::RegistrationInput;
use crate::utils::Password;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(length(min = 2, max = 100, message = "Organization name must be 2-100 characters"))]
    pub organization_name: String,

    #[validate(length(min = 3, max = 48, message = "Slug must be 3-48 characters"))]
    pub organization_slug: Option<String>,

    #[validate(length(min = 1, max = 100, message = "Full name must be 1-100 characters"))]
    pub full_name: String,

    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 8, max = 128, message = "Password must be 8-128 characters"))]
    pub password: String,
}

impl From<RegisterRequest> for RegistrationInput {
    fn from(req: RegisterRequest) -> Self {
        RegistrationInput {
            organization_name: req.organization_name,
            organization_slug: req.organization_slug,
            full_name: req.full_name,
            email: req.email,
            password: Password::new(req.password),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct TokenQuery {
    #[validate(length(min = 1, message = "Token is required"))]
    pub token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub message: String,
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResendVerificationRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,

    /// Narrows login to one organization when the email exists in several.
    pub organization_slug: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,
}
