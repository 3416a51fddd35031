use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::services::invite::{CreateInviteInput, INVITE_MESSAGE_MAX_LEN};
use crate::services::IssuedSession;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateInviteRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, message = "Role is required"))]
    pub role: String,

    #[validate(length(max = 1000, message = "Message is too long"))]
    pub message: Option<String>,
}

impl From<CreateInviteRequest> for CreateInviteInput {
    fn from(req: CreateInviteRequest) -> Self {
        CreateInviteInput {
            email: req.email,
            role: req.role,
            message: req.message,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AcceptInviteRequest {
    #[validate(length(min = 1, message = "Token is required"))]
    pub token: String,

    #[validate(length(min = 1, max = 100, message = "Full name must be 1-100 characters"))]
    pub full_name: String,

    #[validate(length(min = 8, max = 128, message = "Password must be 8-128 characters"))]
    pub password: String,
}

/// The new member is signed in straight away.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptInviteResponse {
    pub user_id: Uuid,
    pub organization_id: Uuid,
    #[serde(flatten)]
    pub session: IssuedSession,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_invite_message_limit() {
        let req = CreateInviteRequest {
            email: "bob@example.com".to_string(),
            role: "member".to_string(),
            message: Some("x".repeat(INVITE_MESSAGE_MAX_LEN + 1)),
        };
        assert!(req.validate().is_err());

        let ok = CreateInviteRequest {
            message: Some("Welcome aboard".to_string()),
            ..req
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_accept_invite_request_camel_case() {
        let req: AcceptInviteRequest = serde_json::from_value(serde_json::json!({
            "token": "abc",
            "fullName": "Bob",
            "password": "password123"
        }))
        .unwrap();
        assert!(req.validate().is_ok());
        assert_eq!(req.full_name, "Bob");
    }
}
