use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;
use validator::Validate;

use crate::{
    dtos::{
        auth::{RegisterRequest, ResendVerificationRequest, TokenQuery, VerifyResponse},
        MessageResponse,
    },
    middleware::ClientMetadata,
    utils::ValidatedJson,
    AppState,
};

/// Create an organization and its first account. Answers 202 with the same
/// body whether or not the email was already registered.
pub async fn register(
    State(state): State<AppState>,
    ClientMetadata(metadata): ClientMetadata,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = state.registration.register(req.into(), &metadata).await?;
    Ok((StatusCode::ACCEPTED, Json(MessageResponse::new(outcome.message()))))
}

pub async fn verify_email(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> Result<impl IntoResponse, AppError> {
    query.validate()?;
    let user_id = state.verification.verify_token(&query.token).await?;
    Ok(Json(VerifyResponse {
        message: "Email verified".to_string(),
        user_id,
    }))
}

pub async fn resend_verification(
    State(state): State<AppState>,
    ClientMetadata(metadata): ClientMetadata,
    ValidatedJson(req): ValidatedJson<ResendVerificationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let message = state
        .verification
        .resend_verification(&req.email, &metadata)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(MessageResponse::new(message))))
}
