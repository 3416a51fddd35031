use axum::{extract::State, response::IntoResponse, Json};
use service_core::error::AppError;

use crate::{
    dtos::{
        auth::{LoginRequest, LogoutRequest, RefreshRequest},
        MessageResponse,
    },
    middleware::{AuthUser, ClientMetadata},
    models::auth_session::REVOKE_REASON_REVOKE_ALL,
    utils::{Password, ValidatedJson},
    AppState,
};

pub async fn login(
    State(state): State<AppState>,
    ClientMetadata(metadata): ClientMetadata,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let session = state
        .sessions
        .login(
            &req.email,
            Password::new(req.password),
            req.organization_slug.as_deref(),
            &metadata,
        )
        .await?;
    Ok(Json(session))
}

pub async fn refresh(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RefreshRequest>,
) -> Result<impl IntoResponse, AppError> {
    let session = state.sessions.refresh(&req.refresh_token).await?;
    Ok(Json(session))
}

/// Revoke the session behind a refresh token. Unknown tokens get the same answer.
pub async fn logout(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<LogoutRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.sessions.logout(&req.refresh_token).await?;
    Ok(Json(MessageResponse::new("Logged out")))
}

pub async fn logout_all(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    state
        .sessions
        .revoke_all_for_user(user.user_id, REVOKE_REASON_REVOKE_ALL)
        .await?;
    Ok(Json(MessageResponse::new("All sessions revoked")))
}
