use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{
        auth::TokenQuery,
        invites::{AcceptInviteRequest, AcceptInviteResponse, CreateInviteRequest},
    },
    middleware::{AuthUser, ClientMetadata},
    utils::{Password, ValidatedJson},
    AppState,
};

pub async fn create_invite(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<CreateInviteRequest>,
) -> Result<impl IntoResponse, AppError> {
    let created = state.invites.create_invite(user.actor(), req.into()).await?;
    let status = if created.reissued {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(created)))
}

pub async fn list_invites(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let invites = state.invites.list_pending_invites(user.actor()).await?;
    Ok(Json(invites))
}

pub async fn revoke_invite(
    State(state): State<AppState>,
    user: AuthUser,
    Path(invite_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.invites.revoke_invite(user.actor(), invite_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn preview_invite(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> Result<impl IntoResponse, AppError> {
    query.validate()?;
    let preview = state.invites.validate_invite_token(&query.token).await?;
    Ok(Json(preview))
}

/// Join the organization and sign in.
pub async fn accept_invite(
    State(state): State<AppState>,
    ClientMetadata(metadata): ClientMetadata,
    ValidatedJson(req): ValidatedJson<AcceptInviteRequest>,
) -> Result<impl IntoResponse, AppError> {
    let accepted = state
        .invites
        .accept_invite(&req.token, &req.full_name, Password::new(req.password))
        .await?;

    let session = state
        .sessions
        .issue_for_user(accepted.user_id, &metadata)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(AcceptInviteResponse {
            user_id: accepted.user_id,
            organization_id: accepted.organization_id,
            session,
        }),
    ))
}
