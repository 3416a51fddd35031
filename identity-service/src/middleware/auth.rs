use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use chrono::Utc;
use service_core::error::AppError;
use uuid::Uuid;

use crate::db;
use crate::models::session_is_active;
use crate::services::invite::Actor;
use crate::AppState;

/// Caller identified by a bearer access token whose session is still live.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub session_id: Uuid,
    pub email: String,
    pub role: String,
}

impl AuthUser {
    pub fn actor(&self) -> Actor {
        Actor {
            user_id: self.user_id,
            organization_id: self.organization_id,
        }
    }
}

fn unauthorized(message: &str) -> AppError {
    AppError::Unauthorized(anyhow::anyhow!(message.to_string()))
}

pub fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| unauthorized("Missing or invalid Authorization header"))?;

        let claims = state
            .sessions
            .jwt()
            .validate_access_token(token)
            .map_err(|_| unauthorized("Invalid or expired token"))?;

        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| unauthorized("Invalid token subject"))?;
        let organization_id =
            Uuid::parse_str(&claims.org_id).map_err(|_| unauthorized("Invalid token subject"))?;
        let session_id = Uuid::parse_str(&claims.sid).map_err(|_| unauthorized("Invalid token subject"))?;

        // Logout and reuse detection revoke the session; its access tokens die with it.
        let session = db::sessions::find_by_id(&state.pool, session_id)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::Error::new(e)))?;
        match session {
            Some(s) if s.user_id == user_id && session_is_active(&s, Utc::now()) => {}
            _ => return Err(unauthorized("Invalid or expired session")),
        }

        Ok(AuthUser {
            user_id,
            organization_id,
            session_id,
            email: claims.email,
            role: claims.role,
        })
    }
}
