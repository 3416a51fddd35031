//! User model - organization-scoped accounts.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use super::membership::MemberRole;

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub role: String,
    pub is_email_verified: bool,
    pub email_verified_utc: Option<DateTime<Utc>>,
    pub active_flag: bool,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl User {
    /// `email` must already be normalized.
    pub fn new(
        organization_id: Uuid,
        email: String,
        password_hash: String,
        full_name: String,
        role: MemberRole,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: Uuid::new_v4(),
            organization_id,
            email,
            password_hash,
            full_name,
            role: role.as_str().to_string(),
            is_email_verified: false,
            email_verified_utc: None,
            active_flag: true,
            created_utc: now,
            updated_utc: now,
        }
    }

    /// Mark verified at creation time (invite acceptance proves mailbox control).
    pub fn verified_at(mut self, now: DateTime<Utc>) -> Self {
        self.is_email_verified = true;
        self.email_verified_utc = Some(now);
        self
    }

    pub fn sanitized(&self) -> UserResponse {
        UserResponse::from(self.clone())
    }
}

/// User as returned over HTTP (no password hash).
#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: String,
    pub is_email_verified: bool,
    pub created_utc: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            user_id: user.user_id,
            organization_id: user.organization_id,
            email: user.email,
            full_name: user.full_name,
            role: user.role,
            is_email_verified: user.is_email_verified,
            created_utc: user.created_utc,
        }
    }
}

/// Trim and lower-case; the only form emails are stored or compared in.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
