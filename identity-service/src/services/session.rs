//! Refresh-token sessions: issue, rotate, revoke.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::db;
use crate::models::{
    auth_session::{REVOKE_REASON_LOGOUT, REVOKE_REASON_REUSE},
    normalize_email, AuditEvent, AuditEventType, AuthSession, RequestMetadata, User,
};
use crate::services::error::ServiceError;
use crate::services::jwt::{JwtService, TokenSubject};
use crate::services::metrics;
use crate::services::token_hash::{hash_prefix, TokenHasher};
use crate::utils::{verify_password_async, Password, PasswordHashString};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedSession {
    pub session_id: Uuid,
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub refresh_expires_utc: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SessionManager {
    pool: PgPool,
    hasher: Arc<TokenHasher>,
    jwt: Arc<JwtService>,
    refresh_ttl: Duration,
}

impl SessionManager {
    pub fn new(
        pool: PgPool,
        hasher: Arc<TokenHasher>,
        jwt: Arc<JwtService>,
        refresh_ttl_days: i64,
    ) -> Self {
        Self {
            pool,
            hasher,
            jwt,
            refresh_ttl: Duration::days(refresh_ttl_days),
        }
    }

    pub fn jwt(&self) -> &JwtService {
        &self.jwt
    }

    /// Start a new session lineage for `subject`.
    pub async fn issue(
        &self,
        subject: &TokenSubject,
        metadata: &RequestMetadata,
    ) -> Result<IssuedSession, ServiceError> {
        let now = db::now();
        let raw = self.hasher.generate_raw_token();
        let session = AuthSession::new(
            subject.organization_id,
            subject.user_id,
            self.hasher.hash_token(&raw),
            self.refresh_ttl,
            metadata,
            now,
        );

        db::sessions::insert(&self.pool, &session).await?;

        tracing::info!(
            session_id = %session.session_id,
            user_id = %subject.user_id,
            "Session issued"
        );

        self.mint(subject, &session, raw)
    }

    /// Sign in a user who just proved themselves some other way (invite accept).
    pub async fn issue_for_user(
        &self,
        user_id: Uuid,
        metadata: &RequestMetadata,
    ) -> Result<IssuedSession, ServiceError> {
        let user = db::users::find_by_id(&self.pool, user_id)
            .await?
            .filter(|u| u.active_flag)
            .ok_or(ServiceError::InvalidSession)?;
        self.issue(&subject_for(&user), metadata).await
    }

    /// Rotate `presented` for a new refresh token. The old token stops working
    /// the moment this returns.
    pub async fn refresh(&self, presented: &str) -> Result<IssuedSession, ServiceError> {
        let now = db::now();
        let presented_hash = self.hasher.hash_token(presented);
        let new_raw = self.hasher.generate_raw_token();
        let new_hash = self.hasher.hash_token(&new_raw);

        let rotated =
            db::sessions::rotate_refresh_hash(&self.pool, &presented_hash, &new_hash, now).await?;

        let session = match rotated {
            Some(session) => session,
            None => {
                self.handle_refresh_miss(&presented_hash, now).await?;
                metrics::record_refresh("rejected");
                return Err(ServiceError::InvalidSession);
            }
        };

        let user = match db::users::find_by_id(&self.pool, session.user_id).await? {
            Some(user) if user.active_flag => user,
            _ => {
                db::sessions::revoke(&self.pool, session.session_id, "user_inactive", now).await?;
                metrics::record_refresh("rejected");
                return Err(ServiceError::InvalidSession);
            }
        };

        metrics::record_refresh("rotated");
        tracing::debug!(session_id = %session.session_id, "Refresh token rotated");

        self.mint(&subject_for(&user), &session, new_raw)
    }

    /// A miss on the current hash may be a replay of an already-rotated token.
    async fn handle_refresh_miss(
        &self,
        presented_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        let reused = db::sessions::revoke_by_previous_hash(
            &self.pool,
            presented_hash,
            REVOKE_REASON_REUSE,
            now,
        )
        .await?;

        if let Some(session) = reused {
            tracing::warn!(
                session_id = %session.session_id,
                user_id = %session.user_id,
                token_hash_prefix = %hash_prefix(presented_hash),
                "Rotated refresh token presented again; session revoked"
            );
            metrics::record_refresh("reuse_detected");

            let event = AuditEvent::new(AuditEventType::SessionRefreshReuse, now)
                .with_organization(session.organization_id)
                .with_actor(session.user_id)
                .with_target("auth_session", session.session_id);
            db::audit::insert(&self.pool, &event).await?;
        }

        Ok(())
    }

    pub async fn revoke(&self, session_id: Uuid, reason: &str) -> Result<bool, ServiceError> {
        let revoked = db::sessions::revoke(&self.pool, session_id, reason, db::now()).await?;
        if revoked {
            tracing::info!(session_id = %session_id, reason, "Session revoked");
        }
        Ok(revoked)
    }

    /// Logout. Unknown or already-revoked tokens are not an error.
    pub async fn revoke_by_refresh_token(&self, raw: &str, reason: &str) -> Result<bool, ServiceError> {
        let hash = self.hasher.hash_token(raw);
        let revoked = db::sessions::revoke_by_hash(&self.pool, &hash, reason, db::now()).await?;
        if let Some(session) = &revoked {
            tracing::info!(session_id = %session.session_id, reason, "Session revoked");
        }
        Ok(revoked.is_some())
    }

    pub async fn logout(&self, raw: &str) -> Result<bool, ServiceError> {
        self.revoke_by_refresh_token(raw, REVOKE_REASON_LOGOUT).await
    }

    pub async fn revoke_all_for_user(&self, user_id: Uuid, reason: &str) -> Result<u64, ServiceError> {
        let count =
            db::sessions::revoke_all_for_user(&self.pool, user_id, reason, db::now()).await?;
        tracing::info!(user_id = %user_id, count, reason, "Sessions revoked");
        Ok(count)
    }

    /// Password login. Every failure is the same `InvalidCredentials`.
    pub async fn login(
        &self,
        email: &str,
        password: Password,
        organization_slug: Option<&str>,
        metadata: &RequestMetadata,
    ) -> Result<IssuedSession, ServiceError> {
        let email = normalize_email(email);
        let candidates =
            db::users::find_login_candidates(&self.pool, &email, organization_slug).await?;

        for user in candidates {
            let hash = PasswordHashString::new(user.password_hash.clone());
            if verify_password_async(password.clone(), hash).await.is_ok() {
                return self.issue(&subject_for(&user), metadata).await;
            }
        }

        tracing::info!("Login rejected");
        Err(ServiceError::InvalidCredentials)
    }

    fn mint(
        &self,
        subject: &TokenSubject,
        session: &AuthSession,
        refresh_token: String,
    ) -> Result<IssuedSession, ServiceError> {
        let access_token = self.jwt.generate_access_token(subject, session.session_id)?;

        Ok(IssuedSession {
            session_id: session.session_id,
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.jwt.access_token_expiry_seconds(),
            refresh_expires_utc: session.refresh_expires_utc,
        })
    }
}

pub fn subject_for(user: &User) -> TokenSubject {
    TokenSubject {
        user_id: user.user_id,
        organization_id: user.organization_id,
        email: user.email.clone(),
        role: user.role.clone(),
    }
}
