use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use std::sync::Arc;
use uuid::Uuid;

use crate::db;
use crate::models::{
    normalize_email, verification_token_is_usable, AuditEvent, AuditEventType,
    EmailVerificationRequested, EmailVerificationToken, OutboxEvent, RequestMetadata, User,
};
use crate::services::error::ServiceError;
use crate::services::token_hash::{hash_prefix, TokenHasher};

pub const INVALID_VERIFICATION_TOKEN: &str = "Invalid or expired verification token";
pub const RESEND_NEUTRAL_MESSAGE: &str =
    "If an unverified account exists for this email, a new verification link has been sent.";

#[derive(Clone)]
pub struct VerificationService {
    pool: PgPool,
    hasher: Arc<TokenHasher>,
}

impl VerificationService {
    pub fn new(pool: PgPool, hasher: Arc<TokenHasher>) -> Self {
        Self { pool, hasher }
    }

    /// Replace any unused token for `user` and enqueue the email, on the
    /// caller's transaction. Returns the raw token.
    pub async fn issue_token_in(
        &self,
        conn: &mut PgConnection,
        user: &User,
        now: DateTime<Utc>,
        metadata: &RequestMetadata,
    ) -> Result<String, ServiceError> {
        let superseded = db::verification_tokens::invalidate_unused(&mut *conn, user.user_id, now).await?;

        let raw = self.hasher.generate_raw_token();
        let token = EmailVerificationToken::new(
            user.user_id,
            self.hasher.hash_token(&raw),
            metadata,
            now,
        );
        db::verification_tokens::insert(&mut *conn, &token).await?;

        let event = OutboxEvent::EmailVerificationRequested(EmailVerificationRequested {
            user_id: user.user_id,
            email: user.email.clone(),
            token: raw.clone(),
            full_name: user.full_name.clone(),
        });
        db::outbox::enqueue(&mut *conn, &event, now).await?;

        tracing::info!(
            user_id = %user.user_id,
            token_id = %token.token_id,
            superseded,
            "Verification token issued"
        );

        Ok(raw)
    }

    pub async fn create_token(
        &self,
        user_id: Uuid,
        metadata: &RequestMetadata,
    ) -> Result<String, ServiceError> {
        let mut tx = self.pool.begin().await?;
        let user = db::users::find_by_id(&mut *tx, user_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("User not found"))?;

        let raw = self.issue_token_in(&mut tx, &user, db::now(), metadata).await?;
        tx.commit().await?;
        Ok(raw)
    }

    /// Consume `raw` and mark its user verified. Returns the user id.
    pub async fn verify_token(&self, raw: &str) -> Result<Uuid, ServiceError> {
        let now = db::now();
        let hash = self.hasher.hash_token(raw);

        let mut tx = self.pool.begin().await?;

        let token = match db::verification_tokens::lock_unused_by_hash(&mut *tx, &hash).await? {
            Some(token) if verification_token_is_usable(&token, now) => token,
            _ => {
                tracing::info!(token_hash_prefix = %hash_prefix(&hash), "Verification token rejected");
                return Err(ServiceError::validation(INVALID_VERIFICATION_TOKEN));
            }
        };

        db::verification_tokens::mark_used(&mut *tx, token.token_id, now).await?;
        db::users::mark_email_verified(&mut *tx, token.user_id, now).await?;

        let user = db::users::find_by_id(&mut *tx, token.user_id).await?;
        let mut event = AuditEvent::new(AuditEventType::UserEmailVerified, now)
            .with_actor(token.user_id)
            .with_target("user", token.user_id);
        if let Some(user) = &user {
            event = event.with_organization(user.organization_id);
        }
        db::audit::insert(&mut *tx, &event).await?;

        tx.commit().await?;

        tracing::info!(user_id = %token.user_id, "Email verified");
        Ok(token.user_id)
    }

    /// Always answers with the same message whether or not anything was sent.
    pub async fn resend_verification(
        &self,
        email: &str,
        metadata: &RequestMetadata,
    ) -> Result<&'static str, ServiceError> {
        let email = normalize_email(email);
        let mut tx = self.pool.begin().await?;

        match db::users::find_by_email(&mut *tx, &email).await? {
            Some(user) if !user.is_email_verified && user.active_flag => {
                self.issue_token_in(&mut tx, &user, db::now(), metadata).await?;
                tx.commit().await?;
            }
            _ => {
                tx.rollback().await?;
                tracing::debug!("Verification resend skipped");
            }
        }

        Ok(RESEND_NEUTRAL_MESSAGE)
    }
}
