//! Email verification tokens.

use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use super::auth_session::RequestMetadata;

pub const VERIFICATION_TOKEN_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, FromRow)]
pub struct EmailVerificationToken {
    pub token_id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_utc: DateTime<Utc>,
    pub used_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
    pub request_ip: Option<String>,
    pub user_agent: Option<String>,
}

impl EmailVerificationToken {
    pub fn new(
        user_id: Uuid,
        token_hash: String,
        metadata: &RequestMetadata,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            token_id: Uuid::new_v4(),
            user_id,
            token_hash,
            expires_utc: now + Duration::hours(VERIFICATION_TOKEN_TTL_HOURS),
            used_utc: None,
            created_utc: now,
            request_ip: metadata.ip_address.clone(),
            user_agent: metadata.user_agent.clone(),
        }
    }
}

pub fn verification_token_is_usable(token: &EmailVerificationToken, now: DateTime<Utc>) -> bool {
    token.used_utc.is_none() && token.expires_utc > now
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usable_window() {
        let now = Utc::now();
        let mut token =
            EmailVerificationToken::new(Uuid::new_v4(), "h".repeat(64), &RequestMetadata::default(), now);
        assert!(verification_token_is_usable(&token, now + Duration::hours(23)));
        assert!(!verification_token_is_usable(&token, now + Duration::hours(24)));

        token.used_utc = Some(now);
        assert!(!verification_token_is_usable(&token, now));
    }
}
