//! Refresh-token sessions.

use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;
use uuid::Uuid;

pub const REVOKE_REASON_LOGOUT: &str = "logout";
pub const REVOKE_REASON_REUSE: &str = "refresh_token_reuse";
pub const REVOKE_REASON_REVOKE_ALL: &str = "revoke_all";

#[derive(Debug, Clone, FromRow)]
pub struct AuthSession {
    pub session_id: Uuid,
    pub organization_id: Uuid,
    pub user_id: Uuid,
    pub refresh_token_hash: Option<String>,
    pub previous_refresh_token_hash: Option<String>,
    pub refresh_expires_utc: DateTime<Utc>,
    pub created_utc: DateTime<Utc>,
    pub last_seen_utc: DateTime<Utc>,
    pub revoked_utc: Option<DateTime<Utc>>,
    pub revoke_reason: Option<String>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

/// Client details recorded alongside a session or token.
#[derive(Debug, Clone, Default)]
pub struct RequestMetadata {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

impl AuthSession {
    pub fn new(
        organization_id: Uuid,
        user_id: Uuid,
        refresh_token_hash: String,
        ttl: Duration,
        metadata: &RequestMetadata,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            organization_id,
            user_id,
            refresh_token_hash: Some(refresh_token_hash),
            previous_refresh_token_hash: None,
            refresh_expires_utc: now + ttl,
            created_utc: now,
            last_seen_utc: now,
            revoked_utc: None,
            revoke_reason: None,
            user_agent: metadata.user_agent.clone(),
            ip_address: metadata.ip_address.clone(),
        }
    }
}

pub fn session_is_active(session: &AuthSession, now: DateTime<Utc>) -> bool {
    session.revoked_utc.is_none()
        && session.refresh_token_hash.is_some()
        && session.refresh_expires_utc > now
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(now: DateTime<Utc>) -> AuthSession {
        AuthSession::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "a".repeat(64),
            Duration::days(30),
            &RequestMetadata::default(),
            now,
        )
    }

    #[test]
    fn test_active_until_expiry() {
        let now = Utc::now();
        let s = session(now);
        assert!(session_is_active(&s, now));
        assert!(session_is_active(&s, now + Duration::days(29)));
        assert!(!session_is_active(&s, now + Duration::days(30)));
    }

    #[test]
    fn test_revoked_is_inactive() {
        let now = Utc::now();
        let mut s = session(now);
        s.revoked_utc = Some(now);
        assert!(!session_is_active(&s, now));
    }
}
