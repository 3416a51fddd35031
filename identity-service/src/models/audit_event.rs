//! Audit trail entries.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditEventType {
    OrganizationRegistered,
    UserEmailVerified,
    InviteCreated,
    InviteRevoked,
    InviteAccepted,
    SessionRefreshReuse,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::OrganizationRegistered => "organization_registered",
            AuditEventType::UserEmailVerified => "user_email_verified",
            AuditEventType::InviteCreated => "invite_created",
            AuditEventType::InviteRevoked => "invite_revoked",
            AuditEventType::InviteAccepted => "invite_accepted",
            AuditEventType::SessionRefreshReuse => "session_refresh_reuse",
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub organization_id: Option<Uuid>,
    pub actor_user_id: Option<Uuid>,
    pub event_type_code: String,
    pub target_type: Option<String>,
    pub target_id: Option<Uuid>,
    pub event_data: Option<serde_json::Value>,
    pub created_utc: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType, now: DateTime<Utc>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            organization_id: None,
            actor_user_id: None,
            event_type_code: event_type.as_str().to_string(),
            target_type: None,
            target_id: None,
            event_data: None,
            created_utc: now,
        }
    }

    pub fn with_organization(mut self, organization_id: Uuid) -> Self {
        self.organization_id = Some(organization_id);
        self
    }

    pub fn with_actor(mut self, user_id: Uuid) -> Self {
        self.actor_user_id = Some(user_id);
        self
    }

    pub fn with_target(mut self, target_type: &str, target_id: Uuid) -> Self {
        self.target_type = Some(target_type.to_string());
        self.target_id = Some(target_id);
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.event_data = Some(data);
        self
    }
}
