//! Email outbox rows and their payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

pub const EVENT_EMAIL_VERIFICATION_REQUESTED: &str = "auth.email_verification.requested";
pub const EVENT_INVITE_CREATED: &str = "auth.invite.created";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboxStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "pending",
            OutboxStatus::Processing => "processing",
            OutboxStatus::Completed => "completed",
            OutboxStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct OutboxMessage {
    pub outbox_id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub attempts: i32,
    pub next_attempt_utc: DateTime<Utc>,
    pub claimed_utc: Option<DateTime<Utc>>,
    pub processed_utc: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailVerificationRequested {
    pub user_id: Uuid,
    pub email: String,
    pub token: String,
    pub full_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteCreated {
    pub email: String,
    pub token: String,
    pub org_name: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Events that can be enqueued; each maps to one `event_type` string.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboxEvent {
    EmailVerificationRequested(EmailVerificationRequested),
    InviteCreated(InviteCreated),
}

impl OutboxEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            OutboxEvent::EmailVerificationRequested(_) => EVENT_EMAIL_VERIFICATION_REQUESTED,
            OutboxEvent::InviteCreated(_) => EVENT_INVITE_CREATED,
        }
    }

    pub fn payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            OutboxEvent::EmailVerificationRequested(p) => serde_json::to_value(p),
            OutboxEvent::InviteCreated(p) => serde_json::to_value(p),
        }
    }

    /// `Ok(None)` for an event type this build does not know.
    pub fn decode(
        event_type: &str,
        payload: &serde_json::Value,
    ) -> Result<Option<Self>, serde_json::Error> {
        let event = match event_type {
            EVENT_EMAIL_VERIFICATION_REQUESTED => Some(OutboxEvent::EmailVerificationRequested(
                serde_json::from_value(payload.clone())?,
            )),
            EVENT_INVITE_CREATED => Some(OutboxEvent::InviteCreated(serde_json::from_value(
                payload.clone(),
            )?)),
            _ => None,
        };
        Ok(event)
    }
}
