//! Organization invites.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::membership::MemberRole;

pub const INVITE_TTL_DAYS: i64 = 7;

/// Roles an invite may carry. `Owner` is representable so it can be refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InviteRole {
    Owner,
    Admin,
    Member,
    Viewer,
}

impl InviteRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            InviteRole::Owner => "owner",
            InviteRole::Admin => "admin",
            InviteRole::Member => "member",
            InviteRole::Viewer => "viewer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "owner" => Some(InviteRole::Owner),
            "admin" => Some(InviteRole::Admin),
            "member" => Some(InviteRole::Member),
            "viewer" => Some(InviteRole::Viewer),
            _ => None,
        }
    }

    /// Membership role granted on acceptance; `None` for owner.
    pub fn member_role(&self) -> Option<MemberRole> {
        match self {
            InviteRole::Owner => None,
            InviteRole::Admin => Some(MemberRole::Admin),
            InviteRole::Member => Some(MemberRole::Pm),
            InviteRole::Viewer => Some(MemberRole::Viewer),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct OrgInvite {
    pub invite_id: Uuid,
    pub organization_id: Uuid,
    pub email: String,
    pub role: String,
    pub token_hash: String,
    pub invited_by_user_id: Uuid,
    pub message: Option<String>,
    pub expires_utc: DateTime<Utc>,
    pub accepted_utc: Option<DateTime<Utc>>,
    pub revoked_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl OrgInvite {
    pub fn new(
        organization_id: Uuid,
        email: String,
        role: InviteRole,
        token_hash: String,
        invited_by_user_id: Uuid,
        message: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            invite_id: Uuid::new_v4(),
            organization_id,
            email,
            role: role.as_str().to_string(),
            token_hash,
            invited_by_user_id,
            message,
            expires_utc: invite_expiry(now),
            accepted_utc: None,
            revoked_utc: None,
            created_utc: now,
            updated_utc: now,
        }
    }

    pub fn invite_role(&self) -> Option<InviteRole> {
        InviteRole::parse(&self.role)
    }
}

pub fn invite_expiry(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::days(INVITE_TTL_DAYS)
}

/// Not accepted, not revoked, not expired.
pub fn invite_is_active(invite: &OrgInvite, now: DateTime<Utc>) -> bool {
    invite.accepted_utc.is_none() && invite.revoked_utc.is_none() && invite.expires_utc > now
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteSummary {
    pub invite_id: Uuid,
    pub email: String,
    pub role: String,
    pub invited_by_user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<OrgInvite> for InviteSummary {
    fn from(invite: OrgInvite) -> Self {
        Self {
            invite_id: invite.invite_id,
            email: invite.email,
            role: invite.role,
            invited_by_user_id: invite.invited_by_user_id,
            expires_at: invite.expires_utc,
            created_at: invite.created_utc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invite(now: DateTime<Utc>) -> OrgInvite {
        OrgInvite::new(
            Uuid::new_v4(),
            "x@y.co".to_string(),
            InviteRole::Member,
            "h".repeat(64),
            Uuid::new_v4(),
            None,
            now,
        )
    }

    #[test]
    fn test_invite_active_window() {
        let now = Utc::now();
        let i = invite(now);
        assert!(invite_is_active(&i, now));
        assert!(!invite_is_active(&i, now + Duration::days(7)));
    }

    #[test]
    fn test_accepted_or_revoked_is_inactive() {
        let now = Utc::now();
        let mut accepted = invite(now);
        accepted.accepted_utc = Some(now);
        assert!(!invite_is_active(&accepted, now));

        let mut revoked = invite(now);
        revoked.revoked_utc = Some(now);
        assert!(!invite_is_active(&revoked, now));
    }

    #[test]
    fn test_role_mapping() {
        assert_eq!(InviteRole::Admin.member_role(), Some(MemberRole::Admin));
        assert_eq!(InviteRole::Member.member_role(), Some(MemberRole::Pm));
        assert_eq!(InviteRole::Viewer.member_role(), Some(MemberRole::Viewer));
        assert_eq!(InviteRole::Owner.member_role(), None);
        assert_eq!(InviteRole::parse(" Viewer "), Some(InviteRole::Viewer));
        assert_eq!(InviteRole::parse("superuser"), None);
    }
}
