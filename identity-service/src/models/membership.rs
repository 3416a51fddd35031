//! Organization membership and workspaces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Owner,
    Admin,
    Pm,
    Viewer,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Owner => "owner",
            MemberRole::Admin => "admin",
            MemberRole::Pm => "pm",
            MemberRole::Viewer => "viewer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "owner" => Some(MemberRole::Owner),
            "admin" => Some(MemberRole::Admin),
            "pm" => Some(MemberRole::Pm),
            "viewer" => Some(MemberRole::Viewer),
            _ => None,
        }
    }

    /// May issue, list and revoke invites.
    pub fn can_manage_invites(&self) -> bool {
        matches!(self, MemberRole::Owner | MemberRole::Admin)
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct OrganizationMember {
    pub organization_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    pub created_utc: DateTime<Utc>,
}

impl OrganizationMember {
    pub fn new(organization_id: Uuid, user_id: Uuid, role: MemberRole, now: DateTime<Utc>) -> Self {
        Self {
            organization_id,
            user_id,
            role: role.as_str().to_string(),
            created_utc: now,
        }
    }

    pub fn member_role(&self) -> Option<MemberRole> {
        MemberRole::parse(&self.role)
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Workspace {
    pub workspace_id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub slug: String,
    pub created_utc: DateTime<Utc>,
}

impl Workspace {
    pub fn new(organization_id: Uuid, name: String, slug: String, now: DateTime<Utc>) -> Self {
        Self {
            workspace_id: Uuid::new_v4(),
            organization_id,
            name,
            slug,
            created_utc: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip_and_authority() {
        for role in [MemberRole::Owner, MemberRole::Admin, MemberRole::Pm, MemberRole::Viewer] {
            assert_eq!(MemberRole::parse(role.as_str()), Some(role));
        }
        assert_eq!(MemberRole::parse("member"), None);
        assert!(MemberRole::Owner.can_manage_invites());
        assert!(MemberRole::Admin.can_manage_invites());
        assert!(!MemberRole::Pm.can_manage_invites());
        assert!(!MemberRole::Viewer.can_manage_invites());
    }
}
