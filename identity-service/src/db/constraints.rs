//! Unique-violation classification.
//!
//! Callers branch on which constraint fired, never on raw error text. The
//! constraint name reported by Postgres is matched first; the message is only
//! searched when the driver did not surface a name.

use sqlx::Error as SqlxError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueConstraint {
    UserEmail,
    OrganizationSlug,
    OrganizationName,
    WorkspaceSlug,
    OpenInviteEmail,
    InviteTokenHash,
    SessionRefreshHash,
    VerificationTokenHash,
}

/// Constraint (or unique index) name to kind. Names match the migrations.
pub const UNIQUE_CONSTRAINTS: &[(&str, UniqueConstraint)] = &[
    ("users_org_email_key", UniqueConstraint::UserEmail),
    ("organizations_slug_key", UniqueConstraint::OrganizationSlug),
    ("organizations_name_key", UniqueConstraint::OrganizationName),
    ("workspaces_org_slug_key", UniqueConstraint::WorkspaceSlug),
    ("org_invites_open_email_key", UniqueConstraint::OpenInviteEmail),
    ("org_invites_token_hash_key", UniqueConstraint::InviteTokenHash),
    (
        "auth_sessions_refresh_token_hash_key",
        UniqueConstraint::SessionRefreshHash,
    ),
    (
        "email_verification_tokens_token_hash_key",
        UniqueConstraint::VerificationTokenHash,
    ),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    Known(UniqueConstraint),
    /// Unique violation on a constraint not in the table.
    Unknown(Option<String>),
}

pub fn lookup(constraint: &str) -> Option<UniqueConstraint> {
    UNIQUE_CONSTRAINTS
        .iter()
        .find(|(name, _)| *name == constraint)
        .map(|(_, kind)| *kind)
}

/// Pure form of [`classify`], separated for testing.
pub fn classify_parts(
    is_unique_violation: bool,
    constraint: Option<&str>,
    message: &str,
) -> Option<Violation> {
    if !is_unique_violation {
        return None;
    }

    if let Some(name) = constraint {
        return Some(match lookup(name) {
            Some(kind) => Violation::Known(kind),
            None => Violation::Unknown(Some(name.to_string())),
        });
    }

    // Longest names first so a name that prefixes another cannot shadow it.
    let mut by_len: Vec<&(&str, UniqueConstraint)> = UNIQUE_CONSTRAINTS.iter().collect();
    by_len.sort_by_key(|(name, _)| std::cmp::Reverse(name.len()));

    Some(
        by_len
            .into_iter()
            .find(|(name, _)| message.contains(name))
            .map(|(_, kind)| Violation::Known(*kind))
            .unwrap_or(Violation::Unknown(None)),
    )
}

/// `None` unless `err` is a unique violation.
pub fn classify(err: &SqlxError) -> Option<Violation> {
    match err {
        SqlxError::Database(db_err) => classify_parts(
            db_err.is_unique_violation(),
            db_err.constraint(),
            db_err.message(),
        ),
        _ => None,
    }
}

pub fn is_violation_of(err: &SqlxError, kind: UniqueConstraint) -> bool {
    classify(err) == Some(Violation::Known(kind))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_table_entry_resolves() {
        for (name, kind) in UNIQUE_CONSTRAINTS {
            assert_eq!(
                classify_parts(true, Some(*name), ""),
                Some(Violation::Known(*kind))
            );
        }
    }

    #[test]
    fn test_non_unique_errors_are_ignored() {
        assert_eq!(classify_parts(false, Some("users_org_email_key"), ""), None);
        assert_eq!(classify(&SqlxError::RowNotFound), None);
    }

    #[test]
    fn test_unknown_constraint_is_reported() {
        assert_eq!(
            classify_parts(true, Some("something_else_key"), ""),
            Some(Violation::Unknown(Some("something_else_key".to_string())))
        );
    }

    #[test]
    fn test_message_fallback() {
        let msg = r#"duplicate key value violates unique constraint "organizations_slug_key""#;
        assert_eq!(
            classify_parts(true, None, msg),
            Some(Violation::Known(UniqueConstraint::OrganizationSlug))
        );
        assert_eq!(
            classify_parts(true, None, "duplicate key"),
            Some(Violation::Unknown(None))
        );
    }
}
