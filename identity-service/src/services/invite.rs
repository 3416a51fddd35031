//! Organization invites: issue, preview, accept once, revoke.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use std::sync::Arc;
use uuid::Uuid;
use validator::ValidateEmail;

use crate::db;
use crate::db::constraints::{self, UniqueConstraint};
use crate::db::invites::InvitePreview;
use crate::models::invitation::invite_expiry;
use crate::models::{
    invite_is_active, normalize_email, AuditEvent, AuditEventType, InviteCreated, InviteRole,
    InviteSummary, MemberRole, OrgInvite, OrganizationMember, OutboxEvent, User,
};
use crate::services::error::ServiceError;
use crate::services::metrics;
use crate::services::templates;
use crate::services::token_hash::TokenHasher;
use crate::utils::{hash_password_async, Password};

pub const INVITE_NOT_FOUND: &str = "Invite not found or no longer valid";
pub const INVITE_MESSAGE_MAX_LEN: usize = 1000;

/// The authenticated user acting on their own organization.
#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub user_id: Uuid,
    pub organization_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct CreateInviteInput {
    pub email: String,
    pub role: String,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedInvite {
    pub invite_id: Uuid,
    pub email: String,
    pub role: String,
    pub expires_at: DateTime<Utc>,
    /// One-time link; the raw token is not recoverable afterwards.
    pub invite_link: String,
    /// True when an open invite was refreshed instead of a new one created.
    pub reissued: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedInvite {
    pub user_id: Uuid,
    pub organization_id: Uuid,
}

#[derive(Clone)]
pub struct InviteService {
    pool: PgPool,
    hasher: Arc<TokenHasher>,
    public_url: String,
}

impl InviteService {
    pub fn new(pool: PgPool, hasher: Arc<TokenHasher>, public_url: String) -> Self {
        Self {
            pool,
            hasher,
            public_url,
        }
    }

    pub async fn create_invite(
        &self,
        actor: Actor,
        input: CreateInviteInput,
    ) -> Result<CreatedInvite, ServiceError> {
        self.authorize(actor).await?;

        let role = parse_invite_role(&input.role)?;
        let email = normalize_email(&input.email);
        if !email.validate_email() {
            return Err(ServiceError::validation("Invalid email address"));
        }
        let message = input
            .message
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty());
        if message
            .as_ref()
            .is_some_and(|m| m.chars().count() > INVITE_MESSAGE_MAX_LEN)
        {
            return Err(ServiceError::validation(format!(
                "Message must be at most {} characters",
                INVITE_MESSAGE_MAX_LEN
            )));
        }

        let raw = self.hasher.generate_raw_token();

        let mut tx = self.pool.begin().await?;
        let now = db::now();

        let (invite, reissued) = self
            .upsert_open_invite(&mut tx, actor, &email, role, &raw, message, now)
            .await
            .map_err(|e| {
                map_unique_violation(
                    e,
                    UniqueConstraint::OpenInviteEmail,
                    "Another invite for this email was just issued; please retry",
                )
            })?;

        tx.commit().await?;

        tracing::info!(
            invite_id = %invite.invite_id,
            organization_id = %actor.organization_id,
            role = %invite.role,
            reissued,
            "Invite issued"
        );

        Ok(CreatedInvite {
            invite_id: invite.invite_id,
            email: invite.email,
            role: invite.role,
            expires_at: invite.expires_utc,
            invite_link: templates::invite_link(&self.public_url, &raw),
            reissued,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn upsert_open_invite(
        &self,
        conn: &mut PgConnection,
        actor: Actor,
        email: &str,
        role: InviteRole,
        raw_token: &str,
        message: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(OrgInvite, bool), ServiceError> {
        let token_hash = self.hasher.hash_token(raw_token);

        let org = db::organizations::find_by_id(&mut *conn, actor.organization_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Organization not found"))?;

        if db::users::find_by_email_in_org(&mut *conn, org.organization_id, email)
            .await?
            .is_some()
        {
            return Err(ServiceError::conflict(
                "A user with this email is already a member of the organization",
            ));
        }

        let open = db::invites::lock_open_for_email(&mut *conn, org.organization_id, email).await?;

        let (invite, reissued) = match open {
            Some(mut existing) if invite_is_active(&existing, now) => {
                existing.token_hash = token_hash;
                existing.role = role.as_str().to_string();
                existing.invited_by_user_id = actor.user_id;
                existing.message = message;
                existing.expires_utc = invite_expiry(now);
                existing.updated_utc = now;
                (db::invites::reissue(&mut *conn, &existing).await?, true)
            }
            stale => {
                if let Some(expired) = stale {
                    // Close it so the open-invite unique index admits the new row.
                    db::invites::revoke(&mut *conn, org.organization_id, expired.invite_id, now)
                        .await?;
                }
                let invite = OrgInvite::new(
                    org.organization_id,
                    email.to_string(),
                    role,
                    token_hash,
                    actor.user_id,
                    message,
                    now,
                );
                db::invites::insert(&mut *conn, &invite).await?;
                (invite, false)
            }
        };

        let event = OutboxEvent::InviteCreated(InviteCreated {
            email: invite.email.clone(),
            token: raw_token.to_string(),
            org_name: org.name.clone(),
            role: invite.role.clone(),
            message: invite.message.clone(),
            expires_at: invite.expires_utc,
        });
        db::outbox::enqueue(&mut *conn, &event, now).await?;

        let audit = AuditEvent::new(AuditEventType::InviteCreated, now)
            .with_organization(org.organization_id)
            .with_actor(actor.user_id)
            .with_target("org_invite", invite.invite_id)
            .with_data(serde_json::json!({ "role": invite.role, "reissued": reissued }));
        db::audit::insert(&mut *conn, &audit).await?;

        Ok((invite, reissued))
    }

    pub async fn validate_invite_token(&self, raw: &str) -> Result<InvitePreview, ServiceError> {
        let hash = self.hasher.hash_token(raw);
        db::invites::find_active_preview(&self.pool, &hash, db::now())
            .await?
            .ok_or_else(|| ServiceError::not_found(INVITE_NOT_FOUND))
    }

    /// Create the invited account. Exactly one of any number of concurrent
    /// calls with the same token succeeds.
    pub async fn accept_invite(
        &self,
        raw: &str,
        full_name: &str,
        password: Password,
    ) -> Result<AcceptedInvite, ServiceError> {
        let full_name = full_name.trim().to_string();
        if !(1..=100).contains(&full_name.chars().count()) {
            return Err(ServiceError::validation(
                "Full name must be between 1 and 100 characters",
            ));
        }
        if !password.has_valid_length() {
            return Err(ServiceError::validation(
                "Password must be between 8 and 128 characters",
            ));
        }

        // Hash before taking the row lock.
        let password_hash = hash_password_async(password).await?.into_string();
        let hash = self.hasher.hash_token(raw);

        let mut tx = self.pool.begin().await?;
        let now = db::now();

        let result = accept_in(&mut tx, &hash, full_name, password_hash, now)
            .await
            .map_err(|e| {
                map_unique_violation(
                    e,
                    UniqueConstraint::UserEmail,
                    "An account with this email already exists in the organization",
                )
            });

        match result {
            Ok(accepted) => {
                tx.commit().await?;
                metrics::record_invite_accept("accepted");
                tracing::info!(
                    user_id = %accepted.user_id,
                    organization_id = %accepted.organization_id,
                    "Invite accepted"
                );
                Ok(accepted)
            }
            Err(err) => {
                metrics::record_invite_accept(match &err {
                    ServiceError::NotFound(_) => "not_found",
                    ServiceError::Conflict(_) => "conflict",
                    ServiceError::Forbidden(_) => "forbidden",
                    _ => "error",
                });
                Err(err)
            }
        }
    }

    pub async fn revoke_invite(&self, actor: Actor, invite_id: Uuid) -> Result<(), ServiceError> {
        self.authorize(actor).await?;

        let now = db::now();
        let mut tx = self.pool.begin().await?;

        if !db::invites::revoke(&mut *tx, actor.organization_id, invite_id, now).await? {
            return Err(ServiceError::not_found(INVITE_NOT_FOUND));
        }

        let audit = AuditEvent::new(AuditEventType::InviteRevoked, now)
            .with_organization(actor.organization_id)
            .with_actor(actor.user_id)
            .with_target("org_invite", invite_id);
        db::audit::insert(&mut *tx, &audit).await?;

        tx.commit().await?;
        tracing::info!(invite_id = %invite_id, "Invite revoked");
        Ok(())
    }

    pub async fn list_pending_invites(&self, actor: Actor) -> Result<Vec<InviteSummary>, ServiceError> {
        self.authorize(actor).await?;
        let invites =
            db::invites::list_pending(&self.pool, actor.organization_id, db::now()).await?;
        Ok(invites.into_iter().map(InviteSummary::from).collect())
    }

    /// Owner or admin of their organization, per `organization_members`.
    async fn authorize(&self, actor: Actor) -> Result<MemberRole, ServiceError> {
        let member =
            db::organizations::find_member(&self.pool, actor.organization_id, actor.user_id).await?;

        match member.and_then(|m| m.member_role()) {
            Some(role) if role.can_manage_invites() => Ok(role),
            _ => {
                tracing::warn!(
                    user_id = %actor.user_id,
                    organization_id = %actor.organization_id,
                    "Invite management denied"
                );
                Err(ServiceError::forbidden(
                    "Only organization owners and admins can manage invites",
                ))
            }
        }
    }
}

async fn accept_in(
    conn: &mut PgConnection,
    token_hash: &str,
    full_name: String,
    password_hash: String,
    now: DateTime<Utc>,
) -> Result<AcceptedInvite, ServiceError> {
    // The only authoritative check: a second acceptor waits on this lock and
    // then no longer matches the filter.
    let invite = db::invites::lock_active_by_hash(&mut *conn, token_hash, now)
        .await?
        .ok_or_else(|| ServiceError::not_found(INVITE_NOT_FOUND))?;

    if db::users::find_by_email_in_org(&mut *conn, invite.organization_id, &invite.email)
        .await?
        .is_some()
    {
        return Err(ServiceError::conflict(
            "An account with this email already exists in the organization",
        ));
    }

    let member_role = match invite.invite_role() {
        Some(InviteRole::Owner) => {
            return Err(ServiceError::forbidden("Invites cannot grant the owner role"))
        }
        Some(role) => role
            .member_role()
            .ok_or_else(|| ServiceError::forbidden("Invites cannot grant the owner role"))?,
        None => return Err(ServiceError::validation("Invite carries an unsupported role")),
    };

    let user = User::new(
        invite.organization_id,
        invite.email.clone(),
        password_hash,
        full_name,
        member_role,
        now,
    )
    .verified_at(now);
    db::users::insert(&mut *conn, &user).await?;

    let membership = OrganizationMember::new(invite.organization_id, user.user_id, member_role, now);
    db::organizations::insert_member(&mut *conn, &membership).await?;

    db::invites::mark_accepted(&mut *conn, invite.invite_id, now).await?;

    let audit = AuditEvent::new(AuditEventType::InviteAccepted, now)
        .with_organization(invite.organization_id)
        .with_actor(user.user_id)
        .with_target("org_invite", invite.invite_id)
        .with_data(serde_json::json!({ "role": member_role.as_str() }));
    db::audit::insert(&mut *conn, &audit).await?;

    Ok(AcceptedInvite {
        user_id: user.user_id,
        organization_id: invite.organization_id,
    })
}

/// Unknown role → validation error; owner → authorization error.
pub fn parse_invite_role(raw: &str) -> Result<InviteRole, ServiceError> {
    match InviteRole::parse(raw) {
        Some(InviteRole::Owner) => Err(ServiceError::forbidden("Invites cannot grant the owner role")),
        Some(role) => Ok(role),
        None => Err(ServiceError::validation(format!(
            "Unknown role '{}'; expected admin, member or viewer",
            raw.trim()
        ))),
    }
}

/// A lost race on `kind` surfaces as a conflict instead of a 500.
fn map_unique_violation(err: ServiceError, kind: UniqueConstraint, message: &str) -> ServiceError {
    let lost_race = matches!(
        &err,
        ServiceError::Database(db_err) if constraints::is_violation_of(db_err, kind)
    );
    if lost_race {
        ServiceError::conflict(message)
    } else {
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_invite_role() {
        assert_eq!(parse_invite_role("member").unwrap(), InviteRole::Member);
        assert_eq!(parse_invite_role("Admin").unwrap(), InviteRole::Admin);
        assert!(matches!(parse_invite_role("owner"), Err(ServiceError::Forbidden(_))));
        assert!(matches!(parse_invite_role("root"), Err(ServiceError::Validation(_))));
    }

    #[test]
    fn test_map_unique_violation_leaves_other_errors() {
        let mapped = map_unique_violation(
            ServiceError::Database(sqlx::Error::RowNotFound),
            UniqueConstraint::OpenInviteEmail,
            "retry",
        );
        assert!(matches!(mapped, ServiceError::Database(_)));
    }
}
