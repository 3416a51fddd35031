use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgExecutor};
use uuid::Uuid;

use crate::models::OrgInvite;

/// What an invitee may see before accepting.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitePreview {
    pub email: String,
    pub role: String,
    pub organization_name: String,
    #[serde(rename = "expiresAt")]
    pub expires_utc: DateTime<Utc>,
}

/// Row-lock the open (unaccepted, unrevoked) invite for org + email, expired or not.
pub async fn lock_open_for_email<'e, E>(
    executor: E,
    organization_id: Uuid,
    email: &str,
) -> Result<Option<OrgInvite>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, OrgInvite>(
        r#"
        SELECT * FROM org_invites
        WHERE organization_id = $1
          AND email = $2
          AND accepted_utc IS NULL
          AND revoked_utc IS NULL
        FOR UPDATE
        "#,
    )
    .bind(organization_id)
    .bind(email)
    .fetch_optional(executor)
    .await
}

/// Re-issue an open invite in place: new token, role, inviter, message and expiry.
pub async fn reissue<'e, E>(executor: E, invite: &OrgInvite) -> Result<OrgInvite, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, OrgInvite>(
        r#"
        UPDATE org_invites
        SET token_hash = $2,
            role = $3,
            invited_by_user_id = $4,
            message = $5,
            expires_utc = $6,
            updated_utc = $7
        WHERE invite_id = $1
        RETURNING *
        "#,
    )
    .bind(invite.invite_id)
    .bind(&invite.token_hash)
    .bind(&invite.role)
    .bind(invite.invited_by_user_id)
    .bind(&invite.message)
    .bind(invite.expires_utc)
    .bind(invite.updated_utc)
    .fetch_one(executor)
    .await
}

pub async fn insert<'e, E>(executor: E, invite: &OrgInvite) -> Result<(), sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO org_invites (
            invite_id, organization_id, email, role, token_hash, invited_by_user_id, message,
            expires_utc, accepted_utc, revoked_utc, created_utc, updated_utc
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(invite.invite_id)
    .bind(invite.organization_id)
    .bind(&invite.email)
    .bind(&invite.role)
    .bind(&invite.token_hash)
    .bind(invite.invited_by_user_id)
    .bind(&invite.message)
    .bind(invite.expires_utc)
    .bind(invite.accepted_utc)
    .bind(invite.revoked_utc)
    .bind(invite.created_utc)
    .bind(invite.updated_utc)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn find_active_preview<'e, E>(
    executor: E,
    token_hash: &str,
    now: DateTime<Utc>,
) -> Result<Option<InvitePreview>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, InvitePreview>(
        r#"
        SELECT i.email, i.role, o.name AS organization_name, i.expires_utc
        FROM org_invites i
        JOIN organizations o ON o.organization_id = i.organization_id
        WHERE i.token_hash = $1
          AND i.accepted_utc IS NULL
          AND i.revoked_utc IS NULL
          AND i.expires_utc > $2
        "#,
    )
    .bind(token_hash)
    .bind(now)
    .fetch_optional(executor)
    .await
}

/// Row-lock the invite only if it is still active. The single authoritative
/// check for acceptance; a concurrent acceptor blocks here and then misses.
pub async fn lock_active_by_hash<'e, E>(
    executor: E,
    token_hash: &str,
    now: DateTime<Utc>,
) -> Result<Option<OrgInvite>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, OrgInvite>(
        r#"
        SELECT * FROM org_invites
        WHERE token_hash = $1
          AND accepted_utc IS NULL
          AND revoked_utc IS NULL
          AND expires_utc > $2
        FOR UPDATE
        "#,
    )
    .bind(token_hash)
    .bind(now)
    .fetch_optional(executor)
    .await
}

pub async fn mark_accepted<'e, E>(executor: E, invite_id: Uuid, now: DateTime<Utc>) -> Result<(), sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query("UPDATE org_invites SET accepted_utc = $2, updated_utc = $2 WHERE invite_id = $1")
        .bind(invite_id)
        .bind(now)
        .execute(executor)
        .await?;
    Ok(())
}

/// Close an open invite. Returns false if it was not open in this organization.
pub async fn revoke<'e, E>(
    executor: E,
    organization_id: Uuid,
    invite_id: Uuid,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE org_invites
        SET revoked_utc = $3, updated_utc = $3
        WHERE invite_id = $1
          AND organization_id = $2
          AND accepted_utc IS NULL
          AND revoked_utc IS NULL
        "#,
    )
    .bind(invite_id)
    .bind(organization_id)
    .bind(now)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn list_pending<'e, E>(
    executor: E,
    organization_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Vec<OrgInvite>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, OrgInvite>(
        r#"
        SELECT * FROM org_invites
        WHERE organization_id = $1
          AND accepted_utc IS NULL
          AND revoked_utc IS NULL
          AND expires_utc > $2
        ORDER BY created_utc DESC
        "#,
    )
    .bind(organization_id)
    .bind(now)
    .fetch_all(executor)
    .await
}
