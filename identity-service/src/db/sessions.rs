use chrono::{DateTime, Utc};
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::AuthSession;

pub async fn insert<'e, E>(executor: E, session: &AuthSession) -> Result<(), sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO auth_sessions (
            session_id, organization_id, user_id, refresh_token_hash, previous_refresh_token_hash,
            refresh_expires_utc, created_utc, last_seen_utc, revoked_utc, revoke_reason,
            user_agent, ip_address
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(session.session_id)
    .bind(session.organization_id)
    .bind(session.user_id)
    .bind(&session.refresh_token_hash)
    .bind(&session.previous_refresh_token_hash)
    .bind(session.refresh_expires_utc)
    .bind(session.created_utc)
    .bind(session.last_seen_utc)
    .bind(session.revoked_utc)
    .bind(&session.revoke_reason)
    .bind(&session.user_agent)
    .bind(&session.ip_address)
    .execute(executor)
    .await?;
    Ok(())
}

/// Swap `current_hash` for `new_hash` on a live session in one statement.
///
/// `None` when no unrevoked, unexpired session holds `current_hash`; two
/// concurrent calls with the same hash cannot both succeed.
pub async fn rotate_refresh_hash<'e, E>(
    executor: E,
    current_hash: &str,
    new_hash: &str,
    now: DateTime<Utc>,
) -> Result<Option<AuthSession>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, AuthSession>(
        r#"
        UPDATE auth_sessions
        SET refresh_token_hash = $2,
            previous_refresh_token_hash = $1,
            last_seen_utc = $3
        WHERE refresh_token_hash = $1
          AND revoked_utc IS NULL
          AND refresh_expires_utc > $3
        RETURNING *
        "#,
    )
    .bind(current_hash)
    .bind(new_hash)
    .bind(now)
    .fetch_optional(executor)
    .await
}

/// Revoke the live session whose *previous* hash is `hash` (a replayed token).
pub async fn revoke_by_previous_hash<'e, E>(
    executor: E,
    hash: &str,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<Option<AuthSession>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, AuthSession>(
        r#"
        UPDATE auth_sessions
        SET revoked_utc = $3, revoke_reason = $2
        WHERE previous_refresh_token_hash = $1
          AND revoked_utc IS NULL
        RETURNING *
        "#,
    )
    .bind(hash)
    .bind(reason)
    .bind(now)
    .fetch_optional(executor)
    .await
}

pub async fn find_by_id<'e, E>(executor: E, session_id: Uuid) -> Result<Option<AuthSession>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, AuthSession>("SELECT * FROM auth_sessions WHERE session_id = $1")
        .bind(session_id)
        .fetch_optional(executor)
        .await
}

/// Returns false when the session was already revoked or does not exist.
pub async fn revoke<'e, E>(
    executor: E,
    session_id: Uuid,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE auth_sessions
        SET revoked_utc = $3, revoke_reason = $2
        WHERE session_id = $1 AND revoked_utc IS NULL
        "#,
    )
    .bind(session_id)
    .bind(reason)
    .bind(now)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn revoke_by_hash<'e, E>(
    executor: E,
    hash: &str,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<Option<AuthSession>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, AuthSession>(
        r#"
        UPDATE auth_sessions
        SET revoked_utc = $3, revoke_reason = $2
        WHERE refresh_token_hash = $1 AND revoked_utc IS NULL
        RETURNING *
        "#,
    )
    .bind(hash)
    .bind(reason)
    .bind(now)
    .fetch_optional(executor)
    .await
}

pub async fn revoke_all_for_user<'e, E>(
    executor: E,
    user_id: Uuid,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE auth_sessions
        SET revoked_utc = $3, revoke_reason = $2
        WHERE user_id = $1 AND revoked_utc IS NULL
        "#,
    )
    .bind(user_id)
    .bind(reason)
    .bind(now)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}
