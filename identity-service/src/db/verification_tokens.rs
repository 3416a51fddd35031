use chrono::{DateTime, Utc};
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::EmailVerificationToken;

/// Mark every unused token of `user_id` as used so only the newest one works.
pub async fn invalidate_unused<'e, E>(
    executor: E,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        "UPDATE email_verification_tokens SET used_utc = $2 WHERE user_id = $1 AND used_utc IS NULL",
    )
    .bind(user_id)
    .bind(now)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

pub async fn insert<'e, E>(executor: E, token: &EmailVerificationToken) -> Result<(), sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO email_verification_tokens (
            token_id, user_id, token_hash, expires_utc, used_utc, created_utc, request_ip, user_agent
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(token.token_id)
    .bind(token.user_id)
    .bind(&token.token_hash)
    .bind(token.expires_utc)
    .bind(token.used_utc)
    .bind(token.created_utc)
    .bind(&token.request_ip)
    .bind(&token.user_agent)
    .execute(executor)
    .await?;
    Ok(())
}

/// Row-lock the unused token with this hash. Must run inside a transaction.
pub async fn lock_unused_by_hash<'e, E>(
    executor: E,
    token_hash: &str,
) -> Result<Option<EmailVerificationToken>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, EmailVerificationToken>(
        r#"
        SELECT * FROM email_verification_tokens
        WHERE token_hash = $1 AND used_utc IS NULL
        FOR UPDATE
        "#,
    )
    .bind(token_hash)
    .fetch_optional(executor)
    .await
}

pub async fn mark_used<'e, E>(executor: E, token_id: Uuid, now: DateTime<Utc>) -> Result<(), sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query("UPDATE email_verification_tokens SET used_utc = $2 WHERE token_id = $1")
        .bind(token_id)
        .bind(now)
        .execute(executor)
        .await?;
    Ok(())
}
