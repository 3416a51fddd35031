use chrono::{DateTime, Utc};
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::{OutboxEvent, OutboxMessage, OutboxStatus};

/// Insert a pending row, due immediately. Call with the caller's transaction.
pub async fn enqueue<'e, E>(
    executor: E,
    event: &OutboxEvent,
    now: DateTime<Utc>,
) -> Result<Uuid, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    let outbox_id = Uuid::new_v4();
    let payload = event
        .payload()
        .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

    sqlx::query(
        r#"
        INSERT INTO auth_outbox (
            outbox_id, event_type, payload, status, attempts, next_attempt_utc, created_utc, updated_utc
        )
        VALUES ($1, $2, $3, $4, 0, $5, $5, $5)
        "#,
    )
    .bind(outbox_id)
    .bind(event.event_type())
    .bind(payload)
    .bind(OutboxStatus::Pending.as_str())
    .bind(now)
    .execute(executor)
    .await?;

    Ok(outbox_id)
}

/// Lock due rows, skipping rows another replica holds. Must run inside a transaction.
pub async fn select_due_for_update<'e, E>(
    executor: E,
    batch_size: i64,
    max_attempts: i32,
    now: DateTime<Utc>,
) -> Result<Vec<Uuid>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_scalar(
        r#"
        SELECT outbox_id FROM auth_outbox
        WHERE next_attempt_utc <= $1
          AND (status = 'pending' OR (status = 'failed' AND attempts < $2))
        ORDER BY created_utc
        LIMIT $3
        FOR UPDATE SKIP LOCKED
        "#,
    )
    .bind(now)
    .bind(max_attempts)
    .bind(batch_size)
    .fetch_all(executor)
    .await
}

pub async fn mark_processing<'e, E>(
    executor: E,
    ids: &[Uuid],
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE auth_outbox
        SET status = 'processing', claimed_utc = $2, updated_utc = $2
        WHERE outbox_id = ANY($1)
        "#,
    )
    .bind(ids)
    .bind(now)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

pub async fn load_by_ids<'e, E>(executor: E, ids: &[Uuid]) -> Result<Vec<OutboxMessage>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, OutboxMessage>(
        "SELECT * FROM auth_outbox WHERE outbox_id = ANY($1) ORDER BY created_utc",
    )
    .bind(ids)
    .fetch_all(executor)
    .await
}

pub async fn find_by_id<'e, E>(executor: E, outbox_id: Uuid) -> Result<Option<OutboxMessage>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, OutboxMessage>("SELECT * FROM auth_outbox WHERE outbox_id = $1")
        .bind(outbox_id)
        .fetch_optional(executor)
        .await
}

/// Only transitions a row this worker still holds.
pub async fn mark_completed<'e, E>(
    executor: E,
    outbox_id: Uuid,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE auth_outbox
        SET status = 'completed', processed_utc = $2, last_error = NULL, updated_utc = $2
        WHERE outbox_id = $1 AND status = 'processing'
        "#,
    )
    .bind(outbox_id)
    .bind(now)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Record a failed attempt: back to `pending` at `next_attempt_utc`, or `failed`.
pub async fn record_failure<'e, E>(
    executor: E,
    outbox_id: Uuid,
    status: OutboxStatus,
    attempts: i32,
    next_attempt_utc: DateTime<Utc>,
    last_error: &str,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE auth_outbox
        SET status = $2,
            attempts = $3,
            next_attempt_utc = $4,
            last_error = $5,
            claimed_utc = NULL,
            updated_utc = $6
        WHERE outbox_id = $1 AND status = 'processing'
        "#,
    )
    .bind(outbox_id)
    .bind(status.as_str())
    .bind(attempts)
    .bind(next_attempt_utc)
    .bind(last_error)
    .bind(now)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Return rows stuck in `processing` since before `cutoff` to `pending`.
/// Stale claims count as an attempt, so a row that keeps killing its worker still reaches `failed`.
pub async fn reclaim_stale<'e, E>(
    executor: E,
    cutoff: DateTime<Utc>,
    max_attempts: i32,
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE auth_outbox
        SET attempts = attempts + 1,
            status = CASE WHEN attempts + 1 >= $2 THEN 'failed' ELSE 'pending' END,
            last_error = 'Claim expired before completion',
            claimed_utc = NULL,
            updated_utc = $3
        WHERE status = 'processing' AND claimed_utc < $1
        "#,
    )
    .bind(cutoff)
    .bind(max_attempts)
    .bind(now)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

pub async fn requeue_failed<'e, E>(
    executor: E,
    outbox_id: Uuid,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE auth_outbox
        SET status = 'pending', attempts = 0, next_attempt_utc = $2, last_error = NULL,
            claimed_utc = NULL, updated_utc = $2
        WHERE outbox_id = $1 AND status = 'failed'
        "#,
    )
    .bind(outbox_id)
    .bind(now)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}
