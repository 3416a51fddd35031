use chrono::{DateTime, Utc};
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::User;

pub async fn find_by_id<'e, E>(executor: E, user_id: Uuid) -> Result<Option<User>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(executor)
        .await
}

/// Any user with this (normalized) email, in any organization.
pub async fn find_by_email<'e, E>(executor: E, email: &str) -> Result<Option<User>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1 ORDER BY created_utc LIMIT 1")
        .bind(email)
        .fetch_optional(executor)
        .await
}

pub async fn find_by_email_in_org<'e, E>(
    executor: E,
    organization_id: Uuid,
    email: &str,
) -> Result<Option<User>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE organization_id = $1 AND email = $2")
        .bind(organization_id)
        .bind(email)
        .fetch_optional(executor)
        .await
}

/// Login candidates: active users with this email, optionally narrowed to one org slug.
pub async fn find_login_candidates<'e, E>(
    executor: E,
    email: &str,
    organization_slug: Option<&str>,
) -> Result<Vec<User>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, User>(
        r#"
        SELECT u.*
        FROM users u
        JOIN organizations o ON o.organization_id = u.organization_id
        WHERE u.email = $1
          AND u.active_flag
          AND o.status = 'active'
          AND ($2::text IS NULL OR o.slug = $2)
        ORDER BY u.created_utc
        LIMIT 5
        "#,
    )
    .bind(email)
    .bind(organization_slug)
    .fetch_all(executor)
    .await
}

pub async fn insert<'e, E>(executor: E, user: &User) -> Result<(), sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO users (
            user_id, organization_id, email, password_hash, full_name, role,
            is_email_verified, email_verified_utc, active_flag, created_utc, updated_utc
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(user.user_id)
    .bind(user.organization_id)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(&user.full_name)
    .bind(&user.role)
    .bind(user.is_email_verified)
    .bind(user.email_verified_utc)
    .bind(user.active_flag)
    .bind(user.created_utc)
    .bind(user.updated_utc)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn mark_email_verified<'e, E>(
    executor: E,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        UPDATE users
        SET is_email_verified = TRUE,
            email_verified_utc = COALESCE(email_verified_utc, $2),
            updated_utc = $2
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .bind(now)
    .execute(executor)
    .await?;
    Ok(())
}
