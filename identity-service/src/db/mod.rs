//! PostgreSQL pool, migrations and the query functions used by the services.
//!
//! Query functions take any `PgExecutor` so the same statement runs against the
//! pool or inside a caller's transaction.

pub mod audit;
pub mod constraints;
pub mod invites;
pub mod organizations;
pub mod outbox;
pub mod sessions;
pub mod users;
pub mod verification_tokens;

use chrono::{DateTime, SubsecRound, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use crate::config::DatabaseConfig;

pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    tracing::info!("Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&config.url)
        .await?;

    tracing::info!(
        max_connections = config.max_connections,
        "Connected to PostgreSQL"
    );

    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database migrations completed");
    Ok(())
}

/// Current time at `timestamptz` precision, so values handed back to callers match what was stored.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

pub async fn health_check(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_has_microsecond_precision() {
        let now = now();
        assert_eq!(now.timestamp_subsec_nanos() % 1_000, 0);
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL; set TEST_DATABASE_URL"]
    async fn test_create_pool_and_health_check() {
        let config = DatabaseConfig {
            url: std::env::var("TEST_DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/identity_test".to_string()),
            max_connections: 2,
            min_connections: 1,
        };

        let pool = create_pool(&config).await.expect("pool");
        assert!(health_check(&pool).await.is_ok());
    }
}
