use sqlx::PgExecutor;

use crate::models::AuditEvent;

pub async fn insert<'e, E>(executor: E, event: &AuditEvent) -> Result<(), sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO audit_events (
            event_id, organization_id, actor_user_id, event_type_code,
            target_type, target_id, event_data, created_utc
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(event.event_id)
    .bind(event.organization_id)
    .bind(event.actor_user_id)
    .bind(&event.event_type_code)
    .bind(&event.target_type)
    .bind(event.target_id)
    .bind(&event.event_data)
    .bind(event.created_utc)
    .execute(executor)
    .await?;
    Ok(())
}
