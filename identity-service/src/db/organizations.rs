use chrono::{DateTime, Utc};
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::{MemberRole, Organization, OrganizationMember, Workspace};

pub async fn slug_exists<'e, E>(executor: E, slug: &str) -> Result<bool, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM organizations WHERE slug = $1)")
            .bind(slug)
            .fetch_one(executor)
            .await?;
    Ok(exists)
}

pub async fn find_by_id<'e, E>(
    executor: E,
    organization_id: Uuid,
) -> Result<Option<Organization>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, Organization>("SELECT * FROM organizations WHERE organization_id = $1")
        .bind(organization_id)
        .fetch_optional(executor)
        .await
}

pub async fn insert<'e, E>(executor: E, org: &Organization) -> Result<(), sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO organizations (organization_id, name, slug, status, settings, created_utc, updated_utc)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(org.organization_id)
    .bind(&org.name)
    .bind(&org.slug)
    .bind(&org.status)
    .bind(&org.settings)
    .bind(org.created_utc)
    .bind(org.updated_utc)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn insert_member<'e, E>(executor: E, member: &OrganizationMember) -> Result<(), sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO organization_members (organization_id, user_id, role, created_utc)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(member.organization_id)
    .bind(member.user_id)
    .bind(&member.role)
    .bind(member.created_utc)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn find_member<'e, E>(
    executor: E,
    organization_id: Uuid,
    user_id: Uuid,
) -> Result<Option<OrganizationMember>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, OrganizationMember>(
        "SELECT * FROM organization_members WHERE organization_id = $1 AND user_id = $2",
    )
    .bind(organization_id)
    .bind(user_id)
    .fetch_optional(executor)
    .await
}

pub async fn insert_workspace<'e, E>(executor: E, workspace: &Workspace) -> Result<(), sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO workspaces (workspace_id, organization_id, name, slug, created_utc)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(workspace.workspace_id)
    .bind(workspace.organization_id)
    .bind(&workspace.name)
    .bind(&workspace.slug)
    .bind(workspace.created_utc)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn insert_workspace_member<'e, E>(
    executor: E,
    workspace_id: Uuid,
    user_id: Uuid,
    role: MemberRole,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO workspace_members (workspace_id, user_id, role, created_utc)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(workspace_id)
    .bind(user_id)
    .bind(role.as_str())
    .bind(now)
    .execute(executor)
    .await?;
    Ok(())
}
