//! Organization (tenant) model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrganizationStatus {
    Active,
    Suspended,
}

impl OrganizationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrganizationStatus::Active => "active",
            OrganizationStatus::Suspended => "suspended",
        }
    }
}

/// Per-organization settings stored as JSONB.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrganizationSettings {
    pub timezone: String,
    pub week_start_day: u8,
    pub default_workspace_name: String,
}

impl Default for OrganizationSettings {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
            week_start_day: 1,
            default_workspace_name: "General".to_string(),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Organization {
    pub organization_id: Uuid,
    pub name: String,
    pub slug: String,
    pub status: String,
    pub settings: sqlx::types::Json<OrganizationSettings>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Organization {
    pub fn new(name: String, slug: String, now: DateTime<Utc>) -> Self {
        Self {
            organization_id: Uuid::new_v4(),
            name,
            slug,
            status: OrganizationStatus::Active.as_str().to_string(),
            settings: sqlx::types::Json(OrganizationSettings::default()),
            created_utc: now,
            updated_utc: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == OrganizationStatus::Active.as_str()
    }
}
