//! Self-serve sign-up: organization, owner account, default workspace.
//!
//! Callers see the same message whether or not an account was created, so the
//! endpoint cannot be used to probe which emails are registered.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;
use validator::ValidateEmail;

use crate::db;
use crate::db::constraints::{self, UniqueConstraint, Violation};
use crate::models::{
    normalize_email, AuditEvent, AuditEventType, MemberRole, Organization, OrganizationMember,
    RequestMetadata, User, Workspace,
};
use crate::services::error::ServiceError;
use crate::services::metrics;
use crate::services::slug::{self, SlugError};
use crate::services::verification::VerificationService;
use crate::utils::{hash_password_async, Password};

pub const REGISTRATION_NEUTRAL_MESSAGE: &str =
    "Thanks for signing up. If the email can be registered, a verification link is on its way.";

const DEFAULT_WORKSPACE_NAME: &str = "General";
const DEFAULT_WORKSPACE_SLUG: &str = "general";
const FALLBACK_SLUG_SUFFIX: &str = "org";

#[derive(Debug, Clone)]
pub struct RegistrationInput {
    pub organization_name: String,
    pub organization_slug: Option<String>,
    pub full_name: String,
    pub email: String,
    pub password: Password,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    Created {
        organization_id: Uuid,
        user_id: Uuid,
    },
    /// Nothing written; an account already uses this email.
    AlreadyRegistered,
}

impl RegistrationOutcome {
    pub fn message(&self) -> &'static str {
        REGISTRATION_NEUTRAL_MESSAGE
    }
}

/// Trimmed, validated fields.
#[derive(Debug)]
struct CheckedInput {
    organization_name: String,
    full_name: String,
    email: String,
}

#[derive(Clone)]
pub struct RegistrationService {
    pool: PgPool,
    verification: VerificationService,
}

impl RegistrationService {
    pub fn new(pool: PgPool, verification: VerificationService) -> Self {
        Self { pool, verification }
    }

    pub async fn register(
        &self,
        input: RegistrationInput,
        metadata: &RequestMetadata,
    ) -> Result<RegistrationOutcome, ServiceError> {
        let checked = check_input(&input)?;
        let slug = self
            .resolve_slug(&checked.organization_name, input.organization_slug.as_deref())
            .await?;
        let password_hash = hash_password_async(input.password).await?.into_string();

        let mut tx = self.pool.begin().await?;
        let now = db::now();

        let result = self
            .register_in(&mut tx, &checked, &slug, password_hash, now, metadata)
            .await;

        let outcome = match result {
            Ok(outcome @ RegistrationOutcome::Created { .. }) => {
                tx.commit().await?;
                outcome
            }
            Ok(RegistrationOutcome::AlreadyRegistered) => {
                tx.rollback().await?;
                RegistrationOutcome::AlreadyRegistered
            }
            Err(err) => {
                // Dropping `tx` rolls back.
                drop(tx);
                classify_failure(err)?
            }
        };

        match &outcome {
            RegistrationOutcome::Created {
                organization_id,
                user_id,
            } => {
                metrics::record_registration("created");
                tracing::info!(
                    organization_id = %organization_id,
                    user_id = %user_id,
                    slug = %slug,
                    "Organization registered"
                );
            }
            RegistrationOutcome::AlreadyRegistered => {
                metrics::record_registration("already_registered");
                tracing::info!("Registration skipped: email already registered");
            }
        }

        Ok(outcome)
    }

    async fn register_in(
        &self,
        conn: &mut PgConnection,
        input: &CheckedInput,
        slug: &str,
        password_hash: String,
        now: DateTime<Utc>,
        metadata: &RequestMetadata,
    ) -> Result<RegistrationOutcome, ServiceError> {
        // Serializes registrations of the same email across replicas until commit.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(&input.email)
            .execute(&mut *conn)
            .await?;

        if db::users::find_by_email(&mut *conn, &input.email)
            .await?
            .is_some()
        {
            return Ok(RegistrationOutcome::AlreadyRegistered);
        }

        let org = Organization::new(input.organization_name.clone(), slug.to_string(), now);
        db::organizations::insert(&mut *conn, &org).await?;

        let user = User::new(
            org.organization_id,
            input.email.clone(),
            password_hash,
            input.full_name.clone(),
            MemberRole::Admin,
            now,
        );
        db::users::insert(&mut *conn, &user).await?;

        let membership =
            OrganizationMember::new(org.organization_id, user.user_id, MemberRole::Owner, now);
        db::organizations::insert_member(&mut *conn, &membership).await?;

        let workspace = Workspace::new(
            org.organization_id,
            DEFAULT_WORKSPACE_NAME.to_string(),
            DEFAULT_WORKSPACE_SLUG.to_string(),
            now,
        );
        db::organizations::insert_workspace(&mut *conn, &workspace).await?;
        db::organizations::insert_workspace_member(
            &mut *conn,
            workspace.workspace_id,
            user.user_id,
            MemberRole::Owner,
            now,
        )
        .await?;

        self.verification
            .issue_token_in(&mut *conn, &user, now, metadata)
            .await?;

        let audit = AuditEvent::new(AuditEventType::OrganizationRegistered, now)
            .with_organization(org.organization_id)
            .with_actor(user.user_id)
            .with_target("organization", org.organization_id)
            .with_data(serde_json::json!({ "slug": org.slug }));
        db::audit::insert(&mut *conn, &audit).await?;

        Ok(RegistrationOutcome::Created {
            organization_id: org.organization_id,
            user_id: user.user_id,
        })
    }

    /// An explicit slug is taken as-is; otherwise derive one and probe for a free variant.
    async fn resolve_slug(
        &self,
        organization_name: &str,
        explicit: Option<&str>,
    ) -> Result<String, ServiceError> {
        if let Some(requested) = explicit.map(str::trim).filter(|s| !s.is_empty()) {
            let check = slug::validate(requested);
            if !check.valid {
                return Err(ServiceError::validation(
                    check.reason.unwrap_or_else(|| "Invalid slug".to_string()),
                ));
            }
            if db::organizations::slug_exists(&self.pool, requested).await? {
                return Err(ServiceError::conflict(
                    "Organization slug is already taken; choose another",
                ));
            }
            return Ok(requested.to_string());
        }

        let base = base_slug(organization_name);
        let pool = &self.pool;
        slug::assign_available(
            &base,
            |candidate| async move { db::organizations::slug_exists(pool, &candidate).await },
            slug::DEFAULT_MAX_ATTEMPTS,
        )
        .await
        .map_err(|e| match e {
            SlugError::Invalid { reason, .. } => ServiceError::validation(reason),
            SlugError::Lookup(db_err) => ServiceError::Database(db_err),
            SlugError::Exhausted { .. } => ServiceError::conflict(
                "Could not find an available organization slug; please provide one",
            ),
        })
    }
}

fn check_input(input: &RegistrationInput) -> Result<CheckedInput, ServiceError> {
    if !input.password.has_valid_length() {
        return Err(ServiceError::validation(
            "Password must be between 8 and 128 characters",
        ));
    }

    let organization_name = input.organization_name.trim();
    let name_len = organization_name.chars().count();
    if !(2..=100).contains(&name_len) {
        return Err(ServiceError::validation(
            "Organization name must be between 2 and 100 characters",
        ));
    }

    let full_name = input.full_name.trim();
    let full_name_len = full_name.chars().count();
    if !(1..=100).contains(&full_name_len) {
        return Err(ServiceError::validation(
            "Full name must be between 1 and 100 characters",
        ));
    }

    let email = normalize_email(&input.email);
    if !email.validate_email() {
        return Err(ServiceError::validation("Invalid email address"));
    }

    Ok(CheckedInput {
        organization_name: organization_name.to_string(),
        full_name: full_name.to_string(),
        email,
    })
}

/// `slugify(name)`, padded to something valid when the name yields a short or reserved slug.
pub fn base_slug(organization_name: &str) -> String {
    let derived = slug::slugify(organization_name);
    if slug::validate(&derived).valid {
        return derived;
    }
    if derived.is_empty() {
        return FALLBACK_SLUG_SUFFIX.to_string();
    }
    let padded = slug::candidate(&format!("{}-{}", derived, FALLBACK_SLUG_SUFFIX), 1);
    if slug::validate(&padded).valid {
        padded
    } else {
        FALLBACK_SLUG_SUFFIX.to_string()
    }
}

/// Turn a unique violation raised mid-transaction into the caller-facing result.
fn classify_failure(err: ServiceError) -> Result<RegistrationOutcome, ServiceError> {
    let violation = match &err {
        ServiceError::Database(db_err) => constraints::classify(db_err),
        _ => None,
    };

    match violation {
        Some(Violation::Known(UniqueConstraint::UserEmail)) => {
            Ok(RegistrationOutcome::AlreadyRegistered)
        }
        Some(Violation::Known(UniqueConstraint::OrganizationSlug)) => Err(ServiceError::conflict(
            "Organization slug was just taken; please retry or choose another",
        )),
        Some(Violation::Known(UniqueConstraint::OrganizationName)) => Err(ServiceError::conflict(
            "An organization with this name already exists",
        )),
        _ => Err(err),
    }
}
