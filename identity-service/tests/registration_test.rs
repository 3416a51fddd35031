mod common;

use common::{registration_input, TestContext};
use identity_service::{
    models::RequestMetadata,
    services::{registration::REGISTRATION_NEUTRAL_MESSAGE, RegistrationOutcome, ServiceError},
};
use serial_test::serial;

#[tokio::test]
#[serial]
#[ignore = "requires PostgreSQL; set TEST_DATABASE_URL"]
async fn test_register_creates_full_tenant() {
    let ctx = TestContext::new().await;
    let (organization_id, user_id) = ctx.register("Acme Corp", " Owner@Acme.TEST ").await;

    let (slug, name): (String, String) =
        sqlx::query_as("SELECT slug, name FROM organizations WHERE organization_id = $1")
            .bind(organization_id)
            .fetch_one(&ctx.pool)
            .await
            .unwrap();
    assert_eq!(slug, "acme-corp");
    assert_eq!(name, "Acme Corp");

    let (email, role, verified): (String, String, bool) = sqlx::query_as(
        "SELECT email, role, is_email_verified FROM users WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_one(&ctx.pool)
    .await
    .unwrap();
    assert_eq!(email, "owner@acme.test");
    assert_eq!(role, "admin");
    assert!(!verified);

    let member_role: String = sqlx::query_scalar(
        "SELECT role FROM organization_members WHERE organization_id = $1 AND user_id = $2",
    )
    .bind(organization_id)
    .bind(user_id)
    .fetch_one(&ctx.pool)
    .await
    .unwrap();
    assert_eq!(member_role, "owner");

    assert_eq!(ctx.count("SELECT COUNT(*) FROM workspaces WHERE slug = 'general'").await, 1);
    assert_eq!(ctx.count("SELECT COUNT(*) FROM workspace_members").await, 1);
    assert_eq!(
        ctx.count("SELECT COUNT(*) FROM email_verification_tokens WHERE used_utc IS NULL")
            .await,
        1
    );
    assert_eq!(
        ctx.count(
            "SELECT COUNT(*) FROM auth_outbox \
             WHERE event_type = 'auth.email_verification.requested' AND status = 'pending'"
        )
        .await,
        1
    );

    // Only the hash is stored; the raw token lives in the outbox payload.
    let raw = ctx.verification_token("owner@acme.test").await;
    let stored: String = sqlx::query_scalar("SELECT token_hash FROM email_verification_tokens")
        .fetch_one(&ctx.pool)
        .await
        .unwrap();
    assert_ne!(stored, raw);
    assert_eq!(stored, ctx.hasher.hash_token(&raw));
}

#[tokio::test]
#[serial]
#[ignore = "requires PostgreSQL; set TEST_DATABASE_URL"]
async fn test_second_registration_is_neutral_and_writes_nothing() {
    let ctx = TestContext::new().await;
    ctx.register("Acme", "owner@acme.test").await;

    let outcome = ctx
        .state
        .registration
        .register(
            registration_input("Another Org", "OWNER@acme.test"),
            &RequestMetadata::default(),
        )
        .await
        .unwrap();

    assert_eq!(outcome, RegistrationOutcome::AlreadyRegistered);
    assert_eq!(outcome.message(), REGISTRATION_NEUTRAL_MESSAGE);
    assert_eq!(ctx.count("SELECT COUNT(*) FROM users").await, 1);
    assert_eq!(ctx.count("SELECT COUNT(*) FROM organizations").await, 1);
    assert_eq!(ctx.count("SELECT COUNT(*) FROM auth_outbox").await, 1);
}

#[tokio::test]
#[serial]
#[ignore = "requires PostgreSQL; set TEST_DATABASE_URL"]
async fn test_concurrent_same_email_creates_one_account() {
    let ctx = TestContext::new().await;

    let mut handles = Vec::new();
    for i in 0..4 {
        let registration = ctx.state.registration.clone();
        handles.push(tokio::spawn(async move {
            registration
                .register(
                    registration_input(&format!("Racing Org {}", i), "racer@example.test"),
                    &RequestMetadata::default(),
                )
                .await
        }));
    }

    let mut created = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            RegistrationOutcome::Created { .. } => created += 1,
            RegistrationOutcome::AlreadyRegistered => {}
        }
    }

    assert_eq!(created, 1);
    assert_eq!(
        ctx.count("SELECT COUNT(*) FROM users WHERE email = 'racer@example.test'")
            .await,
        1
    );
    assert_eq!(ctx.count("SELECT COUNT(*) FROM organizations").await, 1);
}

#[tokio::test]
#[serial]
#[ignore = "requires PostgreSQL; set TEST_DATABASE_URL"]
async fn test_derived_slug_gets_suffix_when_taken() {
    let ctx = TestContext::new().await;
    ctx.register("Acme Corp", "first@acme.test").await;
    let (second_org, _) = ctx.register("Acme-Corp", "second@acme.test").await;

    let slug: String = sqlx::query_scalar("SELECT slug FROM organizations WHERE organization_id = $1")
        .bind(second_org)
        .fetch_one(&ctx.pool)
        .await
        .unwrap();
    assert_eq!(slug, "acme-corp-2");
}

#[tokio::test]
#[serial]
#[ignore = "requires PostgreSQL; set TEST_DATABASE_URL"]
async fn test_explicit_slug_and_name_collisions_conflict() {
    let ctx = TestContext::new().await;
    ctx.register("Acme", "first@acme.test").await;

    let mut taken_slug = registration_input("Globex", "second@globex.test");
    taken_slug.organization_slug = Some("acme".to_string());
    let err = ctx
        .state
        .registration
        .register(taken_slug, &RequestMetadata::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));

    let mut reserved = registration_input("Globex", "third@globex.test");
    reserved.organization_slug = Some("admin".to_string());
    let err = ctx
        .state
        .registration
        .register(reserved, &RequestMetadata::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    let err = ctx
        .state
        .registration
        .register(
            registration_input("ACME", "fourth@acme.test"),
            &RequestMetadata::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));

    assert_eq!(ctx.count("SELECT COUNT(*) FROM users").await, 1);
}
