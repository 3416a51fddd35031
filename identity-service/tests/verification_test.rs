mod common;

use common::TestContext;
use identity_service::{
    models::RequestMetadata,
    services::{
        verification::{INVALID_VERIFICATION_TOKEN, RESEND_NEUTRAL_MESSAGE},
        ServiceError,
    },
};
use serial_test::serial;

#[tokio::test]
#[serial]
#[ignore = "requires PostgreSQL; set TEST_DATABASE_URL"]
async fn test_verify_token_is_single_use() {
    let ctx = TestContext::new().await;
    let (_, user_id) = ctx.register("Acme", "owner@acme.test").await;
    let raw = ctx.verification_token("owner@acme.test").await;

    let verified = ctx.state.verification.verify_token(&raw).await.unwrap();
    assert_eq!(verified, user_id);

    let is_verified: bool =
        sqlx::query_scalar("SELECT is_email_verified FROM users WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&ctx.pool)
            .await
            .unwrap();
    assert!(is_verified);
    assert_eq!(
        ctx.count("SELECT COUNT(*) FROM audit_events WHERE event_type_code = 'user_email_verified'")
            .await,
        1
    );

    match ctx.state.verification.verify_token(&raw).await {
        Err(ServiceError::Validation(msg)) => assert_eq!(msg, INVALID_VERIFICATION_TOKEN),
        other => panic!("expected validation error, got {:?}", other),
    }
}

#[tokio::test]
#[serial]
#[ignore = "requires PostgreSQL; set TEST_DATABASE_URL"]
async fn test_expired_and_unknown_tokens_share_one_error() {
    let ctx = TestContext::new().await;
    ctx.register("Acme", "owner@acme.test").await;
    let raw = ctx.verification_token("owner@acme.test").await;

    sqlx::query("UPDATE email_verification_tokens SET expires_utc = NOW() - INTERVAL '1 minute'")
        .execute(&ctx.pool)
        .await
        .unwrap();

    let expired = ctx.state.verification.verify_token(&raw).await.unwrap_err();
    let unknown = ctx
        .state
        .verification
        .verify_token("definitely-not-issued")
        .await
        .unwrap_err();

    assert_eq!(expired.to_string(), unknown.to_string());
}

#[tokio::test]
#[serial]
#[ignore = "requires PostgreSQL; set TEST_DATABASE_URL"]
async fn test_new_token_supersedes_old_one() {
    let ctx = TestContext::new().await;
    let (_, user_id) = ctx.register("Acme", "owner@acme.test").await;
    let first = ctx.verification_token("owner@acme.test").await;

    let second = ctx
        .state
        .verification
        .create_token(user_id, &RequestMetadata::default())
        .await
        .unwrap();
    assert_ne!(first, second);
    assert_eq!(
        ctx.count("SELECT COUNT(*) FROM email_verification_tokens WHERE used_utc IS NULL")
            .await,
        1
    );

    assert!(ctx.state.verification.verify_token(&first).await.is_err());
    assert_eq!(
        ctx.state.verification.verify_token(&second).await.unwrap(),
        user_id
    );
}

#[tokio::test]
#[serial]
#[ignore = "requires PostgreSQL; set TEST_DATABASE_URL"]
async fn test_resend_is_neutral() {
    let ctx = TestContext::new().await;
    ctx.register("Acme", "owner@acme.test").await;
    let metadata = RequestMetadata::default();

    let known = ctx
        .state
        .verification
        .resend_verification("owner@acme.test", &metadata)
        .await
        .unwrap();
    let unknown = ctx
        .state
        .verification
        .resend_verification("stranger@acme.test", &metadata)
        .await
        .unwrap();

    assert_eq!(known, RESEND_NEUTRAL_MESSAGE);
    assert_eq!(unknown, RESEND_NEUTRAL_MESSAGE);
    assert_eq!(
        ctx.count("SELECT COUNT(*) FROM auth_outbox WHERE event_type = 'auth.email_verification.requested'")
            .await,
        2
    );

    // Verified accounts get nothing new.
    let raw = ctx.verification_token("owner@acme.test").await;
    ctx.state.verification.verify_token(&raw).await.unwrap();
    ctx.state
        .verification
        .resend_verification("owner@acme.test", &metadata)
        .await
        .unwrap();
    assert_eq!(
        ctx.count("SELECT COUNT(*) FROM auth_outbox WHERE event_type = 'auth.email_verification.requested'")
            .await,
        2
    );
}
