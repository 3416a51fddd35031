mod common;

use chrono::{Duration, Utc};
use common::TestContext;
use identity_service::{
    db,
    models::{EmailVerificationRequested, OutboxEvent},
    services::{DispatcherSettings, EmailSender, MockEmailSender, OutboxDispatcher},
};
use serial_test::serial;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

fn settings(batch_size: i64) -> DispatcherSettings {
    DispatcherSettings {
        batch_size,
        max_attempts: 3,
        poll_interval: std::time::Duration::from_millis(50),
        claim_timeout: std::time::Duration::from_secs(5),
        stale_claim_after: Duration::minutes(15),
    }
}

fn dispatcher(ctx: &TestContext, email: &Arc<MockEmailSender>, batch_size: i64) -> OutboxDispatcher {
    let sender: Arc<dyn EmailSender> = email.clone();
    OutboxDispatcher::new(
        ctx.pool.clone(),
        sender,
        settings(batch_size),
        "https://app.example.test".to_string(),
    )
}

async fn enqueue_verification(ctx: &TestContext, email: &str) -> Uuid {
    let event = OutboxEvent::EmailVerificationRequested(EmailVerificationRequested {
        user_id: Uuid::new_v4(),
        email: email.to_string(),
        token: format!("token-for-{}", email),
        full_name: "Recipient".to_string(),
    });
    db::outbox::enqueue(&ctx.pool, &event, Utc::now()).await.unwrap()
}

async fn row_state(ctx: &TestContext, outbox_id: Uuid) -> (String, i32, Option<String>) {
    sqlx::query_as("SELECT status, attempts, last_error FROM auth_outbox WHERE outbox_id = $1")
        .bind(outbox_id)
        .fetch_one(&ctx.pool)
        .await
        .unwrap()
}

async fn make_due(ctx: &TestContext) {
    sqlx::query("UPDATE auth_outbox SET next_attempt_utc = NOW() - INTERVAL '1 second'")
        .execute(&ctx.pool)
        .await
        .unwrap();
}

#[tokio::test]
#[serial]
#[ignore = "requires PostgreSQL; set TEST_DATABASE_URL"]
async fn test_registration_email_is_delivered() {
    let ctx = TestContext::new().await;
    ctx.register("Acme", "owner@acme.test").await;
    let raw = ctx.verification_token("owner@acme.test").await;

    let email = Arc::new(MockEmailSender::new());
    let report = dispatcher(&ctx, &email, 25).run_once().await.unwrap();
    assert_eq!(report.claimed, 1);
    assert_eq!(report.completed, 1);

    let sent = email.sent_to("owner@acme.test");
    assert_eq!(sent.len(), 1);
    assert!(sent[0]
        .html
        .contains(&format!("https://app.example.test/verify-email?token={}", raw)));

    assert_eq!(
        ctx.count("SELECT COUNT(*) FROM auth_outbox WHERE status = 'completed' AND processed_utc IS NOT NULL")
            .await,
        1
    );

    // Nothing left to do.
    let report = dispatcher(&ctx, &email, 25).run_once().await.unwrap();
    assert_eq!(report.claimed, 0);
    assert_eq!(email.sent().len(), 1);
}

#[tokio::test]
#[serial]
#[ignore = "requires PostgreSQL; set TEST_DATABASE_URL"]
async fn test_three_failures_end_in_failed() {
    let ctx = TestContext::new().await;
    let outbox_id = enqueue_verification(&ctx, "a@example.test").await;
    let email = Arc::new(MockEmailSender::failing(10));
    let dispatcher = dispatcher(&ctx, &email, 25);

    let before = Utc::now();
    let report = dispatcher.run_once().await.unwrap();
    assert_eq!(report.retried, 1);

    let (status, attempts, last_error) = row_state(&ctx, outbox_id).await;
    assert_eq!((status.as_str(), attempts), ("pending", 1));
    assert!(last_error.unwrap().contains("mock failure"));

    let next: chrono::DateTime<Utc> =
        sqlx::query_scalar("SELECT next_attempt_utc FROM auth_outbox WHERE outbox_id = $1")
            .bind(outbox_id)
            .fetch_one(&ctx.pool)
            .await
            .unwrap();
    assert!(next >= before + Duration::minutes(5));

    // Not due yet.
    assert_eq!(dispatcher.run_once().await.unwrap().claimed, 0);

    make_due(&ctx).await;
    dispatcher.run_once().await.unwrap();
    assert_eq!(row_state(&ctx, outbox_id).await.1, 2);

    make_due(&ctx).await;
    let report = dispatcher.run_once().await.unwrap();
    assert_eq!(report.failed, 1);
    let (status, attempts, _) = row_state(&ctx, outbox_id).await;
    assert_eq!((status.as_str(), attempts), ("failed", 3));

    // Terminal: never claimed again.
    make_due(&ctx).await;
    assert_eq!(dispatcher.run_once().await.unwrap().claimed, 0);
    assert!(email.sent().is_empty());

    // Manual requeue gives it a fresh budget.
    email.fail_next(0);
    assert!(dispatcher.requeue_failed(outbox_id).await.unwrap());
    assert!(!dispatcher.requeue_failed(outbox_id).await.unwrap());
    let report = dispatcher.run_once().await.unwrap();
    assert_eq!(report.completed, 1);
    assert_eq!(row_state(&ctx, outbox_id).await.0, "completed");
}

#[tokio::test]
#[serial]
#[ignore = "requires PostgreSQL; set TEST_DATABASE_URL"]
async fn test_unknown_event_type_fails_immediately() {
    let ctx = TestContext::new().await;
    let outbox_id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO auth_outbox (outbox_id, event_type, payload, status, attempts,
                                 next_attempt_utc, created_utc, updated_utc)
        VALUES ($1, 'auth.something.else', '{}'::jsonb, 'pending', 0, NOW(), NOW(), NOW())
        "#,
    )
    .bind(outbox_id)
    .execute(&ctx.pool)
    .await
    .unwrap();

    let email = Arc::new(MockEmailSender::new());
    let report = dispatcher(&ctx, &email, 25).run_once().await.unwrap();
    assert_eq!(report.failed, 1);

    let (status, attempts, last_error) = row_state(&ctx, outbox_id).await;
    assert_eq!(status, "failed");
    assert_eq!(attempts, 3);
    assert!(last_error.unwrap().contains("auth.something.else"));
    assert!(email.sent().is_empty());
}

#[tokio::test]
#[serial]
#[ignore = "requires PostgreSQL; set TEST_DATABASE_URL"]
async fn test_two_dispatchers_deliver_each_row_once() {
    let ctx = TestContext::new().await;
    for i in 0..30 {
        enqueue_verification(&ctx, &format!("user{}@example.test", i)).await;
    }

    let email = Arc::new(MockEmailSender::new());
    let first = Arc::new(dispatcher(&ctx, &email, 4));
    let second = Arc::new(dispatcher(&ctx, &email, 4));

    let drain = |d: Arc<OutboxDispatcher>| async move {
        loop {
            let report = d.run_once().await.unwrap();
            if report.claimed == 0 && !report.skipped {
                break;
            }
        }
    };
    let (a, b) = tokio::join!(
        tokio::spawn(drain(first)),
        tokio::spawn(drain(second)),
    );
    a.unwrap();
    b.unwrap();

    let sent = email.sent();
    assert_eq!(sent.len(), 30);
    let recipients: HashSet<_> = sent.iter().map(|m| m.to.clone()).collect();
    assert_eq!(recipients.len(), 30);
    assert_eq!(
        ctx.count("SELECT COUNT(*) FROM auth_outbox WHERE status = 'completed'")
            .await,
        30
    );
}

#[tokio::test]
#[serial]
#[ignore = "requires PostgreSQL; set TEST_DATABASE_URL"]
async fn test_stale_claim_is_recovered() {
    let ctx = TestContext::new().await;
    let outbox_id = enqueue_verification(&ctx, "stuck@example.test").await;
    sqlx::query(
        "UPDATE auth_outbox SET status = 'processing', claimed_utc = NOW() - INTERVAL '20 minutes' \
         WHERE outbox_id = $1",
    )
    .bind(outbox_id)
    .execute(&ctx.pool)
    .await
    .unwrap();

    let email = Arc::new(MockEmailSender::new());
    let report = dispatcher(&ctx, &email, 25).run_once().await.unwrap();
    assert_eq!(report.reclaimed, 1);
    assert_eq!(report.completed, 1);
    let (status, attempts, _) = row_state(&ctx, outbox_id).await;
    assert_eq!((status.as_str(), attempts), ("completed", 1));
}

#[tokio::test]
#[serial]
#[ignore = "requires PostgreSQL; set TEST_DATABASE_URL"]
async fn test_repeatedly_stale_row_ends_in_failed() {
    let ctx = TestContext::new().await;
    let outbox_id = enqueue_verification(&ctx, "crashy@example.test").await;
    sqlx::query(
        "UPDATE auth_outbox SET status = 'processing', attempts = 2, \
         claimed_utc = NOW() - INTERVAL '20 minutes' WHERE outbox_id = $1",
    )
    .bind(outbox_id)
    .execute(&ctx.pool)
    .await
    .unwrap();

    let email = Arc::new(MockEmailSender::new());
    let report = dispatcher(&ctx, &email, 25).run_once().await.unwrap();
    assert_eq!(report.reclaimed, 1);
    assert_eq!(report.claimed, 0);

    let (status, attempts, last_error) = row_state(&ctx, outbox_id).await;
    assert_eq!((status.as_str(), attempts), ("failed", 3));
    assert!(last_error.unwrap().contains("Claim expired"));
    assert!(email.sent().is_empty());
}

#[tokio::test]
#[serial]
#[ignore = "requires PostgreSQL; set TEST_DATABASE_URL"]
async fn test_fresh_claim_is_left_alone() {
    let ctx = TestContext::new().await;
    let outbox_id = enqueue_verification(&ctx, "busy@example.test").await;
    sqlx::query(
        "UPDATE auth_outbox SET status = 'processing', claimed_utc = NOW() WHERE outbox_id = $1",
    )
    .bind(outbox_id)
    .execute(&ctx.pool)
    .await
    .unwrap();

    let email = Arc::new(MockEmailSender::new());
    let report = dispatcher(&ctx, &email, 25).run_once().await.unwrap();
    assert_eq!(report.reclaimed, 0);
    assert_eq!(report.claimed, 0);
    assert_eq!(row_state(&ctx, outbox_id).await.0, "processing");
}

#[tokio::test]
#[serial]
#[ignore = "requires PostgreSQL; set TEST_DATABASE_URL"]
async fn test_run_loop_stops_on_shutdown() {
    let ctx = TestContext::new().await;
    enqueue_verification(&ctx, "loop@example.test").await;

    let email = Arc::new(MockEmailSender::new());
    let dispatcher = Arc::new(dispatcher(&ctx, &email, 25));
    let handle = tokio::spawn(dispatcher.clone().run());

    for _ in 0..50 {
        if !email.sent().is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    assert_eq!(email.sent_to("loop@example.test").len(), 1);

    dispatcher.shutdown();
    tokio::time::timeout(std::time::Duration::from_secs(5), handle)
        .await
        .expect("dispatcher did not stop")
        .unwrap();
}
