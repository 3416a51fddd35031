//! Outbox dispatcher: claims due rows and delivers their emails.
//!
//! Any number of replicas may run this loop. Each row is claimed by exactly
//! one of them (`FOR UPDATE SKIP LOCKED` inside a short transaction) and is
//! only sent after that transaction commits, so no row lock is ever held
//! across SMTP. Delivery is at-least-once: a replica that dies between send
//! and completion leaves the row `processing`, and it is retried once the
//! claim goes stale.

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::OutboxConfig;
use crate::db;
use crate::models::{OutboxEvent, OutboxMessage, OutboxStatus};
use crate::services::email::EmailSender;
use crate::services::error::ServiceError;
use crate::services::metrics::{self, OutboxOutcome};
use crate::services::templates;

/// Delay before the next attempt after the 1st, 2nd, 3rd... failure. The last
/// entry repeats.
pub const BACKOFF_SCHEDULE_SECS: [i64; 3] = [5 * 60, 30 * 60, 2 * 60 * 60];

const SEND_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

pub fn backoff_for(attempts: i32) -> Duration {
    let idx = (attempts.max(1) - 1) as usize;
    let secs = BACKOFF_SCHEDULE_SECS[idx.min(BACKOFF_SCHEDULE_SECS.len() - 1)];
    Duration::seconds(secs)
}

/// Where a failed row goes next.
pub fn next_after_failure(
    previous_attempts: i32,
    max_attempts: i32,
    now: DateTime<Utc>,
) -> (OutboxStatus, i32, DateTime<Utc>) {
    let attempts = previous_attempts + 1;
    if attempts >= max_attempts {
        (OutboxStatus::Failed, attempts, now)
    } else {
        (OutboxStatus::Pending, attempts, now + backoff_for(attempts))
    }
}

#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    pub batch_size: i64,
    pub max_attempts: i32,
    pub poll_interval: std::time::Duration,
    pub claim_timeout: std::time::Duration,
    pub stale_claim_after: Duration,
}

impl From<&OutboxConfig> for DispatcherSettings {
    fn from(config: &OutboxConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            max_attempts: config.max_attempts,
            poll_interval: config.poll_interval(),
            claim_timeout: config.claim_timeout(),
            stale_claim_after: Duration::minutes(config.stale_claim_minutes),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// Another tick on this instance was still running.
    pub skipped: bool,
    pub reclaimed: u64,
    pub claimed: usize,
    pub completed: usize,
    pub retried: usize,
    pub failed: usize,
}

enum RowOutcome {
    Completed,
    Retried,
    Failed,
    /// The row left `processing` under us (reclaimed); nothing was written.
    Lost,
}

/// Clears the re-entrancy flag however the tick ends.
struct TickGuard<'a>(&'a AtomicBool);

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct OutboxDispatcher {
    pool: PgPool,
    email: Arc<dyn EmailSender>,
    settings: DispatcherSettings,
    public_url: String,
    running: AtomicBool,
    shutdown_token: CancellationToken,
}

impl OutboxDispatcher {
    pub fn new(
        pool: PgPool,
        email: Arc<dyn EmailSender>,
        settings: DispatcherSettings,
        public_url: String,
    ) -> Self {
        Self {
            pool,
            email,
            settings,
            public_url,
            running: AtomicBool::new(false),
            shutdown_token: CancellationToken::new(),
        }
    }

    pub fn shutdown(&self) {
        tracing::info!("Outbox dispatcher shutdown requested");
        self.shutdown_token.cancel();
    }

    /// Tick every `poll_interval` until cancelled.
    pub async fn run(self: Arc<Self>) {
        tracing::info!(
            poll_interval_secs = self.settings.poll_interval.as_secs(),
            batch_size = self.settings.batch_size,
            max_attempts = self.settings.max_attempts,
            "Outbox dispatcher started"
        );

        let mut interval = tokio::time::interval(self.settings.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown_token.cancelled() => {
                    tracing::info!("Outbox dispatcher stopped");
                    break;
                }
                _ = interval.tick() => {
                    match self.run_once().await {
                        Ok(report) if report.claimed > 0 || report.reclaimed > 0 => {
                            tracing::info!(
                                claimed = report.claimed,
                                completed = report.completed,
                                retried = report.retried,
                                failed = report.failed,
                                reclaimed = report.reclaimed,
                                "Outbox tick finished"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => tracing::error!(error = %e, "Outbox tick failed"),
                    }
                }
            }
        }
    }

    /// One pass: recover stale claims, claim a batch, deliver it.
    pub async fn run_once(&self) -> Result<TickReport, ServiceError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Outbox tick skipped; previous tick still running");
            return Ok(TickReport {
                skipped: true,
                ..TickReport::default()
            });
        }
        let _guard = TickGuard(&self.running);

        let mut report = TickReport {
            reclaimed: self.reclaim_stale(db::now()).await?,
            ..TickReport::default()
        };

        let ids = self.claim(db::now()).await?;
        report.claimed = ids.len();
        if ids.is_empty() {
            return Ok(report);
        }

        let messages = db::outbox::load_by_ids(&self.pool, &ids).await?;
        for message in messages {
            metrics::record_outbox(&message.event_type, OutboxOutcome::Claimed, 1);
            match self.process(&message).await {
                Ok(RowOutcome::Completed) => report.completed += 1,
                Ok(RowOutcome::Retried) => report.retried += 1,
                Ok(RowOutcome::Failed) => report.failed += 1,
                Ok(RowOutcome::Lost) => {}
                Err(e) => {
                    // Row stays `processing`; stale recovery picks it up.
                    tracing::error!(outbox_id = %message.outbox_id, error = %e, "Outbox row bookkeeping failed");
                }
            }
        }

        Ok(report)
    }

    /// Move up to `batch_size` due rows to `processing` and return their ids.
    pub async fn claim(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, ServiceError> {
        let timeout_ms = self.settings.claim_timeout.as_millis();
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!("SET LOCAL statement_timeout = {}", timeout_ms))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("SET LOCAL lock_timeout = {}", timeout_ms))
            .execute(&mut *tx)
            .await?;

        let ids = db::outbox::select_due_for_update(
            &mut *tx,
            self.settings.batch_size,
            self.settings.max_attempts,
            now,
        )
        .await?;

        if !ids.is_empty() {
            db::outbox::mark_processing(&mut *tx, &ids, now).await?;
        }
        tx.commit().await?;

        Ok(ids)
    }

    pub async fn reclaim_stale(&self, now: DateTime<Utc>) -> Result<u64, ServiceError> {
        let cutoff = now - self.settings.stale_claim_after;
        let reclaimed =
            db::outbox::reclaim_stale(&self.pool, cutoff, self.settings.max_attempts, now).await?;
        if reclaimed > 0 {
            tracing::warn!(reclaimed, "Returned stale outbox claims to pending");
            metrics::record_outbox("any", OutboxOutcome::Reclaimed, reclaimed);
        }
        Ok(reclaimed)
    }

    /// Manual retry of a terminally failed row. False if the row is not `failed`.
    pub async fn requeue_failed(&self, outbox_id: Uuid) -> Result<bool, ServiceError> {
        let requeued = db::outbox::requeue_failed(&self.pool, outbox_id, db::now()).await?;
        if requeued {
            tracing::info!(outbox_id = %outbox_id, "Failed outbox row requeued");
        }
        Ok(requeued)
    }

    async fn process(&self, message: &OutboxMessage) -> Result<RowOutcome, ServiceError> {
        let event = match OutboxEvent::decode(&message.event_type, &message.payload) {
            Ok(Some(event)) => event,
            Ok(None) => {
                let reason = format!("Unknown event type: {}", message.event_type);
                return self.fail_permanently(message, &reason).await;
            }
            Err(e) => {
                let reason = format!("Malformed payload for {}: {}", message.event_type, e);
                return self.fail_permanently(message, &reason).await;
            }
        };

        let email = match &event {
            OutboxEvent::EmailVerificationRequested(p) => {
                templates::verification_email(&self.public_url, p)
            }
            OutboxEvent::InviteCreated(p) => templates::invite_email(&self.public_url, p),
        };

        let sent = match tokio::time::timeout(SEND_TIMEOUT, self.email.send(&email)).await {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(_) => Err(format!("Email send timed out after {}s", SEND_TIMEOUT.as_secs())),
        };

        let now = db::now();
        match sent {
            Ok(()) => {
                if !db::outbox::mark_completed(&self.pool, message.outbox_id, now).await? {
                    tracing::warn!(outbox_id = %message.outbox_id, "Outbox row no longer held at completion");
                    return Ok(RowOutcome::Lost);
                }
                metrics::record_outbox(&message.event_type, OutboxOutcome::Completed, 1);
                tracing::info!(
                    outbox_id = %message.outbox_id,
                    event_type = %message.event_type,
                    "Outbox row delivered"
                );
                Ok(RowOutcome::Completed)
            }
            Err(reason) => self.record_failure(message, &reason, now).await,
        }
    }

    async fn record_failure(
        &self,
        message: &OutboxMessage,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<RowOutcome, ServiceError> {
        let (status, attempts, next_attempt) =
            next_after_failure(message.attempts, self.settings.max_attempts, now);

        let held = db::outbox::record_failure(
            &self.pool,
            message.outbox_id,
            status,
            attempts,
            next_attempt,
            reason,
            now,
        )
        .await?;
        if !held {
            return Ok(RowOutcome::Lost);
        }

        if status == OutboxStatus::Failed {
            metrics::record_outbox(&message.event_type, OutboxOutcome::Failed, 1);
            tracing::error!(
                outbox_id = %message.outbox_id,
                event_type = %message.event_type,
                attempts,
                error = %reason,
                "Outbox row failed permanently"
            );
            Ok(RowOutcome::Failed)
        } else {
            metrics::record_outbox(&message.event_type, OutboxOutcome::Retried, 1);
            tracing::warn!(
                outbox_id = %message.outbox_id,
                event_type = %message.event_type,
                attempts,
                next_attempt_utc = %next_attempt,
                error = %reason,
                "Outbox delivery failed; will retry"
            );
            Ok(RowOutcome::Retried)
        }
    }

    /// No retry can help: jump straight to the attempt ceiling.
    async fn fail_permanently(
        &self,
        message: &OutboxMessage,
        reason: &str,
    ) -> Result<RowOutcome, ServiceError> {
        let now = db::now();
        let held = db::outbox::record_failure(
            &self.pool,
            message.outbox_id,
            OutboxStatus::Failed,
            self.settings.max_attempts,
            now,
            reason,
            now,
        )
        .await?;
        if !held {
            return Ok(RowOutcome::Lost);
        }

        metrics::record_outbox(&message.event_type, OutboxOutcome::Failed, 1);
        tracing::error!(outbox_id = %message.outbox_id, error = %reason, "Outbox row rejected");
        Ok(RowOutcome::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_schedule() {
        assert_eq!(backoff_for(1), Duration::minutes(5));
        assert_eq!(backoff_for(2), Duration::minutes(30));
        assert_eq!(backoff_for(3), Duration::hours(2));
        assert_eq!(backoff_for(7), Duration::hours(2));
        assert_eq!(backoff_for(0), Duration::minutes(5));
    }

    #[test]
    fn test_three_failures_end_in_failed() {
        let now = Utc::now();

        let (status, attempts, next) = next_after_failure(0, 3, now);
        assert_eq!((status, attempts), (OutboxStatus::Pending, 1));
        assert_eq!(next - now, Duration::minutes(5));

        let (status, attempts, next) = next_after_failure(1, 3, now);
        assert_eq!((status, attempts), (OutboxStatus::Pending, 2));
        assert_eq!(next - now, Duration::minutes(30));

        let (status, attempts, _) = next_after_failure(2, 3, now);
        assert_eq!((status, attempts), (OutboxStatus::Failed, 3));
    }

    #[test]
    fn test_raised_ceiling_reaches_last_backoff() {
        let now = Utc::now();
        let (status, attempts, next) = next_after_failure(2, 5, now);
        assert_eq!((status, attempts), (OutboxStatus::Pending, 3));
        assert_eq!(next - now, Duration::hours(2));
    }

    #[test]
    fn test_settings_from_config() {
        let settings = DispatcherSettings::from(&OutboxConfig::default());
        assert_eq!(settings.max_attempts, 3);
        assert_eq!(settings.batch_size, 25);
        assert_eq!(settings.stale_claim_after, Duration::minutes(15));
    }
}
