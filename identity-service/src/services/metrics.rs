use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub static OUTBOX_MESSAGES_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static REGISTRATIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static INVITE_ACCEPTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static SESSION_REFRESHES_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

#[derive(Debug, Clone, Copy)]
pub enum OutboxOutcome {
    Claimed,
    Completed,
    Retried,
    Failed,
    Reclaimed,
}

impl OutboxOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            OutboxOutcome::Claimed => "claimed",
            OutboxOutcome::Completed => "completed",
            OutboxOutcome::Retried => "retried",
            OutboxOutcome::Failed => "failed",
            OutboxOutcome::Reclaimed => "reclaimed",
        }
    }
}

fn counter(name: &str, help: &str, labels: &[&str]) -> Result<IntCounterVec, prometheus::Error> {
    IntCounterVec::new(Opts::new(name, help), labels)
}

/// Idempotent; later calls are no-ops.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    if REGISTRY.get().is_some() {
        return Ok(());
    }

    let registry = Registry::new();

    let outbox = counter(
        "identity_outbox_messages_total",
        "Outbox rows by dispatch outcome",
        &["event_type", "outcome"],
    )?;
    let registrations = counter(
        "identity_registrations_total",
        "Self-serve registrations by outcome",
        &["outcome"],
    )?;
    let invite_accepts = counter(
        "identity_invite_accepts_total",
        "Invite acceptance attempts by outcome",
        &["outcome"],
    )?;
    let refreshes = counter(
        "identity_session_refreshes_total",
        "Refresh-token rotations by outcome",
        &["outcome"],
    )?;

    registry.register(Box::new(outbox.clone()))?;
    registry.register(Box::new(registrations.clone()))?;
    registry.register(Box::new(invite_accepts.clone()))?;
    registry.register(Box::new(refreshes.clone()))?;

    let _ = REGISTRY.set(registry);
    let _ = OUTBOX_MESSAGES_TOTAL.set(outbox);
    let _ = REGISTRATIONS_TOTAL.set(registrations);
    let _ = INVITE_ACCEPTS_TOTAL.set(invite_accepts);
    let _ = SESSION_REFRESHES_TOTAL.set(refreshes);

    tracing::info!("Prometheus metrics registered");
    Ok(())
}

pub fn record_outbox(event_type: &str, outcome: OutboxOutcome, count: u64) {
    if let Some(c) = OUTBOX_MESSAGES_TOTAL.get() {
        c.with_label_values(&[event_type, outcome.as_str()])
            .inc_by(count);
    }
}

pub fn record_registration(outcome: &str) {
    if let Some(c) = REGISTRATIONS_TOTAL.get() {
        c.with_label_values(&[outcome]).inc();
    }
}

pub fn record_invite_accept(outcome: &str) {
    if let Some(c) = INVITE_ACCEPTS_TOTAL.get() {
        c.with_label_values(&[outcome]).inc();
    }
}

pub fn record_refresh(outcome: &str) {
    if let Some(c) = SESSION_REFRESHES_TOTAL.get() {
        c.with_label_values(&[outcome]).inc();
    }
}

pub fn get_metrics() -> String {
    let registry = match REGISTRY.get() {
        Some(r) => r,
        None => {
            tracing::error!("Metrics registry not initialized");
            return "# Metrics registry not initialized\n".to_string();
        }
    };

    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&registry.gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return format!("# Failed to encode metrics: {}\n", e);
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Failed to convert metrics to UTF-8: {}", e);
        format!("# Failed to convert metrics to UTF-8: {}\n", e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_show_up_in_output() {
        init_metrics().unwrap();
        init_metrics().unwrap();

        record_outbox("auth.invite.created", OutboxOutcome::Completed, 2);
        record_registration("created");

        let text = get_metrics();
        assert!(text.contains("identity_outbox_messages_total"));
        assert!(text.contains("outcome=\"completed\""));
        assert!(text.contains("identity_registrations_total"));
    }
}
