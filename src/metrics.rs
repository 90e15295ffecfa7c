//! Relay metrics and the Prometheus recorder behind `GET /metrics`.
//!
//! [`RelayMetrics`] keeps its own atomic counters so the registry can read
//! them back, and mirrors every update to the `metrics` facade for export.

use std::sync::atomic::{AtomicU64, Ordering};

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Active sessions across all pools (gauge).
pub const SESSIONS: &str = "relay_sessions";
/// Registered pools (gauge).
pub const POOLS: &str = "relay_pools";
/// Messages delivered to recipients (counter).
pub const MESSAGES_SENT_TOTAL: &str = "relay_messages_sent_total";
/// Messages received from senders (counter).
pub const MESSAGES_RECEIVED_TOTAL: &str = "relay_messages_received_total";
/// Per-recipient delivery failures (counter).
pub const SEND_FAILURES_TOTAL: &str = "relay_send_failures_total";

/// Installs the global Prometheus recorder.
///
/// Must be called once at startup before any metric is recorded.
///
/// # Errors
///
/// Returns [`BuildError`] if a global recorder is already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    metrics::describe_gauge!(SESSIONS, "Current number of sessions");
    metrics::describe_gauge!(POOLS, "Current number of pools");
    metrics::describe_counter!(MESSAGES_SENT_TOTAL, "Total number of messages sent");
    metrics::describe_counter!(MESSAGES_RECEIVED_TOTAL, "Total number of messages received");
    metrics::describe_counter!(SEND_FAILURES_TOTAL, "Total number of failed deliveries");
    tracing::info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Process-wide relay counters.
#[derive(Debug, Default)]
pub struct RelayMetrics {
    active_sessions: AtomicU64,
    active_pools: AtomicU64,
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    send_failures: AtomicU64,
}

impl RelayMetrics {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a newly registered pool.
    pub fn pool_created(&self) {
        self.active_pools.fetch_add(1, Ordering::Relaxed);
        metrics::gauge!(POOLS).increment(1.0);
    }

    /// Records a newly registered session.
    pub fn session_opened(&self) {
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
        metrics::gauge!(SESSIONS).increment(1.0);
    }

    /// Records a session removed from its pool.
    pub fn session_closed(&self) {
        let prev = self
            .active_sessions
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(1))
            })
            .unwrap_or(0);
        if prev > 0 {
            metrics::gauge!(SESSIONS).decrement(1.0);
        }
    }

    /// Records one message delivered to one recipient.
    pub fn message_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(MESSAGES_SENT_TOTAL).increment(1);
    }

    /// Records one inbound message from a sender.
    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(MESSAGES_RECEIVED_TOTAL).increment(1);
    }

    /// Records one failed delivery.
    pub fn send_failed(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(SEND_FAILURES_TOTAL).increment(1);
    }

    /// Returns a point-in-time copy of all counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            active_sessions: self.active_sessions.load(Ordering::Relaxed),
            active_pools: self.active_pools.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
        }
    }
}

/// Copy of [`RelayMetrics`] counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    /// Sessions currently registered.
    pub active_sessions: u64,
    /// Pools currently registered.
    pub active_pools: u64,
    /// Messages delivered since startup.
    pub messages_sent: u64,
    /// Messages received since startup.
    pub messages_received: u64,
    /// Failed deliveries since startup.
    pub send_failures: u64,
}
