//! Lock-free metrics collector.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::algorithm::current_timestamp_ms;
use crate::metrics::MetricsSnapshot;

/// Atomic counters shared between a limiter and whoever observes it.
///
/// Every update is a single atomic operation, so a collector can be shared
/// through an `Arc` and read while requests are in flight.
///
/// Decisions are stored only as their outcomes. A snapshot derives
/// `total_requests` from them, so `total == allowed + denied` holds for any
/// read, concurrent or not. Callers that count requests on entry
/// ([`increment_total_requests`](Self::increment_total_requests)) see
/// `total >= allowed + denied` instead, the difference being calls still
/// in flight.
#[derive(Debug)]
pub struct MetricsCollector {
    started_requests: AtomicU64,
    allowed_requests: AtomicU64,
    denied_requests: AtomicU64,
    current_rate: AtomicU64,
    last_reset_time: AtomicU64,
    total_wait_nanos: AtomicU64,
    max_wait_nanos: AtomicU64,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    /// Create a collector with zeroed counters, stamped with the current time.
    pub fn new() -> Self {
        Self {
            started_requests: AtomicU64::new(0),
            allowed_requests: AtomicU64::new(0),
            denied_requests: AtomicU64::new(0),
            current_rate: AtomicU64::new(0),
            last_reset_time: AtomicU64::new(current_timestamp_ms()),
            total_wait_nanos: AtomicU64::new(0),
            max_wait_nanos: AtomicU64::new(0),
        }
    }

    /// Count a request on entry, before its outcome is known.
    pub fn increment_total_requests(&self) {
        self.started_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Count an admitted request.
    pub fn increment_allowed_requests(&self) {
        self.allowed_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a denied request.
    pub fn increment_denied_requests(&self) {
        self.denied_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a completed decision.
    ///
    /// The request is counted through its outcome alone, so a concurrent
    /// snapshot never sees it half recorded.
    pub fn record_decision(&self, allowed: bool) {
        if allowed {
            self.increment_allowed_requests();
        } else {
            self.increment_denied_requests();
        }
    }

    /// Record the configured rate.
    pub fn update_current_rate(&self, rate: u64) {
        self.current_rate.store(rate, Ordering::Relaxed);
    }

    /// Add a successful wait to the cumulative and maximum wait statistics.
    pub fn record_wait_time(&self, wait: Duration) {
        let nanos = u64::try_from(wait.as_nanos()).unwrap_or(u64::MAX);
        self.total_wait_nanos.fetch_add(nanos, Ordering::Relaxed);

        let mut current = self.max_wait_nanos.load(Ordering::Relaxed);
        while nanos > current {
            match self.max_wait_nanos.compare_exchange_weak(
                current,
                nanos,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }

    /// Read every counter.
    ///
    /// Configuration fields other than the rate are left at zero; limiters
    /// fill them in.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let allowed_requests = self.allowed_requests.load(Ordering::Relaxed);
        let denied_requests = self.denied_requests.load(Ordering::Relaxed);
        let decided = allowed_requests.saturating_add(denied_requests);
        let started = self.started_requests.load(Ordering::Relaxed);

        MetricsSnapshot {
            total_requests: started.max(decided),
            allowed_requests,
            denied_requests,
            current_rate: self.current_rate.load(Ordering::Relaxed),
            last_reset_time: self.last_reset_time.load(Ordering::Relaxed),
            total_wait_time: Duration::from_nanos(self.total_wait_nanos.load(Ordering::Relaxed)),
            max_wait_time: Duration::from_nanos(self.max_wait_nanos.load(Ordering::Relaxed)),
            ..Default::default()
        }
    }

    /// Zero the counters and restamp the reset time.
    ///
    /// The configured rate is kept.
    pub fn reset(&self) {
        self.started_requests.store(0, Ordering::Relaxed);
        self.allowed_requests.store(0, Ordering::Relaxed);
        self.denied_requests.store(0, Ordering::Relaxed);
        self.total_wait_nanos.store(0, Ordering::Relaxed);
        self.max_wait_nanos.store(0, Ordering::Relaxed);
        self.last_reset_time.store(current_timestamp_ms(), Ordering::Relaxed);
    }
}
