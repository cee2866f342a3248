//! Metrics decorator for any limiter.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::algorithm::Limiter;
use crate::error::Result;
use crate::metrics::{MetricsCollector, MetricsSnapshot};

/// Wraps a limiter and records every call in a [`MetricsCollector`].
///
/// The wrapper is itself a [`Limiter`], so it can stand in anywhere a limiter
/// is expected, including around another wrapper. It depends only on the
/// trait, never on a concrete strategy.
///
/// Each call counts one request on entry and one allowed or denied outcome
/// on exit. Successful waits also record their wall-clock duration; a
/// cancelled wait counts as denied and adds nothing to the wait statistics.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use skp_admit::{Limiter, MetricsCollector, MetricsWrapper, TokenBucket};
///
/// let collector = Arc::new(MetricsCollector::new());
/// let limiter = MetricsWrapper::new(TokenBucket::new(10, 10), collector.clone());
///
/// limiter.allow();
/// assert_eq!(collector.snapshot().allowed_requests, 1);
/// ```
#[derive(Debug)]
pub struct MetricsWrapper<L> {
    inner: L,
    collector: Arc<MetricsCollector>,
}

impl<L: Limiter> MetricsWrapper<L> {
    /// Wrap `inner`, recording into `collector`.
    pub fn new(inner: L, collector: Arc<MetricsCollector>) -> Self {
        Self { inner, collector }
    }

    /// Wrap `inner` with a fresh collector.
    pub fn with_new_collector(inner: L) -> Self {
        Self::new(inner, Arc::new(MetricsCollector::new()))
    }

    /// Get the collector this wrapper records into.
    pub fn collector(&self) -> &Arc<MetricsCollector> {
        &self.collector
    }

    /// Get the wrapped limiter.
    pub fn inner(&self) -> &L {
        &self.inner
    }

    /// Unwrap the limiter, dropping this wrapper's handle to the collector.
    pub fn into_inner(self) -> L {
        self.inner
    }

    fn record_outcome(&self, allowed: bool) {
        if allowed {
            self.collector.increment_allowed_requests();
        } else {
            self.collector.increment_denied_requests();
        }
    }
}

#[async_trait]
impl<L: Limiter> Limiter for MetricsWrapper<L> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn allow(&self) -> bool {
        self.collector.increment_total_requests();
        let allowed = self.inner.allow();
        self.record_outcome(allowed);
        allowed
    }

    fn allow_n(&self, n: u64) -> bool {
        self.collector.increment_total_requests();
        let allowed = self.inner.allow_n(n);
        self.record_outcome(allowed);
        allowed
    }

    async fn wait(&self, cancel: &CancellationToken) -> Result<()> {
        self.collector.increment_total_requests();
        let start = Instant::now();

        let result = self.inner.wait(cancel).await;
        self.record_outcome(result.is_ok());
        if result.is_ok() {
            self.collector.record_wait_time(start.elapsed());
        }
        result
    }

    async fn wait_n(&self, n: u64, cancel: &CancellationToken) -> Result<()> {
        self.collector.increment_total_requests();
        let start = Instant::now();

        let result = self.inner.wait_n(n, cancel).await;
        self.record_outcome(result.is_ok());
        if result.is_ok() {
            self.collector.record_wait_time(start.elapsed());
        }
        result
    }

    fn reset(&self) {
        self.inner.reset();
        self.collector.reset();
    }

    /// Collector counters, with the wrapped limiter's window configuration.
    fn get_metrics(&self) -> MetricsSnapshot {
        let inner = self.inner.get_metrics();
        let snapshot = self.collector.snapshot();
        let rate = if snapshot.current_rate == 0 {
            inner.current_rate
        } else {
            snapshot.current_rate
        };

        snapshot.with_limits(
            rate,
            inner.window_duration,
            inner.inner_rate,
            inner.inner_window,
        )
    }
}
