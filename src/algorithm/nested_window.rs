//! Nested Window rate limiting algorithm.
//!
//! Enforces a sustained quota over a long outer window and a burst quota over
//! a short inner window at the same time. A single window cannot express
//! both "average at most X" and "never more than Y at once"; two counters
//! checked together can, without token-bucket refill arithmetic.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::algorithm::{wait_for_admission, Attempt, Limiter, WindowCounter};
use crate::config::{Algorithm, RateLimitConfig};
use crate::error::Result;
use crate::metrics::{MetricsCollector, MetricsSnapshot};

#[derive(Debug)]
struct Windows {
    outer: WindowCounter,
    inner: WindowCounter,
}

/// Nested Window rate limiting algorithm.
///
/// Admits `n` permits only if both the outer window (`outer_rate` per
/// `outer_window`) and the inner window (`inner_rate` per `inner_window`)
/// have room. The two windows run on independent clocks: each restarts on
/// the first request after its own expiry.
#[derive(Debug)]
pub struct NestedWindow {
    outer_rate: u64,
    outer_window: Duration,
    inner_rate: u64,
    inner_window: Duration,
    windows: Mutex<Windows>,
    metrics: MetricsCollector,
}

impl NestedWindow {
    /// Create a limiter with an outer and an inner quota.
    ///
    /// # Panics
    ///
    /// Panics if either rate is 0 or either window is zero duration.
    pub fn new(
        outer_rate: u64,
        outer_window: Duration,
        inner_rate: u64,
        inner_window: Duration,
    ) -> Self {
        assert!(outer_rate > 0, "outer rate must be greater than 0");
        assert!(inner_rate > 0, "inner rate must be greater than 0");
        assert!(!outer_window.is_zero(), "outer window must be non-zero");
        assert!(!inner_window.is_zero(), "inner window must be non-zero");

        debug!(
            outer_rate,
            ?outer_window,
            inner_rate,
            ?inner_window,
            "creating nested window limiter"
        );

        let metrics = MetricsCollector::new();
        metrics.update_current_rate(outer_rate);

        let now = Instant::now();
        Self {
            outer_rate,
            outer_window,
            inner_rate,
            inner_window,
            windows: Mutex::new(Windows {
                outer: WindowCounter::new(now),
                inner: WindowCounter::new(now),
            }),
            metrics,
        }
    }

    /// Create a limiter from `config.rate`/`config.window` (outer) and
    /// `config.burst`/the effective inner window (inner).
    pub fn from_config(config: &RateLimitConfig) -> Result<Self> {
        config
            .clone()
            .with_algorithm(Algorithm::NestedWindow)
            .validate()?;
        Ok(Self::new(
            config.rate,
            config.window,
            config.burst,
            config.effective_inner_window(),
        ))
    }

    /// Get the (outer, inner) counts of the current windows.
    pub fn current_counts(&self) -> (u64, u64) {
        let now = Instant::now();
        let mut windows = self.windows.lock();
        windows.outer.roll(now, self.outer_window);
        windows.inner.roll(now, self.inner_window);
        (windows.outer.count, windows.inner.count)
    }
}

#[async_trait]
impl Limiter for NestedWindow {
    fn name(&self) -> &'static str {
        "nested_window"
    }

    fn allow_n(&self, n: u64) -> bool {
        let now = Instant::now();
        let mut windows = self.windows.lock();
        windows.outer.roll(now, self.outer_window);
        windows.inner.roll(now, self.inner_window);

        let allowed = windows.outer.has_room(n, self.outer_rate)
            && windows.inner.has_room(n, self.inner_rate);
        if allowed {
            windows.outer.count += n;
            windows.inner.count += n;
        }
        drop(windows);

        if !allowed {
            trace!(requested = n, "nested window denied request");
        }

        self.metrics.record_decision(allowed);
        allowed
    }

    async fn wait_n(&self, n: u64, cancel: &CancellationToken) -> Result<()> {
        if n > self.outer_rate.min(self.inner_rate) {
            warn!(
                requested = n,
                outer_rate = self.outer_rate,
                inner_rate = self.inner_rate,
                "wait asks for more permits than a window admits, only cancellation can end it"
            );
        }

        // Poll once per inner window; the lock is never held while sleeping.
        wait_for_admission(self.name(), cancel, || {
            if self.allow_n(n) {
                Attempt::Admitted
            } else {
                Attempt::RetryAfter(self.inner_window)
            }
        })
        .await
    }

    fn reset(&self) {
        let now = Instant::now();
        {
            let mut windows = self.windows.lock();
            windows.outer = WindowCounter::new(now);
            windows.inner = WindowCounter::new(now);
        }
        self.metrics.reset();

        debug!(
            outer_rate = self.outer_rate,
            inner_rate = self.inner_rate,
            "nested window reset"
        );
    }

    fn get_metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot().with_limits(
            self.outer_rate,
            self.outer_window,
            self.inner_rate,
            self.inner_window,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> NestedWindow {
        NestedWindow::new(
            10,
            Duration::from_secs(1),
            5,
            Duration::from_millis(100),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_nested_window_inner_limit() {
        let limiter = limiter();

        for i in 1..=5 {
            assert!(limiter.allow(), "Request {} should be allowed", i);
        }
        for i in 6..=10 {
            assert!(!limiter.allow(), "Request {} should hit the inner limit", i);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_nested_window_allow_n() {
        let limiter = limiter();

        assert!(limiter.allow_n(3));
        assert!(limiter.allow_n(2));
        assert!(!limiter.allow_n(1));
        assert_eq!(limiter.current_counts(), (5, 5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_nested_window_outer_limit() {
        let limiter = limiter();

        assert!(limiter.allow_n(5));
        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(limiter.allow_n(5));

        // Inner window rolled again but the outer quota is spent
        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(!limiter.allow());
        assert_eq!(limiter.current_counts(), (10, 0));

        tokio::time::advance(Duration::from_millis(800)).await;
        assert!(limiter.allow());
    }

    #[tokio::test(start_paused = true)]
    async fn test_nested_window_denial_leaves_counts() {
        let limiter = limiter();

        assert!(limiter.allow_n(4));
        assert!(!limiter.allow_n(2));
        assert_eq!(limiter.current_counts(), (4, 4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_nested_window_wait_polls_inner_window() {
        let limiter = limiter();
        let cancel = CancellationToken::new();

        assert!(limiter.allow_n(5));

        let start = Instant::now();
        limiter.wait(&cancel).await.unwrap();
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(100), "waited {:?}", waited);
        assert!(waited < Duration::from_millis(200), "waited {:?}", waited);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nested_window_wait_cancelled() {
        let limiter = limiter();
        assert!(limiter.allow_n(5));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let result = limiter.wait(&cancel).await;
        assert!(result.unwrap_err().is_cancelled());
        assert_eq!(limiter.current_counts(), (5, 5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_nested_window_reset() {
        let limiter = limiter();
        for _ in 0..7 {
            limiter.allow();
        }

        limiter.reset();

        assert_eq!(limiter.current_counts(), (0, 0));
        for i in 1..=5 {
            assert!(limiter.allow(), "Request {} should be allowed after reset", i);
        }
        assert!(!limiter.allow());
    }

    #[tokio::test(start_paused = true)]
    async fn test_nested_window_metrics() {
        let limiter = limiter();
        for _ in 0..7 {
            limiter.allow();
        }

        let metrics = limiter.get_metrics();
        assert_eq!(metrics.total_requests, 7);
        assert_eq!(metrics.allowed_requests, 5);
        assert_eq!(metrics.denied_requests, 2);
        assert_eq!(metrics.current_rate, 10);
        assert_eq!(metrics.window_duration, Duration::from_secs(1));
        assert_eq!(metrics.inner_rate, 5);
        assert_eq!(metrics.inner_window, Duration::from_millis(100));
    }

    #[test]
    fn test_nested_window_from_config_default_inner_window() {
        let config = RateLimitConfig::new(10)
            .with_burst(5)
            .with_window(Duration::from_secs(1));
        let limiter = NestedWindow::from_config(&config).unwrap();

        let metrics = limiter.get_metrics();
        assert_eq!(metrics.inner_window, Duration::from_millis(100));
        assert_eq!(metrics.inner_rate, 5);
    }
}
