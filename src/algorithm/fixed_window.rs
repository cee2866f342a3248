//! Fixed Window rate limiting algorithm.
//!
//! Counts admissions inside a window that starts at the first request seen
//! after the previous window expired. Windows are not aligned to the clock.

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

/// Fixed Window rate limiting algorithm.
///
/// Admits at most `rate` permits per window. Like every fixed window
/// counter it can admit up to `2 * rate` permits across a window boundary;
/// use the sliding window or the token bucket for smoother limiting.
///
/// Rollover and reservation happen together under one short lock, so a new
/// window always starts empty and the count never exceeds `rate`.
#[derive(Debug)]
pub struct FixedWindow {
    rate: u64,
    window: Duration,
    counter: Mutex<WindowCounter>,
    metrics: MetricsCollector,
}

impl FixedWindow {
    /// Create a limiter admitting `rate` permits per `window`.
    ///
    /// # Panics
    ///
    /// Panics if `rate` is 0 or `window` is zero duration.
    pub fn new(rate: u64, window: Duration) -> Self {
        assert!(rate > 0, "rate must be greater than 0");
        assert!(!window.is_zero(), "window must be non-zero");

        debug!(rate, ?window, "creating fixed window limiter");

        let metrics = MetricsCollector::new();
        metrics.update_current_rate(rate);

        Self {
            rate,
            window,
            counter: Mutex::new(WindowCounter::new(Instant::now())),
            metrics,
        }
    }

    /// Create a limiter from `config.rate` and `config.window`.
    pub fn from_config(config: &RateLimitConfig) -> Result<Self> {
        config
            .clone()
            .with_algorithm(Algorithm::FixedWindow)
            .validate()?;
        Ok(Self::new(config.rate, config.window))
    }

    /// Get the number of permits admitted in the current window.
    pub fn current_count(&self) -> u64 {
        let mut counter = self.counter.lock();
        counter.roll(Instant::now(), self.window);
        counter.count
    }

    /// Reserve `n` permits, or report the time left in the current window.
    fn try_reserve(&self, n: u64) -> Attempt {
        let now = Instant::now();
        let mut counter = self.counter.lock();
        counter.roll(now, self.window);

        let attempt = if counter.has_room(n, self.rate) {
            counter.count += n;
            Attempt::Admitted
        } else {
            Attempt::RetryAfter(counter.remaining(now, self.window))
        };
        drop(counter);

        let allowed = attempt == Attempt::Admitted;
        if !allowed {
            trace!(requested = n, rate = self.rate, "fixed window denied request");
        }

        self.metrics.record_decision(allowed);
        attempt
    }
}

#[async_trait]
impl Limiter for FixedWindow {
    fn name(&self) -> &'static str {
        "fixed_window"
    }

    fn allow_n(&self, n: u64) -> bool {
        self.try_reserve(n) == Attempt::Admitted
    }

    async fn wait_n(&self, n: u64, cancel: &CancellationToken) -> Result<()> {
        if n > self.rate {
            warn!(
                requested = n,
                rate = self.rate,
                "wait asks for more permits than a window admits, only cancellation can end it"
            );
        }

        wait_for_admission(self.name(), cancel, || self.try_reserve(n)).await
    }

    fn reset(&self) {
        *self.counter.lock() = WindowCounter::new(Instant::now());
        self.metrics.reset();

        debug!(rate = self.rate, "fixed window reset");
    }

    fn get_metrics(&self) -> MetricsSnapshot {
        self.metrics
            .snapshot()
            .with_limits(self.rate, self.window, 0, Duration::ZERO)
    }
}
