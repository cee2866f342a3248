//! Sliding Window rate limiting algorithm.
//!
//! Keeps the timestamp of every admission inside the trailing window,
//! giving exact accounting at a memory cost proportional to the rate.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::algorithm::{wait_for_admission, Attempt, Limiter};
use crate::config::{Algorithm, RateLimitConfig};
use crate::error::Result;
use crate::metrics::{MetricsCollector, MetricsSnapshot};

/// Upper bound for the log's up-front allocation.
const MAX_PREALLOCATED: usize = 1024;

/// Admissions inside the trailing window, oldest first.
///
/// Admissions made at the same instant share one entry, so the log grows with
/// the number of distinct admission times rather than with the permit count.
#[derive(Debug)]
struct AdmissionLog {
    entries: VecDeque<(Instant, u64)>,
    /// Sum of the entries' permit counts.
    admitted: u64,
}

impl AdmissionLog {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            admitted: 0,
        }
    }

    /// Drop entries older than `now - window` from the front.
    fn trim(&mut self, now: Instant, window: Duration) {
        let Some(cutoff) = now.checked_sub(window) else {
            return;
        };

        while let Some(&(oldest, permits)) = self.entries.front() {
            if oldest >= cutoff {
                break;
            }
            self.entries.pop_front();
            self.admitted -= permits;
        }
    }

    fn push(&mut self, now: Instant, permits: u64) {
        let merged = match self.entries.back_mut() {
            Some((last, count)) if *last == now => {
                *count += permits;
                true
            }
            _ => false,
        };
        if !merged {
            self.entries.push_back((now, permits));
        }
        self.admitted += permits;
    }

    /// Time until the oldest entry leaves the window.
    fn time_to_expiry(&self, now: Instant, window: Duration) -> Duration {
        self.entries
            .front()
            .and_then(|&(oldest, _)| oldest.checked_add(window))
            .map_or(window, |expiry| expiry.saturating_duration_since(now))
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.admitted = 0;
    }
}

/// Sliding Window rate limiting algorithm.
///
/// Admits `n` permits iff at most `rate - n` permits were admitted during
/// the last `window`. Unlike the fixed window there is no boundary burst.
///
/// Trimming, counting and appending happen under one lock, so admission
/// decisions are totally ordered by lock acquisition.
#[derive(Debug)]
pub struct SlidingWindow {
    rate: u64,
    window: Duration,
    log: Mutex<AdmissionLog>,
    metrics: MetricsCollector,
}

impl SlidingWindow {
    /// Create a limiter admitting `rate` permits in any trailing `window`.
    ///
    /// # Panics
    ///
    /// Panics if `rate` is 0 or `window` is zero duration.
    pub fn new(rate: u64, window: Duration) -> Self {
        assert!(rate > 0, "rate must be greater than 0");
        assert!(!window.is_zero(), "window must be non-zero");

        debug!(rate, ?window, "creating sliding window limiter");

        let metrics = MetricsCollector::new();
        metrics.update_current_rate(rate);

        let preallocated = usize::try_from(rate)
            .unwrap_or(usize::MAX)
            .min(MAX_PREALLOCATED);

        Self {
            rate,
            window,
            log: Mutex::new(AdmissionLog::with_capacity(preallocated)),
            metrics,
        }
    }

    /// Create a limiter from `config.rate` and `config.window`.
    pub fn from_config(config: &RateLimitConfig) -> Result<Self> {
        config
            .clone()
            .with_algorithm(Algorithm::SlidingWindow)
            .validate()?;
        Ok(Self::new(config.rate, config.window))
    }

    /// Get the number of permits admitted inside the trailing window.
    pub fn current_count(&self) -> u64 {
        let mut log = self.log.lock();
        log.trim(Instant::now(), self.window);
        log.admitted
    }

    /// Admit `n` permits, or report how long until the oldest entry expires.
    fn try_admit(&self, n: u64) -> Attempt {
        let now = Instant::now();
        let mut log = self.log.lock();
        log.trim(now, self.window);

        let admitted = log
            .admitted
            .checked_add(n)
            .is_some_and(|total| total <= self.rate);

        let attempt = if admitted {
            log.push(now, n);
            Attempt::Admitted
        } else {
            Attempt::RetryAfter(log.time_to_expiry(now, self.window))
        };
        drop(log);

        if !admitted {
            trace!(requested = n, rate = self.rate, "sliding window denied request");
        }

        self.metrics.record_decision(admitted);
        attempt
    }
}

#[async_trait]
impl Limiter for SlidingWindow {
    fn name(&self) -> &'static str {
        "sliding_window"
    }

    fn allow_n(&self, n: u64) -> bool {
        self.try_admit(n) == Attempt::Admitted
    }

    async fn wait_n(&self, n: u64, cancel: &CancellationToken) -> Result<()> {
        if n > self.rate {
            warn!(
                requested = n,
                rate = self.rate,
                "wait asks for more permits than the window admits, only cancellation can end it"
            );
        }

        wait_for_admission(self.name(), cancel, || self.try_admit(n)).await
    }

    fn reset(&self) {
        self.log.lock().clear();
        self.metrics.reset();

        debug!(rate = self.rate, "sliding window reset");
    }

    fn get_metrics(&self) -> MetricsSnapshot {
        self.metrics
            .snapshot()
            .with_limits(self.rate, self.window, 0, Duration::ZERO)
    }
}
