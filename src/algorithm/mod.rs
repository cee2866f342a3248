//! The `Limiter` trait and its strategy implementations.
//!
//! # Available Algorithms
//!
//! - **Token Bucket** (default): Controlled bursts with refilling tokens
//! - **Fixed Window** (default): Simple counter per time window
//! - **Sliding Window** (`sliding-window` feature): Exact log of admissions in the trailing window
//! - **Nested Window** (`nested-window` feature): Sustained quota plus a short burst quota

mod fixed_window;
#[cfg(feature = "nested-window")]
mod nested_window;
#[cfg(feature = "sliding-window")]
mod sliding_window;
mod token_bucket;

pub use fixed_window::FixedWindow;
#[cfg(feature = "nested-window")]
pub use nested_window::NestedWindow;
#[cfg(feature = "sliding-window")]
pub use sliding_window::SlidingWindow;
pub use token_bucket::TokenBucket;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::{RateLimitError, Result};
use crate::metrics::MetricsSnapshot;

/// Admission-control capability shared by every strategy.
///
/// Each strategy trades accuracy, memory and burst handling differently.
/// All implementations are thread-safe and can be shared behind an `Arc`.
///
/// | Algorithm | Accuracy | Memory | Burst | Best For |
/// |-----------|----------|--------|-------|----------|
/// | Token Bucket | High | Low | Excellent | Bursty traffic |
/// | Sliding Window | Highest | O(rate) | Good | Precision critical |
/// | Nested Window | Medium | Low | Capped | Sustained + burst ceilings |
/// | Fixed Window | Low | Low | Poor (2x at boundary) | Simple use cases |
#[async_trait]
pub trait Limiter: Send + Sync {
    /// Get the algorithm name (for logging/metrics).
    fn name(&self) -> &'static str;

    /// Ask whether one unit of work may proceed now.
    fn allow(&self) -> bool {
        self.allow_n(1)
    }

    /// Ask whether `n` units of work may proceed now, all or nothing.
    ///
    /// A denial is backpressure, not an error.
    fn allow_n(&self, n: u64) -> bool;

    /// Wait until one unit of work is admitted or `cancel` fires.
    async fn wait(&self, cancel: &CancellationToken) -> Result<()> {
        self.wait_n(1, cancel).await
    }

    /// Wait until `n` units are admitted or `cancel` fires.
    ///
    /// Returns [`RateLimitError::Cancelled`] if the token fires first,
    /// including when it had already fired before the call.
    async fn wait_n(&self, n: u64, cancel: &CancellationToken) -> Result<()>;

    /// Return to the freshly constructed state.
    fn reset(&self);

    /// Read the limiter's metrics.
    fn get_metrics(&self) -> MetricsSnapshot;
}

#[async_trait]
impl<L: Limiter + ?Sized> Limiter for Box<L> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn allow(&self) -> bool {
        (**self).allow()
    }

    fn allow_n(&self, n: u64) -> bool {
        (**self).allow_n(n)
    }

    async fn wait(&self, cancel: &CancellationToken) -> Result<()> {
        (**self).wait(cancel).await
    }

    async fn wait_n(&self, n: u64, cancel: &CancellationToken) -> Result<()> {
        (**self).wait_n(n, cancel).await
    }

    fn reset(&self) {
        (**self).reset()
    }

    fn get_metrics(&self) -> MetricsSnapshot {
        (**self).get_metrics()
    }
}

#[async_trait]
impl<L: Limiter + ?Sized> Limiter for Arc<L> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn allow(&self) -> bool {
        (**self).allow()
    }

    fn allow_n(&self, n: u64) -> bool {
        (**self).allow_n(n)
    }

    async fn wait(&self, cancel: &CancellationToken) -> Result<()> {
        (**self).wait(cancel).await
    }

    async fn wait_n(&self, n: u64, cancel: &CancellationToken) -> Result<()> {
        (**self).wait_n(n, cancel).await
    }

    fn reset(&self) {
        (**self).reset()
    }

    fn get_metrics(&self) -> MetricsSnapshot {
        (**self).get_metrics()
    }
}

/// Shortest sleep between two admission attempts.
const MIN_RETRY_DELAY: Duration = Duration::from_millis(1);

/// Outcome of one admission attempt inside a wait loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Attempt {
    Admitted,
    RetryAfter(Duration),
}

/// Run admission attempts until one succeeds or `cancel` fires.
///
/// The delay is recomputed by `attempt` from fresh state on every iteration.
/// Cancellation is checked before each attempt, so an already-cancelled
/// token never reports success.
pub(crate) async fn wait_for_admission<F>(
    algorithm: &'static str,
    cancel: &CancellationToken,
    mut attempt: F,
) -> Result<()>
where
    F: FnMut() -> Attempt,
{
    loop {
        if cancel.is_cancelled() {
            return Err(RateLimitError::Cancelled);
        }

        let delay = match attempt() {
            Attempt::Admitted => return Ok(()),
            Attempt::RetryAfter(delay) => delay.max(MIN_RETRY_DELAY),
        };

        trace!(algorithm = algorithm, delay = ?delay, "admission denied, retrying after delay");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RateLimitError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// One lazily reset window counter.
///
/// The window starts at the first request seen after the previous one
/// expired, not on a clock-aligned boundary.
#[derive(Debug)]
pub(crate) struct WindowCounter {
    pub(crate) count: u64,
    start: Instant,
}

impl WindowCounter {
    pub(crate) fn new(now: Instant) -> Self {
        Self { count: 0, start: now }
    }

    /// Start a new window if this one has lasted `window` or longer.
    pub(crate) fn roll(&mut self, now: Instant, window: Duration) {
        if now.saturating_duration_since(self.start) >= window {
            self.count = 0;
            self.start = now;
        }
    }

    pub(crate) fn has_room(&self, n: u64, limit: u64) -> bool {
        self.count.checked_add(n).is_some_and(|total| total <= limit)
    }

    /// Time left before the window expires.
    pub(crate) fn remaining(&self, now: Instant, window: Duration) -> Duration {
        window.saturating_sub(now.saturating_duration_since(self.start))
    }
}

/// Monotonic clock anchored at limiter construction.
///
/// Timestamps are nanoseconds since the anchor so they fit in an `AtomicU64`.
/// Reads `tokio::time::Instant`, which follows a paused test clock.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Clock {
    origin: Instant,
}

impl Clock {
    pub(crate) fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Nanoseconds elapsed since the anchor.
    pub(crate) fn now_nanos(&self) -> u64 {
        duration_nanos(self.origin.elapsed())
    }
}

/// Convert a duration to whole nanoseconds, saturating.
pub(crate) fn duration_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

/// Get the current timestamp in milliseconds since Unix epoch.
pub(crate) fn current_timestamp_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
