//! Token Bucket rate limiting algorithm.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::algorithm::{wait_for_admission, Attempt, Clock, Limiter};
use crate::config::{Algorithm, RateLimitConfig};
use crate::error::Result;
use crate::metrics::{MetricsCollector, MetricsSnapshot};

const NANOS_PER_SEC: f64 = 1_000_000_000.0;

/// Token Bucket rate limiting algorithm.
///
/// Allows controlled bursts while enforcing an average rate limit.
/// Tokens are refilled at a constant rate up to maximum capacity, so an idle
/// bucket can absorb a burst of `capacity` requests at once.
///
/// The bucket is lock-free. Refill and consumption are both compare-and-swap
/// loops on the token count, so concurrent callers can never take more tokens
/// than the bucket holds.
#[derive(Debug)]
pub struct TokenBucket {
    rate: u64,
    capacity: u64,
    tokens: AtomicU64,
    /// Nanoseconds since `clock`'s anchor.
    last_refill: AtomicU64,
    clock: Clock,
    metrics: MetricsCollector,
}

impl TokenBucket {
    /// Create a bucket refilling `rate` tokens per second, holding at most
    /// `capacity`. The bucket starts full.
    ///
    /// # Panics
    ///
    /// Panics if `rate` or `capacity` is 0.
    pub fn new(rate: u64, capacity: u64) -> Self {
        assert!(rate > 0, "rate must be greater than 0");
        assert!(capacity > 0, "capacity must be greater than 0");

        debug!(rate, capacity, "creating token bucket");

        let metrics = MetricsCollector::new();
        metrics.update_current_rate(rate);

        Self {
            rate,
            capacity,
            tokens: AtomicU64::new(capacity),
            last_refill: AtomicU64::new(0),
            clock: Clock::new(),
            metrics,
        }
    }

    /// Create a bucket from `config.rate` and `config.capacity`.
    pub fn from_config(config: &RateLimitConfig) -> Result<Self> {
        config
            .clone()
            .with_algorithm(Algorithm::TokenBucket)
            .validate()?;
        Ok(Self::new(config.rate, config.capacity))
    }

    /// Get the refill rate in tokens per second.
    pub fn rate(&self) -> u64 {
        self.rate
    }

    /// Get the maximum number of tokens.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Get the tokens available right now, after refilling.
    pub fn available(&self) -> u64 {
        self.refill(self.clock.now_nanos());
        self.tokens.load(Ordering::Acquire)
    }

    /// Time between two tokens.
    fn refill_interval(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / self.rate)
    }

    /// Credit the whole tokens earned since the last refill.
    ///
    /// The timestamp only advances when at least one token is added, and only
    /// the caller that wins the timestamp swap credits the tokens.
    fn refill(&self, now: u64) {
        let last = self.last_refill.load(Ordering::Acquire);
        // A timestamp ahead of `now` means another caller just refilled.
        let elapsed = now.saturating_sub(last);
        let earned = (self.rate as f64 * elapsed as f64 / NANOS_PER_SEC).floor() as u64;
        if earned == 0 {
            return;
        }

        if self
            .last_refill
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.tokens
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |tokens| {
                    Some(tokens.saturating_add(earned).min(self.capacity))
                })
                .ok();
        }
    }

    /// Take `n` tokens if the bucket holds at least `n`.
    fn try_consume(&self, n: u64) -> bool {
        self.tokens
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |available| {
                available.checked_sub(n)
            })
            .is_ok()
    }

    /// How long until `n` tokens will have been refilled.
    fn time_until_available(&self, n: u64) -> Duration {
        let available = self.tokens.load(Ordering::Acquire);
        if available >= n {
            return Duration::ZERO;
        }

        let missing = (n - available) as f64;
        let needed = (missing / self.rate as f64 * NANOS_PER_SEC).ceil() as u64;
        let since_refill = self
            .clock
            .now_nanos()
            .saturating_sub(self.last_refill.load(Ordering::Acquire));

        Duration::from_nanos(needed.saturating_sub(since_refill))
    }

    fn attempt(&self, n: u64) -> Attempt {
        if self.allow_n(n) {
            Attempt::Admitted
        } else {
            Attempt::RetryAfter(self.time_until_available(n))
        }
    }
}

#[async_trait]
impl Limiter for TokenBucket {
    fn name(&self) -> &'static str {
        "token_bucket"
    }

    fn allow_n(&self, n: u64) -> bool {
        self.refill(self.clock.now_nanos());

        let allowed = self.try_consume(n);
        if !allowed {
            trace!(requested = n, "token bucket denied request");
        }

        self.metrics.record_decision(allowed);
        allowed
    }

    async fn wait_n(&self, n: u64, cancel: &CancellationToken) -> Result<()> {
        if n > self.capacity {
            warn!(
                requested = n,
                capacity = self.capacity,
                "wait asks for more tokens than the bucket holds, only cancellation can end it"
            );
        }

        wait_for_admission(self.name(), cancel, || self.attempt(n)).await
    }

    fn reset(&self) {
        self.tokens.store(self.capacity, Ordering::Release);
        self.last_refill.store(self.clock.now_nanos(), Ordering::Release);
        self.metrics.reset();

        debug!(capacity = self.capacity, "token bucket reset");
    }

    fn get_metrics(&self) -> MetricsSnapshot {
        self.metrics
            .snapshot()
            .with_limits(self.rate, self.refill_interval(), 0, Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_token_bucket_basic() {
        let bucket = TokenBucket::new(10, 10);

        for i in 1..=10 {
            assert!(bucket.allow(), "Request {} should be allowed", i);
        }

        assert!(!bucket.allow(), "11th request should be denied");
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_bucket_allow_n() {
        let bucket = TokenBucket::new(10, 10);

        assert!(bucket.allow_n(5));
        assert!(bucket.allow_n(5));
        assert!(!bucket.allow_n(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_bucket_denial_keeps_tokens() {
        let bucket = TokenBucket::new(10, 10);

        assert!(bucket.allow_n(7));
        assert!(!bucket.allow_n(5));
        assert_eq!(bucket.available(), 3);
        assert!(bucket.allow_n(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_bucket_refill() {
        let bucket = TokenBucket::new(10, 10);
        assert!(bucket.allow_n(10));
        assert!(!bucket.allow());

        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(bucket.allow());
        assert!(!bucket.allow());
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_bucket_refill_capped_at_capacity() {
        let bucket = TokenBucket::new(100, 5);
        assert!(bucket.allow_n(5));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(bucket.available(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_bucket_partial_refill_not_lost() {
        // 3 tokens/s: a token every ~333ms
        let bucket = TokenBucket::new(3, 3);
        assert!(bucket.allow_n(3));

        tokio::time::advance(Duration::from_millis(200)).await;
        assert!(!bucket.allow());

        // The 200ms already elapsed still counts towards the next token
        tokio::time::advance(Duration::from_millis(150)).await;
        assert!(bucket.allow());
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_bucket_wait() {
        let bucket = TokenBucket::new(10, 1);
        let cancel = CancellationToken::new();

        bucket.wait(&cancel).await.unwrap();

        let start = tokio::time::Instant::now();
        bucket.wait(&cancel).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_bucket_wait_n() {
        let bucket = TokenBucket::new(10, 10);
        let cancel = CancellationToken::new();

        bucket.wait_n(10, &cancel).await.unwrap();

        let start = tokio::time::Instant::now();
        bucket.wait_n(5, &cancel).await.unwrap();
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(500), "waited {:?}", waited);
        assert!(waited < Duration::from_millis(600), "waited {:?}", waited);
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_bucket_wait_cancelled() {
        let bucket = TokenBucket::new(1, 1);
        assert!(bucket.allow());

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let result = bucket.wait(&cancel).await;
        assert!(result.unwrap_err().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_bucket_reset() {
        let bucket = TokenBucket::new(10, 10);
        assert!(bucket.allow_n(10));
        assert!(!bucket.allow());

        bucket.reset();

        let metrics = bucket.get_metrics();
        assert_eq!(metrics.total_requests, 0);
        for i in 1..=10 {
            assert!(bucket.allow(), "Request {} should be allowed after reset", i);
        }
        assert!(!bucket.allow());
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_bucket_metrics() {
        let bucket = TokenBucket::new(10, 5);
        for _ in 0..7 {
            bucket.allow();
        }

        let metrics = bucket.get_metrics();
        assert_eq!(metrics.total_requests, 7);
        assert_eq!(metrics.allowed_requests, 5);
        assert_eq!(metrics.denied_requests, 2);
        assert_eq!(metrics.current_rate, 10);
        assert_eq!(metrics.window_duration, Duration::from_millis(100));
        assert_eq!(metrics.total_wait_time, Duration::ZERO);
        assert_eq!(metrics.inner_rate, 0);
        assert_eq!(metrics.inner_window, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_bucket_huge_values() {
        let bucket = TokenBucket::new(u64::MAX, u64::MAX);

        assert!(bucket.allow_n(u64::MAX));
        assert!(!bucket.allow());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(bucket.available(), u64::MAX);
        assert_eq!(bucket.get_metrics().window_duration, Duration::ZERO);
    }

    #[test]
    #[should_panic]
    fn test_token_bucket_zero_rate_panics() {
        TokenBucket::new(0, 10);
    }

    #[test]
    fn test_token_bucket_from_config() {
        let config = RateLimitConfig::new(20).with_capacity(40);
        let bucket = TokenBucket::from_config(&config).unwrap();
        assert_eq!(bucket.rate(), 20);
        assert_eq!(bucket.capacity(), 40);

        assert!(TokenBucket::from_config(&config.with_capacity(0)).is_err());
    }
}
