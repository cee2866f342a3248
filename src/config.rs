//! Limiter configuration.
//!
//! A `RateLimitConfig` names the algorithm to use and carries every parameter
//! any of the strategies needs. Fields a strategy does not use are ignored by
//! it, so one configuration shape serves all four algorithms.
//!
//! # Examples
//!
//! ```ignore
//! use skp_admit::{Algorithm, RateLimitConfig};
//! use std::time::Duration;
//!
//! // 100 permits per second, bursting up to 100 tokens
//! let config = RateLimitConfig::new(100).with_capacity(100);
//!
//! // 10 per second sustained, at most 5 inside any 100ms slice
//! let config = RateLimitConfig::new(10)
//!     .with_algorithm(Algorithm::NestedWindow)
//!     .with_burst(5)
//!     .with_window(Duration::from_secs(1));
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Rate limiting strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// Continuous refill up to a capacity.
    #[default]
    TokenBucket,
    /// Hard quota per lazily anchored window.
    FixedWindow,
    /// Exact trailing-window timestamp log.
    SlidingWindow,
    /// Outer sustained quota plus inner burst quota.
    NestedWindow,
}

impl Algorithm {
    /// All known algorithms.
    pub const ALL: [Algorithm; 4] = [
        Algorithm::TokenBucket,
        Algorithm::FixedWindow,
        Algorithm::SlidingWindow,
        Algorithm::NestedWindow,
    ];

    /// The algorithm's configuration name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::TokenBucket => "token_bucket",
            Algorithm::FixedWindow => "fixed_window",
            Algorithm::SlidingWindow => "sliding_window",
            Algorithm::NestedWindow => "nested_window",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Algorithm::ALL
            .into_iter()
            .find(|algorithm| algorithm.as_str() == s)
            .ok_or_else(|| ConfigError::UnsupportedAlgorithm(s.to_string()))
    }
}

/// Limiter configuration.
///
/// Immutable once a strategy has been constructed from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Permits per unit time (per second for the token bucket, per window otherwise).
    pub rate: u64,

    /// Inner (burst) rate for the nested window.
    pub burst: u64,

    /// Maximum tokens held by the token bucket.
    pub capacity: u64,

    /// Window duration for window-based algorithms.
    pub window: Duration,

    /// Inner window for the nested window. Defaults to `window / 10`.
    pub inner_window: Option<Duration>,

    /// Algorithm to construct.
    pub algorithm: Algorithm,

    /// Wrap the limiter with a metrics collector.
    pub metrics_enabled: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rate: 100,
            burst: 1,
            capacity: 100,
            window: Duration::from_secs(60),
            inner_window: None,
            algorithm: Algorithm::TokenBucket,
            metrics_enabled: false,
        }
    }
}

impl RateLimitConfig {
    /// Create a configuration with the given rate and all other fields defaulted.
    pub fn new(rate: u64) -> Self {
        Self {
            rate,
            ..Default::default()
        }
    }

    /// Create a validating builder.
    pub fn builder() -> RateLimitConfigBuilder {
        RateLimitConfigBuilder::new()
    }

    /// Set the rate.
    pub fn with_rate(mut self, rate: u64) -> Self {
        self.rate = rate;
        self
    }

    /// Set the inner (burst) rate.
    pub fn with_burst(mut self, burst: u64) -> Self {
        self.burst = burst;
        self
    }

    /// Set the token bucket capacity.
    pub fn with_capacity(mut self, capacity: u64) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the window duration.
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Set the inner window duration explicitly.
    pub fn with_inner_window(mut self, inner_window: Duration) -> Self {
        self.inner_window = Some(inner_window);
        self
    }

    /// Set the algorithm.
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Enable or disable the metrics wrapper.
    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.metrics_enabled = enabled;
        self
    }

    /// Get the inner window: the configured one, or a tenth of the outer window.
    pub fn effective_inner_window(&self) -> Duration {
        self.inner_window.unwrap_or(self.window / 10)
    }

    /// Check the fields the selected algorithm depends on.
    pub fn validate(&self) -> Result<()> {
        if self.rate == 0 {
            return Err(ConfigError::InvalidConfig("rate must be greater than 0".into()).into());
        }

        match self.algorithm {
            Algorithm::TokenBucket => {
                if self.capacity == 0 {
                    return Err(
                        ConfigError::InvalidConfig("capacity must be greater than 0".into()).into(),
                    );
                }
            }
            Algorithm::FixedWindow | Algorithm::SlidingWindow => {
                if self.window.is_zero() {
                    return Err(ConfigError::InvalidConfig("window must be non-zero".into()).into());
                }
            }
            Algorithm::NestedWindow => {
                if self.window.is_zero() {
                    return Err(ConfigError::InvalidConfig("window must be non-zero".into()).into());
                }
                if self.effective_inner_window().is_zero() {
                    return Err(
                        ConfigError::InvalidConfig("inner window must be non-zero".into()).into(),
                    );
                }
                if self.burst == 0 {
                    return Err(
                        ConfigError::InvalidConfig("burst must be greater than 0".into()).into(),
                    );
                }
            }
        }

        Ok(())
    }
}

/// Builder for creating configurations with validation.
///
/// Unlike the `with_*` methods, the builder accepts the algorithm by name and
/// reports an unknown name from [`build`](Self::build).
#[derive(Debug, Default)]
pub struct RateLimitConfigBuilder {
    rate: Option<u64>,
    burst: Option<u64>,
    capacity: Option<u64>,
    window: Option<Duration>,
    inner_window: Option<Duration>,
    algorithm: Option<String>,
    metrics_enabled: bool,
}

impl RateLimitConfigBuilder {
    /// Create a new configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the rate.
    pub fn rate(mut self, rate: u64) -> Self {
        self.rate = Some(rate);
        self
    }

    /// Set the inner (burst) rate.
    pub fn burst(mut self, burst: u64) -> Self {
        self.burst = Some(burst);
        self
    }

    /// Set the token bucket capacity.
    pub fn capacity(mut self, capacity: u64) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Set the window duration.
    pub fn window(mut self, window: Duration) -> Self {
        self.window = Some(window);
        self
    }

    /// Set the inner window duration.
    pub fn inner_window(mut self, inner_window: Duration) -> Self {
        self.inner_window = Some(inner_window);
        self
    }

    /// Set the algorithm.
    pub fn algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = Some(algorithm.as_str().to_string());
        self
    }

    /// Set the algorithm by its configuration name.
    pub fn algorithm_name(mut self, name: impl Into<String>) -> Self {
        self.algorithm = Some(name.into());
        self
    }

    /// Enable or disable the metrics wrapper.
    pub fn metrics(mut self, enabled: bool) -> Self {
        self.metrics_enabled = enabled;
        self
    }

    /// Build the configuration, returning an error if invalid.
    pub fn build(self) -> Result<RateLimitConfig> {
        let defaults = RateLimitConfig::default();

        let algorithm = match self.algorithm {
            Some(name) => name.parse::<Algorithm>()?,
            None => defaults.algorithm,
        };

        let config = RateLimitConfig {
            rate: self.rate.unwrap_or(defaults.rate),
            burst: self.burst.unwrap_or(defaults.burst),
            capacity: self.capacity.unwrap_or(defaults.capacity),
            window: self.window.unwrap_or(defaults.window),
            inner_window: self.inner_window,
            algorithm,
            metrics_enabled: self.metrics_enabled,
        };

        config.validate()?;
        Ok(config)
    }
}
