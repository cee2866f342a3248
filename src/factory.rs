//! Limiter construction from configuration.
//!
//! The factory picks the strategy named by the configuration, once, and
//! optionally layers a [`MetricsWrapper`] over it. Callers then hold the
//! result as a `Box<dyn Limiter>` for the life of the process.
//!
//! # Example
//!
//! ```ignore
//! use skp_admit::{new_limiter, Algorithm, RateLimitConfig};
//! use std::time::Duration;
//!
//! let config = RateLimitConfig::new(10)
//!     .with_algorithm(Algorithm::SlidingWindow)
//!     .with_window(Duration::from_secs(1))
//!     .with_metrics(true);
//!
//! let limiter = new_limiter(&config)?;
//! if limiter.allow() {
//!     // do the work
//! }
//! ```

use std::sync::Arc;

use tracing::debug;

use crate::algorithm::{FixedWindow, Limiter, TokenBucket};
#[cfg(feature = "nested-window")]
use crate::algorithm::NestedWindow;
#[cfg(feature = "sliding-window")]
use crate::algorithm::SlidingWindow;
use crate::config::{Algorithm, RateLimitConfig};
use crate::error::{ConfigError, Result};
use crate::metrics::{MetricsCollector, MetricsWrapper};

/// Build the limiter described by `config`.
///
/// Fails without building anything if the configuration is invalid or the
/// algorithm's cargo feature is disabled. With `metrics_enabled`, the
/// strategy is wrapped with a fresh collector.
pub fn new_limiter(config: &RateLimitConfig) -> Result<Box<dyn Limiter>> {
    config.validate()?;

    let limiter: Box<dyn Limiter> = match config.algorithm {
        Algorithm::TokenBucket => Box::new(TokenBucket::from_config(config)?),
        Algorithm::FixedWindow => Box::new(FixedWindow::from_config(config)?),
        #[cfg(feature = "sliding-window")]
        Algorithm::SlidingWindow => Box::new(SlidingWindow::from_config(config)?),
        #[cfg(feature = "nested-window")]
        Algorithm::NestedWindow => Box::new(NestedWindow::from_config(config)?),
        #[allow(unreachable_patterns)]
        disabled => {
            return Err(ConfigError::UnsupportedAlgorithm(disabled.to_string()).into());
        }
    };

    debug!(
        algorithm = %config.algorithm,
        rate = config.rate,
        metrics = config.metrics_enabled,
        "built limiter"
    );

    if !config.metrics_enabled {
        return Ok(limiter);
    }

    let collector = Arc::new(MetricsCollector::new());
    collector.update_current_rate(config.rate);
    Ok(Box::new(MetricsWrapper::new(limiter, collector)))
}

/// Build a limiter for the algorithm called `name`, taking every other
/// setting from `config`.
///
/// Unknown names fail with [`ConfigError::UnsupportedAlgorithm`].
pub fn new_limiter_by_name(name: &str, config: &RateLimitConfig) -> Result<Box<dyn Limiter>> {
    let algorithm = name.parse::<Algorithm>()?;
    new_limiter(&config.clone().with_algorithm(algorithm))
}
