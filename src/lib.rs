//! In-process admission control for Rust.
//!
//! `skp_admit` decides whether a unit of work may proceed now, or waits
//! until it may, according to a configured rate policy:
//!
//! - **Multiple Algorithms**: Token Bucket, Fixed Window, Sliding Window, Nested Window
//! - **One Capability**: every strategy is a [`Limiter`] and is interchangeable behind `Box<dyn Limiter>`
//! - **Cancellable Waits**: blocking admission honors a [`CancellationToken`]
//! - **Metrics**: per-limiter counters plus a decorator that records wait times
//!
//! # Quick Start
//!
//! ```ignore
//! use skp_admit::{new_limiter, Algorithm, CancellationToken, Limiter, RateLimitConfig};
//!
//! #[tokio::main]
//! async fn main() -> skp_admit::Result<()> {
//!     let config = RateLimitConfig::new(10)
//!         .with_capacity(10)
//!         .with_algorithm(Algorithm::TokenBucket)
//!         .with_metrics(true);
//!     let limiter = new_limiter(&config)?;
//!
//!     if limiter.allow() {
//!         println!("Request allowed!");
//!     }
//!
//!     // Block until admitted, or fail once the token is cancelled
//!     let cancel = CancellationToken::new();
//!     limiter.wait(&cancel).await?;
//!
//!     println!("{:?}", limiter.get_metrics());
//!     Ok(())
//! }
//! ```
//!
//! # Algorithms
//!
//! | Algorithm | Best For | Memory | Feature Flag |
//! |-----------|----------|--------|--------------|
//! | Token Bucket | Bursty traffic | Low | default |
//! | Fixed Window | Simple use cases | Low | default |
//! | Sliding Window | Precision critical | O(rate) | `sliding-window` |
//! | Nested Window | Sustained + burst ceilings | Low | `nested-window` |
//!
//! # Feature Flags
//!
//! - `all-algorithms` (default): every algorithm below
//! - `sliding-window`: Sliding Window algorithm
//! - `nested-window`: Nested Window algorithm

pub mod algorithm;
pub mod config;
pub mod error;
pub mod factory;
pub mod metrics;

// Re-export main types
pub use algorithm::Limiter;
pub use config::{Algorithm, RateLimitConfig, RateLimitConfigBuilder};
pub use error::{ConfigError, RateLimitError, Result};
pub use factory::{new_limiter, new_limiter_by_name};
pub use metrics::{MetricsCollector, MetricsSnapshot, MetricsWrapper};

// Re-export algorithms
pub use algorithm::{FixedWindow, TokenBucket};

#[cfg(feature = "sliding-window")]
pub use algorithm::SlidingWindow;

#[cfg(feature = "nested-window")]
pub use algorithm::NestedWindow;

pub use tokio_util::sync::CancellationToken;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::algorithm::Limiter;
    pub use crate::config::{Algorithm, RateLimitConfig};
    pub use crate::error::{RateLimitError, Result};
    pub use crate::factory::new_limiter;
    pub use crate::metrics::{MetricsSnapshot, MetricsWrapper};

    pub use crate::algorithm::{FixedWindow, TokenBucket};

    #[cfg(feature = "sliding-window")]
    pub use crate::algorithm::SlidingWindow;

    #[cfg(feature = "nested-window")]
    pub use crate::algorithm::NestedWindow;

    pub use tokio_util::sync::CancellationToken;
}
