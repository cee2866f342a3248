//! Error types for admission control.
//!
//! Denial is not an error: `allow`/`allow_n` report backpressure with `false`.
//! Errors only arise while building a limiter or when a blocking wait is
//! cancelled before it was admitted.

use thiserror::Error;

/// Result type for admission-control operations.
pub type Result<T> = std::result::Result<T, RateLimitError>;

/// Main error type for admission-control operations.
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The cancellation token fired before the wait was admitted.
    ///
    /// The caller must treat the unit of work as not admitted.
    #[error("Wait cancelled before admission")]
    Cancelled,
}

impl RateLimitError {
    /// Check if this error came from a cancelled wait.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Configuration-related errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Unknown algorithm name, or an algorithm whose feature is disabled.
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Invalid numeric configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
