//! Runtime metrics for limiters.
//!
//! Every limiter reports a [`MetricsSnapshot`]. Strategies count their own
//! decisions; the [`MetricsWrapper`] decorator adds wait-time statistics on
//! top of any limiter by feeding a shared [`MetricsCollector`].

mod collector;
mod wrapper;

pub use collector::MetricsCollector;
pub use wrapper::MetricsWrapper;

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Point-in-time view of a limiter's counters and configuration.
///
/// Fields that do not apply to the active algorithm are zero, never absent:
/// only the metrics wrapper fills the wait-time fields, and only the nested
/// window fills the inner-window fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Admission decisions made (allowed + denied).
    pub total_requests: u64,
    /// Decisions that admitted the request.
    pub allowed_requests: u64,
    /// Decisions that denied the request.
    pub denied_requests: u64,
    /// Configured rate.
    pub current_rate: u64,
    /// Construction or last `reset()`, Unix milliseconds.
    pub last_reset_time: u64,
    /// Cumulative time spent in successful waits.
    pub total_wait_time: Duration,
    /// Longest successful wait observed.
    pub max_wait_time: Duration,
    /// Window length (refill interval for the token bucket).
    pub window_duration: Duration,
    /// Inner (burst) rate of the nested window.
    pub inner_rate: u64,
    /// Inner window of the nested window.
    pub inner_window: Duration,
}

impl MetricsSnapshot {
    /// Fraction of decisions that were denials, `0.0` before any request.
    pub fn denial_ratio(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.denied_requests as f64 / self.total_requests as f64
        }
    }

    /// Set the configuration fields reported alongside the counters.
    pub(crate) fn with_limits(
        mut self,
        rate: u64,
        window: Duration,
        inner_rate: u64,
        inner_window: Duration,
    ) -> Self {
        self.current_rate = rate;
        self.window_duration = window;
        self.inner_rate = inner_rate;
        self.inner_window = inner_window;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_zero() {
        let snapshot = MetricsSnapshot::default();
        assert_eq!(snapshot.total_requests, 0);
        assert_eq!(snapshot.max_wait_time, Duration::ZERO);
        assert_eq!(snapshot.inner_window, Duration::ZERO);
        assert_eq!(snapshot.denial_ratio(), 0.0);
    }

    #[test]
    fn test_denial_ratio() {
        let snapshot = MetricsSnapshot {
            total_requests: 4,
            allowed_requests: 3,
            denied_requests: 1,
            ..Default::default()
        };
        assert!((snapshot.denial_ratio() - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_snapshot_serializes_every_field() {
        let snapshot = MetricsSnapshot::default().with_limits(
            10,
            Duration::from_secs(1),
            0,
            Duration::ZERO,
        );
        let json = serde_json::to_value(snapshot).unwrap();

        for field in [
            "total_requests",
            "allowed_requests",
            "denied_requests",
            "current_rate",
            "last_reset_time",
            "total_wait_time",
            "max_wait_time",
            "window_duration",
            "inner_rate",
            "inner_window",
        ] {
            assert!(json.get(field).is_some(), "missing {}", field);
        }
        assert_eq!(json["current_rate"], 10);
    }
}
