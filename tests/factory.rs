//! Integration tests for building limiters from configuration.

use std::time::Duration;

use skp_admit::{
    new_limiter, new_limiter_by_name, Algorithm, ConfigError, RateLimitConfig, RateLimitError,
};

#[test]
fn test_config_defaults() {
    let config = RateLimitConfig::default();

    assert_eq!(config.rate, 100);
    assert_eq!(config.burst, 1);
    assert_eq!(config.capacity, 100);
    assert_eq!(config.window, Duration::from_secs(60));
    assert_eq!(config.effective_inner_window(), Duration::from_secs(6));
    assert_eq!(config.algorithm, Algorithm::TokenBucket);
    assert!(!config.metrics_enabled);
}

#[cfg(feature = "all-algorithms")]
#[tokio::test(start_paused = true)]
async fn test_factory_by_name() {
    let config = RateLimitConfig::new(3).with_window(Duration::from_secs(1));

    for name in ["token_bucket", "fixed_window", "sliding_window", "nested_window"] {
        let limiter = new_limiter_by_name(name, &config.clone().with_burst(3)).unwrap();
        assert_eq!(limiter.name(), name);
    }
}

#[test]
fn test_factory_rejects_unknown_name() {
    match new_limiter_by_name("gcra", &RateLimitConfig::default()) {
        Err(RateLimitError::Config(ConfigError::UnsupportedAlgorithm(name))) => {
            assert_eq!(name, "gcra")
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(limiter) => panic!("built {} for an unknown name", limiter.name()),
    }
}

#[test]
fn test_factory_rejects_invalid_values() {
    let cases = [
        RateLimitConfig::new(0),
        RateLimitConfig::new(10).with_capacity(0),
        RateLimitConfig::new(10)
            .with_algorithm(Algorithm::FixedWindow)
            .with_window(Duration::ZERO),
    ];

    for config in cases {
        assert!(
            matches!(
                new_limiter(&config),
                Err(RateLimitError::Config(ConfigError::InvalidConfig(_)))
            ),
            "{:?} should be rejected",
            config
        );
    }
}

#[cfg(feature = "nested-window")]
#[test]
fn test_factory_rejects_zero_burst_nested() {
    let config = RateLimitConfig::new(10)
        .with_burst(0)
        .with_algorithm(Algorithm::NestedWindow);

    assert!(new_limiter(&config).is_err());
}

#[tokio::test(start_paused = true)]
async fn test_metrics_flag_wraps_limiter() {
    let config = RateLimitConfig::new(2)
        .with_window(Duration::from_secs(1))
        .with_algorithm(Algorithm::FixedWindow)
        .with_metrics(true);
    let limiter = new_limiter(&config).unwrap();

    for _ in 0..3 {
        limiter.allow();
    }

    let metrics = limiter.get_metrics();
    assert_eq!(metrics.total_requests, 3);
    assert_eq!(metrics.denied_requests, 1);
    assert_eq!(metrics.current_rate, 2);
    assert_eq!(metrics.window_duration, Duration::from_secs(1));
    assert_eq!(limiter.name(), "fixed_window");
}

#[cfg(feature = "sliding-window")]
#[tokio::test(start_paused = true)]
async fn test_config_from_json() {
    let config: RateLimitConfig = serde_json::from_str(
        r#"{
            "rate": 4,
            "window": { "secs": 2, "nanos": 0 },
            "algorithm": "sliding_window",
            "metrics_enabled": true
        }"#,
    )
    .unwrap();

    assert_eq!(config.capacity, 100);
    let limiter = new_limiter(&config).unwrap();
    assert_eq!(limiter.name(), "sliding_window");
    assert!(limiter.allow_n(4));
    assert!(!limiter.allow());
}

#[test]
fn test_builder_by_name() {
    let config = RateLimitConfig::builder()
        .algorithm_name("fixed_window")
        .rate(50)
        .window(Duration::from_secs(10))
        .build()
        .unwrap();
    assert_eq!(config.algorithm, Algorithm::FixedWindow);

    let err = RateLimitConfig::builder()
        .algorithm_name("leaky_bucket")
        .build()
        .unwrap_err();
    assert!(matches!(
        err,
        RateLimitError::Config(ConfigError::UnsupportedAlgorithm(_))
    ));
}
