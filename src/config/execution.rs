//! Order execution configuration for the paired-leg driver.

use serde::Deserialize;
use std::time::Duration;

use super::duration;

/// Timeout and retry settings around each leg placement.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecutionConfig {
    /// Maximum time to wait for a single leg placement (default: 10s).
    #[serde(default, with = "duration")]
    pub timeout: Duration,
    /// Retry behavior for failed placements.
    pub retry: Option<RetryConfig>,
}

/// Retry settings for failed placements.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: Option<u32>,
    /// Delay before the first retry.
    #[serde(default, with = "duration")]
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    #[serde(default, with = "duration")]
    pub max_delay: Duration,
    /// Factor by which delay increases after each retry.
    pub multiplier: Option<f64>,
}
