//! Bounded exponential backoff for leg placements.

use std::time::Duration;

use crate::config::RetryConfig;
use crate::exchanges::ExchangeError;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(500);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(5);
const DEFAULT_MULTIPLIER: f64 = 2.0;

/// RetryPolicy decides whether and when a failed placement is retried.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts including the first one.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            multiplier: DEFAULT_MULTIPLIER,
        }
    }
}

impl RetryPolicy {
    /// Builds a policy from config, filling unset fields with defaults.
    pub fn from_config(cfg: Option<&RetryConfig>) -> Self {
        let Some(cfg) = cfg else {
            return Self::default();
        };

        let defaults = Self::default();
        Self {
            max_attempts: cfg.max_attempts.unwrap_or(defaults.max_attempts).max(1),
            initial_delay: non_zero_or(cfg.initial_delay, defaults.initial_delay),
            max_delay: non_zero_or(cfg.max_delay, defaults.max_delay),
            multiplier: cfg.multiplier.unwrap_or(defaults.multiplier),
        }
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Only transport failures are retried; venue rejections are final.
    pub fn is_retryable(&self, err: &ExchangeError) -> bool {
        matches!(
            err,
            ExchangeError::Connection(_) | ExchangeError::Timeout(_)
        )
    }
}

fn non_zero_or(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() { fallback } else { value }
}
