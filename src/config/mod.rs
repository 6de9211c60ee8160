//! Configuration loading and validation for a spread arbitrage run.
//!
//! Uses serde_yaml to load YAML configuration files with support for
//! environment variable overrides.

mod app;
mod duration;
mod error;
mod execution;
mod feed;
mod strategy;

pub use app::AppConfig;
pub use error::ConfigError;
pub use execution::{ExecutionConfig, RetryConfig};
pub use feed::{FeedConfig, HistoryConfig, LegsConfig};
pub use strategy::StrategyConfig;

use serde::Deserialize;
use std::{env, fs};

/// Environment variable that replaces `feed.path`.
pub const FEED_PATH_ENV: &str = "ARB_FEED_PATH";

/// Largest kline page Binance futures serves in one request.
pub const MAX_HISTORY_LIMIT: u32 = 1500;

/// Root configuration structure.
///
/// Required sections: app, symbol, legs, feed.
/// Optional sections: strategy, execution.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Application-level settings like name and environment.
    pub app: AppConfig,
    /// Contract symbol in leg-A notation (e.g., "BIDUSDT").
    pub symbol: String,
    /// Venues of the two legs.
    pub legs: LegsConfig,
    /// Entry thresholds, fee rate and per-leg notional.
    #[serde(default)]
    pub strategy: StrategyConfig,
    /// Observation source.
    pub feed: FeedConfig,
    /// Placement timeouts and retries (optional).
    #[serde(default)]
    pub execution: ExecutionConfig,
}

impl Config {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Loads `.env` first (if present), then applies `ARB_FEED_PATH`.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let content = fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&content)?;

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = env::var(FEED_PATH_ENV) {
            if !path.trim().is_empty() {
                self.feed.path = path;
            }
        }
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.app.name.is_empty() {
            return Err(ConfigError::Validation("app.name is required".into()));
        }

        let symbol = self.symbol.trim();
        if symbol.is_empty() {
            return Err(ConfigError::Validation("symbol is required".into()));
        }

        if self
            .feed
            .blacklist
            .iter()
            .any(|b| b.eq_ignore_ascii_case(symbol))
        {
            return Err(ConfigError::Blacklisted(symbol.to_string()));
        }

        if self.legs.a.venue.is_empty() || self.legs.b.venue.is_empty() {
            return Err(ConfigError::Validation(
                "legs.a.venue and legs.b.venue are required".into(),
            ));
        }

        if self.legs.a.venue.eq_ignore_ascii_case(&self.legs.b.venue) {
            return Err(ConfigError::Validation(format!(
                "legs must be on different venues (both are {})",
                self.legs.a.venue
            )));
        }

        if self.feed.path.trim().is_empty() {
            return Err(ConfigError::Validation("feed.path is required".into()));
        }

        self.strategy.validate().map_err(ConfigError::Validation)?;

        let history = &self.feed.history;
        if history.bar_interval().is_none() {
            return Err(ConfigError::Validation(format!(
                "feed.history.interval is not a valid bar interval: {:?}",
                history.interval
            )));
        }
        if history.limit == 0 || history.limit > MAX_HISTORY_LIMIT {
            return Err(ConfigError::Validation(format!(
                "feed.history.limit must be between 1 and {}",
                MAX_HISTORY_LIMIT
            )));
        }

        if let Some(ref retry) = self.execution.retry {
            if retry.max_attempts == Some(0) {
                return Err(ConfigError::Validation(
                    "execution.retry.max_attempts must be positive".into(),
                ));
            }
            if let Some(m) = retry.multiplier {
                if !m.is_finite() || m < 1.0 {
                    return Err(ConfigError::Validation(
                        "execution.retry.multiplier must be at least 1.0".into(),
                    ));
                }
            }
        }

        Ok(())
    }
}
