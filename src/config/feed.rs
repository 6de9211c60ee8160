//! Feed source and leg venue configuration.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::duration::parse_duration;

/// Venue of one leg.
#[derive(Debug, Clone, Deserialize)]
pub struct LegConfig {
    /// Venue name, e.g. "binance" or "gate".
    pub venue: String,
}

/// The two legs of the pair.
#[derive(Debug, Clone, Deserialize)]
pub struct LegsConfig {
    pub a: LegConfig,
    pub b: LegConfig,
}

/// Where observations come from.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// Path to a JSON-lines feed file (overridable with ARB_FEED_PATH).
    pub path: String,
    /// Symbols that share a ticker across venues but not an underlying asset.
    #[serde(default = "default_blacklist")]
    pub blacklist: Vec<String>,
    /// Window downloaded by `--fetch`.
    #[serde(default)]
    pub history: HistoryConfig,
}

/// Venue REST history download settings.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    /// Bar interval in venue notation, e.g. "5m" or "1h".
    #[serde(default = "default_interval")]
    pub interval: String,
    /// Bars per leg.
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// First bar open time. Defaults to `limit` bars before now.
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
}

impl HistoryConfig {
    /// Length of one bar, or `None` if the interval is unparsable or zero.
    pub fn bar_interval(&self) -> Option<Duration> {
        parse_duration(&self.interval).ok().filter(|d| !d.is_zero())
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            limit: default_limit(),
            start: None,
        }
    }
}

fn default_interval() -> String {
    "5m".to_string()
}

fn default_limit() -> u32 {
    1500
}

fn default_blacklist() -> Vec<String> {
    vec!["NEIROUSDT".to_string()]
}
