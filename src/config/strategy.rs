//! Spread strategy thresholds and sizing.

use serde::Deserialize;

/// Thresholds, fees and sizing for one run. Immutable once loaded.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct StrategyConfig {
    /// Open short A / long B when `diff_pct` is strictly above this.
    #[serde(default = "default_upper")]
    pub upper_threshold: f64,
    /// Open long A / short B when `diff_pct` is strictly below this.
    #[serde(default = "default_lower")]
    pub lower_threshold: f64,
    /// Taker fee per leg per transition (e.g. 0.0005 for 0.05%).
    #[serde(default = "default_fee_rate")]
    pub fee_rate: f64,
    /// Per-leg notional used for every trade.
    #[serde(default = "default_init_capital")]
    pub init_capital: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            upper_threshold: default_upper(),
            lower_threshold: default_lower(),
            fee_rate: default_fee_rate(),
            init_capital: default_init_capital(),
        }
    }
}

impl StrategyConfig {
    pub(super) fn validate(&self) -> Result<(), String> {
        if !self.upper_threshold.is_finite() || !self.lower_threshold.is_finite() {
            return Err("strategy thresholds must be finite".into());
        }
        if self.upper_threshold <= self.lower_threshold {
            return Err(format!(
                "strategy.upper_threshold ({}) must be greater than strategy.lower_threshold ({})",
                self.upper_threshold, self.lower_threshold
            ));
        }
        if !self.fee_rate.is_finite() || self.fee_rate < 0.0 {
            return Err("strategy.fee_rate must be a non-negative number".into());
        }
        if !self.init_capital.is_finite() || self.init_capital <= 0.0 {
            return Err("strategy.init_capital must be positive".into());
        }
        Ok(())
    }
}

fn default_upper() -> f64 {
    0.006
}

fn default_lower() -> f64 {
    -0.006
}

fn default_fee_rate() -> f64 {
    0.0005
}

fn default_init_capital() -> f64 {
    10_000.0
}
