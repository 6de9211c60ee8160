//! Synchronized two-leg market observation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Observation is one time-aligned bar for both legs.
///
/// Funding rates are only present on bars that coincide with a funding print
/// on that venue.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Bar timestamp shared by both legs.
    pub timestamp: DateTime<Utc>,
    /// Close price of leg A.
    pub price_a: f64,
    /// Close price of leg B.
    pub price_b: f64,
    /// Funding rate printed on leg A at this bar, if any.
    pub funding_a: Option<f64>,
    /// Funding rate printed on leg B at this bar, if any.
    pub funding_b: Option<f64>,
}

impl Observation {
    /// Creates an observation without funding prints.
    pub fn new(timestamp: DateTime<Utc>, price_a: f64, price_b: f64) -> Self {
        Self {
            timestamp,
            price_a,
            price_b,
            funding_a: None,
            funding_b: None,
        }
    }

    /// Attaches funding prints for both legs.
    pub fn with_funding(mut self, funding_a: Option<f64>, funding_b: Option<f64>) -> Self {
        self.funding_a = funding_a;
        self.funding_b = funding_b;
        self
    }

    /// Normalized divergence of leg A against leg B, relative to leg A.
    pub fn diff_pct(&self) -> f64 {
        (self.price_a - self.price_b) / self.price_a
    }

    /// Returns both funding rates, or `None` unless both legs printed a finite rate.
    pub fn funding_pair(&self) -> Option<(f64, f64)> {
        match (self.funding_a, self.funding_b) {
            (Some(a), Some(b)) if a.is_finite() && b.is_finite() => Some((a, b)),
            _ => None,
        }
    }

    /// Describes why the prices cannot be evaluated, if they cannot.
    pub fn price_defect(&self) -> Option<String> {
        if !self.price_a.is_finite() || self.price_a <= 0.0 {
            return Some(format!("leg A price {} is not a positive number", self.price_a));
        }
        if !self.price_b.is_finite() || self.price_b <= 0.0 {
            return Some(format!("leg B price {} is not a positive number", self.price_b));
        }
        None
    }
}
