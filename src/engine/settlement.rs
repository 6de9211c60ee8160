//! Entry fee and close settlement for a paired position.

use chrono::{DateTime, Utc};

use crate::domain::Position;

/// Fee for one transition of both legs: one taker fee per leg.
pub fn transition_fee(notional: f64, fee_rate: f64) -> f64 {
    2.0 * notional * fee_rate
}

/// Realized result of closing a position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Settlement {
    /// Price convergence P&L before fees.
    pub gross: f64,
    /// Closing fee for both legs.
    pub fee: f64,
    /// `gross - fee`.
    pub pnl: f64,
    pub duration_minutes: f64,
}

/// Settles a position at the given exit prices and time.
pub fn settle(
    position: &Position,
    exit_a: f64,
    exit_b: f64,
    at: DateTime<Utc>,
    fee_rate: f64,
) -> Settlement {
    let gross = position.convergence_pnl(exit_a, exit_b);
    let fee = transition_fee(position.notional, fee_rate);
    Settlement {
        gross,
        fee,
        pnl: gross - fee,
        duration_minutes: position.minutes_held(at),
    }
}
