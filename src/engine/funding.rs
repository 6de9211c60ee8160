//! Directional funding cash flow for an open pair.

use crate::domain::{Direction, Position};

/// Funding P&L for one funding print on both legs.
///
/// A short receives funding when the rate is positive, a long pays it.
pub fn funding_pnl(direction: Direction, notional: f64, rate_a: f64, rate_b: f64) -> f64 {
    match direction {
        Direction::ShortALongB => notional * rate_a - notional * rate_b,
        Direction::LongAShortB => -notional * rate_a + notional * rate_b,
    }
}

/// Funding P&L for the given position.
pub fn accrue(position: &Position, rate_a: f64, rate_b: f64) -> f64 {
    funding_pnl(position.direction, position.notional, rate_a, rate_b)
}
