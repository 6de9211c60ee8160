//! Paired position and the single-slot position ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Leg identifies one side of the pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Leg {
    A,
    B,
}

impl std::fmt::Display for Leg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Leg::A => write!(f, "a"),
            Leg::B => write!(f, "b"),
        }
    }
}

/// Side of a single-leg position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Long => write!(f, "long"),
            Side::Short => write!(f, "short"),
        }
    }
}

/// Direction of an open paired position.
///
/// A flat book is the absence of a position, so there is no `None` variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Leg A trades rich: sell A, buy B.
    ShortALongB,
    /// Leg A trades cheap: buy A, sell B.
    LongAShortB,
}

impl Direction {
    /// Returns the side held on the given leg.
    pub fn side(self, leg: Leg) -> Side {
        match (self, leg) {
            (Direction::ShortALongB, Leg::A) | (Direction::LongAShortB, Leg::B) => Side::Short,
            (Direction::ShortALongB, Leg::B) | (Direction::LongAShortB, Leg::A) => Side::Long,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::ShortALongB => write!(f, "short_a_long_b"),
            Direction::LongAShortB => write!(f, "long_a_short_b"),
        }
    }
}

/// Position is the currently open pair. Fields are fixed until close.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub direction: Direction,
    pub entry_price_a: f64,
    pub entry_price_b: f64,
    pub entry_time: DateTime<Utc>,
    /// Per-leg exposure in quote currency.
    pub notional: f64,
}

impl Position {
    /// Price convergence P&L of both legs at the given prices, before fees.
    pub fn convergence_pnl(&self, price_a: f64, price_b: f64) -> f64 {
        let n = self.notional;
        match self.direction {
            Direction::ShortALongB => {
                (self.entry_price_a - price_a) * n / self.entry_price_a
                    + (price_b - self.entry_price_b) * n / self.entry_price_b
            }
            Direction::LongAShortB => {
                (price_a - self.entry_price_a) * n / self.entry_price_a
                    + (self.entry_price_b - price_b) * n / self.entry_price_b
            }
        }
    }

    /// Minutes elapsed from entry to `at`.
    pub fn minutes_held(&self, at: DateTime<Utc>) -> f64 {
        (at - self.entry_time).num_milliseconds() as f64 / 60_000.0
    }
}

/// Errors raised when the ledger is driven out of order.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    #[error("cannot open {requested}: a {open} position is already open")]
    AlreadyOpen {
        requested: Direction,
        open: Direction,
    },
    #[error("cannot close: no position is open")]
    AlreadyFlat,
}

/// PositionLedger holds at most one open position.
#[derive(Debug, Clone, Default)]
pub struct PositionLedger {
    current: Option<Position>,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_flat(&self) -> bool {
        self.current.is_none()
    }

    /// Returns the open position, if any.
    pub fn current(&self) -> Option<&Position> {
        self.current.as_ref()
    }

    /// Opens a position. Fails if one is already open.
    pub fn open(
        &mut self,
        direction: Direction,
        price_a: f64,
        price_b: f64,
        time: DateTime<Utc>,
        notional: f64,
    ) -> Result<Position, LedgerError> {
        if let Some(open) = &self.current {
            return Err(LedgerError::AlreadyOpen {
                requested: direction,
                open: open.direction,
            });
        }

        let position = Position {
            direction,
            entry_price_a: price_a,
            entry_price_b: price_b,
            entry_time: time,
            notional,
        };
        self.current = Some(position);
        Ok(position)
    }

    /// Clears the open position and returns it. Fails if flat.
    pub fn close(&mut self) -> Result<Position, LedgerError> {
        self.current.take().ok_or(LedgerError::AlreadyFlat)
    }
}
