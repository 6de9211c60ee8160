//! Leg execution abstractions and implementations.

mod paper;
pub mod utils;

use crate::domain::{Leg, Side};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub use paper::PaperExchange;

/// Exchange errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExchangeError {
    /// A position is already open on this leg.
    #[error("{0} already holds an open position")]
    PositionAlreadyOpen(String),

    /// There is no position to close on this leg.
    #[error("{0} has no open position")]
    NoOpenPosition(String),

    /// The order was rejected by the venue.
    #[error("order rejected: {0}")]
    Rejected(String),

    /// Connection error.
    #[error("connection error: {0}")]
    Connection(String),

    /// The placement did not complete in time.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Result type for exchange operations.
pub type Result<T> = std::result::Result<T, ExchangeError>;

/// Fill reports the executed price of one leg placement.
#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    pub leg: Leg,
    pub side: Side,
    /// Average execution price.
    pub price: f64,
    /// Quote-currency size of the fill.
    pub notional: f64,
    pub filled_at: DateTime<Utc>,
}

/// LegExecutor places and closes the position of one leg on its venue.
///
/// Each call is one placement. Implementations must not retry internally;
/// the caller owns timeouts and retries.
#[async_trait]
pub trait LegExecutor: Send + Sync {
    /// Opens a `notional`-sized position on `side`.
    /// `reference_price` is the observed price the decision was made on.
    async fn open_position(&self, side: Side, notional: f64, reference_price: f64) -> Result<Fill>;

    /// Closes the open position on this leg.
    /// Returns NoOpenPosition if the leg is flat.
    async fn close_position(&self, reference_price: f64) -> Result<Fill>;

    /// Which leg of the pair this executor trades.
    fn leg(&self) -> Leg;

    /// Venue name (e.g., "binance", "gate").
    fn venue(&self) -> &str;

    /// Contract symbol in this venue's notation.
    fn symbol(&self) -> &str;
}
