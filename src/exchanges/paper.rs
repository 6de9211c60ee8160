//! Paper leg executor that fills every placement at the reference price.

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::{Leg, Side};
use crate::exchanges::utils::venue_symbol;
use crate::exchanges::{ExchangeError, Fill, LegExecutor, Result};

/// Open paper position on one leg.
#[derive(Debug, Clone, Copy, PartialEq)]
struct PaperPosition {
    side: Side,
    notional: f64,
}

/// PaperExchange simulates one leg with immediate fills at the reference price.
pub struct PaperExchange {
    leg: Leg,
    venue: String,
    symbol: String,
    position: Mutex<Option<PaperPosition>>,
}

impl PaperExchange {
    /// Creates a paper executor; `symbol` is converted to the venue's notation.
    pub fn new(leg: Leg, venue: &str, symbol: &str) -> Self {
        Self {
            leg,
            venue: venue.to_lowercase(),
            symbol: venue_symbol(venue, symbol),
            position: Mutex::new(None),
        }
    }

    /// Side of the open paper position, if any.
    #[cfg(test)]
    pub async fn open_side(&self) -> Option<Side> {
        self.position.lock().await.map(|p| p.side)
    }

    fn fill(&self, side: Side, price: f64, notional: f64) -> Fill {
        Fill {
            leg: self.leg,
            side,
            price,
            notional,
            filled_at: Utc::now(),
        }
    }
}

#[async_trait]
impl LegExecutor for PaperExchange {
    async fn open_position(&self, side: Side, notional: f64, reference_price: f64) -> Result<Fill> {
        if !reference_price.is_finite() || reference_price <= 0.0 {
            return Err(ExchangeError::Rejected(format!(
                "invalid reference price {}",
                reference_price
            )));
        }

        let mut guard = self.position.lock().await;
        if guard.is_some() {
            return Err(ExchangeError::PositionAlreadyOpen(self.symbol.clone()));
        }
        *guard = Some(PaperPosition { side, notional });

        debug!(
            venue = %self.venue,
            symbol = %self.symbol,
            side = %side,
            notional,
            price = reference_price,
            "Paper position opened"
        );

        Ok(self.fill(side, reference_price, notional))
    }

    async fn close_position(&self, reference_price: f64) -> Result<Fill> {
        let mut guard = self.position.lock().await;
        let position = guard
            .take()
            .ok_or_else(|| ExchangeError::NoOpenPosition(self.symbol.clone()))?;

        debug!(
            venue = %self.venue,
            symbol = %self.symbol,
            side = %position.side,
            price = reference_price,
            "Paper position closed"
        );

        Ok(self.fill(position.side, reference_price, position.notional))
    }

    fn leg(&self) -> Leg {
        self.leg
    }

    fn venue(&self) -> &str {
        &self.venue
    }

    fn symbol(&self) -> &str {
        &self.symbol
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_symbol_uses_venue_notation() {
        let gate = PaperExchange::new(Leg::B, "gate", "BIDUSDT");
        assert_eq!(gate.symbol(), "BID_USDT");
        assert_eq!(gate.venue(), "gate");
        assert_eq!(gate.leg(), Leg::B);

        let binance = PaperExchange::new(Leg::A, "Binance", "BIDUSDT");
        assert_eq!(binance.symbol(), "BIDUSDT");
        assert_eq!(binance.venue(), "binance");
    }

    #[tokio::test]
    async fn test_open_fills_at_reference_price() {
        let ex = PaperExchange::new(Leg::A, "binance", "BIDUSDT");
        let fill = ex.open_position(Side::Short, 10_000.0, 100.0).await.unwrap();

        assert_eq!(fill.leg, Leg::A);
        assert_eq!(fill.side, Side::Short);
        assert_eq!(fill.price, 100.0);
        assert_eq!(fill.notional, 10_000.0);
        assert_eq!(ex.open_side().await, Some(Side::Short));
    }

    #[tokio::test]
    async fn test_open_twice_is_rejected() {
        let ex = PaperExchange::new(Leg::A, "binance", "BIDUSDT");
        ex.open_position(Side::Long, 10_000.0, 100.0).await.unwrap();

        let err = ex.open_position(Side::Long, 10_000.0, 100.0).await.unwrap_err();
        assert_eq!(err, ExchangeError::PositionAlreadyOpen("BIDUSDT".to_string()));
    }

    #[tokio::test]
    async fn test_close_returns_original_side() {
        let ex = PaperExchange::new(Leg::B, "gate", "BIDUSDT");
        ex.open_position(Side::Long, 5_000.0, 99.0).await.unwrap();

        let fill = ex.close_position(100.1).await.unwrap();
        assert_eq!(fill.side, Side::Long);
        assert_eq!(fill.price, 100.1);
        assert_eq!(fill.notional, 5_000.0);
        assert_eq!(ex.open_side().await, None);
    }

    #[tokio::test]
    async fn test_close_while_flat_fails() {
        let ex = PaperExchange::new(Leg::B, "gate", "BIDUSDT");
        let err = ex.close_position(100.0).await.unwrap_err();
        assert_eq!(err, ExchangeError::NoOpenPosition("BID_USDT".to_string()));
    }

    #[tokio::test]
    async fn test_invalid_reference_price_is_rejected() {
        let ex = PaperExchange::new(Leg::A, "binance", "BIDUSDT");
        let err = ex.open_position(Side::Long, 1.0, f64::NAN).await.unwrap_err();
        assert!(matches!(err, ExchangeError::Rejected(_)));
        assert_eq!(ex.open_side().await, None);
    }
}
