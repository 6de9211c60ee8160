//! Spread arbitrage decision and settlement engine.
//!
//! The engine is synchronous and owns its position ledger and run log. It is
//! fed one observation at a time, in strictly increasing timestamp order:
//!
//! 1. while a position is open, funding is accrued when both legs printed a rate;
//! 2. from flat, `diff_pct > upper_threshold` opens short A / long B and
//!    `diff_pct < lower_threshold` opens long A / short B;
//! 3. short A / long B closes on `diff_pct <= 0`, long A / short B on `diff_pct >= 0`.
//!
//! A run that ends with an open position is closed at the last observation
//! and the close is flagged as forced.
//!
//! [`ArbitrageEngine::step`] applies decisions at the observed prices. Drivers
//! that execute real fills use [`ArbitrageEngine::decide`] and then report the
//! fill prices back through [`ArbitrageEngine::open`] and [`ArbitrageEngine::close`].

mod error;
pub mod funding;
pub mod settlement;

pub use error::EngineError;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::StrategyConfig;
use crate::domain::{
    Direction, LedgerEntry, Observation, Position, PositionLedger, RunLog, RunResult,
};

/// What the engine wants to do on an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Hold,
    Open(Direction),
    Close,
}

/// ArbitrageEngine runs the open/hold/close state machine for one pair.
#[derive(Debug)]
pub struct ArbitrageEngine {
    strategy: StrategyConfig,
    ledger: PositionLedger,
    log: RunLog,
    observed: usize,
    last: Option<Observation>,
}

impl ArbitrageEngine {
    pub fn new(strategy: StrategyConfig) -> Self {
        Self {
            strategy,
            ledger: PositionLedger::new(),
            log: RunLog::new(),
            observed: 0,
            last: None,
        }
    }

    /// Runs a complete observation sequence and returns the trade history.
    pub fn run<I>(strategy: StrategyConfig, observations: I) -> Result<RunResult, EngineError>
    where
        I: IntoIterator<Item = Observation>,
    {
        let mut engine = Self::new(strategy);
        for obs in observations {
            engine.step(&obs)?;
        }
        engine.finish()?;
        Ok(engine.into_result())
    }

    pub fn strategy(&self) -> &StrategyConfig {
        &self.strategy
    }

    #[cfg(test)]
    pub fn is_flat(&self) -> bool {
        self.ledger.is_flat()
    }

    pub fn position(&self) -> Option<&Position> {
        self.ledger.current()
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        self.log.entries()
    }

    pub fn log(&self) -> &RunLog {
        &self.log
    }

    /// Last admitted observation.
    pub fn last_observation(&self) -> Option<&Observation> {
        self.last.as_ref()
    }

    /// Number of observations admitted so far.
    pub fn observed(&self) -> usize {
        self.observed
    }

    /// Validates the next observation and admits it. Returns its index.
    pub fn observe(&mut self, obs: &Observation) -> Result<usize, EngineError> {
        let index = self.observed;

        if let Some(reason) = obs.price_defect() {
            return Err(EngineError::MalformedObservation {
                index,
                timestamp: obs.timestamp,
                reason,
            });
        }

        if let Some(prev) = &self.last {
            if obs.timestamp <= prev.timestamp {
                return Err(EngineError::OutOfOrder {
                    index,
                    timestamp: obs.timestamp,
                    previous: prev.timestamp,
                });
            }
        }

        self.observed += 1;
        self.last = Some(*obs);
        Ok(index)
    }

    /// Decides the transition for an observation without applying it.
    pub fn decide(&self, obs: &Observation) -> Decision {
        let diff = obs.diff_pct();
        match self.ledger.current().map(|p| p.direction) {
            None if diff > self.strategy.upper_threshold => Decision::Open(Direction::ShortALongB),
            None if diff < self.strategy.lower_threshold => Decision::Open(Direction::LongAShortB),
            None => Decision::Hold,
            Some(Direction::ShortALongB) if diff <= 0.0 => Decision::Close,
            Some(Direction::LongAShortB) if diff >= 0.0 => Decision::Close,
            Some(_) => Decision::Hold,
        }
    }

    /// Unrealized convergence P&L of the open position at the observed prices.
    pub fn mark_to_market(&self, obs: &Observation) -> Option<f64> {
        self.ledger
            .current()
            .map(|p| p.convergence_pnl(obs.price_a, obs.price_b))
    }

    /// Accrues funding for the open position when both legs printed a rate.
    pub fn accrue_funding(&mut self, obs: &Observation) -> Option<&LedgerEntry> {
        let position = *self.ledger.current()?;
        let (rate_a, rate_b) = obs.funding_pair()?;

        let pnl = funding::accrue(&position, rate_a, rate_b);

        info!(
            time = %obs.timestamp,
            direction = %position.direction,
            rate_a,
            rate_b,
            pnl,
            "Funding applied"
        );

        Some(
            self.log
                .append(LedgerEntry::funding(obs.timestamp, position.direction, pnl)),
        )
    }

    /// Opens a position at the given fill prices and charges the entry fee.
    pub fn open(
        &mut self,
        direction: Direction,
        price_a: f64,
        price_b: f64,
        time: DateTime<Utc>,
    ) -> Result<&LedgerEntry, EngineError> {
        let notional = self.strategy.init_capital;
        self.ledger
            .open(direction, price_a, price_b, time, notional)
            .map_err(|source| EngineError::InvalidStateTransition {
                index: self.current_index(),
                source,
            })?;

        let fee = settlement::transition_fee(notional, self.strategy.fee_rate);

        info!(
            time = %time,
            direction = %direction,
            price_a,
            price_b,
            notional,
            fee,
            "Position opened"
        );

        Ok(self.log.append(LedgerEntry::open(time, direction, fee)))
    }

    /// Closes the open position at the given fill prices.
    pub fn close(
        &mut self,
        price_a: f64,
        price_b: f64,
        time: DateTime<Utc>,
        forced: bool,
    ) -> Result<&LedgerEntry, EngineError> {
        let position = self
            .ledger
            .close()
            .map_err(|source| EngineError::InvalidStateTransition {
                index: self.current_index(),
                source,
            })?;

        let s = settlement::settle(&position, price_a, price_b, time, self.strategy.fee_rate);

        info!(
            time = %time,
            direction = %position.direction,
            price_a,
            price_b,
            gross = s.gross,
            fee = s.fee,
            pnl = s.pnl,
            duration_minutes = s.duration_minutes,
            forced,
            "Position closed"
        );

        Ok(self.log.append(LedgerEntry::close(
            time,
            position.direction,
            s.pnl,
            s.duration_minutes,
            forced,
        )))
    }

    /// Admits an observation and applies its transition at the observed prices.
    pub fn step(&mut self, obs: &Observation) -> Result<Decision, EngineError> {
        self.observe(obs)?;
        self.accrue_funding(obs);

        let decision = self.decide(obs);
        match decision {
            Decision::Open(direction) => {
                self.open(direction, obs.price_a, obs.price_b, obs.timestamp)?;
            }
            Decision::Close => {
                self.close(obs.price_a, obs.price_b, obs.timestamp, false)?;
            }
            Decision::Hold => {
                if let Some(unrealized) = self.mark_to_market(obs) {
                    debug!(
                        time = %obs.timestamp,
                        diff_pct = obs.diff_pct(),
                        unrealized,
                        "Holding position"
                    );
                }
            }
        }
        Ok(decision)
    }

    /// Force-closes an open position at the last observation.
    pub fn finish(&mut self) -> Result<Option<&LedgerEntry>, EngineError> {
        if self.ledger.is_flat() {
            return Ok(None);
        }
        let Some(last) = self.last else {
            return Ok(None);
        };

        warn!(time = %last.timestamp, "Run ended with an open position, forcing close");
        self.close(last.price_a, last.price_b, last.timestamp, true)
            .map(Some)
    }

    /// Consumes the engine and returns the trade history.
    pub fn into_result(self) -> RunResult {
        self.log.finish()
    }

    fn current_index(&self) -> usize {
        self.observed.saturating_sub(1)
    }
}

#[cfg(test)]
mod tests;
