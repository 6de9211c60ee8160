//! Domain models for the paired spread position and its trade history.

mod ledger;
mod observation;
mod position;

pub use ledger::{LedgerEntry, RunLog, RunResult};
#[cfg(test)]
pub use ledger::{EntryKind, RunSummary};
pub use observation::Observation;
pub use position::{Direction, Leg, LedgerError, Position, PositionLedger, Side};
