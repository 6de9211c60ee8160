//! Engine error types.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::LedgerError;

/// Fatal errors that abort a run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("malformed observation #{index} at {timestamp}: {reason}")]
    MalformedObservation {
        index: usize,
        timestamp: DateTime<Utc>,
        reason: String,
    },
    #[error("observation #{index} at {timestamp} is not after the previous one at {previous}")]
    OutOfOrder {
        index: usize,
        timestamp: DateTime<Utc>,
        previous: DateTime<Utc>,
    },
    #[error("invalid state transition at observation #{index}: {source}")]
    InvalidStateTransition {
        index: usize,
        #[source]
        source: LedgerError,
    },
}
