//! Bot error types.

use crate::domain::Leg;
use crate::engine::EngineError;

/// Bot error type.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error("bot is already running")]
    AlreadyRunning,
    #[error("config error: {0}")]
    Config(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("leg {leg} left unbalanced: {reason}")]
    Unbalanced { leg: Leg, reason: String },
    #[error("forced close failed: {0}")]
    ForcedCloseFailed(String),
}
