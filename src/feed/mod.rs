//! Observation feed: JSON-lines loading, leg join and channel delivery.
//!
//! Each line of a feed file is one record:
//!
//! ```text
//! {"type":"bar","leg":"a","time":"2024-05-01T00:00:00Z","close":100.0}
//! {"type":"funding","leg":"b","time":"2024-05-01T08:00:00Z","rate":0.0001}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped.

pub mod history;
mod joiner;

pub use joiner::QuoteJoiner;

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::domain::{Leg, Observation};

/// Capacity of the observation channel handed to the bot.
const CHANNEL_CAPACITY: usize = 256;

/// FeedRecord is one raw per-leg event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FeedRecord {
    /// Close of a price bar on one leg.
    Bar {
        leg: Leg,
        time: DateTime<Utc>,
        close: f64,
    },
    /// Funding rate settled on one leg.
    Funding {
        leg: Leg,
        time: DateTime<Utc>,
        rate: f64,
    },
}

/// Feed errors.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("failed to read feed file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid feed record on line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode feed record: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to write feed file {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Parses JSON-lines feed content.
pub fn parse_records(content: &str) -> Result<Vec<FeedRecord>, FeedError> {
    content
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(line, text)| {
            serde_json::from_str(text).map_err(|source| FeedError::Parse { line, source })
        })
        .collect()
}

/// Writes records as JSON lines, creating parent directories as needed.
pub fn write_records(path: &str, records: &[FeedRecord]) -> Result<(), FeedError> {
    let mut content = String::new();
    for record in records {
        content.push_str(&serde_json::to_string(record).map_err(FeedError::Encode)?);
        content.push('\n');
    }

    let write_err = |source| FeedError::Write {
        path: path.to_string(),
        source,
    };
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
    }
    fs::write(path, content).map_err(write_err)
}

/// Reads a feed file and joins it into the observation sequence.
pub fn load_observations(path: &str) -> Result<Vec<Observation>, FeedError> {
    let content = fs::read_to_string(path).map_err(|source| FeedError::Read {
        path: path.to_string(),
        source,
    })?;

    let records = parse_records(&content)?;
    debug!(path = %path, records = records.len(), "Feed records loaded");

    let mut joiner = QuoteJoiner::new();
    for record in records {
        joiner.push(record);
    }
    debug!(timestamps = joiner.len(), "Feed records joined");
    let observations = joiner.drain();

    info!(path = %path, observations = observations.len(), "Feed loaded");
    Ok(observations)
}

/// Delivers observations one at a time over a channel.
///
/// The channel closes after the last observation, which ends the run.
pub fn stream(observations: Vec<Observation>) -> mpsc::Receiver<Observation> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    tokio::spawn(async move {
        for obs in observations {
            if tx.send(obs).await.is_err() {
                debug!("Observation receiver dropped, stopping feed");
                break;
            }
        }
    });
    rx
}
