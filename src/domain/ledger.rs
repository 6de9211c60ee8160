//! Append-only trade history and its derived aggregates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::position::Direction;

/// EntryKind tags each side-effecting event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Open,
    Funding,
    Close,
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryKind::Open => write!(f, "open"),
            EntryKind::Funding => write!(f, "funding"),
            EntryKind::Close => write!(f, "close"),
        }
    }
}

/// LedgerEntry records one open, funding or close event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub time: DateTime<Utc>,
    pub direction: Direction,
    /// Cash effect of this event alone.
    pub pnl_delta: f64,
    /// Holding time, set on close entries only.
    pub duration_minutes: Option<f64>,
    /// True when the close was caused by the end of the run.
    #[serde(default)]
    pub forced: bool,
}

impl LedgerEntry {
    pub fn open(time: DateTime<Utc>, direction: Direction, fee: f64) -> Self {
        Self {
            kind: EntryKind::Open,
            time,
            direction,
            pnl_delta: -fee,
            duration_minutes: None,
            forced: false,
        }
    }

    pub fn funding(time: DateTime<Utc>, direction: Direction, pnl: f64) -> Self {
        Self {
            kind: EntryKind::Funding,
            time,
            direction,
            pnl_delta: pnl,
            duration_minutes: None,
            forced: false,
        }
    }

    pub fn close(
        time: DateTime<Utc>,
        direction: Direction,
        pnl: f64,
        duration_minutes: f64,
        forced: bool,
    ) -> Self {
        Self {
            kind: EntryKind::Close,
            time,
            direction,
            pnl_delta: pnl,
            duration_minutes: Some(duration_minutes),
            forced,
        }
    }
}

/// RunLog is the ordered, append-only sequence of ledger entries for one run.
#[derive(Debug, Clone, Default)]
pub struct RunLog {
    entries: Vec<LedgerEntry>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry and returns a reference to it.
    pub fn append(&mut self, entry: LedgerEntry) -> &LedgerEntry {
        self.entries.push(entry);
        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub fn summary(&self) -> RunSummary {
        RunSummary::from_entries(&self.entries)
    }

    /// Seals the log into the run result.
    pub fn finish(self) -> RunResult {
        RunResult {
            entries: self.entries,
        }
    }
}

/// RunResult is the complete trade history of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub entries: Vec<LedgerEntry>,
}

impl RunResult {
    /// Sum of every entry's P&L.
    pub fn total_pnl(&self) -> f64 {
        self.entries.iter().map(|e| e.pnl_delta).sum()
    }

    /// Number of closed trades.
    pub fn trade_count(&self) -> usize {
        count_kind(&self.entries, EntryKind::Close)
    }

    /// Number of funding events applied.
    pub fn funding_event_count(&self) -> usize {
        count_kind(&self.entries, EntryKind::Funding)
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary::from_entries(&self.entries)
    }
}

fn count_kind(entries: &[LedgerEntry], kind: EntryKind) -> usize {
    entries.iter().filter(|e| e.kind == kind).count()
}

/// Aggregates derived from a ledger entry sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub total_pnl: f64,
    pub trades: usize,
    pub funding_events: usize,
    pub forced_closes: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// Fees charged at open, as a positive amount.
    pub open_fees: f64,
    pub funding_pnl: f64,
    pub avg_hold_minutes: f64,
}

impl RunSummary {
    pub fn from_entries(entries: &[LedgerEntry]) -> Self {
        let mut summary = RunSummary::default();
        let mut held_minutes = 0.0;

        for entry in entries {
            summary.total_pnl += entry.pnl_delta;
            match entry.kind {
                EntryKind::Open => summary.open_fees -= entry.pnl_delta,
                EntryKind::Funding => {
                    summary.funding_events += 1;
                    summary.funding_pnl += entry.pnl_delta;
                }
                EntryKind::Close => {
                    summary.trades += 1;
                    if entry.forced {
                        summary.forced_closes += 1;
                    }
                    if entry.pnl_delta > 0.0 {
                        summary.winning_trades += 1;
                    } else if entry.pnl_delta < 0.0 {
                        summary.losing_trades += 1;
                    }
                    held_minutes += entry.duration_minutes.unwrap_or_default();
                }
            }
        }

        if summary.trades > 0 {
            summary.avg_hold_minutes = held_minutes / summary.trades as f64;
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn ts(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn sample_log() -> RunLog {
        let d = Direction::ShortALongB;
        let mut log = RunLog::new();
        log.append(LedgerEntry::open(ts(0), d, 10.0));
        log.append(LedgerEntry::funding(ts(5), d, 3.0));
        log.append(LedgerEntry::close(ts(10), d, 101.0, 10.0, false));
        log.append(LedgerEntry::open(ts(15), Direction::LongAShortB, 10.0));
        log.append(LedgerEntry::funding(ts(20), Direction::LongAShortB, -1.5));
        log.append(LedgerEntry::close(ts(45), Direction::LongAShortB, -20.0, 30.0, true));
        log
    }

    #[test]
    fn test_append_preserves_order() {
        let log = sample_log();
        let kinds: Vec<_> = log.entries().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EntryKind::Open,
                EntryKind::Funding,
                EntryKind::Close,
                EntryKind::Open,
                EntryKind::Funding,
                EntryKind::Close,
            ]
        );
        assert_eq!(log.len(), 6);
    }

    #[test]
    fn test_result_aggregates() {
        let result = sample_log().finish();
        assert!((result.total_pnl() - 62.5).abs() < 1e-9);
        assert_eq!(result.trade_count(), 2);
        assert_eq!(result.funding_event_count(), 2);
    }

    #[test]
    fn test_summary() {
        let summary = sample_log().summary();
        assert_eq!(summary.trades, 2);
        assert_eq!(summary.forced_closes, 1);
        assert_eq!(summary.winning_trades, 1);
        assert_eq!(summary.losing_trades, 1);
        assert!((summary.open_fees - 20.0).abs() < 1e-9);
        assert!((summary.funding_pnl - 1.5).abs() < 1e-9);
        assert!((summary.avg_hold_minutes - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_breakeven_close_is_neither_win_nor_loss() {
        let d = Direction::ShortALongB;
        let mut log = RunLog::new();
        log.append(LedgerEntry::open(ts(0), d, 10.0));
        log.append(LedgerEntry::close(ts(5), d, 0.0, 5.0, false));

        let summary = log.summary();
        assert_eq!(summary.trades, 1);
        assert_eq!(summary.winning_trades, 0);
        assert_eq!(summary.losing_trades, 0);
    }

    #[test]
    fn test_empty_summary() {
        let summary = RunLog::new().summary();
        assert_eq!(summary, RunSummary::default());
    }

    #[test]
    fn test_entry_serialization() {
        let entry = LedgerEntry::close(ts(10), Direction::ShortALongB, 1.0, 10.0, true);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "close");
        assert_eq!(json["direction"], "short_a_long_b");
        assert_eq!(json["forced"], true);
        assert_eq!(json["duration_minutes"], 10.0);

        let entry = LedgerEntry::open(ts(0), Direction::LongAShortB, 10.0);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "open");
        assert_eq!(json["pnl_delta"], -10.0);
        assert!(json["duration_minutes"].is_null());
    }
}
