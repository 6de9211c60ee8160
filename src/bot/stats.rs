//! Runtime statistics for the bot.

/// Counters for one driven run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stats {
    pub observations: u64,
    pub funding_events: u64,
    pub opens: u64,
    pub closes: u64,
    pub forced_closes: u64,
    /// Open decisions dropped because a leg failed to fill.
    pub skipped_opens: u64,
    /// Close decisions dropped because neither leg closed.
    pub skipped_closes: u64,
    pub retries: u64,
    pub unwinds: u64,
}
