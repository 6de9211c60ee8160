//! Joins per-leg bars and funding prints into synchronized observations.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::domain::{Leg, Observation};

use super::FeedRecord;

/// Everything seen for one timestamp.
#[derive(Debug, Clone, Copy, Default)]
struct Slot {
    close_a: Option<f64>,
    close_b: Option<f64>,
    funding_a: Option<f64>,
    funding_b: Option<f64>,
}

impl Slot {
    fn set_close(&mut self, leg: Leg, close: f64) {
        match leg {
            Leg::A => self.close_a = Some(close),
            Leg::B => self.close_b = Some(close),
        }
    }

    fn set_funding(&mut self, leg: Leg, rate: f64) {
        match leg {
            Leg::A => self.funding_a = Some(rate),
            Leg::B => self.funding_b = Some(rate),
        }
    }
}

/// QuoteJoiner is the per-run snapshot store keyed by timestamp.
///
/// Bars are inner-joined: a timestamp yields an observation only if both legs
/// closed a bar there. Funding prints are left-joined onto those bars; a print
/// on a timestamp without both bars is dropped.
#[derive(Debug, Default)]
pub struct QuoteJoiner {
    slots: BTreeMap<DateTime<Utc>, Slot>,
}

impl QuoteJoiner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a bar close. A repeated `(leg, time)` replaces the earlier value.
    pub fn push_bar(&mut self, leg: Leg, time: DateTime<Utc>, close: f64) {
        self.slots.entry(time).or_default().set_close(leg, close);
    }

    /// Records a funding print. A repeated `(leg, time)` replaces the earlier value.
    pub fn push_funding(&mut self, leg: Leg, time: DateTime<Utc>, rate: f64) {
        self.slots.entry(time).or_default().set_funding(leg, rate);
    }

    pub fn push(&mut self, record: FeedRecord) {
        match record {
            FeedRecord::Bar { leg, time, close } => self.push_bar(leg, time, close),
            FeedRecord::Funding { leg, time, rate } => self.push_funding(leg, time, rate),
        }
    }

    /// Number of distinct timestamps seen.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Emits the joined observations in timestamp order and empties the store.
    pub fn drain(&mut self) -> Vec<Observation> {
        let slots = std::mem::take(&mut self.slots);
        let total = slots.len();

        let observations: Vec<Observation> = slots
            .into_iter()
            .filter_map(|(time, slot)| {
                let (a, b) = (slot.close_a?, slot.close_b?);
                Some(Observation::new(time, a, b).with_funding(slot.funding_a, slot.funding_b))
            })
            .collect();

        debug!(
            timestamps = total,
            observations = observations.len(),
            dropped = total - observations.len(),
            "Feed joined"
        );

        observations
    }
}
