//! Tests for the arbitrage engine.

use super::*;
use crate::domain::{EntryKind, LedgerError};
use chrono::{Duration, TimeZone};

fn strategy() -> StrategyConfig {
    StrategyConfig {
        upper_threshold: 0.006,
        lower_threshold: -0.006,
        fee_rate: 0.0005,
        init_capital: 10_000.0,
    }
}

fn ts(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes)
}

fn obs(minutes: i64, a: f64, b: f64) -> Observation {
    Observation::new(ts(minutes), a, b)
}

fn obs_fr(minutes: i64, a: f64, b: f64, fr_a: f64, fr_b: f64) -> Observation {
    obs(minutes, a, b).with_funding(Some(fr_a), Some(fr_b))
}

fn kinds(result: &RunResult) -> Vec<EntryKind> {
    result.entries.iter().map(|e| e.kind).collect()
}

/// Deterministic oscillating spread with funding every 8th bar.
fn wave(len: i64) -> Vec<Observation> {
    (0..len)
        .map(|i| {
            let t = i as f64;
            let a = 100.0 + (t * 0.05).sin();
            let spread = 0.012 * (t * 0.21).sin() + 0.003 * (t * 1.3).cos();
            let b = a * (1.0 - spread);
            let o = obs(i * 5, a, b);
            if i % 8 == 0 {
                o.with_funding(Some(0.0001 * (t * 0.1).cos()), Some(-0.00005))
            } else if i % 8 == 4 {
                // Only one venue printed: must not accrue.
                o.with_funding(Some(0.0001), None)
            } else {
                o
            }
        })
        .collect()
}

// ==================== Reference scenarios ====================

#[test]
fn test_open_funding_close_scenario() {
    let observations = vec![
        obs(0, 100.0, 99.0),
        obs(5, 100.0, 99.4),
        obs_fr(10, 100.0, 100.1, 0.0001, -0.0002),
    ];

    let result = ArbitrageEngine::run(strategy(), observations).unwrap();

    assert_eq!(
        kinds(&result),
        vec![EntryKind::Open, EntryKind::Funding, EntryKind::Close]
    );

    let open = &result.entries[0];
    assert_eq!(open.direction, Direction::ShortALongB);
    assert_eq!(open.time, ts(0));
    assert!((open.pnl_delta + 10.0).abs() < 1e-9);

    let funding = &result.entries[1];
    assert_eq!(funding.time, ts(10));
    assert!((funding.pnl_delta - 3.0).abs() < 1e-9);

    let close = &result.entries[2];
    let expected = (100.1 - 99.0) * 10_000.0 / 99.0 - 10.0;
    assert!((close.pnl_delta - expected).abs() < 1e-9);
    assert_eq!(close.duration_minutes, Some(10.0));
    assert!(!close.forced);

    assert!((result.total_pnl() - (-10.0 + 3.0 + expected)).abs() < 1e-9);
    assert_eq!(result.trade_count(), 1);
    assert_eq!(result.funding_event_count(), 1);
}

#[test]
fn test_forced_close_at_end_of_run() {
    let observations = vec![obs(0, 100.0, 101.0), obs(5, 100.0, 100.9), obs(30, 100.0, 100.8)];

    let result = ArbitrageEngine::run(strategy(), observations).unwrap();

    assert_eq!(kinds(&result), vec![EntryKind::Open, EntryKind::Close]);
    let close = result.entries.last().unwrap();
    assert_eq!(close.kind, EntryKind::Close);
    assert!(close.forced);
    assert_eq!(close.direction, Direction::LongAShortB);
    assert_eq!(close.time, ts(30));
    assert_eq!(close.duration_minutes, Some(30.0));

    let expected = (101.0 - 100.8) * 10_000.0 / 101.0 - 10.0;
    assert!((close.pnl_delta - expected).abs() < 1e-9);
}

#[test]
fn test_forced_close_on_opening_bar() {
    let result = ArbitrageEngine::run(strategy(), vec![obs(0, 100.0, 98.0)]).unwrap();

    assert_eq!(kinds(&result), vec![EntryKind::Open, EntryKind::Close]);
    let close = &result.entries[1];
    assert!(close.forced);
    assert_eq!(close.duration_minutes, Some(0.0));
    // No price move: the round trip costs exactly both fees.
    assert!((result.total_pnl() + 20.0).abs() < 1e-9);
}

#[test]
fn test_empty_run() {
    let result = ArbitrageEngine::run(strategy(), Vec::new()).unwrap();
    assert!(result.entries.is_empty());
    assert_eq!(result.total_pnl(), 0.0);
}

#[test]
fn test_run_that_never_opens() {
    let observations = vec![obs(0, 100.0, 99.8), obs(5, 100.0, 100.2), obs(10, 100.0, 100.0)];
    let result = ArbitrageEngine::run(strategy(), observations).unwrap();
    assert!(result.entries.is_empty());
}

// ==================== Threshold boundaries ====================

#[test]
fn test_diff_equal_to_thresholds_does_not_open() {
    let mut engine = ArbitrageEngine::new(StrategyConfig {
        upper_threshold: 0.5,
        lower_threshold: -0.5,
        ..strategy()
    });

    // diff = (100 - 50) / 100 = 0.5 exactly
    assert_eq!(engine.step(&obs(0, 100.0, 50.0)).unwrap(), Decision::Hold);
    // diff = (100 - 150) / 100 = -0.5 exactly
    assert_eq!(engine.step(&obs(5, 100.0, 150.0)).unwrap(), Decision::Hold);
    assert!(engine.is_flat());
    assert!(engine.entries().is_empty());
}

#[test]
fn test_zero_diff_closes_short_a_long_b() {
    let mut engine = ArbitrageEngine::new(strategy());
    assert_eq!(
        engine.step(&obs(0, 100.0, 99.0)).unwrap(),
        Decision::Open(Direction::ShortALongB)
    );
    assert_eq!(engine.step(&obs(5, 100.0, 99.9)).unwrap(), Decision::Hold);
    assert_eq!(engine.step(&obs(10, 100.0, 100.0)).unwrap(), Decision::Close);
    assert!(engine.is_flat());
}

#[test]
fn test_zero_diff_closes_long_a_short_b() {
    let mut engine = ArbitrageEngine::new(strategy());
    assert_eq!(
        engine.step(&obs(0, 100.0, 101.0)).unwrap(),
        Decision::Open(Direction::LongAShortB)
    );
    assert_eq!(engine.step(&obs(5, 100.0, 100.1)).unwrap(), Decision::Hold);
    assert_eq!(engine.step(&obs(10, 100.0, 100.0)).unwrap(), Decision::Close);
    assert!(engine.is_flat());
}

#[test]
fn test_reversal_past_zero_closes() {
    let mut engine = ArbitrageEngine::new(strategy());
    engine.step(&obs(0, 100.0, 101.0)).unwrap();
    // Spread flips all the way past the upper threshold: close only, no reopen.
    assert_eq!(engine.step(&obs(5, 100.0, 98.0)).unwrap(), Decision::Close);
    assert!(engine.is_flat());
    // The next bar may open the opposite side.
    assert_eq!(
        engine.step(&obs(10, 100.0, 98.0)).unwrap(),
        Decision::Open(Direction::ShortALongB)
    );
}

#[test]
fn test_wide_spread_while_open_does_not_reopen() {
    let mut engine = ArbitrageEngine::new(strategy());
    engine.step(&obs(0, 100.0, 99.0)).unwrap();
    assert_eq!(engine.step(&obs(5, 100.0, 97.0)).unwrap(), Decision::Hold);
    assert_eq!(engine.entries().len(), 1);
}

// ==================== Funding ====================

#[test]
fn test_no_funding_on_opening_bar() {
    let mut engine = ArbitrageEngine::new(strategy());
    engine.step(&obs_fr(0, 100.0, 99.0, 0.0001, 0.0001)).unwrap();
    assert_eq!(engine.entries().len(), 1);
    assert_eq!(engine.entries()[0].kind, EntryKind::Open);
}

#[test]
fn test_no_funding_while_flat() {
    let mut engine = ArbitrageEngine::new(strategy());
    engine.step(&obs_fr(0, 100.0, 100.0, 0.0001, 0.0001)).unwrap();
    assert!(engine.entries().is_empty());
}

#[test]
fn test_partial_funding_is_suppressed() {
    let mut engine = ArbitrageEngine::new(strategy());
    engine.step(&obs(0, 100.0, 99.0)).unwrap();
    engine
        .step(&obs(5, 100.0, 99.2).with_funding(Some(0.0001), None))
        .unwrap();
    engine
        .step(&obs(10, 100.0, 99.2).with_funding(None, Some(0.0001)))
        .unwrap();
    engine
        .step(&obs(15, 100.0, 99.2).with_funding(Some(f64::NAN), Some(0.0001)))
        .unwrap();

    assert_eq!(engine.entries().len(), 1);
}

#[test]
fn test_funding_on_held_bar_long_a_short_b() {
    let mut engine = ArbitrageEngine::new(strategy());
    engine.step(&obs(0, 100.0, 101.0)).unwrap();
    engine
        .step(&obs_fr(5, 100.0, 100.9, 0.0001, 0.0003))
        .unwrap();

    let funding = &engine.entries()[1];
    assert_eq!(funding.kind, EntryKind::Funding);
    assert_eq!(funding.direction, Direction::LongAShortB);
    assert!((funding.pnl_delta - 2.0).abs() < 1e-9);
    assert!(funding.duration_minutes.is_none());
    // Funding does not touch the position.
    let pos = engine.position().unwrap();
    assert_eq!(pos.entry_price_a, 100.0);
    assert_eq!(pos.entry_price_b, 101.0);
    assert_eq!(pos.entry_time, ts(0));
}

// ==================== Errors ====================

#[test]
fn test_malformed_price_aborts_with_index() {
    let observations = vec![obs(0, 100.0, 99.0), obs(5, f64::NAN, 99.0)];
    let err = ArbitrageEngine::run(strategy(), observations).unwrap_err();

    match err {
        EngineError::MalformedObservation {
            index, timestamp, ..
        } => {
            assert_eq!(index, 1);
            assert_eq!(timestamp, ts(5));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_zero_price_is_malformed() {
    let err = ArbitrageEngine::run(strategy(), vec![obs(0, 0.0, 99.0)]).unwrap_err();
    assert!(matches!(err, EngineError::MalformedObservation { index: 0, .. }));
}

#[test]
fn test_out_of_order_observation() {
    let observations = vec![obs(5, 100.0, 99.9), obs(5, 100.0, 99.9)];
    let err = ArbitrageEngine::run(strategy(), observations).unwrap_err();
    assert_eq!(
        err,
        EngineError::OutOfOrder {
            index: 1,
            timestamp: ts(5),
            previous: ts(5),
        }
    );
}

#[test]
fn test_rejected_observation_is_not_admitted() {
    let mut engine = ArbitrageEngine::new(strategy());
    engine.step(&obs(0, 100.0, 99.0)).unwrap();
    assert!(engine.step(&obs(5, -1.0, 99.0)).is_err());
    assert_eq!(engine.observed(), 1);
    assert_eq!(engine.last_observation().unwrap().timestamp, ts(0));
}

#[test]
fn test_open_while_positioned_is_invalid() {
    let mut engine = ArbitrageEngine::new(strategy());
    engine.step(&obs(0, 100.0, 99.0)).unwrap();

    let err = engine
        .open(Direction::LongAShortB, 100.0, 101.0, ts(1))
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::InvalidStateTransition {
            index: 0,
            source: LedgerError::AlreadyOpen {
                requested: Direction::LongAShortB,
                open: Direction::ShortALongB,
            },
        }
    );
    assert_eq!(engine.entries().len(), 1);
}

#[test]
fn test_close_while_flat_is_invalid() {
    let mut engine = ArbitrageEngine::new(strategy());
    let err = engine.close(100.0, 100.0, ts(0), false).unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidStateTransition {
            source: LedgerError::AlreadyFlat,
            ..
        }
    ));
    assert!(engine.entries().is_empty());
}

// ==================== Fill-driven API ====================

#[test]
fn test_decide_does_not_mutate() {
    let mut engine = ArbitrageEngine::new(strategy());
    let o = obs(0, 100.0, 99.0);
    engine.observe(&o).unwrap();

    assert_eq!(engine.decide(&o), Decision::Open(Direction::ShortALongB));
    assert_eq!(engine.decide(&o), Decision::Open(Direction::ShortALongB));
    assert!(engine.is_flat());
    assert!(engine.entries().is_empty());
}

#[test]
fn test_open_and_close_at_fill_prices() {
    let mut engine = ArbitrageEngine::new(strategy());
    let o = obs(0, 100.0, 99.0);
    engine.observe(&o).unwrap();
    engine
        .open(Direction::ShortALongB, 99.9, 99.1, o.timestamp)
        .unwrap();

    let pos = *engine.position().unwrap();
    assert_eq!(pos.entry_price_a, 99.9);
    assert_eq!(pos.entry_price_b, 99.1);
    assert_eq!(pos.notional, 10_000.0);

    let entry = engine.close(99.5, 99.5, ts(20), false).unwrap().clone();
    let expected = (99.9 - 99.5) * 10_000.0 / 99.9 + (99.5 - 99.1) * 10_000.0 / 99.1 - 10.0;
    assert!((entry.pnl_delta - expected).abs() < 1e-9);
    assert_eq!(entry.duration_minutes, Some(20.0));
}

#[test]
fn test_mark_to_market() {
    let mut engine = ArbitrageEngine::new(strategy());
    assert_eq!(engine.mark_to_market(&obs(0, 100.0, 99.0)), None);

    engine.step(&obs(0, 100.0, 99.0)).unwrap();
    let unrealized = engine.mark_to_market(&obs(5, 99.0, 99.0)).unwrap();
    assert!((unrealized - 100.0).abs() < 1e-9);
}

#[test]
fn test_finish_without_position_is_noop() {
    let mut engine = ArbitrageEngine::new(strategy());
    engine.step(&obs(0, 100.0, 100.0)).unwrap();
    assert!(engine.finish().unwrap().is_none());
    assert!(engine.into_result().entries.is_empty());
}

// ==================== Properties ====================

#[test]
fn test_fee_conservation_for_single_cycle() {
    let observations = vec![obs(0, 100.0, 101.0), obs(5, 100.5, 100.9), obs(10, 101.0, 100.9)];
    let result = ArbitrageEngine::run(strategy(), observations).unwrap();
    assert_eq!(kinds(&result), vec![EntryKind::Open, EntryKind::Close]);

    let convergence = (101.0 - 100.0) * 10_000.0 / 100.0 + (101.0 - 100.9) * 10_000.0 / 101.0;
    let fees = 4.0 * 10_000.0 * 0.0005;
    assert!((result.total_pnl() - (convergence - fees)).abs() < 1e-9);
}

#[test]
fn test_open_and_close_counts_match() {
    let result = ArbitrageEngine::run(strategy(), wave(600)).unwrap();

    let opens = result
        .entries
        .iter()
        .filter(|e| e.kind == EntryKind::Open)
        .count();
    assert!(opens > 1, "wave should trade more than once");
    assert_eq!(opens, result.trade_count());
}

#[test]
fn test_direction_constant_within_each_trade() {
    let result = ArbitrageEngine::run(strategy(), wave(600)).unwrap();

    let mut open: Option<(Direction, DateTime<Utc>)> = None;
    for entry in &result.entries {
        match entry.kind {
            EntryKind::Open => {
                assert!(open.is_none(), "open while positioned at {}", entry.time);
                open = Some((entry.direction, entry.time));
            }
            EntryKind::Funding => {
                let (direction, _) = open.expect("funding while flat");
                assert_eq!(entry.direction, direction);
            }
            EntryKind::Close => {
                let (direction, opened_at) = open.take().expect("close while flat");
                assert_eq!(entry.direction, direction);

                let minutes = entry.duration_minutes.unwrap();
                assert!(minutes >= 0.0);
                let elapsed = (entry.time - opened_at).num_minutes() as f64;
                assert_eq!(minutes, elapsed);
            }
        }
    }
    assert!(open.is_none(), "run ended with an open position");
}

#[test]
fn test_only_forced_close_is_last() {
    let result = ArbitrageEngine::run(strategy(), wave(600)).unwrap();
    let forced: Vec<_> = result
        .entries
        .iter()
        .enumerate()
        .filter(|(_, e)| e.forced)
        .map(|(i, _)| i)
        .collect();
    assert!(forced.len() <= 1);
    if let Some(&i) = forced.first() {
        assert_eq!(i, result.entries.len() - 1);
    }
}

#[test]
fn test_rerun_is_byte_identical() {
    let first = ArbitrageEngine::run(strategy(), wave(400)).unwrap();
    let second = ArbitrageEngine::run(strategy(), wave(400)).unwrap();

    let a = serde_json::to_string(&first).unwrap();
    let b = serde_json::to_string(&second).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_entries_are_time_ordered() {
    let result = ArbitrageEngine::run(strategy(), wave(600)).unwrap();
    assert!(result
        .entries
        .windows(2)
        .all(|w| w[0].time <= w[1].time));
}
