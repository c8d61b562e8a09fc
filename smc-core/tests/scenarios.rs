//! End-to-end scenarios through the public API.

use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;

use smc_core::config::{EntryMode, StrategyConfig};
use smc_core::domain::{Candle, Direction, Trend};
use smc_core::engine::{run_backtest, LoggedEvent, Pipeline};
use smc_core::gaps::{FvgDirection, GapEvent};
use smc_core::plan::{Adjustment, ExitReason, PlanState, TradePlanEvent};
use smc_core::signals::{DecisionDirection, SourceType};
use smc_core::structure::{StructureEvent, StructureTracker};

/// (high, low, close); open is the previous close clamped into the range.
fn series(rows: &[(f64, f64, f64)]) -> Vec<Candle> {
    let base = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
    let mut prev_close = rows.first().map(|r| r.2).unwrap_or(0.0);
    rows.iter()
        .enumerate()
        .map(|(i, &(high, low, close))| {
            let open = prev_close.clamp(low, high);
            prev_close = close;
            Candle::new(
                i as u64,
                base + Duration::minutes(5 * i as i64),
                open,
                high,
                low,
                close,
                10_000.0,
            )
        })
        .collect()
}

/// Swing highs at 100, 110 and 120 (wicks only), then closes at 125 and 135.
fn uptrend_rows() -> Vec<(f64, f64, f64)> {
    vec![
        (98.0, 95.0, 96.0),
        (100.0, 96.0, 97.0),
        (97.0, 94.0, 95.0),
        (110.0, 95.0, 99.0),
        (99.0, 96.0, 97.0),
        (120.0, 96.0, 105.0),
        (104.0, 97.0, 100.0),
        (126.0, 101.0, 125.0),
        (125.0, 118.0, 120.0),
        (136.0, 121.0, 135.0),
    ]
}

fn run_tracker(candles: &[Candle]) -> (StructureTracker, Vec<StructureEvent>) {
    let mut tracker = StructureTracker::new(1);
    let events = candles
        .iter()
        .flat_map(|c| tracker.on_candle(c).unwrap())
        .collect();
    (tracker, events)
}

#[test]
fn bos_confirmation_scenario() {
    let (tracker, events) = run_tracker(&series(&uptrend_rows()));

    let swing_highs: Vec<f64> = events
        .iter()
        .filter_map(|e| match e {
            StructureEvent::SwingConfirmed(s) if s.candle_index <= 5 => Some(s.price),
            _ => None,
        })
        .filter(|&p| p >= 100.0)
        .collect();
    assert_eq!(swing_highs, vec![100.0, 110.0, 120.0]);

    let bos: Vec<(u64, f64)> = events
        .iter()
        .filter_map(|e| match e {
            StructureEvent::Bos {
                candle_index, level, ..
            } => Some((*candle_index, *level)),
            _ => None,
        })
        .collect();
    assert_eq!(bos, vec![(7, 120.0), (9, 126.0)]);
    assert_eq!(tracker.state().bos_count, 2);
    assert_eq!(tracker.state().trend, Trend::Up);
    assert!(tracker.state().is_confirmed());
}

#[test]
fn choch_scenario() {
    let mut rows = uptrend_rows();
    rows.extend([
        (134.0, 100.0, 101.0),
        (99.0, 95.0, 97.0),
        (103.0, 98.0, 102.0),
        (104.0, 99.0, 100.0),
        // fails to exceed the swing high, closes below the 95 swing low
        (101.0, 89.0, 90.0),
    ]);
    let (tracker, events) = run_tracker(&series(&rows));

    assert_eq!(tracker.state().last_swing_low, Some(89.0));
    let chochs: Vec<&StructureEvent> = events
        .iter()
        .filter(|e| matches!(e, StructureEvent::Choch { .. }))
        .collect();
    assert_eq!(chochs.len(), 1);
    assert_eq!(
        chochs[0],
        &StructureEvent::Choch {
            direction: Direction::Short,
            level: 95.0,
            candle_index: 14,
        }
    );
    assert_eq!(tracker.state().trend, Trend::Down);
    assert_eq!(tracker.state().bos_count, 0);
}

#[test]
fn invalidated_gap_never_signals() {
    let candles = series(&[
        (100.0, 97.0, 99.0),
        (104.0, 99.5, 103.0),
        (106.0, 104.0, 105.0),
        (105.5, 99.0, 100.0),
    ]);
    let mut pipeline = Pipeline::new("FVG", Arc::new(StrategyConfig::default())).unwrap();
    let mut outputs = Vec::new();
    for candle in &candles {
        outputs.push(pipeline.push_candle(candle).unwrap());
    }

    match &outputs[2].gap_events[..] {
        [GapEvent::Created(gap)] => {
            assert_eq!(gap.direction, FvgDirection::Bullish);
            assert_eq!((gap.bottom, gap.top, gap.midpoint), (100.0, 104.0, 102.0));
            assert_eq!(gap.displacement_candle_index, 1);
        }
        other => panic!("expected one created gap, got {other:?}"),
    }
    assert!(matches!(
        &outputs[3].gap_events[..],
        [GapEvent::Invalidated(g)] if g.invalidated
    ));
    assert!(outputs
        .iter()
        .flat_map(|o| &o.signals)
        .all(|s| s.source != SourceType::Gap));
    assert!(pipeline.gaps().tradable(Direction::Long).next().is_none());
}

/// Downtrend, CHoCH up on a displacement candle that leaves a bullish FVG,
/// retrace into the gap midpoint, then a rally to the 2R target.
fn reversal_rows() -> Vec<(f64, f64, f64)> {
    vec![
        (110.0, 106.0, 107.0),
        (108.0, 104.0, 105.0),
        (109.0, 105.0, 106.0),
        (107.0, 103.0, 104.0),
        (104.0, 100.0, 101.0),
        (103.0, 100.5, 102.0),
        (104.0, 101.0, 103.0),
        (103.5, 101.5, 102.0),
        (107.0, 102.0, 106.5),
        (109.0, 106.0, 108.5),
        (109.5, 106.5, 107.5),
        (108.0, 104.5, 105.0),
        (108.0, 104.8, 107.5),
        (111.0, 107.0, 110.5),
    ]
}

fn reversal_config() -> StrategyConfig {
    let mut config = StrategyConfig::default();
    config.structure.swing_lookback = 1;
    config.plan.stop_buffer_bps = 0.0;
    config.plan.reward_multiple = 2.0;
    config
}

#[test]
fn structure_gap_trade_lifecycle() {
    let candles = series(&reversal_rows());
    let mut pipeline = Pipeline::new("REV", Arc::new(reversal_config())).unwrap();
    let outputs: Vec<_> = candles
        .iter()
        .map(|c| pipeline.push_candle(c).unwrap())
        .collect();

    // CHoCH candle itself: no confirmed gap yet.
    assert!(outputs[8]
        .structure_events
        .iter()
        .any(|e| matches!(e, StructureEvent::Choch { direction: Direction::Long, .. })));
    assert_eq!(outputs[8].decision.direction, DecisionDirection::Long);
    assert_eq!(
        outputs[8].skipped.as_ref().map(|s| s.code()),
        Some("no_correlated_gap")
    );

    // Gap confirmed: trend bias 0.4 + gap 0.5 crosses the 0.8 threshold.
    let step = &outputs[10];
    assert_eq!(step.decision.direction, DecisionDirection::Long);
    assert!((step.decision.long_score - 0.9).abs() < 1e-9);
    let opened = match &step.plan_events[..] {
        [TradePlanEvent::Opened { plan }] => plan.clone(),
        other => panic!("expected an opened plan, got {other:?}"),
    };
    assert_eq!(opened.state, PlanState::Pending);
    assert_eq!(opened.entry_price, 104.75);
    assert_eq!(opened.stop_loss, 102.0);
    assert_eq!(opened.take_profit, 110.25);

    assert!(matches!(
        outputs[11].plan_events[..],
        [TradePlanEvent::Adjusted {
            adjustment: Adjustment::Filled { .. },
            ..
        }]
    ));

    let closed = match &outputs[13].plan_events[..] {
        [TradePlanEvent::Closed { plan }] => plan.clone(),
        other => panic!("expected a closed plan, got {other:?}"),
    };
    assert_eq!(closed.exit_reason, Some(ExitReason::TakeProfit));
    assert_eq!(closed.r_multiple(), Some(2.0));
    // BOS on the exit candle cannot re-enter in the same step.
    assert_eq!(
        outputs[13].skipped.as_ref().map(|s| s.code()),
        Some("closed_this_step")
    );
    assert!(pipeline.active_plan().is_none());
}

#[test]
fn backtest_result_reports_trades_and_skips() {
    let candles = series(&reversal_rows());
    let result = run_backtest("REV", &candles, &reversal_config()).unwrap();

    assert_eq!(result.candles_processed, 14);
    assert_eq!(result.summary.trades, 1);
    assert_eq!(result.summary.wins, 1);
    assert_eq!(result.summary.total_r, 2.0);
    assert_eq!(result.skip_counts.get("no_correlated_gap"), Some(&1));
    assert_eq!(result.skip_counts.get("closed_this_step"), Some(&1));
    assert!(result.open_plan.is_none());
    assert!(result
        .events
        .iter()
        .any(|r| matches!(r.event, LoggedEvent::Skipped { ref code } if code == "closed_this_step")));
    assert_eq!(result.config_fingerprint, reversal_config().fingerprint());
}

#[test]
fn close_entry_mode_opens_immediately() {
    let mut config = reversal_config();
    config.plan.entry_mode = EntryMode::Close;
    let candles = series(&reversal_rows());
    let mut pipeline = Pipeline::new("REV", Arc::new(config)).unwrap();
    let mut opened = None;
    for candle in &candles {
        let out = pipeline.push_candle(candle).unwrap();
        if let Some(TradePlanEvent::Opened { plan }) = out.plan_events.first() {
            opened.get_or_insert(plan.clone());
        }
    }
    // CHoCH candle: market entry at the close, stop below the 100 swing low.
    let plan = opened.unwrap();
    assert_eq!(plan.opened_at_candle_index, 8);
    assert_eq!(plan.state, PlanState::Open);
    assert_eq!(plan.entry_price, 106.5);
    assert_eq!(plan.stop_loss, 100.0);
}
