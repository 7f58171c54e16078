//! Property tests for data handling and simulation invariants.
//!
//! 1. Well-formed bars never raise OHLC violations
//! 2. Repair policies keep or shrink the series as documented
//! 3. Breakout entries fill at or above the upper band
//! 4. Unaffordable buys are rejected, never filled
//! 5. Equity on the first bar is the initial cash
//! 6. Exported datasets read back unchanged
//! 7. Sweeps produce one distinct record per combination

mod common;

use barsim::adapters::csv_adapter::{write_dataset, CsvFileAdapter};
use barsim::domain::backtest::{run_backtest, BacktestConfig};
use barsim::domain::execution::{simulate_fill, ExecutionConfig, FillOutcome, FillPolicy};
use barsim::domain::indicator::{IndicatorEngine, IndicatorType, IndicatorValue};
use barsim::domain::order::{Order, RejectReason, Side};
use barsim::domain::pipeline::RunConfig;
use barsim::domain::repair::{repair, MissingDataPolicy};
use barsim::domain::strategy::StrategyParameters;
use barsim::domain::sweep::{run_sweep, ParamGrid, SweepConfig};
use barsim::domain::validation::{validate, ValidationConfig};
use barsim::ports::data_port::DataPort;
use common::*;
use proptest::prelude::*;
use std::collections::HashSet;

type TradingStrategy = barsim::domain::strategy::Strategy;

// ── Strategies (proptest) ────────────────────────────────────────────

/// (low, spread, open fraction, close fraction) for a bar inside its range.
fn arb_bar_shape() -> impl Strategy<Value = (f64, f64, f64, f64)> {
    (1.0..500.0_f64, 0.0..50.0_f64, 0.0..=1.0_f64, 0.0..=1.0_f64)
}

fn arb_cell() -> impl Strategy<Value = Option<f64>> {
    prop_oneof![3 => (1.0..200.0_f64).prop_map(Some), 1 => Just(None)]
}

fn arb_raw_row() -> impl Strategy<Value = [Option<f64>; 5]> {
    prop::array::uniform5(arb_cell())
}

fn raw_series(cells: &[[Option<f64>; 5]]) -> RawSeries {
    let rows = cells
        .iter()
        .enumerate()
        .map(|(i, c)| RawBar {
            date: date(2024, 1, 1) + chrono::Duration::days(i as i64),
            open: c[0],
            high: c[1],
            low: c[2],
            close: c[3],
            volume: c[4].map(|v| v.round() as i64),
        })
        .collect();
    RawSeries::new("PROP", rows)
}

fn increasing_closes() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(
        prop_oneof![4 => 0.01..0.5_f64, 1 => 2.0..15.0_f64],
        30..120,
    )
    .prop_map(|steps| {
        let mut price = 50.0;
        steps
            .into_iter()
            .map(|s| {
                price += s;
                price
            })
            .collect()
    })
}

// ── 1. Validation ────────────────────────────────────────────────────

proptest! {
    #[test]
    fn valid_bars_have_no_ohlc_violations(
        shapes in prop::collection::vec(arb_bar_shape(), 1..60)
    ) {
        let rows = shapes
            .iter()
            .enumerate()
            .map(|(i, &(low, spread, a, b))| RawBar {
                date: date(2024, 1, 1) + chrono::Duration::days(i as i64),
                open: Some(low + a * spread),
                high: Some(low + spread),
                low: Some(low),
                close: Some(low + b * spread),
                volume: Some(100),
            })
            .collect();
        let report = validate(&RawSeries::new("PROP", rows), &ValidationConfig::default());
        prop_assert_eq!(report.ohlc_violations, 0);
    }
}

// ── 2. Repair ────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn forward_fill_preserves_length(cells in prop::collection::vec(arb_raw_row(), 0..40)) {
        let series = raw_series(&cells);
        let before = series.len();
        let repaired = repair(series, MissingDataPolicy::ForwardFill).unwrap();
        prop_assert_eq!(repaired.len(), before);
    }

    #[test]
    fn drop_never_grows(cells in prop::collection::vec(arb_raw_row(), 0..40)) {
        let series = raw_series(&cells);
        let before = series.len();
        let repaired = repair(series, MissingDataPolicy::Drop).unwrap();
        prop_assert!(repaired.len() <= before);
        prop_assert!(repaired.rows.iter().all(RawBar::is_complete));
    }

    #[test]
    fn interpolate_fills_interior_gaps(
        first in prop::array::uniform5(1.0..200.0_f64),
        middle in prop::collection::vec(arb_raw_row(), 0..30),
        last in prop::array::uniform5(1.0..200.0_f64),
    ) {
        let mut cells = vec![first.map(Some)];
        cells.extend(middle);
        cells.push(last.map(Some));
        let repaired = repair(raw_series(&cells), MissingDataPolicy::Interpolate).unwrap();
        prop_assert_eq!(repaired.len(), cells.len());
        prop_assert!(repaired.rows.iter().all(RawBar::is_complete));
    }
}

// ── 3. Breakout entries ──────────────────────────────────────────────

proptest! {
    #[test]
    fn breakout_never_enters_below_upper_band(closes in increasing_closes()) {
        let series = series_from_closes("UP", &closes);
        let strategy = TradingStrategy::build(
            "bollinger_breakout",
            &StrategyParameters::new().with("bb_period", 10.0).with("stop_loss_pct", 0.0),
        )
        .unwrap();
        let config = BacktestConfig {
            initial_cash: 100_000.0,
            execution: ExecutionConfig {
                commission_rate: 0.001,
                slippage_pct: 0.0,
                fill_policy: FillPolicy::Close,
            },
        };
        let result = run_backtest(&series, &strategy, &config).unwrap();

        let band = IndicatorType::bollinger(10, 2.0);
        let mut engine = IndicatorEngine::new(&[band]);
        let uppers: Vec<Option<f64>> = series
            .bars()
            .iter()
            .map(|bar| {
                engine.update(bar);
                match engine.get(&band) {
                    Some(IndicatorValue::Bollinger { upper, .. }) => Some(upper),
                    _ => None,
                }
            })
            .collect();

        for order in result.orders.iter().filter(|o| o.side == Side::Buy) {
            if let Some(fill) = order.filled() {
                let upper = uppers[order.created_bar];
                prop_assert!(upper.is_some());
                prop_assert!(fill.price >= upper.unwrap_or(f64::INFINITY));
            }
        }
    }
}

// ── 4. Rejection ─────────────────────────────────────────────────────

proptest! {
    #[test]
    fn unaffordable_buy_is_rejected(
        price in 1.0..500.0_f64,
        size in 1_i64..1000,
        rate in 0.0..0.01_f64,
        shortfall in 0.0..0.999_f64,
    ) {
        let config = ExecutionConfig {
            commission_rate: rate,
            slippage_pct: 0.0,
            fill_policy: FillPolicy::Close,
        };
        let cost = price * size as f64 * (1.0 + rate);
        let cash = cost * shortfall;
        let bar = OhlcvBar {
            date: date(2024, 3, 1),
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 1,
        };
        let order = Order::new(1, Side::Buy, size, bar.date, 0);
        let outcome = simulate_fill(&order, &bar, 0, cash, 0, &config);
        prop_assert_eq!(outcome, FillOutcome::Rejected(RejectReason::InsufficientCash));
    }
}

// ── 5. Equity at bar 0 ───────────────────────────────────────────────

proptest! {
    #[test]
    fn first_snapshot_equals_initial_cash(
        closes in prop::collection::vec(5.0..200.0_f64, 25..80),
        cash in 1_000.0..1_000_000.0_f64,
    ) {
        let series = series_from_closes("EQ", &closes);
        let strategy = TradingStrategy::build("bollinger_breakout", &StrategyParameters::new()).unwrap();
        let config = BacktestConfig { initial_cash: cash, ..Default::default() };
        let result = run_backtest(&series, &strategy, &config).unwrap();
        prop_assert_eq!(result.snapshots[0].equity, cash);
        prop_assert_eq!(result.snapshots.len(), closes.len());
    }
}

// ── 6. Dataset round trip ────────────────────────────────────────────

proptest! {
    #[test]
    fn exported_dataset_reads_back(cells in prop::collection::vec(arb_raw_row(), 1..40)) {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("roundtrip.csv");
        let series = raw_series(&cells);
        write_dataset(&path, std::slice::from_ref(&series)).unwrap();

        let back = CsvFileAdapter::new(&path).fetch_bars(Some("PROP"), None, None).unwrap();
        prop_assert_eq!(back.len(), series.len());
        for (a, b) in series.rows.iter().zip(&back.rows) {
            prop_assert_eq!(a.date, b.date);
            prop_assert_eq!(a.volume, b.volume);
            for (x, y) in [(a.open, b.open), (a.high, b.high), (a.low, b.low), (a.close, b.close)] {
                match (x, y) {
                    (Some(x), Some(y)) => prop_assert!((x - y).abs() < 1e-9),
                    (None, None) => {}
                    other => prop_assert!(false, "cell mismatch {:?}", other),
                }
            }
        }
    }
}

// ── 7. Sweep cardinality ─────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn sweep_yields_one_record_per_combination(n in 1_usize..4, m in 1_usize..4, k in 1_usize..4) {
        let periods: Vec<f64> = (0..n).map(|i| 5.0 + 5.0 * i as f64).collect();
        let devs: Vec<f64> = (0..m).map(|i| 1.0 + 0.5 * i as f64).collect();
        let stops: Vec<f64> = (0..k).map(|i| 0.01 * (i + 1) as f64).collect();
        let grid = ParamGrid::new(StrategyParameters::new())
            .with_axis("bb_period", periods)
            .with_axis("bb_dev", devs)
            .with_axis("stop_loss_pct", stops);

        let series = BarSeries::new("SWEEP", generate_bars(80, 100.0)).unwrap();
        let report = run_sweep(
            &series,
            &grid,
            &RunConfig::default(),
            &SweepConfig { top_k: 3, threads: 2 },
            None,
        )
        .unwrap();

        prop_assert_eq!(report.records.len(), n * m * k);
        let distinct: HashSet<String> =
            report.records.iter().map(|r| r.parameters.to_string()).collect();
        prop_assert_eq!(distinct.len(), n * m * k);
    }
}
