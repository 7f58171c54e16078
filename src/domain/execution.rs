//! Fill simulation.
//!
//! Converts a pending order into a fill or a rejection, applying slippage and
//! commission. Nothing here mutates cash or holdings; the ledger does that once
//! the order has transitioned.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::BacktestError;
use super::ohlcv::OhlcvBar;
use super::order::{Fill, Order, RejectReason, Side};

/// When a signal produced on bar `t` is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FillPolicy {
    /// At the open of bar `t + 1`. No lookahead.
    #[default]
    NextOpen,
    /// At the close of bar `t`, the bar that produced the signal.
    Close,
}

impl FillPolicy {
    pub fn reference_price(&self, bar: &OhlcvBar) -> f64 {
        match self {
            FillPolicy::NextOpen => bar.open,
            FillPolicy::Close => bar.close,
        }
    }
}

impl FromStr for FillPolicy {
    type Err = BacktestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "next-open" | "open" => Ok(FillPolicy::NextOpen),
            "close" | "same-close" => Ok(FillPolicy::Close),
            other => Err(BacktestError::config(
                "fill_policy",
                format!("unsupported fill policy '{other}' (expected next-open or close)"),
            )),
        }
    }
}

impl fmt::Display for FillPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FillPolicy::NextOpen => "next-open",
            FillPolicy::Close => "close",
        })
    }
}

/// Cost model for simulated fills. Rates are fractions (0.001 = 0.1%).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    pub commission_rate: f64,
    pub slippage_pct: f64,
    pub fill_policy: FillPolicy,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            commission_rate: 0.001,
            slippage_pct: 0.0005,
            fill_policy: FillPolicy::NextOpen,
        }
    }
}

/// commission = trade_value * commission_rate
pub fn calculate_commission(trade_value: f64, config: &ExecutionConfig) -> f64 {
    trade_value * config.commission_rate
}

/// Buys pay up, sells receive less.
pub fn apply_slippage(market_price: f64, side: Side, slippage_pct: f64) -> f64 {
    match side {
        Side::Buy => market_price * (1.0 + slippage_pct),
        Side::Sell => market_price * (1.0 - slippage_pct),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FillOutcome {
    Filled(Fill),
    Rejected(RejectReason),
}

/// Prices `order` against `bar` and checks it against available cash and
/// holdings.
///
/// A buy is rejected when `fill_price * size + commission > cash`; a sell when
/// `size` exceeds `held`.
pub fn simulate_fill(
    order: &Order,
    bar: &OhlcvBar,
    bar_index: usize,
    cash: f64,
    held: i64,
    config: &ExecutionConfig,
) -> FillOutcome {
    let reference = config.fill_policy.reference_price(bar);
    let price = apply_slippage(reference, order.side, config.slippage_pct);
    let value = price * order.size as f64;
    let commission = calculate_commission(value, config);

    match order.side {
        Side::Buy if value + commission > cash => {
            return FillOutcome::Rejected(RejectReason::InsufficientCash);
        }
        Side::Sell if order.size > held => {
            return FillOutcome::Rejected(RejectReason::InsufficientHoldings);
        }
        _ => {}
    }

    FillOutcome::Filled(Fill {
        date: bar.date,
        bar_index,
        price,
        size: order.size,
        commission,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    fn bar(open: f64, close: f64) -> OhlcvBar {
        OhlcvBar {
            date: date(),
            open,
            high: open.max(close) + 1.0,
            low: open.min(close) - 1.0,
            close,
            volume: 10_000,
        }
    }

    fn frictionless(policy: FillPolicy) -> ExecutionConfig {
        ExecutionConfig {
            commission_rate: 0.0,
            slippage_pct: 0.0,
            fill_policy: policy,
        }
    }

    #[test]
    fn calculate_commission_basic() {
        let config = ExecutionConfig::default();
        let commission = calculate_commission(10_000.0, &config);
        assert!((commission - 10.0).abs() < 1e-9);
    }

    #[test]
    fn slippage_by_side() {
        assert!((apply_slippage(100.0, Side::Buy, 0.0005) - 100.05).abs() < 1e-9);
        assert!((apply_slippage(100.0, Side::Sell, 0.0005) - 99.95).abs() < 1e-9);
    }

    #[test]
    fn parse_fill_policy() {
        assert_eq!("next-open".parse::<FillPolicy>().unwrap(), FillPolicy::NextOpen);
        assert_eq!("next_open".parse::<FillPolicy>().unwrap(), FillPolicy::NextOpen);
        assert_eq!("CLOSE".parse::<FillPolicy>().unwrap(), FillPolicy::Close);
        assert!("vwap".parse::<FillPolicy>().unwrap_err().is_configuration());
        assert_eq!(FillPolicy::default().to_string(), "next-open");
    }

    #[test]
    fn fill_uses_policy_reference_price() {
        let order = Order::new(1, Side::Buy, 10, date(), 0);
        let b = bar(50.0, 55.0);

        match simulate_fill(&order, &b, 1, 1_000.0, 0, &frictionless(FillPolicy::NextOpen)) {
            FillOutcome::Filled(fill) => assert_eq!(fill.price, 50.0),
            other => panic!("expected fill, got {other:?}"),
        }
        match simulate_fill(&order, &b, 1, 1_000.0, 0, &frictionless(FillPolicy::Close)) {
            FillOutcome::Filled(fill) => assert_eq!(fill.price, 55.0),
            other => panic!("expected fill, got {other:?}"),
        }
    }

    #[test]
    fn buy_cost_scenario() {
        let config = ExecutionConfig {
            commission_rate: 0.001,
            slippage_pct: 0.0,
            fill_policy: FillPolicy::NextOpen,
        };
        let order = Order::new(1, Side::Buy, 950, date(), 0);
        match simulate_fill(&order, &bar(100.0, 100.0), 1, 100_000.0, 0, &config) {
            FillOutcome::Filled(fill) => {
                assert!((fill.notional() + fill.commission - 95_095.0).abs() < 1e-9);
            }
            other => panic!("expected fill, got {other:?}"),
        }
    }

    #[test]
    fn buy_rejected_when_cost_exceeds_cash() {
        let config = ExecutionConfig {
            commission_rate: 0.001,
            slippage_pct: 0.0,
            fill_policy: FillPolicy::NextOpen,
        };
        let order = Order::new(1, Side::Buy, 950, date(), 0);
        // 95_000 notional fits, commission pushes it over.
        let outcome = simulate_fill(&order, &bar(100.0, 100.0), 1, 95_050.0, 0, &config);
        assert_eq!(outcome, FillOutcome::Rejected(RejectReason::InsufficientCash));
    }

    #[test]
    fn sell_rejected_beyond_holdings() {
        let order = Order::new(1, Side::Sell, 11, date(), 0);
        let outcome = simulate_fill(
            &order,
            &bar(10.0, 10.0),
            1,
            0.0,
            10,
            &frictionless(FillPolicy::NextOpen),
        );
        assert_eq!(
            outcome,
            FillOutcome::Rejected(RejectReason::InsufficientHoldings)
        );
    }

    #[test]
    fn sell_fill_applies_slippage_and_commission() {
        let config = ExecutionConfig::default();
        let order = Order::new(1, Side::Sell, 100, date(), 0);
        match simulate_fill(&order, &bar(200.0, 210.0), 7, 0.0, 100, &config) {
            FillOutcome::Filled(fill) => {
                let price = 200.0 * (1.0 - 0.0005);
                assert!((fill.price - price).abs() < 1e-9);
                assert!((fill.commission - price * 100.0 * 0.001).abs() < 1e-9);
                assert_eq!(fill.bar_index, 7);
            }
            other => panic!("expected fill, got {other:?}"),
        }
    }
}
