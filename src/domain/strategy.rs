//! Signal evaluation.
//!
//! A strategy is one variant of a closed enum. Each variant declares its
//! parameters with [`ParamSpec`] and turns the current bar plus indicator state
//! into at most one [`TradeIntent`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::error::BacktestError;
use super::indicator::{IndicatorEngine, IndicatorType, IndicatorValue};
use super::ohlcv::OhlcvBar;
use super::order::Side;
use super::position::Position;

/// Declared range for one numeric strategy knob.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub default: f64,
    pub min: f64,
    pub max: f64,
    /// False makes the lower bound exclusive.
    pub min_inclusive: bool,
    pub integer: bool,
}

impl ParamSpec {
    const fn period(name: &'static str, default: f64) -> Self {
        ParamSpec {
            name,
            default,
            min: 2.0,
            max: 500.0,
            min_inclusive: true,
            integer: true,
        }
    }

    const fn fraction(name: &'static str, default: f64, min_inclusive: bool) -> Self {
        ParamSpec {
            name,
            default,
            min: 0.0,
            max: 1.0,
            min_inclusive,
            integer: false,
        }
    }

    pub fn check(&self, value: f64) -> Result<(), BacktestError> {
        let above_min = if self.min_inclusive {
            value >= self.min
        } else {
            value > self.min
        };
        if !value.is_finite() || !above_min || value > self.max {
            let open = if self.min_inclusive { '[' } else { '(' };
            return Err(BacktestError::config(
                self.name,
                format!("{value} outside {open}{}, {}]", self.min, self.max),
            ));
        }
        if self.integer && value.fract() != 0.0 {
            return Err(BacktestError::config(
                self.name,
                format!("{value} must be a whole number"),
            ));
        }
        Ok(())
    }
}

const BOLLINGER_PARAMS: [ParamSpec; 4] = [
    ParamSpec::period("bb_period", 20.0),
    ParamSpec {
        name: "bb_dev",
        default: 2.0,
        min: 0.0,
        max: 10.0,
        min_inclusive: false,
        integer: false,
    },
    ParamSpec::fraction("stop_loss_pct", 0.03, true),
    ParamSpec::fraction("position_size_pct", 0.95, false),
];

const MA_CROSS_PARAMS: [ParamSpec; 4] = [
    ParamSpec::period("fast_period", 20.0),
    ParamSpec::period("slow_period", 50.0),
    ParamSpec::fraction("stop_loss_pct", 0.02, true),
    ParamSpec::fraction("position_size_pct", 0.95, false),
];

/// Named numeric knobs, ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StrategyParameters(BTreeMap<String, f64>);

impl StrategyParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: f64) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for StrategyParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, value) in self.iter() {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            write!(f, "{name}={value}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    BollingerBreakout,
    MaCross,
}

impl StrategyKind {
    pub fn name(&self) -> &'static str {
        match self {
            StrategyKind::BollingerBreakout => "bollinger_breakout",
            StrategyKind::MaCross => "ma_cross",
        }
    }

    pub fn param_specs(&self) -> &'static [ParamSpec] {
        match self {
            StrategyKind::BollingerBreakout => &BOLLINGER_PARAMS,
            StrategyKind::MaCross => &MA_CROSS_PARAMS,
        }
    }

    pub fn param_spec(&self, name: &str) -> Option<&'static ParamSpec> {
        self.param_specs().iter().find(|s| s.name == name)
    }
}

impl FromStr for StrategyKind {
    type Err = BacktestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "bollinger_breakout" | "bb_breakout" | "bollinger" => {
                Ok(StrategyKind::BollingerBreakout)
            }
            "ma_cross" | "moving_average_cross" | "sma_cross" => Ok(StrategyKind::MaCross),
            _ => Err(BacktestError::UnknownStrategy(s.trim().to_string())),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerParams {
    pub period: usize,
    pub dev: f64,
    pub stop_loss_pct: f64,
    pub position_size_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaCrossParams {
    pub fast_period: usize,
    pub slow_period: usize,
    pub stop_loss_pct: f64,
    pub position_size_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Strategy {
    BollingerBreakout(BollingerParams),
    MovingAverageCross(MaCrossParams),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalReason {
    Entry,
    Exit,
    StopLoss,
}

impl fmt::Display for SignalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SignalReason::Entry => "entry",
            SignalReason::Exit => "exit",
            SignalReason::StopLoss => "stop-loss",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeIntent {
    pub side: Side,
    pub size: i64,
    pub reason: SignalReason,
}

/// Everything a strategy may look at on one bar.
#[derive(Debug, Clone, Copy)]
pub struct SignalContext<'a> {
    pub bar: &'a OhlcvBar,
    pub bar_index: usize,
    pub indicators: &'a IndicatorEngine,
    pub position: Option<&'a Position>,
    pub cash: f64,
    pub has_pending_order: bool,
}

impl Strategy {
    /// Builds a strategy by name. Missing parameters take their defaults;
    /// unknown names and out-of-range values are configuration errors.
    pub fn build(name: &str, params: &StrategyParameters) -> Result<Self, BacktestError> {
        Self::from_params(name.parse()?, params)
    }

    pub fn from_params(
        kind: StrategyKind,
        params: &StrategyParameters,
    ) -> Result<Self, BacktestError> {
        let resolved = resolve(kind, params)?;
        let value = |name: &str| resolved.get(name).unwrap_or_default();

        match kind {
            StrategyKind::BollingerBreakout => Ok(Strategy::BollingerBreakout(BollingerParams {
                period: value("bb_period") as usize,
                dev: value("bb_dev"),
                stop_loss_pct: value("stop_loss_pct"),
                position_size_pct: value("position_size_pct"),
            })),
            StrategyKind::MaCross => {
                let fast_period = value("fast_period") as usize;
                let slow_period = value("slow_period") as usize;
                if fast_period >= slow_period {
                    return Err(BacktestError::config(
                        "fast_period",
                        format!("{fast_period} must be below slow_period {slow_period}"),
                    ));
                }
                Ok(Strategy::MovingAverageCross(MaCrossParams {
                    fast_period,
                    slow_period,
                    stop_loss_pct: value("stop_loss_pct"),
                    position_size_pct: value("position_size_pct"),
                }))
            }
        }
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            Strategy::BollingerBreakout(_) => StrategyKind::BollingerBreakout,
            Strategy::MovingAverageCross(_) => StrategyKind::MaCross,
        }
    }

    /// The full parameter set this strategy runs with, defaults included.
    pub fn parameters(&self) -> StrategyParameters {
        match self {
            Strategy::BollingerBreakout(p) => StrategyParameters::new()
                .with("bb_period", p.period as f64)
                .with("bb_dev", p.dev)
                .with("stop_loss_pct", p.stop_loss_pct)
                .with("position_size_pct", p.position_size_pct),
            Strategy::MovingAverageCross(p) => StrategyParameters::new()
                .with("fast_period", p.fast_period as f64)
                .with("slow_period", p.slow_period as f64)
                .with("stop_loss_pct", p.stop_loss_pct)
                .with("position_size_pct", p.position_size_pct),
        }
    }

    pub fn required_indicators(&self) -> Vec<IndicatorType> {
        match self {
            Strategy::BollingerBreakout(p) => vec![IndicatorType::bollinger(p.period, p.dev)],
            Strategy::MovingAverageCross(p) => vec![IndicatorType::Crossover {
                fast: p.fast_period,
                slow: p.slow_period,
            }],
        }
    }

    /// Bars consumed before the first signal can fire.
    pub fn warmup_bars(&self) -> usize {
        self.required_indicators()
            .iter()
            .map(IndicatorType::warmup)
            .max()
            .unwrap_or(0)
    }

    pub fn on_bar(&self, ctx: &SignalContext<'_>) -> Option<TradeIntent> {
        if ctx.has_pending_order {
            return None;
        }
        let close = ctx.bar.close;
        let held = ctx.position.filter(|p| p.is_long());

        match self {
            Strategy::BollingerBreakout(p) => {
                let kind = IndicatorType::bollinger(p.period, p.dev);
                let Some(IndicatorValue::Bollinger { upper, middle, .. }) = ctx.indicators.get(&kind)
                else {
                    return None;
                };
                match held {
                    None if close > upper => entry(ctx, p.position_size_pct),
                    None => None,
                    Some(pos) if close < middle => exit(pos, SignalReason::Exit),
                    Some(pos) => stop_loss(pos, close, p.stop_loss_pct),
                }
            }
            Strategy::MovingAverageCross(p) => {
                let kind = IndicatorType::Crossover {
                    fast: p.fast_period,
                    slow: p.slow_period,
                };
                let Some(IndicatorValue::Cross(signal)) = ctx.indicators.get(&kind) else {
                    return None;
                };
                match held {
                    None if signal > 0 => entry(ctx, p.position_size_pct),
                    None => None,
                    Some(pos) if signal < 0 => exit(pos, SignalReason::Exit),
                    Some(pos) => stop_loss(pos, close, p.stop_loss_pct),
                }
            }
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind(), self.parameters())
    }
}

fn resolve(kind: StrategyKind, params: &StrategyParameters) -> Result<StrategyParameters, BacktestError> {
    for (name, _) in params.iter() {
        if kind.param_spec(name).is_none() {
            return Err(BacktestError::config(
                name,
                format!("not a parameter of {kind}"),
            ));
        }
    }
    let mut resolved = StrategyParameters::new();
    for spec in kind.param_specs() {
        let value = params.get(spec.name).unwrap_or(spec.default);
        spec.check(value)?;
        resolved.set(spec.name, value);
    }
    Ok(resolved)
}

/// size = floor(position_size_pct * cash / close); nothing when that is zero.
fn entry(ctx: &SignalContext<'_>, position_size_pct: f64) -> Option<TradeIntent> {
    let close = ctx.bar.close;
    if close <= 0.0 {
        return None;
    }
    let size = (position_size_pct * ctx.cash / close).floor() as i64;
    (size > 0).then_some(TradeIntent {
        side: Side::Buy,
        size,
        reason: SignalReason::Entry,
    })
}

fn exit(pos: &Position, reason: SignalReason) -> Option<TradeIntent> {
    Some(TradeIntent {
        side: Side::Sell,
        size: pos.quantity,
        reason,
    })
}

/// A zero stop-loss disables the check.
fn stop_loss(pos: &Position, close: f64, stop_loss_pct: f64) -> Option<TradeIntent> {
    if stop_loss_pct > 0.0 && pos.return_at(close) <= -stop_loss_pct {
        exit(pos, SignalReason::StopLoss)
    } else {
        None
    }
}
