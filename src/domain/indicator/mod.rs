//! Technical indicators, updated incrementally as bars arrive.
//!
//! - `IndicatorType`: indicator identity + parameters (serves as map key)
//! - `IndicatorValue`: the different indicator output shapes
//! - `IndicatorEngine`: one rolling state per configured indicator

pub mod bollinger;
pub mod crossover;
pub mod rsi;
pub mod sma;
pub mod stddev;

use std::fmt;

use crate::domain::ohlcv::OhlcvBar;
use bollinger::Bollinger;
use crossover::Crossover;
use rsi::Rsi;
use sma::Sma;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IndicatorValue {
    Simple(f64),
    Bollinger { upper: f64, middle: f64, lower: f64 },
    Cross(i8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorType {
    Sma(usize),
    Rsi(usize),
    /// The multiplier is keyed by its bit pattern so any finite value hashes exactly.
    Bollinger { period: usize, stddev_mult_bits: u64 },
    Crossover { fast: usize, slow: usize },
}

impl IndicatorType {
    pub fn bollinger(period: usize, mult: f64) -> Self {
        IndicatorType::Bollinger {
            period,
            stddev_mult_bits: mult.to_bits(),
        }
    }

    /// Bars that must be observed before the indicator reports a value.
    pub fn warmup(&self) -> usize {
        match *self {
            IndicatorType::Sma(p) => p,
            IndicatorType::Rsi(p) => p + 1,
            IndicatorType::Bollinger { period, .. } => period,
            IndicatorType::Crossover { fast, slow } => fast.max(slow),
        }
    }
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Sma(period) => write!(f, "SMA({})", period),
            IndicatorType::Rsi(period) => write!(f, "RSI({})", period),
            IndicatorType::Bollinger {
                period,
                stddev_mult_bits,
            } => write!(f, "BOLLINGER({},{})", period, f64::from_bits(*stddev_mult_bits)),
            IndicatorType::Crossover { fast, slow } => write!(f, "CROSS({},{})", fast, slow),
        }
    }
}

#[derive(Debug, Clone)]
enum Indicator {
    Sma(Sma),
    Rsi(Rsi),
    Bollinger(Bollinger),
    Crossover(Crossover),
}

impl Indicator {
    fn new(kind: IndicatorType) -> Self {
        match kind {
            IndicatorType::Sma(p) => Indicator::Sma(Sma::new(p)),
            IndicatorType::Rsi(p) => Indicator::Rsi(Rsi::new(p)),
            IndicatorType::Bollinger {
                period,
                stddev_mult_bits,
            } => Indicator::Bollinger(Bollinger::new(period, f64::from_bits(stddev_mult_bits))),
            IndicatorType::Crossover { fast, slow } => {
                Indicator::Crossover(Crossover::new(fast, slow))
            }
        }
    }

    fn update(&mut self, close: f64) {
        match self {
            Indicator::Sma(i) => i.update(close),
            Indicator::Rsi(i) => i.update(close),
            Indicator::Bollinger(i) => i.update(close),
            Indicator::Crossover(i) => i.update(close),
        }
    }

    fn value(&self) -> Option<IndicatorValue> {
        match self {
            Indicator::Sma(i) => i.value().map(IndicatorValue::Simple),
            Indicator::Rsi(i) => i.value().map(IndicatorValue::Simple),
            Indicator::Bollinger(i) => i.value().map(|b| IndicatorValue::Bollinger {
                upper: b.upper,
                middle: b.middle,
                lower: b.lower,
            }),
            Indicator::Crossover(i) => i.value().map(IndicatorValue::Cross),
        }
    }

    fn is_ready(&self) -> bool {
        match self {
            Indicator::Sma(i) => i.is_ready(),
            Indicator::Rsi(i) => i.is_ready(),
            Indicator::Bollinger(i) => i.is_ready(),
            Indicator::Crossover(i) => i.is_ready(),
        }
    }
}

/// Holds the rolling state of every indicator a strategy needs. Bars must be
/// fed in date order; the engine never looks ahead.
#[derive(Debug, Clone)]
pub struct IndicatorEngine {
    indicators: Vec<(IndicatorType, Indicator)>,
    bars_seen: usize,
}

impl IndicatorEngine {
    pub fn new(types: &[IndicatorType]) -> Self {
        let mut indicators: Vec<(IndicatorType, Indicator)> = Vec::with_capacity(types.len());
        for &kind in types {
            if !indicators.iter().any(|(k, _)| *k == kind) {
                indicators.push((kind, Indicator::new(kind)));
            }
        }
        IndicatorEngine {
            indicators,
            bars_seen: 0,
        }
    }

    pub fn update(&mut self, bar: &OhlcvBar) {
        for (_, indicator) in &mut self.indicators {
            indicator.update(bar.close);
        }
        self.bars_seen += 1;
    }

    /// Latest value, or `None` when the indicator is not configured or not ready.
    pub fn get(&self, kind: &IndicatorType) -> Option<IndicatorValue> {
        self.indicators
            .iter()
            .find(|(k, _)| k == kind)
            .and_then(|(_, i)| i.value())
    }

    pub fn is_ready(&self, kind: &IndicatorType) -> bool {
        self.indicators
            .iter()
            .any(|(k, i)| k == kind && i.is_ready())
    }

    pub fn all_ready(&self) -> bool {
        self.indicators.iter().all(|(_, i)| i.is_ready())
    }

    pub fn bars_seen(&self) -> usize {
        self.bars_seen
    }

    /// Bars needed before every configured indicator is ready.
    pub fn required_bars(&self) -> usize {
        self.indicators
            .iter()
            .map(|(k, _)| k.warmup())
            .max()
            .unwrap_or(0)
    }

    pub fn types(&self) -> impl Iterator<Item = &IndicatorType> {
        self.indicators.iter().map(|(k, _)| k)
    }
}
