//! OHLCV bar representation.
//!
//! Rows arrive from a data port as [`RawSeries`], where every numeric cell may be
//! missing. Validation and repair work on the raw form; the simulation only ever
//! sees a [`BarSeries`], which is complete, sorted and duplicate-free.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::domain::error::BacktestError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OhlcvBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

/// Numeric columns of a bar file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Column {
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl Column {
    pub const ALL: [Column; 5] = [
        Column::Open,
        Column::High,
        Column::Low,
        Column::Close,
        Column::Volume,
    ];

    pub const PRICES: [Column; 4] = [Column::Open, Column::High, Column::Low, Column::Close];

    pub fn as_str(&self) -> &'static str {
        match self {
            Column::Open => "open",
            Column::High => "high",
            Column::Low => "low",
            Column::Close => "close",
            Column::Volume => "volume",
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bar as read from a source, before any quality checks.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBar {
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<i64>,
}

impl RawBar {
    pub fn complete(bar: &OhlcvBar) -> Self {
        RawBar {
            date: bar.date,
            open: Some(bar.open),
            high: Some(bar.high),
            low: Some(bar.low),
            close: Some(bar.close),
            volume: Some(bar.volume),
        }
    }

    /// Numeric view of a column; volume is widened to f64.
    pub fn get(&self, column: Column) -> Option<f64> {
        match column {
            Column::Open => self.open,
            Column::High => self.high,
            Column::Low => self.low,
            Column::Close => self.close,
            Column::Volume => self.volume.map(|v| v as f64),
        }
    }

    /// Volume is rounded to the nearest whole unit.
    pub fn set(&mut self, column: Column, value: f64) {
        match column {
            Column::Open => self.open = Some(value),
            Column::High => self.high = Some(value),
            Column::Low => self.low = Some(value),
            Column::Close => self.close = Some(value),
            Column::Volume => self.volume = Some(value.round() as i64),
        }
    }

    pub fn is_complete(&self) -> bool {
        Column::ALL.iter().all(|c| self.get(*c).is_some())
    }

    fn first_missing(&self) -> Option<Column> {
        Column::ALL.into_iter().find(|c| self.get(*c).is_none())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawSeries {
    pub symbol: String,
    pub rows: Vec<RawBar>,
}

impl RawSeries {
    pub fn new(symbol: impl Into<String>, rows: Vec<RawBar>) -> Self {
        RawSeries {
            symbol: symbol.into(),
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Keeps rows whose date lies in the inclusive range; open ends are unbounded.
    pub fn within(self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        let rows = self
            .rows
            .into_iter()
            .filter(|r| start.is_none_or(|s| r.date >= s) && end.is_none_or(|e| r.date <= e))
            .collect();
        RawSeries {
            symbol: self.symbol,
            rows,
        }
    }

    /// Converts to a validated series. Every cell must be present; rows are sorted
    /// by date and only the first row of a duplicated date is kept.
    pub fn into_bar_series(self) -> Result<BarSeries, BacktestError> {
        let mut bars = Vec::with_capacity(self.rows.len());
        for (row, raw) in self.rows.iter().enumerate() {
            if let Some(column) = raw.first_missing() {
                return Err(BacktestError::MissingField {
                    row,
                    column: column.as_str(),
                });
            }
            bars.push(OhlcvBar {
                date: raw.date,
                open: raw.open.unwrap_or_default(),
                high: raw.high.unwrap_or_default(),
                low: raw.low.unwrap_or_default(),
                close: raw.close.unwrap_or_default(),
                volume: raw.volume.unwrap_or_default(),
            });
        }

        bars.sort_by_key(|b| b.date);
        let before = bars.len();
        let mut seen = HashSet::with_capacity(before);
        bars.retain(|b| seen.insert(b.date));
        if bars.len() < before {
            tracing::warn!(
                symbol = %self.symbol,
                dropped = before - bars.len(),
                "duplicate dates removed, first occurrence kept"
            );
        }

        BarSeries::new(self.symbol, bars)
    }
}

/// Ordered bars for one instrument. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct BarSeries {
    symbol: String,
    bars: Vec<OhlcvBar>,
}

impl BarSeries {
    /// Dates must be strictly increasing and the series non-empty.
    pub fn new(symbol: impl Into<String>, bars: Vec<OhlcvBar>) -> Result<Self, BacktestError> {
        let symbol = symbol.into();
        if bars.is_empty() {
            return Err(BacktestError::EmptyData { symbol });
        }
        if let Some(w) = bars.windows(2).find(|w| w[1].date <= w[0].date) {
            return Err(BacktestError::data(format!(
                "{symbol}: dates not strictly increasing at {} -> {}",
                w[0].date, w[1].date
            )));
        }
        Ok(BarSeries { symbol, bars })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn bars(&self) -> &[OhlcvBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first_date(&self) -> NaiveDate {
        self.bars[0].date
    }

    pub fn last_date(&self) -> NaiveDate {
        self.bars[self.bars.len() - 1].date
    }

    pub fn to_raw(&self) -> RawSeries {
        RawSeries::new(
            self.symbol.clone(),
            self.bars.iter().map(RawBar::complete).collect(),
        )
    }
}
