#![allow(dead_code)]

use chrono::NaiveDate;
use barsim::domain::error::BacktestError;
pub use barsim::domain::ohlcv::{BarSeries, OhlcvBar, RawBar, RawSeries};
use barsim::ports::data_port::DataPort;
use std::collections::HashMap;
use std::io::Write;

/// In-memory data port keyed by symbol.
pub struct MockDataPort {
    pub data: HashMap<String, RawSeries>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<OhlcvBar>) -> Self {
        let rows = bars.iter().map(RawBar::complete).collect();
        self.data
            .insert(symbol.to_string(), RawSeries::new(symbol, rows));
        self
    }

    pub fn with_rows(mut self, symbol: &str, rows: Vec<RawBar>) -> Self {
        self.data
            .insert(symbol.to_string(), RawSeries::new(symbol, rows));
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_bars(
        &self,
        symbol: Option<&str>,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<RawSeries, BacktestError> {
        let symbol = match symbol {
            Some(s) => s.to_string(),
            None => self
                .data
                .keys()
                .next()
                .cloned()
                .ok_or_else(|| BacktestError::data("no data"))?,
        };
        if let Some(reason) = self.errors.get(&symbol) {
            return Err(BacktestError::data(reason.clone()));
        }
        let series = self
            .data
            .get(&symbol)
            .cloned()
            .unwrap_or_else(|| RawSeries::new(symbol.as_str(), Vec::new()));
        Ok(series.within(start_date, end_date))
    }

    fn list_symbols(&self) -> Result<Vec<String>, BacktestError> {
        let mut symbols: Vec<String> = self
            .data
            .keys()
            .chain(self.errors.keys())
            .cloned()
            .collect();
        symbols.sort();
        Ok(symbols)
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Bars on consecutive days starting 2024-01-01 with open = close.
pub fn bars_from_closes(closes: &[f64]) -> Vec<OhlcvBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| OhlcvBar {
            date: date(2024, 1, 1) + chrono::Duration::days(i as i64),
            open: close,
            high: close + 1.0,
            low: (close - 1.0).max(0.01),
            close,
            volume: 1000,
        })
        .collect()
}

pub fn series_from_closes(symbol: &str, closes: &[f64]) -> BarSeries {
    BarSeries::new(symbol, bars_from_closes(closes)).unwrap()
}

/// A gently trending sine wave, long enough for default indicator periods.
pub fn generate_bars(count: usize, start_price: f64) -> Vec<OhlcvBar> {
    let closes: Vec<f64> = (0..count)
        .map(|i| start_price + (i as f64 * 0.35).sin() * 6.0 + i as f64 * 0.05)
        .collect();
    bars_from_closes(&closes)
}

/// Renders bars as CSV text with the standard header.
pub fn bars_csv(bars: &[OhlcvBar]) -> String {
    let mut out = String::from("date,open,high,low,close,volume\n");
    for b in bars {
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            b.date, b.open, b.high, b.low, b.close, b.volume
        ));
    }
    out
}

pub fn write_temp_ini(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}
