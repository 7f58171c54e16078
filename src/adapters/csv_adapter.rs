//! CSV bar files.
//!
//! Reading is header-driven: column names are matched case-insensitively in any
//! order and unknown columns are ignored. Empty cells and `NaN` are missing
//! values. A `date` cell may carry a time of day, which is dropped.

use crate::domain::error::BacktestError;
use crate::domain::metadata::{sidecar_path, DatasetMetadata};
use crate::domain::ohlcv::{Column, RawBar, RawSeries};
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufWriter, Read};
use std::path::{Path, PathBuf};

/// Column positions resolved from a header row.
struct Layout {
    date: usize,
    values: [usize; 5],
    symbol: Option<usize>,
}

impl Layout {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self, BacktestError> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
        };
        let require = |name: &str| {
            find(name).ok_or_else(|| BacktestError::data(format!("missing '{name}' column")))
        };
        Ok(Layout {
            date: require("date")?,
            values: [
                require(Column::Open.as_str())?,
                require(Column::High.as_str())?,
                require(Column::Low.as_str())?,
                require(Column::Close.as_str())?,
                require(Column::Volume.as_str())?,
            ],
            symbol: find("symbol"),
        })
    }
}

/// One parsed line plus the symbol it was tagged with, if any.
struct Line {
    symbol: Option<String>,
    bar: RawBar,
}

fn parse_date(cell: &str, row: usize) -> Result<NaiveDate, BacktestError> {
    let cell = cell.trim();
    let day = match cell.char_indices().nth(10) {
        Some((i, 'T' | ' ')) => &cell[..i],
        _ => cell,
    };
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map_err(|e| BacktestError::data(format!("row {row}: invalid date '{cell}': {e}")))
}

fn parse_value(cell: &str, column: Column, row: usize) -> Result<Option<f64>, BacktestError> {
    let cell = cell.trim();
    if cell.is_empty() || cell.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    cell.parse::<f64>()
        .map(Some)
        .map_err(|_| BacktestError::data(format!("row {row}: invalid {column} value '{cell}'")))
}

/// Volume is a share count; anything negative or fractional is malformed.
fn to_volume(value: Option<f64>, row: usize) -> Result<Option<i64>, BacktestError> {
    match value {
        Some(v) if v < 0.0 || v.fract() != 0.0 => Err(BacktestError::data(format!(
            "row {row}: volume '{v}' is not a non-negative whole number"
        ))),
        other => Ok(other.map(|v| v as i64)),
    }
}

fn read_lines<R: Read>(reader: R) -> Result<(Vec<Line>, bool), BacktestError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let layout = Layout::from_headers(rdr.headers()?)?;

    let mut lines = Vec::new();
    for (row, record) in rdr.records().enumerate() {
        let record = record?;
        let cell = |idx: usize| record.get(idx).unwrap_or("");

        let mut values = [None; 5];
        for (slot, (column, &idx)) in values
            .iter_mut()
            .zip(Column::ALL.iter().zip(layout.values.iter()))
        {
            *slot = parse_value(cell(idx), *column, row)?;
        }
        let [open, high, low, close, volume] = values;

        lines.push(Line {
            symbol: layout.symbol.map(|idx| cell(idx).to_string()),
            bar: RawBar {
                date: parse_date(cell(layout.date), row)?,
                open,
                high,
                low,
                close,
                volume: to_volume(volume, row)?,
            },
        });
    }
    Ok((lines, layout.symbol.is_some()))
}

/// Reads one instrument from CSV text.
///
/// With a `symbol` column the rows are filtered to `symbol`; when no symbol is
/// requested the file must hold exactly one. `fallback` names the series when
/// nothing else does.
pub fn read_series<R: Read>(
    reader: R,
    symbol: Option<&str>,
    fallback: &str,
) -> Result<RawSeries, BacktestError> {
    let (lines, tagged) = read_lines(reader)?;

    let name = match (symbol, tagged) {
        (Some(s), _) => s.to_string(),
        (None, false) => fallback.to_string(),
        (None, true) => {
            let symbols: BTreeSet<&str> = lines.iter().filter_map(|l| l.symbol.as_deref()).collect();
            match symbols.len() {
                0 => fallback.to_string(),
                1 => symbols.into_iter().next().unwrap_or(fallback).to_string(),
                n => {
                    return Err(BacktestError::data(format!(
                        "{n} symbols in file, choose one with [data] symbol"
                    )));
                }
            }
        }
    };

    let rows = lines
        .into_iter()
        .filter(|l| !tagged || l.symbol.as_deref() == Some(name.as_str()))
        .map(|l| l.bar)
        .collect();
    Ok(RawSeries::new(name, rows))
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn open(path: &Path) -> Result<File, BacktestError> {
    File::open(path)
        .map_err(|e| BacktestError::data(format!("failed to read {}: {e}", path.display())))
}

/// A single CSV file, optionally holding several symbols.
pub struct CsvFileAdapter {
    path: PathBuf,
}

impl CsvFileAdapter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DataPort for CsvFileAdapter {
    fn fetch_bars(
        &self,
        symbol: Option<&str>,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<RawSeries, BacktestError> {
        let series = read_series(open(&self.path)?, symbol, &file_stem(&self.path))?;
        Ok(series.within(start_date, end_date))
    }

    fn list_symbols(&self) -> Result<Vec<String>, BacktestError> {
        let (lines, tagged) = read_lines(open(&self.path)?)?;
        if !tagged {
            return Ok(vec![file_stem(&self.path)]);
        }
        let symbols: BTreeSet<String> = lines.into_iter().filter_map(|l| l.symbol).collect();
        Ok(symbols.into_iter().collect())
    }
}

/// A directory of `<SYMBOL>.csv` files.
pub struct CsvDirectoryAdapter {
    base_path: PathBuf,
}

impl CsvDirectoryAdapter {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{symbol}.csv"))
    }
}

impl DataPort for CsvDirectoryAdapter {
    fn fetch_bars(
        &self,
        symbol: Option<&str>,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<RawSeries, BacktestError> {
        let symbol = symbol.ok_or_else(|| BacktestError::data("a symbol is required"))?;
        let series = read_series(open(&self.csv_path(symbol))?, Some(symbol), symbol)?;
        Ok(series.within(start_date, end_date))
    }

    fn list_symbols(&self) -> Result<Vec<String>, BacktestError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| {
            BacktestError::data(format!(
                "failed to read directory {}: {e}",
                self.base_path.display()
            ))
        })?;

        let mut symbols = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("csv")) {
                symbols.push(file_stem(&path));
            }
        }
        symbols.sort();
        Ok(symbols)
    }
}

#[derive(Serialize)]
struct DatasetRow<'a> {
    date: NaiveDate,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    volume: Option<i64>,
    symbol: &'a str,
}

/// Writes every series to one file with a trailing `symbol` column. Missing
/// cells are left empty.
pub fn write_dataset(path: &Path, series: &[RawSeries]) -> Result<(), BacktestError> {
    let mut wtr = csv::Writer::from_path(path)?;
    for s in series {
        for bar in &s.rows {
            wtr.serialize(DatasetRow {
                date: bar.date,
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
                volume: bar.volume,
                symbol: &s.symbol,
            })?;
        }
    }
    wtr.flush()?;
    Ok(())
}

/// Writes the provenance sidecar next to `dataset` and returns its path.
pub fn write_metadata(dataset: &Path, metadata: &DatasetMetadata) -> Result<PathBuf, BacktestError> {
    let path = sidecar_path(dataset);
    let writer = BufWriter::new(File::create(&path)?);
    serde_json::to_writer_pretty(writer, metadata)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const BARS: &str = "date,open,high,low,close,volume\n\
        2024-01-15,100.0,110.0,90.0,105.0,50000\n\
        2024-01-16,105.0,115.0,100.0,110.0,60000\n\
        2024-01-17,110.0,120.0,105.0,115.0,55000\n";

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn setup_test_data() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_path_buf();
        fs::write(path.join("BHP.csv"), BARS).unwrap();
        fs::write(path.join("CBA.csv"), "date,open,high,low,close,volume\n").unwrap();
        fs::write(path.join("notes.txt"), "ignored").unwrap();
        (dir, path)
    }

    #[test]
    fn reads_values() {
        let series = read_series(BARS.as_bytes(), None, "BHP").unwrap();
        assert_eq!(series.symbol, "BHP");
        assert_eq!(series.len(), 3);
        let first = &series.rows[0];
        assert_eq!(first.date, day(15));
        assert_eq!(first.open, Some(100.0));
        assert_eq!(first.high, Some(110.0));
        assert_eq!(first.low, Some(90.0));
        assert_eq!(first.close, Some(105.0));
        assert_eq!(first.volume, Some(50000));
    }

    #[test]
    fn headers_any_order_and_case() {
        let text = "Volume,Close,extra,DATE,Low,High,Open\n1000,10.5,x,2024-01-15,9,11,10\n";
        let series = read_series(text.as_bytes(), None, "X").unwrap();
        let bar = &series.rows[0];
        assert_eq!(bar.open, Some(10.0));
        assert_eq!(bar.close, Some(10.5));
        assert_eq!(bar.volume, Some(1000));
    }

    #[test]
    fn empty_and_nan_cells_are_missing() {
        let text = "date,open,high,low,close,volume\n2024-01-15,,11,NaN,10,\n";
        let bar = &read_series(text.as_bytes(), None, "X").unwrap().rows[0];
        assert_eq!(bar.open, None);
        assert_eq!(bar.low, None);
        assert_eq!(bar.volume, None);
        assert_eq!(bar.high, Some(11.0));
    }

    #[test]
    fn datetime_truncated_to_date() {
        let text = "date,open,high,low,close,volume\n\
            2024-01-15 00:00:00,1,1,1,1,1\n\
            2024-01-16T09:30:00Z,1,1,1,1,1\n";
        let series = read_series(text.as_bytes(), None, "X").unwrap();
        assert_eq!(series.rows[0].date, day(15));
        assert_eq!(series.rows[1].date, day(16));
    }

    #[test]
    fn missing_column_is_data_error() {
        let err = read_series("date,open,high,low,close\n".as_bytes(), None, "X").unwrap_err();
        assert!(matches!(err, BacktestError::Data { .. }));
    }

    #[test]
    fn malformed_number_is_data_error() {
        let text = "date,open,high,low,close,volume\n2024-01-15,abc,1,1,1,1\n";
        let err = read_series(text.as_bytes(), None, "X").unwrap_err();
        assert!(err.to_string().contains("open"));
    }

    #[test]
    fn negative_or_fractional_volume_is_data_error() {
        for volume in ["-5", "10.5"] {
            let text = format!("date,open,high,low,close,volume\n2024-01-15,1,1,1,1,{volume}\n");
            let err = read_series(text.as_bytes(), None, "X").unwrap_err();
            assert!(matches!(err, BacktestError::Data { .. }));
            assert!(err.to_string().contains("volume"));
        }
    }

    #[test]
    fn whole_float_volume_is_accepted() {
        let text = "date,open,high,low,close,volume\n2024-01-15,1,1,1,1,1200.0\n";
        let series = read_series(text.as_bytes(), None, "X").unwrap();
        assert_eq!(series.rows[0].volume, Some(1200));
    }

    #[test]
    fn symbol_column_filters() {
        let text = "date,open,high,low,close,volume,symbol\n\
            2024-01-15,1,1,1,1,1,AAA\n\
            2024-01-15,2,2,2,2,2,BBB\n\
            2024-01-16,1,1,1,1,1,AAA\n";
        let series = read_series(text.as_bytes(), Some("AAA"), "file").unwrap();
        assert_eq!(series.symbol, "AAA");
        assert_eq!(series.len(), 2);
        assert!(read_series(text.as_bytes(), None, "file").is_err());
        assert!(read_series(text.as_bytes(), Some("ZZZ"), "file").unwrap().is_empty());
    }

    #[test]
    fn file_adapter_filters_by_date() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvFileAdapter::new(path.join("BHP.csv"));
        let series = adapter.fetch_bars(None, Some(day(16)), Some(day(16))).unwrap();
        assert_eq!(series.symbol, "BHP");
        assert_eq!(series.len(), 1);
        assert_eq!(adapter.list_symbols().unwrap(), vec!["BHP"]);
    }

    #[test]
    fn directory_adapter_reads_by_symbol() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvDirectoryAdapter::new(path);
        assert_eq!(adapter.fetch_bars(Some("BHP"), None, None).unwrap().len(), 3);
        assert!(adapter.fetch_bars(Some("XYZ"), None, None).is_err());
        assert!(adapter.fetch_bars(None, None, None).is_err());
        assert_eq!(adapter.list_symbols().unwrap(), vec!["BHP", "CBA"]);
    }

    #[test]
    fn dataset_round_trip() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("combined.csv");
        let a = read_series(BARS.as_bytes(), None, "AAA").unwrap();
        let mut b = a.clone();
        b.symbol = "BBB".into();
        b.rows[1].close = None;
        b.rows[2].open = Some(0.1 + 0.2);

        write_dataset(&out, &[a.clone(), b.clone()]).unwrap();

        let adapter = CsvFileAdapter::new(&out);
        assert_eq!(adapter.list_symbols().unwrap(), vec!["AAA", "BBB"]);
        assert_eq!(adapter.fetch_bars(Some("AAA"), None, None).unwrap(), a);
        assert_eq!(adapter.fetch_bars(Some("BBB"), None, None).unwrap(), b);
    }

    #[test]
    fn metadata_written_beside_dataset() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("prices.csv");
        let series = read_series(BARS.as_bytes(), None, "BHP").unwrap();
        let meta = DatasetMetadata::describe("test", &[series]);
        let path = write_metadata(&out, &meta).unwrap();
        assert_eq!(path, dir.path().join("prices_metadata.json"));
        let back: DatasetMetadata =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(back, meta);
    }
}
