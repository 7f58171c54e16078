//! Provenance record written next to an exported dataset.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::ohlcv::RawSeries;

pub const METADATA_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    pub source: String,
    pub symbols: Vec<String>,
    pub parameters: BTreeMap<String, String>,
    pub row_count: usize,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub version: String,
}

impl DatasetMetadata {
    /// Summarises `series` as exported from `source`. The date range spans
    /// every row of every symbol.
    pub fn describe(source: impl Into<String>, series: &[RawSeries]) -> Self {
        let dates = series.iter().flat_map(|s| s.rows.iter().map(|r| r.date));
        let (start_date, end_date) = dates.fold((None, None), |(lo, hi), d| {
            (
                Some(lo.map_or(d, |l: NaiveDate| l.min(d))),
                Some(hi.map_or(d, |h: NaiveDate| h.max(d))),
            )
        });
        DatasetMetadata {
            source: source.into(),
            symbols: series.iter().map(|s| s.symbol.clone()).collect(),
            parameters: BTreeMap::new(),
            row_count: series.iter().map(RawSeries::len).sum(),
            start_date,
            end_date,
            created_at: Utc::now(),
            version: METADATA_VERSION.to_string(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.parameters.insert(key.into(), value.to_string());
        self
    }
}

/// `<dir>/<stem>_metadata.json` for a dataset at `<dir>/<stem>.<ext>`.
pub fn sidecar_path(dataset: &Path) -> PathBuf {
    let stem = dataset
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset".to_string());
    dataset.with_file_name(format!("{stem}_metadata.json"))
}
