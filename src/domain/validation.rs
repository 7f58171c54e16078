//! Market-data quality checks.
//!
//! [`validate`] never touches the series; it only counts defects. The report is
//! advisory unless the caller opts into strict mode through [`ValidationReport::enforce`].

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::domain::error::BacktestError;
use crate::domain::ohlcv::{Column, RawBar, RawSeries};

pub const DEFAULT_GAP_THRESHOLD_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationConfig {
    pub gap_threshold_days: i64,
    pub strict: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        ValidationConfig {
            gap_threshold_days: DEFAULT_GAP_THRESHOLD_DAYS,
            strict: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapSummary {
    pub threshold_days: i64,
    pub count: usize,
    pub max_gap_days: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub symbol: String,
    pub total_rows: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub missing_values: BTreeMap<Column, usize>,
    pub duplicate_dates: usize,
    pub non_positive_prices: BTreeMap<Column, usize>,
    pub ohlc_violations: usize,
    pub gaps: GapSummary,
}

/// One kind of defect found in a series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValidationIssue {
    MissingValues { column: Column, count: usize },
    DuplicateDates { count: usize },
    NonPositivePrices { column: Column, count: usize },
    OhlcViolations { count: usize },
    DataGaps { count: usize, max_gap_days: i64 },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::MissingValues { column, count } => {
                write!(f, "{count} missing {column} values")
            }
            ValidationIssue::DuplicateDates { count } => write!(f, "{count} duplicate dates"),
            ValidationIssue::NonPositivePrices { column, count } => {
                write!(f, "{count} non-positive {column} prices")
            }
            ValidationIssue::OhlcViolations { count } => {
                write!(f, "{count} rows with invalid OHLC relationships")
            }
            ValidationIssue::DataGaps {
                count,
                max_gap_days,
            } => write!(f, "{count} data gaps (max {max_gap_days} days)"),
        }
    }
}

pub fn validate(series: &RawSeries, config: &ValidationConfig) -> ValidationReport {
    let rows = &series.rows;
    ValidationReport {
        symbol: series.symbol.clone(),
        total_rows: rows.len(),
        first_date: rows.iter().map(|r| r.date).min(),
        last_date: rows.iter().map(|r| r.date).max(),
        missing_values: count_missing(rows),
        duplicate_dates: count_duplicates(rows),
        non_positive_prices: count_non_positive(rows),
        ohlc_violations: rows.iter().filter(|r| violates_ohlc(r)).count(),
        gaps: find_gaps(rows, config.gap_threshold_days),
    }
}

fn count_missing(rows: &[RawBar]) -> BTreeMap<Column, usize> {
    Column::ALL
        .into_iter()
        .map(|c| (c, rows.iter().filter(|r| r.get(c).is_none()).count()))
        .filter(|(_, n)| *n > 0)
        .collect()
}

fn count_duplicates(rows: &[RawBar]) -> usize {
    let mut seen = HashSet::with_capacity(rows.len());
    rows.iter().filter(|r| !seen.insert(r.date)).count()
}

fn count_non_positive(rows: &[RawBar]) -> BTreeMap<Column, usize> {
    Column::PRICES
        .into_iter()
        .map(|c| {
            let n = rows
                .iter()
                .filter(|r| r.get(c).is_some_and(|v| v <= 0.0))
                .count();
            (c, n)
        })
        .filter(|(_, n)| *n > 0)
        .collect()
}

/// Rows with any missing price are not judged.
fn violates_ohlc(row: &RawBar) -> bool {
    let (Some(open), Some(high), Some(low), Some(close)) = (row.open, row.high, row.low, row.close)
    else {
        return false;
    };
    high < low || high < open || high < close || low > open || low > close
}

fn find_gaps(rows: &[RawBar], threshold_days: i64) -> GapSummary {
    let mut dates: Vec<NaiveDate> = rows.iter().map(|r| r.date).collect();
    dates.sort_unstable();

    let large: Vec<i64> = dates
        .windows(2)
        .map(|w| (w[1] - w[0]).num_days())
        .filter(|&d| d > threshold_days)
        .collect();

    GapSummary {
        threshold_days,
        count: large.len(),
        max_gap_days: large.iter().copied().max(),
    }
}

impl ValidationReport {
    pub fn issues(&self) -> Vec<ValidationIssue> {
        let mut issues: Vec<ValidationIssue> = self
            .missing_values
            .iter()
            .map(|(&column, &count)| ValidationIssue::MissingValues { column, count })
            .collect();
        if self.duplicate_dates > 0 {
            issues.push(ValidationIssue::DuplicateDates {
                count: self.duplicate_dates,
            });
        }
        issues.extend(
            self.non_positive_prices
                .iter()
                .map(|(&column, &count)| ValidationIssue::NonPositivePrices { column, count }),
        );
        if self.ohlc_violations > 0 {
            issues.push(ValidationIssue::OhlcViolations {
                count: self.ohlc_violations,
            });
        }
        if let Some(max_gap_days) = self.gaps.max_gap_days {
            issues.push(ValidationIssue::DataGaps {
                count: self.gaps.count,
                max_gap_days,
            });
        }
        issues
    }

    pub fn is_clean(&self) -> bool {
        self.issues().is_empty()
    }

    pub fn missing_total(&self) -> usize {
        self.missing_values.values().sum()
    }

    /// Strict mode turns any issue into a hard error; otherwise issues are logged
    /// and the run continues.
    pub fn enforce(&self, strict: bool) -> Result<(), BacktestError> {
        let issues = self.issues();
        if issues.is_empty() {
            tracing::info!(symbol = %self.symbol, rows = self.total_rows, "data validation passed");
            return Ok(());
        }
        if strict {
            return Err(BacktestError::StrictValidation {
                issues: issues.iter().map(|i| format!("{}: {i}", self.symbol)).collect(),
            });
        }
        for issue in &issues {
            tracing::warn!(symbol = %self.symbol, "{issue}");
        }
        Ok(())
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Validation report for {}", self.symbol)?;
        writeln!(f, "  Rows:        {}", self.total_rows)?;
        if let (Some(first), Some(last)) = (self.first_date, self.last_date) {
            writeln!(f, "  Date range:  {first} to {last}")?;
        }
        let issues = self.issues();
        if issues.is_empty() {
            write!(f, "  No issues found")
        } else {
            write!(f, "  Issues:      {}", issues.len())?;
            for issue in &issues {
                write!(f, "\n    - {issue}")?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ohlcv::OhlcvBar;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    fn row(m: u32, d: u32, open: f64, high: f64, low: f64, close: f64) -> RawBar {
        RawBar::complete(&OhlcvBar {
            date: date(m, d),
            open,
            high,
            low,
            close,
            volume: 100,
        })
    }

    fn clean_rows() -> Vec<RawBar> {
        (1..=5)
            .map(|d| row(1, d, 10.0, 11.0, 9.0, 10.5))
            .collect()
    }

    #[test]
    fn clean_series_has_no_issues() {
        let report = validate(&RawSeries::new("GOOG", clean_rows()), &ValidationConfig::default());
        assert!(report.is_clean());
        assert_eq!(report.total_rows, 5);
        assert_eq!(report.first_date, Some(date(1, 1)));
        assert_eq!(report.last_date, Some(date(1, 5)));
    }

    #[test]
    fn counts_missing_per_column() {
        let mut rows = clean_rows();
        rows[1].close = None;
        rows[2].close = None;
        rows[3].volume = None;
        let report = validate(&RawSeries::new("GOOG", rows), &ValidationConfig::default());
        assert_eq!(report.missing_values.get(&Column::Close), Some(&2));
        assert_eq!(report.missing_values.get(&Column::Volume), Some(&1));
        assert_eq!(report.missing_values.get(&Column::Open), None);
        assert_eq!(report.missing_total(), 3);
    }

    #[test]
    fn counts_duplicate_dates() {
        let mut rows = clean_rows();
        rows.push(row(1, 2, 10.0, 11.0, 9.0, 10.5));
        rows.push(row(1, 2, 10.0, 11.0, 9.0, 10.5));
        let report = validate(&RawSeries::new("GOOG", rows), &ValidationConfig::default());
        assert_eq!(report.duplicate_dates, 2);
    }

    #[test]
    fn counts_non_positive_prices() {
        let mut rows = clean_rows();
        rows[0].low = Some(0.0);
        rows[1].close = Some(-1.0);
        let report = validate(&RawSeries::new("GOOG", rows), &ValidationConfig::default());
        assert_eq!(report.non_positive_prices.get(&Column::Low), Some(&1));
        assert_eq!(report.non_positive_prices.get(&Column::Close), Some(&1));
    }

    #[test]
    fn flags_each_ohlc_violation_kind() {
        let rows = vec![
            row(1, 1, 10.0, 8.0, 9.0, 10.0),  // high < low
            row(1, 2, 12.0, 11.0, 9.0, 10.0), // high < open
            row(1, 3, 10.0, 11.0, 9.0, 12.0), // high < close
            row(1, 4, 8.0, 11.0, 9.0, 10.0),  // low > open
            row(1, 5, 10.0, 11.0, 9.0, 8.5),  // low > close
            row(1, 6, 10.0, 11.0, 9.0, 10.0),
        ];
        let report = validate(&RawSeries::new("GOOG", rows), &ValidationConfig::default());
        assert_eq!(report.ohlc_violations, 5);
    }

    #[test]
    fn ohlc_check_skips_rows_with_missing_prices() {
        let mut rows = clean_rows();
        rows[0].high = None;
        let report = validate(&RawSeries::new("GOOG", rows), &ValidationConfig::default());
        assert_eq!(report.ohlc_violations, 0);
    }

    #[test]
    fn gaps_use_sorted_dates_and_threshold() {
        let rows = vec![
            row(1, 20, 10.0, 11.0, 9.0, 10.0),
            row(1, 1, 10.0, 11.0, 9.0, 10.0),
            row(1, 8, 10.0, 11.0, 9.0, 10.0),  // 7 days: not a gap
            row(2, 1, 10.0, 11.0, 9.0, 10.0),  // 12 days after 1-20
        ];
        let report = validate(&RawSeries::new("GOOG", rows), &ValidationConfig::default());
        assert_eq!(report.gaps.count, 2);
        assert_eq!(report.gaps.max_gap_days, Some(12));

        let tight = ValidationConfig {
            gap_threshold_days: 3,
            strict: false,
        };
        let report = validate(
            &RawSeries::new("GOOG", vec![row(1, 1, 10.0, 11.0, 9.0, 10.0), row(1, 5, 10.0, 11.0, 9.0, 10.0)]),
            &tight,
        );
        assert_eq!(report.gaps.count, 1);
        assert_eq!(report.gaps.max_gap_days, Some(4));
    }

    #[test]
    fn checks_are_independent() {
        let mut rows = clean_rows();
        rows[0].open = None;
        rows[1].close = Some(-5.0);
        rows.push(row(1, 3, 10.0, 11.0, 9.0, 10.5));
        rows.push(row(3, 1, 10.0, 11.0, 9.0, 10.5));
        let report = validate(&RawSeries::new("GOOG", rows), &ValidationConfig::default());
        let issues = report.issues();
        assert_eq!(issues.len(), 5);
        assert!(issues.contains(&ValidationIssue::MissingValues {
            column: Column::Open,
            count: 1
        }));
        assert!(issues.contains(&ValidationIssue::DuplicateDates { count: 1 }));
        assert!(issues.contains(&ValidationIssue::NonPositivePrices {
            column: Column::Close,
            count: 1
        }));
        assert!(issues.contains(&ValidationIssue::OhlcViolations { count: 1 }));
        assert!(matches!(issues[4], ValidationIssue::DataGaps { count: 1, .. }));
    }

    #[test]
    fn validate_does_not_mutate_series() {
        let mut rows = clean_rows();
        rows[2].close = None;
        let series = RawSeries::new("GOOG", rows);
        let before = series.clone();
        let _ = validate(&series, &ValidationConfig::default());
        assert_eq!(series, before);
    }

    #[test]
    fn enforce_strict_fails_on_issues() {
        let mut rows = clean_rows();
        rows[2].close = None;
        let report = validate(&RawSeries::new("GOOG", rows), &ValidationConfig::default());
        assert!(report.enforce(false).is_ok());
        match report.enforce(true) {
            Err(BacktestError::StrictValidation { issues }) => {
                assert_eq!(issues, vec!["GOOG: 1 missing close values".to_string()]);
            }
            other => panic!("expected StrictValidation, got {other:?}"),
        }
    }

    #[test]
    fn enforce_strict_passes_clean_report() {
        let report = validate(&RawSeries::new("GOOG", clean_rows()), &ValidationConfig::default());
        assert!(report.enforce(true).is_ok());
    }

    #[test]
    fn report_serializes_with_column_names() {
        let mut rows = clean_rows();
        rows[0].volume = None;
        let report = validate(&RawSeries::new("GOOG", rows), &ValidationConfig::default());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["missing_values"]["volume"], 1);
        assert_eq!(json["gaps"]["threshold_days"], 7);

        let issue = serde_json::to_value(&report.issues()[0]).unwrap();
        assert_eq!(issue["type"], "missing_values");
        assert_eq!(issue["column"], "volume");
    }

    #[test]
    fn display_lists_issues() {
        let mut rows = clean_rows();
        rows[0].volume = None;
        let report = validate(&RawSeries::new("GOOG", rows), &ValidationConfig::default());
        let text = report.to_string();
        assert!(text.contains("Validation report for GOOG"));
        assert!(text.contains("- 1 missing volume values"));
    }
}
