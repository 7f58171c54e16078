//! Missing-data remediation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::error::BacktestError;
use crate::domain::ohlcv::{Column, RawSeries};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissingDataPolicy {
    #[default]
    ForwardFill,
    Drop,
    Interpolate,
}

impl FromStr for MissingDataPolicy {
    type Err = BacktestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "forward-fill" | "ffill" => Ok(MissingDataPolicy::ForwardFill),
            "drop" => Ok(MissingDataPolicy::Drop),
            "interpolate" | "linear-interpolate" => Ok(MissingDataPolicy::Interpolate),
            other => Err(BacktestError::config(
                "missing_data_policy",
                format!("unsupported policy '{other}' (expected forward-fill, drop or interpolate)"),
            )),
        }
    }
}

impl fmt::Display for MissingDataPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MissingDataPolicy::ForwardFill => "forward-fill",
            MissingDataPolicy::Drop => "drop",
            MissingDataPolicy::Interpolate => "interpolate",
        })
    }
}

/// Fills or removes missing cells. Rows are first put in date order so a
/// fill only ever draws on earlier observations; the sort is stable, so rows
/// sharing a date keep their source order.
pub fn repair(mut series: RawSeries, policy: MissingDataPolicy) -> Result<RawSeries, BacktestError> {
    series.rows.sort_by_key(|r| r.date);
    let before = series.len();
    let repaired = match policy {
        MissingDataPolicy::ForwardFill => forward_fill(series),
        MissingDataPolicy::Drop => drop_incomplete(series),
        MissingDataPolicy::Interpolate => interpolate(series)?,
    };
    tracing::debug!(
        symbol = %repaired.symbol,
        %policy,
        rows_before = before,
        rows_after = repaired.len(),
        "missing data handled"
    );
    Ok(repaired)
}

/// Leading gaps have nothing to carry and stay missing.
fn forward_fill(mut series: RawSeries) -> RawSeries {
    for column in Column::ALL {
        let mut last: Option<f64> = None;
        for row in &mut series.rows {
            match row.get(column) {
                Some(v) => last = Some(v),
                None => {
                    if let Some(v) = last {
                        row.set(column, v);
                    }
                }
            }
        }
    }
    series
}

fn drop_incomplete(mut series: RawSeries) -> RawSeries {
    series.rows.retain(|r| r.is_complete());
    series
}

fn interpolate(mut series: RawSeries) -> Result<RawSeries, BacktestError> {
    let n = series.rows.len();
    for column in Column::ALL {
        let mut i = 0;
        while i < n {
            if series.rows[i].get(column).is_some() {
                i += 1;
                continue;
            }
            let start = i;
            while i < n && series.rows[i].get(column).is_none() {
                i += 1;
            }
            let end = i;

            let left = start.checked_sub(1).and_then(|p| series.rows[p].get(column));
            let right = series.rows.get(end).and_then(|r| r.get(column));
            let (Some(left), Some(right)) = (left, right) else {
                return Err(BacktestError::InsufficientData {
                    what: format!(
                        "{} interpolation of {column} (rows {start}..{end} touch the series boundary)",
                        series.symbol
                    ),
                    have: 1,
                    need: 2,
                });
            };

            let span = (end - start + 1) as f64;
            for (k, row) in series.rows[start..end].iter_mut().enumerate() {
                let t = (k + 1) as f64 / span;
                row.set(column, left + (right - left) * t);
            }
        }
    }
    Ok(series)
}
