//! JSON report adapter implementing ReportPort.

use serde::Serialize;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use crate::domain::backtest::BacktestResult;
use crate::domain::error::BacktestError;
use crate::domain::metrics::Metrics;
use crate::domain::order::OrderStatus;
use crate::domain::pipeline::RunOutcome;
use crate::domain::sweep::{SweepRecord, SweepReport};
use crate::domain::validation::ValidationReport;
use crate::ports::report_port::ReportPort;

#[derive(Serialize)]
struct OrderCounts {
    filled: usize,
    rejected: usize,
    canceled: usize,
}

#[derive(Serialize)]
struct RunDocument<'a> {
    validation: &'a ValidationReport,
    metrics: &'a Metrics,
    orders: OrderCounts,
    run: &'a BacktestResult,
}

#[derive(Serialize)]
struct SweepDocument<'a> {
    symbol: &'a str,
    strategy: &'a str,
    total_combinations: usize,
    completed: usize,
    cancelled: bool,
    best: Option<&'a SweepRecord>,
    top: &'a [SweepRecord],
}

/// Pretty-printed JSON documents. Parent directories are created as needed.
pub struct JsonReportAdapter;

impl JsonReportAdapter {
    fn write<T: Serialize>(value: &T, output_path: &Path) -> Result<(), BacktestError> {
        if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let writer = BufWriter::new(File::create(output_path)?);
        serde_json::to_writer_pretty(writer, value)?;
        tracing::info!(path = %output_path.display(), "report written");
        Ok(())
    }
}

impl ReportPort for JsonReportAdapter {
    fn write_run(
        &self,
        outcome: &RunOutcome,
        validation: &ValidationReport,
        output_path: &Path,
    ) -> Result<(), BacktestError> {
        let result = &outcome.result;
        let doc = RunDocument {
            validation,
            metrics: &outcome.metrics,
            orders: OrderCounts {
                filled: result.order_count(OrderStatus::Filled),
                rejected: result.order_count(OrderStatus::Rejected),
                canceled: result.order_count(OrderStatus::Canceled),
            },
            run: result,
        };
        Self::write(&doc, output_path)
    }

    fn write_sweep(&self, report: &SweepReport, output_path: &Path) -> Result<(), BacktestError> {
        let doc = SweepDocument {
            symbol: &report.symbol,
            strategy: report.strategy.name(),
            total_combinations: report.total_combinations,
            completed: report.records.len(),
            cancelled: report.cancelled,
            best: report.best(),
            top: report.top(),
        };
        Self::write(&doc, output_path)
    }
}
