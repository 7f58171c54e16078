//! Report output port.

use std::path::Path;

use crate::domain::error::BacktestError;
use crate::domain::pipeline::RunOutcome;
use crate::domain::sweep::SweepReport;
use crate::domain::validation::ValidationReport;

/// Port for persisting run results.
pub trait ReportPort {
    fn write_run(
        &self,
        outcome: &RunOutcome,
        validation: &ValidationReport,
        output_path: &Path,
    ) -> Result<(), BacktestError>;

    fn write_sweep(&self, report: &SweepReport, output_path: &Path) -> Result<(), BacktestError>;
}
