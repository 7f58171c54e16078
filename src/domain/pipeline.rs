//! Load, check, repair, run.
//!
//! [`RunConfig`] carries every recognised option with its default.
//! [`RunContext`] scopes one simulation: it owns the tracing span the run
//! logs under, so parallel runs never share mutable state.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::backtest::{run_backtest, BacktestConfig, BacktestResult};
use super::error::BacktestError;
use super::metrics::Metrics;
use super::ohlcv::{BarSeries, RawSeries};
use super::repair::{repair, MissingDataPolicy};
use super::strategy::{Strategy, StrategyKind, StrategyParameters};
use super::validation::{validate, ValidationConfig, ValidationReport};
use crate::ports::data_port::DataPort;

pub const DEFAULT_RISK_FREE_RATE: f64 = 0.02;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataOptions {
    pub symbol: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub validation: ValidationConfig,
    pub missing_data_policy: MissingDataPolicy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub backtest: BacktestConfig,
    pub risk_free_rate: f64,
    pub data: DataOptions,
    pub strategy: StrategyKind,
    pub parameters: StrategyParameters,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            backtest: BacktestConfig::default(),
            risk_free_rate: DEFAULT_RISK_FREE_RATE,
            data: DataOptions::default(),
            strategy: StrategyKind::BollingerBreakout,
            parameters: StrategyParameters::new(),
        }
    }
}

impl RunConfig {
    pub fn build_strategy(&self) -> Result<Strategy, BacktestError> {
        Strategy::from_params(self.strategy, &self.parameters)
    }
}

/// A series that passed validation and repair, with the report that
/// describes it before repair.
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub series: BarSeries,
    pub report: ValidationReport,
}

/// Fetches through `port` and prepares the result.
pub fn load(port: &dyn DataPort, options: &DataOptions) -> Result<PreparedData, BacktestError> {
    let raw = port.fetch_bars(options.symbol.as_deref(), options.start_date, options.end_date)?;
    prepare(raw, options)
}

/// Date filter, validation (strict mode aborts), missing-data repair, then
/// conversion to a sorted, duplicate-free series.
pub fn prepare(raw: RawSeries, options: &DataOptions) -> Result<PreparedData, BacktestError> {
    let raw = raw.within(options.start_date, options.end_date);
    if raw.is_empty() {
        return Err(BacktestError::EmptyData { symbol: raw.symbol });
    }

    let report = validate(&raw, &options.validation);
    report.enforce(options.validation.strict)?;

    let mut repaired = repair(raw, options.missing_data_policy)?;
    if options.missing_data_policy == MissingDataPolicy::ForwardFill {
        // Rows before the first value of some column have nothing to carry.
        let leading = repaired.rows.iter().take_while(|r| !r.is_complete()).count();
        if leading > 0 {
            tracing::warn!(
                symbol = %repaired.symbol,
                rows = leading,
                "leading rows without values to carry forward dropped"
            );
            repaired.rows.drain(..leading);
        }
    }

    let series = repaired.into_bar_series()?;
    tracing::info!(
        symbol = %series.symbol(),
        bars = series.len(),
        first = %series.first_date(),
        last = %series.last_date(),
        "series ready"
    );
    Ok(PreparedData { series, report })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub result: BacktestResult,
    pub metrics: Metrics,
}

/// Scope for one simulation run.
#[derive(Debug, Clone)]
pub struct RunContext {
    label: String,
    span: tracing::Span,
}

impl RunContext {
    pub fn new(label: impl Into<String>) -> Self {
        let label = label.into();
        let span = tracing::info_span!("run", label = %label);
        RunContext { label, span }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn run(
        &self,
        series: &BarSeries,
        strategy: &Strategy,
        config: &RunConfig,
    ) -> Result<RunOutcome, BacktestError> {
        let _entered = self.span.enter();
        let result = run_backtest(series, strategy, &config.backtest)?;
        let metrics = result.metrics(config.risk_free_rate);
        tracing::debug!(
            %strategy,
            final_equity = metrics.final_equity,
            trades = metrics.total_trades,
            "run complete"
        );
        Ok(RunOutcome { result, metrics })
    }
}
