//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::{self, CsvDirectoryAdapter, CsvFileAdapter};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_report_adapter::JsonReportAdapter;
use crate::domain::config_validation::{
    build_param_grid, build_run_config, build_sweep_config, data_path,
};
use crate::domain::error::BacktestError;
use crate::domain::metadata::DatasetMetadata;
use crate::domain::metrics::Metrics;
use crate::domain::order::OrderStatus;
use crate::domain::pipeline::{load, DataOptions, RunConfig, RunContext, RunOutcome};
use crate::domain::sweep::{run_sweep, ParamGrid, SweepConfig, SweepReport};
use crate::domain::validation::{validate, ValidationReport};
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "barsim", about = "Daily-bar strategy backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Write a JSON report here
        #[arg(short, long)]
        report: Option<PathBuf>,
    },
    /// Run every combination of the [sweep] grid
    Sweep {
        #[arg(short, long)]
        config: PathBuf,
        /// How many ranked results to print (overrides [sweep] top_k)
        #[arg(long)]
        top: Option<usize>,
        #[arg(short, long)]
        report: Option<PathBuf>,
    },
    /// Check data quality without running
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Combine per-symbol files into one dataset with a metadata sidecar
    Collect {
        /// Directory of <SYMBOL>.csv files
        #[arg(long)]
        source_dir: PathBuf,
        /// Comma-separated; every file in the directory when omitted
        #[arg(long, value_delimiter = ',')]
        symbols: Vec<String>,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long)]
        start_date: Option<NaiveDate>,
        #[arg(long)]
        end_date: Option<NaiveDate>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Backtest { config, report } => {
            run_backtest(&config, report.as_deref()).map(|_| ())
        }
        Command::Sweep {
            config,
            top,
            report,
        } => run_sweep_command(&config, top, report.as_deref()).map(|_| ()),
        Command::Validate { config } => run_validate(&config).map(|_| ()),
        Command::Collect {
            source_dir,
            symbols,
            output,
            start_date,
            end_date,
        } => {
            let port = CsvDirectoryAdapter::new(&source_dir);
            let source = format!("csv:{}", source_dir.display());
            run_collect(&port, &source, &symbols, start_date, end_date, &output).map(|_| ())
        }
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(&e)
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, BacktestError> {
    tracing::info!(path = %path.display(), "loading config");
    FileConfigAdapter::from_file(path)
}

fn run_backtest(config_path: &Path, report: Option<&Path>) -> Result<RunOutcome, BacktestError> {
    let adapter = load_config(config_path)?;
    let config = build_run_config(&adapter)?;
    let port = CsvFileAdapter::new(data_path(&adapter)?);
    run_backtest_pipeline(&port, &config, report)
}

/// Load, prepare, simulate, print the summary and optionally write a report.
pub fn run_backtest_pipeline(
    port: &dyn DataPort,
    config: &RunConfig,
    report: Option<&Path>,
) -> Result<RunOutcome, BacktestError> {
    let strategy = config.build_strategy()?;
    let prepared = load(port, &config.data)?;
    tracing::info!(%strategy, bars = prepared.series.len(), "running backtest");

    let outcome = RunContext::new("backtest").run(&prepared.series, &strategy, config)?;
    print_summary(&outcome);

    if let Some(path) = report {
        JsonReportAdapter.write_run(&outcome, &prepared.report, path)?;
        println!("\nReport written to: {}", path.display());
    }
    Ok(outcome)
}

fn run_sweep_command(
    config_path: &Path,
    top: Option<usize>,
    report: Option<&Path>,
) -> Result<SweepReport, BacktestError> {
    let adapter = load_config(config_path)?;
    let config = build_run_config(&adapter)?;
    let grid = build_param_grid(&adapter, &config)?;
    let mut sweep = build_sweep_config(&adapter)?;
    if let Some(top) = top {
        if top == 0 {
            return Err(BacktestError::config("top", "must be at least 1"));
        }
        sweep.top_k = top;
    }
    let port = CsvFileAdapter::new(data_path(&adapter)?);
    run_sweep_pipeline(&port, &config, &grid, &sweep, report)
}

/// Loads once, sweeps the grid, prints the ranking.
pub fn run_sweep_pipeline(
    port: &dyn DataPort,
    config: &RunConfig,
    grid: &ParamGrid,
    sweep: &SweepConfig,
    report: Option<&Path>,
) -> Result<SweepReport, BacktestError> {
    let prepared = load(port, &config.data)?;
    let result = run_sweep(&prepared.series, grid, config, sweep, None)?;
    print_sweep(&result);

    if let Some(path) = report {
        JsonReportAdapter.write_sweep(&result, path)?;
        println!("\nReport written to: {}", path.display());
    }
    Ok(result)
}

fn run_validate(config_path: &Path) -> Result<ValidationReport, BacktestError> {
    let adapter = load_config(config_path)?;
    let config = build_run_config(&adapter)?;
    let port = CsvFileAdapter::new(data_path(&adapter)?);
    run_validate_pipeline(&port, &config.data)
}

/// Prints the report for the configured series. Strict mode with any issue is
/// an error.
pub fn run_validate_pipeline(
    port: &dyn DataPort,
    options: &DataOptions,
) -> Result<ValidationReport, BacktestError> {
    let raw = port.fetch_bars(options.symbol.as_deref(), options.start_date, options.end_date)?;
    let raw = raw.within(options.start_date, options.end_date);
    if raw.is_empty() {
        return Err(BacktestError::EmptyData { symbol: raw.symbol });
    }
    let report = validate(&raw, &options.validation);
    print!("{report}");
    let issues = report.issues();
    if issues.is_empty() {
        println!("No issues found");
    } else {
        println!("Issues:");
        for issue in &issues {
            println!("  - {issue}");
        }
    }
    report.enforce(options.validation.strict)?;
    Ok(report)
}

/// Reads each symbol through `port`, skipping those that fail, and writes the
/// combined dataset plus its metadata sidecar.
pub fn run_collect(
    port: &dyn DataPort,
    source: &str,
    symbols: &[String],
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    output: &Path,
) -> Result<DatasetMetadata, BacktestError> {
    let symbols = if symbols.is_empty() {
        port.list_symbols()?
    } else {
        symbols.to_vec()
    };

    let mut collected = Vec::new();
    for symbol in &symbols {
        match port.fetch_bars(Some(symbol), start_date, end_date) {
            Ok(series) if series.is_empty() => {
                tracing::warn!(%symbol, "no rows in range, skipping");
            }
            Ok(series) => {
                tracing::info!(%symbol, rows = series.len(), "collected");
                collected.push(series);
            }
            Err(e) => tracing::warn!(%symbol, error = %e, "skipping"),
        }
    }
    if collected.is_empty() {
        return Err(BacktestError::data(format!(
            "none of {} requested symbols could be read",
            symbols.len()
        )));
    }

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    csv_adapter::write_dataset(output, &collected)?;

    let mut metadata = DatasetMetadata::describe(source, &collected)
        .with_parameter("requested_symbols", symbols.join(","));
    if let Some(start) = start_date {
        metadata = metadata.with_parameter("start_date", start);
    }
    if let Some(end) = end_date {
        metadata = metadata.with_parameter("end_date", end);
    }
    let sidecar = csv_adapter::write_metadata(output, &metadata)?;

    println!(
        "Collected {} of {} symbols, {} rows",
        collected.len(),
        symbols.len(),
        metadata.row_count
    );
    println!("Dataset:  {}", output.display());
    println!("Metadata: {}", sidecar.display());
    Ok(metadata)
}

fn ratio(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.2}"))
}

fn percent(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{:.1}%", v * 100.0))
}

fn print_metrics(metrics: &Metrics) {
    println!("Final Equity:     {:.2}", metrics.final_equity);
    println!("Total Return:     {:.2}%", metrics.total_return * 100.0);
    println!("Annualized:       {:.2}%", metrics.annualized_return * 100.0);
    println!("Sharpe Ratio:     {}", ratio(metrics.sharpe_ratio));
    println!("Sortino Ratio:    {}", ratio(metrics.sortino_ratio));
    println!("Max Drawdown:     -{:.1}%", metrics.max_drawdown * 100.0);
    println!("Total Trades:     {}", metrics.total_trades);
    println!("Win Rate:         {}", percent(metrics.win_rate));
    println!("Profit Factor:    {}", ratio(metrics.profit_factor));
    println!("SQN:              {}", ratio(metrics.sqn));
}

fn print_summary(outcome: &RunOutcome) {
    let result = &outcome.result;
    println!("=== {} | {} ===", result.symbol, result.strategy);
    println!("Initial Cash:     {:.2}", result.initial_cash);
    print_metrics(&outcome.metrics);
    println!(
        "Orders:           {} filled, {} rejected, {} canceled",
        result.order_count(OrderStatus::Filled),
        result.order_count(OrderStatus::Rejected),
        result.order_count(OrderStatus::Canceled)
    );
}

fn print_sweep(report: &SweepReport) {
    println!(
        "=== Sweep {} | {} | {} of {} runs ===",
        report.symbol,
        report.strategy,
        report.records.len(),
        report.total_combinations
    );
    if report.cancelled {
        println!("(cancelled before all runs completed)");
    }
    println!(
        "{:>4}  {:>9}  {:>8}  {:>7}  {:>6}  parameters",
        "rank", "return", "max dd", "sharpe", "trades"
    );
    for (rank, record) in report.top().iter().enumerate() {
        let m = &record.metrics;
        println!(
            "{:>4}  {:>8.2}%  {:>7.2}%  {:>7}  {:>6}  {}",
            rank + 1,
            m.total_return * 100.0,
            m.max_drawdown * 100.0,
            ratio(m.sharpe_ratio),
            m.total_trades,
            record.parameters
        );
    }
    if let Some(best) = report.best() {
        println!("\nBest: {}", best.parameters);
        print_metrics(&best.metrics);
    }
}
