//! Configuration validation.
//!
//! Turns the INI sections into typed run, grid and sweep settings. Every
//! recognised key is checked here, so a bad file fails before any data is
//! loaded or any simulation starts.

use chrono::NaiveDate;
use std::path::PathBuf;
use std::str::FromStr;

use crate::domain::backtest::BacktestConfig;
use crate::domain::error::BacktestError;
use crate::domain::execution::{ExecutionConfig, FillPolicy};
use crate::domain::pipeline::{DataOptions, RunConfig, DEFAULT_RISK_FREE_RATE};
use crate::domain::repair::MissingDataPolicy;
use crate::domain::strategy::{Strategy, StrategyKind, StrategyParameters};
use crate::domain::sweep::{ParamGrid, SweepConfig, DEFAULT_TOP_K};
use crate::domain::validation::{ValidationConfig, DEFAULT_GAP_THRESHOLD_DAYS};
use crate::ports::config_port::ConfigPort;

const SWEEP_SETTINGS: [&str; 2] = ["top_k", "threads"];

pub fn build_run_config(config: &dyn ConfigPort) -> Result<RunConfig, BacktestError> {
    let run = RunConfig {
        backtest: build_backtest_config(config)?,
        risk_free_rate: validate_risk_free_rate(config)?,
        data: build_data_options(config)?,
        strategy: strategy_kind(config)?,
        parameters: strategy_parameters(config)?,
    };
    // Unknown or out-of-range strategy parameters surface here.
    run.build_strategy()?;
    Ok(run)
}

pub fn build_backtest_config(config: &dyn ConfigPort) -> Result<BacktestConfig, BacktestError> {
    let defaults = ExecutionConfig::default();
    let initial_cash = parse_f64(config, "backtest", "initial_cash", 100_000.0)?;
    if initial_cash <= 0.0 {
        return Err(invalid("backtest", "initial_cash", "must be positive"));
    }
    let commission_rate = parse_f64(config, "backtest", "commission_rate", defaults.commission_rate)?;
    if !(0.0..1.0).contains(&commission_rate) {
        return Err(invalid("backtest", "commission_rate", "must be in [0, 1)"));
    }
    let slippage_pct = parse_f64(config, "backtest", "slippage_pct", defaults.slippage_pct)?;
    if !(0.0..1.0).contains(&slippage_pct) {
        return Err(invalid("backtest", "slippage_pct", "must be in [0, 1)"));
    }
    let fill_policy = parse_with(config, "backtest", "fill_policy", FillPolicy::default())?;

    Ok(BacktestConfig {
        initial_cash,
        execution: ExecutionConfig {
            commission_rate,
            slippage_pct,
            fill_policy,
        },
    })
}

fn validate_risk_free_rate(config: &dyn ConfigPort) -> Result<f64, BacktestError> {
    let value = parse_f64(config, "backtest", "risk_free_rate", DEFAULT_RISK_FREE_RATE)?;
    if !(0.0..1.0).contains(&value) {
        return Err(invalid("backtest", "risk_free_rate", "must be between 0 and 1"));
    }
    Ok(value)
}

pub fn build_data_options(config: &dyn ConfigPort) -> Result<DataOptions, BacktestError> {
    let start_date = parse_date(config, "backtest", "start_date")?;
    let end_date = parse_date(config, "backtest", "end_date")?;
    if let (Some(start), Some(end)) = (start_date, end_date) {
        if start > end {
            return Err(invalid("backtest", "start_date", "must not be after end_date"));
        }
    }

    let gap_threshold_days = parse_f64(
        config,
        "data",
        "gap_threshold_days",
        DEFAULT_GAP_THRESHOLD_DAYS as f64,
    )?;
    if gap_threshold_days < 1.0 || gap_threshold_days.fract() != 0.0 {
        return Err(invalid("data", "gap_threshold_days", "must be a whole number of days >= 1"));
    }

    Ok(DataOptions {
        symbol: config
            .get_string("data", "symbol")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        start_date,
        end_date,
        validation: ValidationConfig {
            gap_threshold_days: gap_threshold_days as i64,
            strict: parse_bool(config, "data", "strict", false)?,
        },
        missing_data_policy: parse_with(
            config,
            "data",
            "missing_data_policy",
            MissingDataPolicy::default(),
        )?,
    })
}

/// `[data] path`, required by every command that reads bars.
pub fn data_path(config: &dyn ConfigPort) -> Result<PathBuf, BacktestError> {
    match config.get_string("data", "path") {
        Some(p) if !p.trim().is_empty() => Ok(PathBuf::from(p.trim())),
        _ => Err(invalid("data", "path", "missing")),
    }
}

fn strategy_kind(config: &dyn ConfigPort) -> Result<StrategyKind, BacktestError> {
    match config.get_string("strategy", "name") {
        Some(name) if !name.trim().is_empty() => name.parse(),
        _ => Ok(StrategyKind::BollingerBreakout),
    }
}

fn strategy_parameters(config: &dyn ConfigPort) -> Result<StrategyParameters, BacktestError> {
    let mut params = StrategyParameters::new();
    for key in config.keys("strategy") {
        if key == "name" {
            continue;
        }
        params.set(key.clone(), parse_f64(config, "strategy", &key, f64::NAN)?);
    }
    Ok(params)
}

/// Axes come from `[sweep]`, one comma list per parameter, ordered as the
/// strategy declares its parameters. `[strategy]` values are the fixed base.
pub fn build_param_grid(config: &dyn ConfigPort, run: &RunConfig) -> Result<ParamGrid, BacktestError> {
    let kind = run.strategy;
    let keys: Vec<String> = config
        .keys("sweep")
        .into_iter()
        .filter(|k| !SWEEP_SETTINGS.contains(&k.as_str()))
        .collect();
    if let Some(unknown) = keys.iter().find(|k| kind.param_spec(k).is_none()) {
        return Err(invalid("sweep", unknown, &format!("not a parameter of {kind}")));
    }

    let mut grid = ParamGrid::new(run.parameters.clone());
    for spec in kind.param_specs() {
        if !keys.iter().any(|k| k == spec.name) {
            continue;
        }
        let raw = config.get_string("sweep", spec.name).unwrap_or_default();
        let values = parse_list(&raw).map_err(|reason| invalid("sweep", spec.name, &reason))?;
        grid.push_axis(spec.name, values);
    }

    for params in grid.combinations() {
        Strategy::from_params(kind, &params)?;
    }
    Ok(grid)
}

pub fn build_sweep_config(config: &dyn ConfigPort) -> Result<SweepConfig, BacktestError> {
    let top_k = parse_f64(config, "sweep", "top_k", DEFAULT_TOP_K as f64)?;
    if top_k < 1.0 || top_k.fract() != 0.0 {
        return Err(invalid("sweep", "top_k", "must be a whole number >= 1"));
    }
    let threads = parse_f64(config, "sweep", "threads", 0.0)?;
    if threads < 0.0 || threads.fract() != 0.0 {
        return Err(invalid("sweep", "threads", "must be a whole number >= 0"));
    }
    Ok(SweepConfig {
        top_k: top_k as usize,
        threads: threads as usize,
    })
}

fn invalid(section: &str, key: &str, reason: &str) -> BacktestError {
    BacktestError::config(format!("{section}.{key}"), reason)
}

fn parse_f64(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, BacktestError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(s) => match s.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => Err(invalid(section, key, &format!("'{s}' is not a number"))),
        },
    }
}

fn parse_bool(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: bool,
) -> Result<bool, BacktestError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(true),
            "false" | "no" | "0" => Ok(false),
            _ => Err(invalid(section, key, &format!("'{s}' is not a boolean"))),
        },
    }
}

fn parse_date(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<NaiveDate>, BacktestError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Some)
            .map_err(|_| invalid(section, key, "invalid date format, expected YYYY-MM-DD")),
    }
}

/// Parses through `FromStr`; the inner error already names the key.
fn parse_with<T>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: T,
) -> Result<T, BacktestError>
where
    T: FromStr<Err = BacktestError>,
{
    match config.get_string(section, key) {
        None => Ok(default),
        Some(s) => s.parse(),
    }
}

fn parse_list(raw: &str) -> Result<Vec<f64>, String> {
    let values = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| format!("'{s}' is not a number"))
        })
        .collect::<Result<Vec<_>, _>>()?;
    if values.is_empty() {
        return Err("needs at least one value".to_string());
    }
    Ok(values)
}
