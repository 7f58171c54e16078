//! Parameter sweep over a grid of strategy parameters.
//!
//! Every combination is validated before anything runs. Runs share only
//! read-only inputs (the bar series and the run configuration) and execute on a
//! rayon pool. A cancel flag is checked before each run; results that already
//! completed are kept.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering as CmpOrdering;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use super::error::BacktestError;
use super::metrics::Metrics;
use super::ohlcv::BarSeries;
use super::pipeline::{RunConfig, RunContext};
use super::strategy::{Strategy, StrategyKind, StrategyParameters};

pub const DEFAULT_TOP_K: usize = 10;

type Job = (usize, StrategyParameters, Strategy);

/// One swept parameter and its candidate values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamAxis {
    pub name: String,
    pub values: Vec<f64>,
}

/// Fixed base parameters plus ordered axes. The first axis varies slowest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamGrid {
    base: StrategyParameters,
    axes: Vec<ParamAxis>,
}

impl ParamGrid {
    pub fn new(base: StrategyParameters) -> Self {
        ParamGrid {
            base,
            axes: Vec::new(),
        }
    }

    pub fn with_axis(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.push_axis(name, values);
        self
    }

    /// A repeated name replaces the earlier axis in place. Repeated values
    /// collapse to their first occurrence so no tuple is run twice.
    pub fn push_axis(&mut self, name: impl Into<String>, mut values: Vec<f64>) {
        let name = name.into();
        let mut seen = HashSet::with_capacity(values.len());
        values.retain(|v| seen.insert(v.to_bits()));
        match self.axes.iter_mut().find(|a| a.name == name) {
            Some(axis) => axis.values = values,
            None => self.axes.push(ParamAxis { name, values }),
        }
    }

    pub fn axes(&self) -> &[ParamAxis] {
        &self.axes
    }

    /// Number of combinations; a grid without axes has one.
    pub fn size(&self) -> usize {
        self.axes.iter().map(|a| a.values.len()).product()
    }

    /// Cartesian product in enumeration order.
    pub fn combinations(&self) -> Vec<StrategyParameters> {
        let mut combos = vec![self.base.clone()];
        for axis in &self.axes {
            combos = combos
                .into_iter()
                .flat_map(|combo| {
                    axis.values
                        .iter()
                        .map(move |&v| combo.clone().with(axis.name.clone(), v))
                })
                .collect();
        }
        combos
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepConfig {
    pub top_k: usize,
    /// Worker threads; 0 uses the global rayon pool.
    pub threads: usize,
}

impl Default for SweepConfig {
    fn default() -> Self {
        SweepConfig {
            top_k: DEFAULT_TOP_K,
            threads: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepRecord {
    /// Position in enumeration order.
    pub index: usize,
    pub parameters: StrategyParameters,
    pub metrics: Metrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub symbol: String,
    pub strategy: StrategyKind,
    pub total_combinations: usize,
    /// Completed runs, best first.
    pub records: Vec<SweepRecord>,
    pub top_k: usize,
    pub cancelled: bool,
}

impl SweepReport {
    pub fn top(&self) -> &[SweepRecord] {
        &self.records[..self.top_k.min(self.records.len())]
    }

    pub fn best(&self) -> Option<&SweepRecord> {
        self.records.first()
    }
}

/// Total return descending, then max drawdown ascending, then enumeration order.
pub fn rank(a: &SweepRecord, b: &SweepRecord) -> CmpOrdering {
    b.metrics
        .total_return
        .total_cmp(&a.metrics.total_return)
        .then(a.metrics.max_drawdown.total_cmp(&b.metrics.max_drawdown))
        .then(a.index.cmp(&b.index))
}

pub fn run_sweep(
    series: &BarSeries,
    grid: &ParamGrid,
    config: &RunConfig,
    sweep: &SweepConfig,
    cancel: Option<&AtomicBool>,
) -> Result<SweepReport, BacktestError> {
    let kind = config.strategy;
    let strategies: Vec<Job> = grid
        .combinations()
        .into_iter()
        .enumerate()
        .map(|(index, params)| {
            let strategy = Strategy::from_params(kind, &params)?;
            Ok((index, params, strategy))
        })
        .collect::<Result<_, BacktestError>>()?;
    let total = strategies.len();

    tracing::info!(
        strategy = %kind,
        combinations = total,
        threads = sweep.threads,
        "sweep started"
    );

    let run_one = |(index, params, strategy): &Job| -> Result<Option<SweepRecord>, BacktestError> {
        if cancel.is_some_and(|f| f.load(Ordering::Relaxed)) {
            return Ok(None);
        }
        let ctx = RunContext::new(format!("sweep-{index}"));
        let outcome = ctx.run(series, strategy, config)?;
        Ok(Some(SweepRecord {
            index: *index,
            parameters: params.clone(),
            metrics: outcome.metrics,
        }))
    };

    let results: Vec<Option<SweepRecord>> = if sweep.threads > 0 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(sweep.threads)
            .build()
            .map_err(|e| BacktestError::config("sweep.threads", e.to_string()))?;
        pool.install(|| {
            strategies
                .par_iter()
                .map(run_one)
                .collect::<Result<Vec<_>, BacktestError>>()
        })?
    } else {
        strategies
            .par_iter()
            .map(run_one)
            .collect::<Result<Vec<_>, BacktestError>>()?
    };

    let mut records: Vec<SweepRecord> = results.into_iter().flatten().collect();
    records.sort_by(rank);
    let cancelled = records.len() < total;
    if cancelled {
        tracing::warn!(completed = records.len(), total, "sweep cancelled");
    } else {
        tracing::info!(completed = total, "sweep finished");
    }

    Ok(SweepReport {
        symbol: series.symbol().to_string(),
        strategy: kind,
        total_combinations: total,
        records,
        top_k: sweep.top_k,
        cancelled,
    })
}
