//! Backtest engine and bar loop.
//!
//! Per bar, in order:
//! 1. resolve the pending order at this bar's open (next-open policy)
//! 2. update indicators with this bar
//! 3. ask the strategy for an intent and queue it as a pending order
//! 4. resolve that order at this bar's close (close policy)
//! 5. snapshot the ledger at the close
//!
//! Nothing after bar `t` is visible while bar `t` is processed.

use serde::{Deserialize, Serialize};

use super::error::BacktestError;
use super::execution::{simulate_fill, ExecutionConfig, FillOutcome, FillPolicy};
use super::indicator::IndicatorEngine;
use super::ledger::{Ledger, LedgerSnapshot};
use super::metrics::Metrics;
use super::ohlcv::{BarSeries, OhlcvBar};
use super::order::{Order, OrderStatus};
use super::position::Trade;
use super::strategy::{SignalContext, Strategy, StrategyParameters};

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub initial_cash: f64,
    pub execution: ExecutionConfig,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            initial_cash: 100_000.0,
            execution: ExecutionConfig::default(),
        }
    }
}

/// Everything a finished run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub symbol: String,
    pub strategy: String,
    pub parameters: StrategyParameters,
    pub initial_cash: f64,
    pub final_equity: f64,
    pub snapshots: Vec<LedgerSnapshot>,
    pub trades: Vec<Trade>,
    pub orders: Vec<Order>,
}

impl BacktestResult {
    pub fn metrics(&self, risk_free_rate: f64) -> Metrics {
        Metrics::compute(self.initial_cash, &self.snapshots, &self.trades, risk_free_rate)
    }

    pub fn order_count(&self, status: OrderStatus) -> usize {
        self.orders.iter().filter(|o| o.status() == status).count()
    }
}

/// Single-run simulation state. Owns its ledger; the bars are borrowed.
pub struct Engine<'a> {
    strategy: &'a Strategy,
    config: &'a BacktestConfig,
    indicators: IndicatorEngine,
    ledger: Ledger,
    orders: Vec<Order>,
    pending: Option<usize>,
    bar_index: usize,
}

impl<'a> Engine<'a> {
    pub fn new(strategy: &'a Strategy, config: &'a BacktestConfig) -> Self {
        Engine {
            strategy,
            config,
            indicators: IndicatorEngine::new(&strategy.required_indicators()),
            ledger: Ledger::new(config.initial_cash),
            orders: Vec::new(),
            pending: None,
            bar_index: 0,
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn pending_order(&self) -> Option<&Order> {
        self.pending.map(|i| &self.orders[i])
    }

    /// Processes the next bar. Bars must arrive in date order.
    pub fn step(&mut self, bar: &OhlcvBar) -> Result<(), BacktestError> {
        let index = self.bar_index;
        let policy = self.config.execution.fill_policy;

        if policy == FillPolicy::NextOpen {
            self.resolve_pending(bar, index)?;
        }

        self.indicators.update(bar);

        let intent = self.strategy.on_bar(&SignalContext {
            bar,
            bar_index: index,
            indicators: &self.indicators,
            position: self.ledger.position(),
            cash: self.ledger.cash(),
            has_pending_order: self.pending.is_some(),
        });
        if let Some(intent) = intent {
            let id = self.orders.len() as u64 + 1;
            tracing::debug!(
                id,
                date = %bar.date,
                side = %intent.side,
                size = intent.size,
                reason = %intent.reason,
                "order submitted"
            );
            self.orders
                .push(Order::new(id, intent.side, intent.size, bar.date, index));
            self.pending = Some(self.orders.len() - 1);
        }

        if policy == FillPolicy::Close {
            self.resolve_pending(bar, index)?;
        }

        self.ledger.snapshot(bar, index);
        self.bar_index += 1;
        Ok(())
    }

    /// Cancels the pending order, if any, and returns its id.
    pub fn cancel_pending(&mut self) -> Result<Option<u64>, BacktestError> {
        let Some(i) = self.pending.take() else {
            return Ok(None);
        };
        let order = &mut self.orders[i];
        order.cancel()?;
        tracing::debug!(id = order.id, "order canceled");
        Ok(Some(order.id))
    }

    fn resolve_pending(&mut self, bar: &OhlcvBar, index: usize) -> Result<(), BacktestError> {
        let Some(i) = self.pending.take() else {
            return Ok(());
        };
        let order = &mut self.orders[i];
        let outcome = simulate_fill(
            order,
            bar,
            index,
            self.ledger.cash(),
            self.ledger.held(),
            &self.config.execution,
        );

        match outcome {
            FillOutcome::Filled(fill) => {
                order.fill(fill.clone())?;
                if let Some(trade) = self.ledger.apply_fill(order.side, &fill)? {
                    tracing::debug!(
                        entry = %trade.entry_date,
                        exit = %trade.exit_date,
                        net_pnl = trade.net_pnl,
                        "trade closed"
                    );
                }
            }
            FillOutcome::Rejected(reason) => {
                order.reject(reason)?;
                tracing::debug!(id = order.id, date = %bar.date, %reason, "order rejected");
            }
        }
        Ok(())
    }

    /// Cancels anything still pending and hands back the run record.
    pub fn finish(mut self, series: &BarSeries) -> Result<BacktestResult, BacktestError> {
        if let Some(id) = self.cancel_pending()? {
            tracing::debug!(id, "order still pending at end of data");
        }
        Ok(BacktestResult {
            symbol: series.symbol().to_string(),
            strategy: self.strategy.kind().to_string(),
            parameters: self.strategy.parameters(),
            initial_cash: self.ledger.initial_cash(),
            final_equity: self.ledger.final_equity(),
            snapshots: self.ledger.snapshots().to_vec(),
            trades: self.ledger.trades().to_vec(),
            orders: self.orders,
        })
    }
}

/// Runs `strategy` over every bar of `series`.
///
/// Fails with `InsufficientData` when the series is shorter than the
/// strategy's indicator warmup.
pub fn run_backtest(
    series: &BarSeries,
    strategy: &Strategy,
    config: &BacktestConfig,
) -> Result<BacktestResult, BacktestError> {
    let need = strategy.warmup_bars();
    if series.len() < need {
        let what = strategy
            .required_indicators()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        return Err(BacktestError::InsufficientData {
            what,
            have: series.len(),
            need,
        });
    }

    let mut engine = Engine::new(strategy, config);
    for bar in series.bars() {
        engine.step(bar)?;
    }
    engine.finish(series)
}
