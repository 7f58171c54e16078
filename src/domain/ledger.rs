//! Cash, holdings and equity tracking for a single run.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::error::BacktestError;
use super::ohlcv::OhlcvBar;
use super::order::{Fill, Side};
use super::position::{Position, Trade};

/// Mark-to-market state at the end of one bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub date: NaiveDate,
    pub bar_index: usize,
    pub cash: f64,
    pub position: i64,
    pub close: f64,
    pub equity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ledger {
    initial_cash: f64,
    cash: f64,
    position: Option<Position>,
    realized_pnl: f64,
    trades: Vec<Trade>,
    snapshots: Vec<LedgerSnapshot>,
}

impl Ledger {
    pub fn new(initial_cash: f64) -> Self {
        Ledger {
            initial_cash,
            cash: initial_cash,
            position: None,
            realized_pnl: 0.0,
            trades: Vec::new(),
            snapshots: Vec::new(),
        }
    }

    pub fn initial_cash(&self) -> f64 {
        self.initial_cash
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    /// Shares held; 0 when flat.
    pub fn held(&self) -> i64 {
        self.position.as_ref().map_or(0, |p| p.quantity)
    }

    pub fn realized_pnl(&self) -> f64 {
        self.realized_pnl
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn snapshots(&self) -> &[LedgerSnapshot] {
        &self.snapshots
    }

    pub fn equity(&self, price: f64) -> f64 {
        self.cash + self.position.as_ref().map_or(0.0, |p| p.market_value(price))
    }

    pub fn final_equity(&self) -> f64 {
        self.snapshots
            .last()
            .map_or(self.initial_cash, |s| s.equity)
    }

    /// Books a fill. Returns the closed trade when the fill brings the position
    /// back to flat.
    ///
    /// Buys update the weighted average cost. Sells realise
    /// `(fill - avg_cost) * size - exit commission - pro-rata entry commission`.
    pub fn apply_fill(&mut self, side: Side, fill: &Fill) -> Result<Option<Trade>, BacktestError> {
        match side {
            Side::Buy => self.apply_buy(fill).map(|_| None),
            Side::Sell => self.apply_sell(fill),
        }
    }

    fn apply_buy(&mut self, fill: &Fill) -> Result<(), BacktestError> {
        let total = fill.notional() + fill.commission;
        if total > self.cash {
            return Err(BacktestError::Ledger(format!(
                "buy of {} costs {total:.2} with {:.2} cash",
                fill.size, self.cash
            )));
        }
        self.cash -= total;

        match &mut self.position {
            None => {
                self.position = Some(Position::open(
                    fill.size,
                    fill.price,
                    fill.commission,
                    fill.date,
                    fill.bar_index,
                ));
            }
            Some(pos) => {
                let quantity = pos.quantity + fill.size;
                pos.avg_cost = (pos.avg_cost * pos.quantity as f64 + fill.notional()) / quantity as f64;
                pos.quantity = quantity;
                pos.entry_commission += fill.commission;
                pos.bought_qty += fill.size;
                pos.bought_value += fill.notional();
                pos.commission += fill.commission;
            }
        }
        Ok(())
    }

    fn apply_sell(&mut self, fill: &Fill) -> Result<Option<Trade>, BacktestError> {
        let held = self.held();
        let Some(pos) = self.position.as_mut().filter(|_| fill.size <= held) else {
            return Err(BacktestError::Ledger(format!(
                "sell of {} with {held} held",
                fill.size
            )));
        };

        let entry_share = pos.entry_commission * fill.size as f64 / pos.quantity as f64;
        let gross = (fill.price - pos.avg_cost) * fill.size as f64;
        self.realized_pnl += gross - fill.commission - entry_share;
        self.cash += fill.notional() - fill.commission;

        pos.entry_commission -= entry_share;
        pos.quantity -= fill.size;
        pos.sold_qty += fill.size;
        pos.sold_value += fill.notional();
        pos.gross_pnl += gross;
        pos.commission += fill.commission;

        if pos.quantity > 0 {
            return Ok(None);
        }

        let Some(closed) = self.position.take() else {
            return Ok(None);
        };
        let trade = Trade {
            entry_date: closed.entry_date,
            exit_date: fill.date,
            entry_bar: closed.entry_bar,
            exit_bar: fill.bar_index,
            quantity: closed.bought_qty,
            entry_price: closed.bought_value / closed.bought_qty as f64,
            exit_price: closed.sold_value / closed.sold_qty as f64,
            gross_pnl: closed.gross_pnl,
            commission: closed.commission,
            net_pnl: closed.gross_pnl - closed.commission,
        };
        self.trades.push(trade.clone());
        Ok(Some(trade))
    }

    /// Marks the ledger to `bar.close` and records the snapshot.
    pub fn snapshot(&mut self, bar: &OhlcvBar, bar_index: usize) -> &LedgerSnapshot {
        let equity = self.equity(bar.close);
        self.snapshots.push(LedgerSnapshot {
            date: bar.date,
            bar_index,
            cash: self.cash,
            position: self.held(),
            close: bar.close,
            equity,
        });
        &self.snapshots[self.snapshots.len() - 1]
    }
}
