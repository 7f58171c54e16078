//! Open position and closed round-trip records.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A long holding. Only the ledger mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub quantity: i64,
    /// Weighted average fill price of the shares still held.
    pub avg_cost: f64,
    /// Entry commission not yet attributed to a sale.
    pub entry_commission: f64,
    pub entry_date: NaiveDate,
    pub entry_bar: usize,
    // Round-trip accumulators, flushed into a Trade when flat again.
    pub(crate) bought_qty: i64,
    pub(crate) bought_value: f64,
    pub(crate) sold_qty: i64,
    pub(crate) sold_value: f64,
    pub(crate) gross_pnl: f64,
    pub(crate) commission: f64,
}

impl Position {
    pub fn open(
        quantity: i64,
        price: f64,
        commission: f64,
        entry_date: NaiveDate,
        entry_bar: usize,
    ) -> Self {
        Position {
            quantity,
            avg_cost: price,
            entry_commission: commission,
            entry_date,
            entry_bar,
            bought_qty: quantity,
            bought_value: price * quantity as f64,
            sold_qty: 0,
            sold_value: 0.0,
            gross_pnl: 0.0,
            commission,
        }
    }

    pub fn is_long(&self) -> bool {
        self.quantity > 0
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity as f64 * price
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.quantity as f64 * (price - self.avg_cost)
    }

    /// Fractional return of `price` against the average cost.
    pub fn return_at(&self, price: f64) -> f64 {
        if self.avg_cost > 0.0 {
            (price - self.avg_cost) / self.avg_cost
        } else {
            0.0
        }
    }
}

/// One completed round trip, flat to flat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    pub entry_bar: usize,
    pub exit_bar: usize,
    pub quantity: i64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub gross_pnl: f64,
    pub commission: f64,
    pub net_pnl: f64,
}

impl Trade {
    pub fn bars_held(&self) -> usize {
        self.exit_bar.saturating_sub(self.entry_bar)
    }

    pub fn return_pct(&self) -> f64 {
        let cost = self.entry_price * self.quantity as f64;
        if cost > 0.0 { self.net_pnl / cost } else { 0.0 }
    }
}
