//! Order lifecycle state machine.
//!
//! ```text
//! Pending -> Filled | Rejected | Canceled
//! ```
//!
//! Terminal states never transition again; attempting to do so is an
//! `InvalidOrderTransition` error.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::error::BacktestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        })
    }
}

/// A simulated execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub date: NaiveDate,
    pub bar_index: usize,
    pub price: f64,
    pub size: i64,
    pub commission: f64,
}

impl Fill {
    pub fn notional(&self) -> f64 {
        self.price * self.size as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    InsufficientCash,
    InsufficientHoldings,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RejectReason::InsufficientCash => "insufficient cash",
            RejectReason::InsufficientHoldings => "insufficient holdings",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OrderState {
    Pending,
    Filled(Fill),
    Rejected { reason: RejectReason },
    Canceled,
}

/// Fieldless view of [`OrderState`], used in errors and counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Filled,
    Rejected,
    Canceled,
}

impl OrderState {
    pub fn status(&self) -> OrderStatus {
        match self {
            OrderState::Pending => OrderStatus::Pending,
            OrderState::Filled(_) => OrderStatus::Filled,
            OrderState::Rejected { .. } => OrderStatus::Rejected,
            OrderState::Canceled => OrderStatus::Canceled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: u64,
    pub side: Side,
    pub size: i64,
    pub created_date: NaiveDate,
    pub created_bar: usize,
    pub state: OrderState,
}

impl Order {
    pub fn new(id: u64, side: Side, size: i64, created_date: NaiveDate, created_bar: usize) -> Self {
        Order {
            id,
            side,
            size,
            created_date,
            created_bar,
            state: OrderState::Pending,
        }
    }

    pub fn status(&self) -> OrderStatus {
        self.state.status()
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, OrderState::Pending)
    }

    pub fn fill(&mut self, fill: Fill) -> Result<(), BacktestError> {
        self.transition(OrderState::Filled(fill))
    }

    pub fn reject(&mut self, reason: RejectReason) -> Result<(), BacktestError> {
        self.transition(OrderState::Rejected { reason })
    }

    pub fn cancel(&mut self) -> Result<(), BacktestError> {
        self.transition(OrderState::Canceled)
    }

    fn transition(&mut self, next: OrderState) -> Result<(), BacktestError> {
        if !self.is_pending() {
            return Err(BacktestError::InvalidOrderTransition {
                id: self.id,
                from: self.status(),
            });
        }
        self.state = next;
        Ok(())
    }

    pub fn filled(&self) -> Option<&Fill> {
        match &self.state {
            OrderState::Filled(fill) => Some(fill),
            _ => None,
        }
    }
}
