//! Rolling window statistics over the last n closes.
//!
//! Keeps a running sum and sum of squares so each push is O(1). The sums are
//! rebuilt from the buffer once per full window turnover to stop floating-point
//! drift from accumulating over multi-year series.
//!
//! STDDEV(n) is the population standard deviation: sqrt(sum((x - mean)^2) / n).

use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct RollingWindow {
    period: usize,
    values: VecDeque<f64>,
    sum: f64,
    sum_sq: f64,
    evictions: usize,
}

impl RollingWindow {
    pub fn new(period: usize) -> Self {
        RollingWindow {
            period,
            values: VecDeque::with_capacity(period + 1),
            sum: 0.0,
            sum_sq: 0.0,
            evictions: 0,
        }
    }

    pub fn push(&mut self, value: f64) {
        self.values.push_back(value);
        self.sum += value;
        self.sum_sq += value * value;

        if self.values.len() > self.period {
            if let Some(old) = self.values.pop_front() {
                self.sum -= old;
                self.sum_sq -= old * old;
            }
            self.evictions += 1;
            if self.evictions >= self.period {
                self.resync();
            }
        }
    }

    fn resync(&mut self) {
        self.sum = self.values.iter().sum();
        self.sum_sq = self.values.iter().map(|v| v * v).sum();
        self.evictions = 0;
    }

    pub fn period(&self) -> usize {
        self.period
    }

    pub fn is_full(&self) -> bool {
        self.period > 0 && self.values.len() == self.period
    }

    pub fn mean(&self) -> Option<f64> {
        self.is_full().then(|| self.sum / self.period as f64)
    }

    pub fn stddev(&self) -> Option<f64> {
        let mean = self.mean()?;
        let variance = (self.sum_sq / self.period as f64 - mean * mean).max(0.0);
        Some(variance.sqrt())
    }
}
