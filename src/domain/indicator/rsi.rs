//! RSI (Relative Strength Index) indicator.
//!
//! Uses Wilder's smoothing for average gain/loss calculation:
//! - First average: simple mean of gains/losses over the first n changes
//! - Subsequent: avg = (prev_avg * (n-1) + current) / n
//!
//! Formula: RSI = 100 - (100 / (1 + avg_gain / avg_loss))
//! If avg_loss == 0: RSI = 100
//!
//! Warmup: n price changes are needed, so the value is ready after n+1 bars.

#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
    prev_close: Option<f64>,
    changes: usize,
    avg_gain: f64,
    avg_loss: f64,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        Rsi {
            period,
            prev_close: None,
            changes: 0,
            avg_gain: 0.0,
            avg_loss: 0.0,
        }
    }

    pub fn update(&mut self, close: f64) {
        let Some(prev) = self.prev_close.replace(close) else {
            return;
        };
        if self.period == 0 {
            return;
        }

        let change = close - prev;
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        self.changes += 1;

        let n = self.period as f64;
        if self.changes <= self.period {
            // Seed with the simple mean of the first n changes.
            self.avg_gain += gain / n;
            self.avg_loss += loss / n;
        } else {
            self.avg_gain = (self.avg_gain * (n - 1.0) + gain) / n;
            self.avg_loss = (self.avg_loss * (n - 1.0) + loss) / n;
        }
    }

    pub fn is_ready(&self) -> bool {
        self.period > 0 && self.changes >= self.period
    }

    pub fn value(&self) -> Option<f64> {
        if !self.is_ready() {
            return None;
        }
        if self.avg_loss == 0.0 {
            return Some(100.0);
        }
        Some(100.0 - (100.0 / (1.0 + self.avg_gain / self.avg_loss)))
    }
}
