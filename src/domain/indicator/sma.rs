//! Simple moving average of closes.
//!
//! SMA(n) = mean of the last n closes. Not ready until n bars have been seen.

use super::stddev::RollingWindow;

#[derive(Debug, Clone)]
pub struct Sma {
    window: RollingWindow,
}

impl Sma {
    pub fn new(period: usize) -> Self {
        Sma {
            window: RollingWindow::new(period),
        }
    }

    pub fn update(&mut self, close: f64) {
        self.window.push(close);
    }

    pub fn value(&self) -> Option<f64> {
        self.window.mean()
    }

    pub fn is_ready(&self) -> bool {
        self.window.is_full()
    }
}
