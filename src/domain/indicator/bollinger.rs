//! Bollinger Bands indicator.
//!
//! Bollinger Bands consist of:
//! - Middle: Simple Moving Average (SMA) over n periods
//! - Upper: Middle + (multiplier × StdDev)
//! - Lower: Middle - (multiplier × StdDev)
//!
//! Where StdDev is population standard deviation (divides by N, not N-1).
//!
//! Default parameters: period=20, multiplier=2.0
//! Warmup: not ready until `period` closes have been seen.

use super::stddev::RollingWindow;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

#[derive(Debug, Clone)]
pub struct Bollinger {
    window: RollingWindow,
    mult: f64,
}

impl Bollinger {
    pub fn new(period: usize, mult: f64) -> Self {
        Bollinger {
            window: RollingWindow::new(period),
            mult,
        }
    }

    pub fn update(&mut self, close: f64) {
        self.window.push(close);
    }

    pub fn value(&self) -> Option<Bands> {
        let middle = self.window.mean()?;
        let stddev = self.window.stddev()?;
        Some(Bands {
            upper: middle + self.mult * stddev,
            middle,
            lower: middle - self.mult * stddev,
        })
    }

    pub fn is_ready(&self) -> bool {
        self.window.is_full()
    }
}
