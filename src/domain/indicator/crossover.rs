//! Crossover of a fast SMA over a slow SMA.
//!
//! +1 on the bar where fast moves from <= slow to > slow, -1 on the bar where it
//! moves from > slow to <= slow, 0 otherwise. The first bar on which both averages
//! are ready has no previous relation to compare against and reports 0.

use super::sma::Sma;

#[derive(Debug, Clone)]
pub struct Crossover {
    fast: Sma,
    slow: Sma,
    prev_above: Option<bool>,
    signal: i8,
}

impl Crossover {
    pub fn new(fast: usize, slow: usize) -> Self {
        Crossover {
            fast: Sma::new(fast),
            slow: Sma::new(slow),
            prev_above: None,
            signal: 0,
        }
    }

    pub fn update(&mut self, close: f64) {
        self.fast.update(close);
        self.slow.update(close);

        let (Some(fast), Some(slow)) = (self.fast.value(), self.slow.value()) else {
            self.signal = 0;
            return;
        };
        let above = fast > slow;
        self.signal = match self.prev_above {
            Some(false) if above => 1,
            Some(true) if !above => -1,
            _ => 0,
        };
        self.prev_above = Some(above);
    }

    pub fn is_ready(&self) -> bool {
        self.fast.is_ready() && self.slow.is_ready()
    }

    pub fn value(&self) -> Option<i8> {
        self.is_ready().then_some(self.signal)
    }
}
