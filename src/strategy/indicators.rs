//! Streaming indicators.
//!
//! Each indicator is fed one value per bar and yields `None` until it has
//! seen enough values. Feeding the same values always yields the same
//! outputs, so a strategy can rebuild its state from bar 0 at any time.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Exponential moving average seeded with the SMA of the first `period` values.
///
/// EMA[t] = alpha * x[t] + (1 - alpha) * EMA[t-1], alpha = 2 / (period + 1).
#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
    alpha: f64,
    seed_sum: f64,
    seen: usize,
    value: Option<f64>,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Ema {
            period,
            alpha: 2.0 / (period as f64 + 1.0),
            seed_sum: 0.0,
            seen: 0,
            value: None,
        }
    }

    pub fn update(&mut self, x: f64) -> Option<f64> {
        self.seen += 1;
        self.value = match self.value {
            Some(prev) => Some(self.alpha * x + (1.0 - self.alpha) * prev),
            None => {
                self.seed_sum += x;
                if self.seen == self.period {
                    Some(self.seed_sum / self.period as f64)
                } else {
                    None
                }
            }
        };
        self.value
    }

    //values needed before the first output, minus one
    pub fn lookback(&self) -> usize {
        self.period - 1
    }
}

//simple moving average over a sliding window
#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
    window: VecDeque<f64>,
    sum: f64,
}

impl Sma {
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Sma {
            period,
            window: VecDeque::with_capacity(period),
            sum: 0.0,
        }
    }

    pub fn update(&mut self, x: f64) -> Option<f64> {
        self.window.push_back(x);
        self.sum += x;
        if self.window.len() > self.period {
            if let Some(old) = self.window.pop_front() {
                self.sum -= old;
            }
        }
        self.value()
    }

    pub fn value(&self) -> Option<f64> {
        if self.window.len() == self.period {
            Some(self.sum / self.period as f64)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MacdValue {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// MACD line (fast EMA - slow EMA), its signal EMA and the histogram.
///
/// The histogram first appears after `slow + signal - 1` values.
#[derive(Debug, Clone)]
pub struct Macd {
    fast: Ema,
    slow: Ema,
    signal: Ema,
}

impl Macd {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        Macd {
            fast: Ema::new(fast),
            slow: Ema::new(slow),
            signal: Ema::new(signal),
        }
    }

    pub fn update(&mut self, close: f64) -> Option<MacdValue> {
        let fast = self.fast.update(close);
        let slow = self.slow.update(close);

        let macd = match (fast, slow) {
            (Some(f), Some(s)) => f - s,
            _ => return None,
        };

        let signal = self.signal.update(macd)?;
        Some(MacdValue {
            macd,
            signal,
            histogram: macd - signal,
        })
    }

    //index of the first bar with a histogram value
    pub fn lookback(&self) -> usize {
        self.fast.lookback().max(self.slow.lookback()) + self.signal.lookback()
    }
}

//batch helper: one MACD output per close
pub fn macd_series(closes: &[f64], fast: usize, slow: usize, signal: usize) -> Vec<Option<MacdValue>> {
    let mut macd = Macd::new(fast, slow, signal);
    closes.iter().map(|&c| macd.update(c)).collect()
}
