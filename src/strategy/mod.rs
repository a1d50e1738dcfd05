pub mod indicators;
pub mod ma_cross;
pub mod macd_histogram;

use crate::data::Bar;
use crate::portfolio::Position;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What a strategy wants done on the current bar.
///
/// Sizes are whole units. `None` defers to the configured position sizing
/// when the order opens exposure, and means "the whole position" when it
/// reduces one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Hold,
    Buy(Option<u64>),
    Sell(Option<u64>),
    Close,
}

impl Decision {
    pub fn buy() -> Self {
        Decision::Buy(None)
    }

    pub fn buy_qty(qty: u64) -> Self {
        Decision::Buy(Some(qty))
    }

    pub fn sell() -> Self {
        Decision::Sell(None)
    }

    pub fn sell_qty(qty: u64) -> Self {
        Decision::Sell(Some(qty))
    }

    pub fn is_hold(&self) -> bool {
        matches!(self, Decision::Hold)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StrategyError {
    #[error("Invalid strategy parameter: {0}")]
    InvalidParameter(String),
    #[error("Strategy failed: {0}")]
    Failed(String),
}

//run facts handed to a strategy once before the first bar
#[derive(Debug, Clone, PartialEq)]
pub struct StrategySetup {
    pub symbol: String,
    pub initial_capital: f64,
    pub lookback_window: usize,
}

/// Strategy interface that all strategies must implement.
///
/// `decide` is called once per eligible bar, in bar order, and may only
/// look at the context it is given and its own fields. The context never
/// contains bars past the current one.
pub trait Strategy: Send {
    //returns the strategy name
    fn name(&self) -> &str;

    //bars that must precede the first decision
    fn min_lookback(&self) -> usize;

    //called once before the first bar; resets internal state
    fn initialize(&mut self, setup: &StrategySetup) -> Result<(), StrategyError>;

    //called on each eligible bar
    fn decide(&mut self, context: &StrategyContext<'_>) -> Result<Decision, StrategyError>;
}

/// Read-only view of the run at the current bar.
///
/// `bars` ends at the current bar. The position and cash are a snapshot
/// taken before this bar's decision is applied.
#[derive(Debug, Clone, Copy)]
pub struct StrategyContext<'a> {
    symbol: &'a str,
    bars: &'a [Bar],
    position: &'a Position,
    cash: f64,
}

impl<'a> StrategyContext<'a> {
    pub fn new(symbol: &'a str, bars: &'a [Bar], position: &'a Position, cash: f64) -> Self {
        StrategyContext {
            symbol,
            bars,
            position,
            cash,
        }
    }

    pub fn symbol(&self) -> &str {
        self.symbol
    }

    //index of the current bar in the series
    pub fn bar_index(&self) -> usize {
        self.bars.len().saturating_sub(1)
    }

    //returns the last n bars (oldest first)
    pub fn get_bars(&self, n: usize) -> &'a [Bar] {
        let start = self.bars.len().saturating_sub(n);
        &self.bars[start..]
    }

    //returns all available bars
    pub fn get_all_bars(&self) -> &'a [Bar] {
        self.bars
    }

    //returns the most recent bar
    pub fn last_bar(&self) -> Option<&'a Bar> {
        self.bars.last()
    }

    //returns the close prices for the last n bars
    pub fn get_close_prices(&self, n: usize) -> Vec<f64> {
        self.get_bars(n).iter().map(|b| b.close).collect()
    }

    //returns the current position
    pub fn current_position(&self) -> &'a Position {
        self.position
    }

    //returns the current cash balance
    pub fn cash(&self) -> f64 {
        self.cash
    }

    //returns the number of bars in history
    pub fn bar_count(&self) -> usize {
        self.bars.len()
    }
}

//helper function to calculate simple moving average
pub fn sma(prices: &[f64]) -> Option<f64> {
    if prices.is_empty() {
        return None;
    }
    Some(prices.iter().sum::<f64>() / prices.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sma_of_window() {
        assert_eq!(sma(&[]), None);
        assert_eq!(sma(&[1.0, 2.0, 3.0]), Some(2.0));
    }

    #[test]
    fn decision_constructors() {
        assert_eq!(Decision::buy(), Decision::Buy(None));
        assert_eq!(Decision::sell_qty(3), Decision::Sell(Some(3)));
        assert!(Decision::Hold.is_hold());
        assert!(!Decision::Close.is_hold());
    }
}
