//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use barback::prelude::*;
use chrono::{Duration, TimeZone, Utc};

pub const SYMBOL: &str = "TEST";

//one bar per day with open == close
pub fn series_from_closes(closes: &[f64]) -> BarSeries {
    series_from_prices(closes, closes)
}

pub fn series_from_prices(opens: &[f64], closes: &[f64]) -> BarSeries {
    let start = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    let bars = opens
        .iter()
        .zip(closes)
        .enumerate()
        .map(|(i, (&open, &close))| {
            Bar::new(
                start + Duration::days(i as i64),
                open,
                open.max(close) + 0.5,
                open.min(close) - 0.5,
                close,
                1_000.0 + i as f64 * 10.0,
                SYMBOL.to_string(),
            )
            .unwrap()
        })
        .collect();
    BarSeries::new(SYMBOL, bars).unwrap()
}

//deterministic pseudo-random walk, floored at 10
pub fn random_walk(n: usize, seed: u64) -> BarSeries {
    let mut state = seed.wrapping_mul(2_862_933_555_777_941_757).wrapping_add(3_037_000_493);
    let mut price = 100.0;
    let mut opens = Vec::with_capacity(n);
    let mut closes = Vec::with_capacity(n);

    for _ in 0..n {
        state = state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        let change = ((state >> 33) % 200) as f64 / 100.0 - 1.0;
        let open = price;
        price = (price + change * 2.0).max(10.0);
        opens.push(open);
        closes.push(price);
    }

    series_from_prices(&opens, &closes)
}

/// Replays a fixed decision per bar index; bars past the script hold.
pub struct Scripted {
    decisions: Vec<Decision>,
    lookback: usize,
    pub seen_bar_counts: Vec<usize>,
}

impl Scripted {
    pub fn new(decisions: Vec<Decision>) -> Self {
        Scripted {
            decisions,
            lookback: 0,
            seen_bar_counts: Vec::new(),
        }
    }

    pub fn with_lookback(mut self, lookback: usize) -> Self {
        self.lookback = lookback;
        self
    }
}

impl Strategy for Scripted {
    fn name(&self) -> &str {
        "Scripted"
    }

    fn min_lookback(&self) -> usize {
        self.lookback
    }

    fn initialize(&mut self, _setup: &StrategySetup) -> Result<(), StrategyError> {
        self.seen_bar_counts.clear();
        Ok(())
    }

    fn decide(&mut self, context: &StrategyContext<'_>) -> Result<Decision, StrategyError> {
        self.seen_bar_counts.push(context.bar_count());
        Ok(self
            .decisions
            .get(context.bar_index())
            .copied()
            .unwrap_or(Decision::Hold))
    }
}

pub fn config(initial_capital: f64) -> BacktestConfig {
    BacktestConfig {
        initial_capital,
        ..BacktestConfig::default()
    }
}
