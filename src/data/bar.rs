use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BarError {
    #[error("Non-finite OHLCV value in bar at {0}")]
    NonFinite(DateTime<Utc>),
    #[error("Non-positive price in bar at {timestamp}: {price}")]
    NonPositivePrice { timestamp: DateTime<Utc>, price: f64 },
    #[error("Invalid OHLC values: high ({high}) < low ({low})")]
    InvalidHighLow { high: f64, low: f64 },
    #[error("Invalid OHLC values: close ({close}) outside high-low range [{low}, {high}]")]
    InvalidClose { close: f64, high: f64, low: f64 },
    #[error("Invalid OHLC values: open ({open}) outside high-low range [{low}, {high}]")]
    InvalidOpen { open: f64, high: f64, low: f64 },
    #[error("Negative volume: {0}")]
    NegativeVolume(f64),
    #[error("Bar {index} at {current} does not follow previous bar at {previous}")]
    NotIncreasing {
        index: usize,
        previous: DateTime<Utc>,
        current: DateTime<Utc>,
    },
    #[error("Bar {index} has symbol '{found}', series is '{expected}'")]
    SymbolMismatch {
        index: usize,
        expected: String,
        found: String,
    },
}

//represents a single ohlcv bar of market data
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub symbol: String,
}

impl Bar {
    //creates a new Bar with validation
    pub fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
        symbol: String,
    ) -> Result<Self, BarError> {
        let bar = Self::new_unchecked(timestamp, open, high, low, close, volume, symbol);
        bar.validate()?;
        Ok(bar)
    }

    //creates a Bar without validation
    pub fn new_unchecked(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
        symbol: String,
    ) -> Self {
        Bar {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
            symbol,
        }
    }

    //checks the ohlcv invariants of a single bar
    pub fn validate(&self) -> Result<(), BarError> {
        let values = [self.open, self.high, self.low, self.close, self.volume];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(BarError::NonFinite(self.timestamp));
        }

        for price in [self.open, self.high, self.low, self.close] {
            if price <= 0.0 {
                return Err(BarError::NonPositivePrice {
                    timestamp: self.timestamp,
                    price,
                });
            }
        }

        //validate high >= low
        if self.high < self.low {
            return Err(BarError::InvalidHighLow {
                high: self.high,
                low: self.low,
            });
        }

        //validate close within [low, high]
        if self.close < self.low || self.close > self.high {
            return Err(BarError::InvalidClose {
                close: self.close,
                high: self.high,
                low: self.low,
            });
        }

        //validate open within [low, high]
        if self.open < self.low || self.open > self.high {
            return Err(BarError::InvalidOpen {
                open: self.open,
                high: self.high,
                low: self.low,
            });
        }

        if self.volume < 0.0 {
            return Err(BarError::NegativeVolume(self.volume));
        }

        Ok(())
    }
}

/// Validated, time-ascending bars for one instrument.
///
/// Fields are private so a `BarSeries` can only exist in its validated
/// form. Engines borrow it; nothing ever mutates it after construction,
/// so one series can back any number of concurrent runs.
#[derive(Debug, Clone, PartialEq)]
pub struct BarSeries {
    symbol: String,
    bars: Vec<Bar>,
}

impl BarSeries {
    //validates every bar and the strict timestamp ordering
    pub fn new(symbol: impl Into<String>, bars: Vec<Bar>) -> Result<Self, BarError> {
        let symbol = symbol.into();

        for (index, bar) in bars.iter().enumerate() {
            bar.validate()?;

            if bar.symbol != symbol {
                return Err(BarError::SymbolMismatch {
                    index,
                    expected: symbol,
                    found: bar.symbol.clone(),
                });
            }

            if index > 0 {
                let previous = bars[index - 1].timestamp;
                if bar.timestamp <= previous {
                    return Err(BarError::NotIncreasing {
                        index,
                        previous,
                        current: bar.timestamp,
                    });
                }
            }
        }

        Ok(BarSeries { symbol, bars })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first(&self) -> Option<&Bar> {
        self.bars.first()
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    //returns a new series holding only the first `len` bars
    pub fn truncated(&self, len: usize) -> BarSeries {
        BarSeries {
            symbol: self.symbol.clone(),
            bars: self.bars[..len.min(self.bars.len())].to_vec(),
        }
    }

    pub fn into_bars(self) -> Vec<Bar> {
        self.bars
    }
}
