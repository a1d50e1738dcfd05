use crate::data::BarError;
use crate::strategy::StrategyError;
use thiserror::Error;

/// Errors that stop a backtest.
///
/// Input errors are raised before the first bar is processed. A strategy
/// error aborts the run at the bar where it happened. Per-bar execution
/// problems are not here: see [`crate::engine::ExecutionError`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BacktestError {
    /// The series leaves no bar to decide on.
    ///
    /// Raised when `bars <= lookback`. A series of exactly `lookback` bars is
    /// refused as well as a shorter one, because the first decision is made
    /// on bar index `lookback` and such a run would produce an empty trace.
    #[error("Series has {bars} bars, need more than the lookback window of {lookback}")]
    EmptySeries { bars: usize, lookback: usize },

    #[error("Invalid bar data: {0}")]
    InvalidBar(#[from] BarError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Strategy failed at bar {bar_index}: {source}")]
    Strategy {
        bar_index: usize,
        #[source]
        source: StrategyError,
    },
}
