pub mod backtest;
pub mod error;
pub mod execution;
pub mod sweep;

pub use backtest::{run_backtest, BacktestConfig, BacktestEngine, BacktestResult, DecisionRecord};
pub use error::BacktestError;
pub use execution::{
    ExecutionEngine, ExecutionError, ExecutionReport, Fill, FillEffect, FillTiming, OrderSide,
    PositionSizing,
};
pub use sweep::{rank_by_sharpe, run_sweep, MacdGrid, SweepJob, SweepOutcome};
