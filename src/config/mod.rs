pub mod backtest_config;

pub use backtest_config::{
    BacktestConfiguration, MaCrossParams, MacdParams, StrategyParams, StrategyType,
};
