//a bar-by-bar strategy backtesting engine with a no-look-ahead guarantee

pub mod config;
pub mod data;
pub mod engine;
pub mod metrics;
pub mod portfolio;
pub mod report;
pub mod strategy;

//prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{
        BacktestConfiguration, MaCrossParams, MacdParams, StrategyParams, StrategyType,
    };
    pub use crate::data::{load_csv, load_series, Bar, BarSeries, CsvDataSource, DataRequest, DataSource};
    pub use crate::engine::{
        run_backtest, run_sweep, BacktestConfig, BacktestEngine, BacktestError, BacktestResult,
        DecisionRecord, ExecutionError, FillTiming, MacdGrid, PositionSizing, SweepJob,
    };
    pub use crate::metrics::{AnalyzerConfig, EquityPoint, SummaryMetrics};
    pub use crate::portfolio::{Account, Position, Side, TradeRecord};
    pub use crate::report::{write_equity_csv, write_summary_json, write_trades_csv, RunReport};
    pub use crate::strategy::{
        ma_cross::MaCrossStrategy, macd_histogram::MacdHistogramStrategy, Decision, Strategy,
        StrategyContext, StrategyError, StrategySetup,
    };
}
