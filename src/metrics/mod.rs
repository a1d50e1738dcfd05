pub mod summary;
pub mod timeseries;

pub use summary::{AnalyzerConfig, SummaryMetrics};
pub use timeseries::{calculate_returns, drawdown_series, equity_values, max_drawdown, EquityPoint};
