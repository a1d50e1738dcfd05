use crate::engine::{BacktestConfig, FillTiming, PositionSizing};
use crate::metrics::AnalyzerConfig;
use crate::strategy::{
    ma_cross::MaCrossStrategy, macd_histogram::MacdHistogramStrategy, Strategy,
};
use anyhow::Context;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

//strategy type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyType {
    MacdHistogram,
    MaCross,
}

impl StrategyType {
    //parse strategy type from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "macd" | "macd_histogram" => Some(StrategyType::MacdHistogram),
            "ma" | "sma" | "ma_cross" => Some(StrategyType::MaCross),
            _ => None,
        }
    }

    pub fn default_params(&self) -> StrategyParams {
        match self {
            StrategyType::MacdHistogram => StrategyParams::Macd(MacdParams::default()),
            StrategyType::MaCross => StrategyParams::MaCross(MaCrossParams::default()),
        }
    }
}

//macd histogram strategy parameters
//the optional filters are off by default, leaving the plain histogram flip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MacdParams {
    pub fast_period: usize,
    pub slow_period: usize,
    pub signal_period: usize,
    pub threshold: f64,
    pub trend_ema_period: Option<usize>,
    pub volume_ma_period: Option<usize>,
    pub volume_factor: f64,
    pub require_macd_above_zero: bool,
    pub take_profit_pct: Option<f64>,
    pub stop_loss_pct: Option<f64>,
    //fixed order size; None defers to the engine's position sizing
    pub qty: Option<u64>,
}

impl Default for MacdParams {
    fn default() -> Self {
        MacdParams {
            fast_period: 12,
            slow_period: 26,
            signal_period: 9,
            threshold: 0.0,
            trend_ema_period: None,
            volume_ma_period: None,
            volume_factor: 1.2,
            require_macd_above_zero: false,
            take_profit_pct: None,
            stop_loss_pct: None,
            qty: None,
        }
    }
}

impl MacdParams {
    //trend, volume and zero-line filters with 15% take-profit and 7% stop-loss
    pub fn filtered() -> Self {
        MacdParams {
            trend_ema_period: Some(60),
            volume_ma_period: Some(20),
            require_macd_above_zero: true,
            take_profit_pct: Some(0.15),
            stop_loss_pct: Some(0.07),
            ..MacdParams::default()
        }
    }
}

//moving average crossover strategy parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaCrossParams {
    pub short_period: usize,
    pub long_period: usize,
    pub qty: Option<u64>,
}

impl Default for MaCrossParams {
    fn default() -> Self {
        MaCrossParams {
            short_period: 20,
            long_period: 50,
            qty: None,
        }
    }
}

//strategy-specific parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StrategyParams {
    Macd(MacdParams),
    MaCross(MaCrossParams),
}

impl StrategyParams {
    pub fn strategy_type(&self) -> StrategyType {
        match self {
            StrategyParams::Macd(_) => StrategyType::MacdHistogram,
            StrategyParams::MaCross(_) => StrategyType::MaCross,
        }
    }

    //builds a fresh strategy instance
    pub fn build(&self) -> Box<dyn Strategy> {
        match self {
            StrategyParams::Macd(p) => Box::new(MacdHistogramStrategy::new(p.clone())),
            StrategyParams::MaCross(p) => Box::new(MaCrossStrategy::new(p.clone())),
        }
    }

    //short human-readable parameter summary
    pub fn describe(&self) -> String {
        match self {
            StrategyParams::Macd(p) => format!(
                "MACD Histogram (fast={}, slow={}, signal={})",
                p.fast_period, p.slow_period, p.signal_period
            ),
            StrategyParams::MaCross(p) => format!(
                "MA Crossover (short={}, long={})",
                p.short_period, p.long_period
            ),
        }
    }
}

impl Default for StrategyParams {
    fn default() -> Self {
        StrategyParams::Macd(MacdParams::default())
    }
}

//share of cash committed per entry by the filtered preset
pub const FILTERED_ENTRY_FRACTION: f64 = 0.95;

/// Complete run configuration, as read from a JSON file.
///
/// Every field has a default, so a file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfiguration {
    //data
    pub data_path: PathBuf,
    pub symbol: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,

    //account and execution
    pub initial_capital: f64,
    pub transaction_cost: f64,
    pub allow_short: bool,
    pub allow_margin: bool,
    pub position_sizing: PositionSizing,
    pub lookback_window: Option<usize>,
    pub fill_timing: FillTiming,
    pub liquidate_at_end: bool,

    //strategy
    pub strategy: StrategyParams,

    //statistics
    pub analyzer: AnalyzerConfig,

    //optional output paths
    pub output_equity_csv: Option<PathBuf>,
    pub output_trades_csv: Option<PathBuf>,
    pub output_summary_json: Option<PathBuf>,
}

impl Default for BacktestConfiguration {
    fn default() -> Self {
        let engine = BacktestConfig::default();
        BacktestConfiguration {
            data_path: PathBuf::from("data.csv"),
            symbol: "SPY".to_string(),
            start_date: None,
            end_date: None,
            initial_capital: engine.initial_capital,
            transaction_cost: engine.transaction_cost,
            allow_short: engine.allow_short,
            allow_margin: engine.allow_margin,
            position_sizing: engine.position_sizing,
            lookback_window: engine.lookback_window,
            fill_timing: engine.fill_timing,
            liquidate_at_end: engine.liquidate_at_end,
            strategy: StrategyParams::default(),
            analyzer: AnalyzerConfig::default(),
            output_equity_csv: None,
            output_trades_csv: None,
            output_summary_json: None,
        }
    }
}

impl BacktestConfiguration {
    //engine options of this run
    pub fn backtest_config(&self) -> BacktestConfig {
        BacktestConfig {
            initial_capital: self.initial_capital,
            transaction_cost: self.transaction_cost,
            allow_short: self.allow_short,
            allow_margin: self.allow_margin,
            position_sizing: self.position_sizing,
            lookback_window: self.lookback_window,
            fill_timing: self.fill_timing,
            liquidate_at_end: self.liquidate_at_end,
        }
    }

    /// Switches a MACD run to [`MacdParams::filtered`].
    ///
    /// The configured periods and order size are kept. Entries are sized at
    /// 95% of cash; an explicit sizing choice should be applied afterwards.
    /// Other strategies are left unchanged.
    pub fn apply_filtered_preset(&mut self) {
        if let StrategyParams::Macd(params) = &mut self.strategy {
            *params = MacdParams {
                fast_period: params.fast_period,
                slow_period: params.slow_period,
                signal_period: params.signal_period,
                qty: params.qty,
                ..MacdParams::filtered()
            };
            self.position_sizing = PositionSizing::FractionOfCapital {
                fraction: FILTERED_ENTRY_FRACTION,
            };
        }
    }

    //load configuration from a JSON file
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .context(format!("Failed to read config file {:?}", path))?;
        let config: BacktestConfiguration = serde_json::from_str(&contents)
            .context(format!("Failed to parse config file {:?}", path))?;
        Ok(config)
    }

    //save configuration to a JSON file
    pub fn to_json_file(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).context(format!("Failed to write config file {:?}", path))?;
        Ok(())
    }
}
