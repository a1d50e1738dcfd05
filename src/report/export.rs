use crate::config::StrategyParams;
use crate::engine::{BacktestConfig, BacktestResult};
use crate::metrics::{drawdown_series, equity_values, EquityPoint, SummaryMetrics};
use crate::portfolio::{Side, TradeRecord};
use anyhow::{Context, Result};
use csv::WriterBuilder;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Serialize)]
struct EquityRow {
    timestamp: String,
    equity: f64,
    cash: f64,
    position_qty: i64,
    realized_pnl: f64,
    costs: f64,
    unrealized_pnl: f64,
    drawdown: f64,
}

#[derive(Debug, Serialize)]
struct TradeRow {
    status: &'static str,
    side: Side,
    quantity: u64,
    entry_time: String,
    entry_price: f64,
    exit_time: Option<String>,
    exit_price: Option<f64>,
    realized_pnl: Option<f64>,
    costs: f64,
}

impl TradeRow {
    fn from_trade(trade: &TradeRecord) -> Self {
        TradeRow {
            status: if trade.is_closed() { "closed" } else { "open" },
            side: trade.side,
            quantity: trade.quantity,
            entry_time: trade.entry_time.to_rfc3339(),
            entry_price: trade.entry_price,
            exit_time: trade.exit_time.map(|t| t.to_rfc3339()),
            exit_price: trade.exit_price,
            realized_pnl: trade.realized_pnl,
            costs: trade.costs,
        }
    }
}

//writes the equity curve, with the drawdown at each point, to a csv file
pub fn write_equity_csv<P: AsRef<Path>>(equity_curve: &[EquityPoint], path: P) -> Result<()> {
    let path = path.as_ref();
    let mut writer = WriterBuilder::new()
        .has_headers(true)
        .from_path(path)
        .context(format!("Failed to create CSV file: {:?}", path))?;

    let drawdowns = drawdown_series(&equity_values(equity_curve));
    for (point, drawdown) in equity_curve.iter().zip(drawdowns) {
        writer.serialize(EquityRow {
            timestamp: point.timestamp.to_rfc3339(),
            equity: point.equity,
            cash: point.cash,
            position_qty: point.position_qty,
            realized_pnl: point.realized_pnl,
            costs: point.costs,
            unrealized_pnl: point.unrealized_pnl,
            drawdown,
        })?;
    }

    writer.flush()?;
    Ok(())
}

//writes closed trades, then the open one if any, to a csv file
pub fn write_trades_csv<P: AsRef<Path>>(
    trades: &[TradeRecord],
    open_trade: Option<&TradeRecord>,
    path: P,
) -> Result<()> {
    let path = path.as_ref();
    let mut writer = WriterBuilder::new()
        .has_headers(true)
        .from_path(path)
        .context(format!("Failed to create CSV file: {:?}", path))?;

    for trade in trades.iter().chain(open_trade) {
        writer.serialize(TradeRow::from_trade(trade))?;
    }

    writer.flush()?;
    Ok(())
}

/// Everything a reader needs to reproduce and judge one run.
///
/// Field names are stable: money in account currency, returns and
/// drawdown as fractions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub symbol: String,
    pub strategy: String,
    pub strategy_params: Option<StrategyParams>,
    pub config: BacktestConfig,
    pub bars_processed: usize,
    pub first_timestamp: Option<String>,
    pub last_timestamp: Option<String>,
    pub metrics: SummaryMetrics,
    pub open_trade: Option<TradeRecord>,
}

impl RunReport {
    pub fn new(
        result: &BacktestResult,
        config: &BacktestConfig,
        strategy_params: Option<StrategyParams>,
        metrics: SummaryMetrics,
    ) -> Self {
        RunReport {
            symbol: result.symbol.clone(),
            strategy: result.strategy_name.clone(),
            strategy_params,
            config: config.clone(),
            bars_processed: result.equity_curve.len(),
            first_timestamp: result.equity_curve.first().map(|p| p.timestamp.to_rfc3339()),
            last_timestamp: result.equity_curve.last().map(|p| p.timestamp.to_rfc3339()),
            metrics,
            open_trade: result.open_trade.clone(),
        }
    }
}

//writes a run report as pretty json
pub fn write_summary_json<P: AsRef<Path>>(report: &RunReport, path: P) -> Result<()> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json).context(format!("Failed to write summary file {:?}", path))?;
    Ok(())
}
