use crate::metrics::timeseries::{calculate_returns, equity_values, max_drawdown, EquityPoint};
use crate::portfolio::TradeRecord;
use indexmap::IndexMap;
use prettytable::{Cell, Row, Table};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

const DAYS_PER_YEAR: f64 = 365.25;

//how per-period statistics are annualised
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    //equity points per year (252 for daily bars)
    pub periods_per_year: f64,
    //annual risk-free rate subtracted in sharpe and sortino
    pub risk_free_rate: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        AnalyzerConfig {
            periods_per_year: 252.0,
            risk_free_rate: 0.0,
        }
    }
}

/// Statistics derived from an execution trace.
///
/// Units: returns, drawdown, volatility, rates and exposure are fractions
/// (0.05 = 5%); money fields are in account currency. Drawdown is reported
/// as a positive fraction of the running peak, in `[0, 1]`. Ratios that are
/// undefined for the trace (no variance, no trades) are 0, except
/// `profit_factor`, which is `None` when there are no losing trades.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryMetrics {
    pub initial_capital: f64,
    pub final_equity: f64,
    pub total_return: f64,
    pub annualized_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown: f64,
    pub num_trades: usize,
    pub num_winning_trades: usize,
    pub num_losing_trades: usize,
    pub win_rate: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub profit_factor: Option<f64>,
    pub exposure: f64,
    pub period_win_rate: f64,
    pub total_costs: f64,
    pub unrealized_pnl: f64,
    pub periods: usize,
}

impl SummaryMetrics {
    //calculate summary metrics from the equity curve and trade log alone
    pub fn from_trace(
        equity_curve: &[EquityPoint],
        trades: &[TradeRecord],
        initial_capital: f64,
        config: &AnalyzerConfig,
    ) -> Self {
        let last = equity_curve.last();
        let final_equity = last.map(|p| p.equity).unwrap_or(initial_capital);
        let total_return = if initial_capital > 0.0 {
            final_equity / initial_capital - 1.0
        } else {
            0.0
        };

        let annualized_return = annualize(equity_curve, total_return);

        let values = equity_values(equity_curve);
        let returns = period_returns(initial_capital, &values);
        let ppy = config.periods_per_year;
        let rf_per_period = config.risk_free_rate / ppy;

        let volatility = if returns.len() >= 2 {
            returns.as_slice().std_dev() * ppy.sqrt()
        } else {
            0.0
        };

        let trade_stats = calculate_trade_statistics(trades);

        SummaryMetrics {
            initial_capital,
            final_equity,
            total_return,
            annualized_return,
            volatility,
            sharpe_ratio: calculate_sharpe_ratio(&returns, rf_per_period, ppy),
            sortino_ratio: calculate_sortino_ratio(&returns, rf_per_period, ppy),
            max_drawdown: max_drawdown(&values),
            num_trades: trade_stats.num_trades,
            num_winning_trades: trade_stats.num_winning_trades,
            num_losing_trades: trade_stats.num_losing_trades,
            win_rate: trade_stats.win_rate,
            avg_win: trade_stats.avg_win,
            avg_loss: trade_stats.avg_loss,
            largest_win: trade_stats.largest_win,
            largest_loss: trade_stats.largest_loss,
            profit_factor: trade_stats.profit_factor,
            exposure: calculate_exposure(equity_curve),
            period_win_rate: calculate_period_win_rate(&returns),
            total_costs: last.map(|p| p.costs).unwrap_or(0.0),
            unrealized_pnl: last.map(|p| p.unrealized_pnl).unwrap_or(0.0),
            periods: equity_curve.len(),
        }
    }

    //labelled, display-formatted metrics in a fixed order
    pub fn to_rows(&self) -> IndexMap<&'static str, String> {
        let mut rows = IndexMap::new();
        rows.insert("Initial Capital", format!("${:.2}", self.initial_capital));
        rows.insert("Final Equity", format!("${:.2}", self.final_equity));
        rows.insert("Total Return", format!("{:.2}%", self.total_return * 100.0));
        rows.insert(
            "Annualized Return",
            format!("{:.2}%", self.annualized_return * 100.0),
        );
        rows.insert("Volatility", format!("{:.2}%", self.volatility * 100.0));
        rows.insert("Max Drawdown", format!("{:.2}%", self.max_drawdown * 100.0));
        rows.insert("Sharpe Ratio", format!("{:.3}", self.sharpe_ratio));
        rows.insert("Sortino Ratio", format!("{:.3}", self.sortino_ratio));
        rows.insert("Number of Trades", self.num_trades.to_string());
        rows.insert("Win Rate", format!("{:.2}%", self.win_rate * 100.0));
        rows.insert("Avg Win", format!("${:.2}", self.avg_win));
        rows.insert("Avg Loss", format!("${:.2}", self.avg_loss));
        rows.insert("Largest Win", format!("${:.2}", self.largest_win));
        rows.insert("Largest Loss", format!("${:.2}", self.largest_loss));
        rows.insert(
            "Profit Factor",
            self.profit_factor
                .map(|pf| format!("{:.3}", pf))
                .unwrap_or_else(|| "n/a".to_string()),
        );
        rows.insert("Exposure", format!("{:.2}%", self.exposure * 100.0));
        rows.insert(
            "Period Win Rate",
            format!("{:.2}%", self.period_win_rate * 100.0),
        );
        rows.insert("Total Costs", format!("${:.2}", self.total_costs));
        rows.insert("Unrealized P&L", format!("${:.2}", self.unrealized_pnl));
        rows
    }

    //prints metrics in a formatted table
    pub fn pretty_print_table(&self) {
        let mut table = Table::new();

        table.add_row(Row::new(vec![Cell::new("Metric"), Cell::new("Value")]));
        for (label, value) in self.to_rows() {
            table.add_row(Row::new(vec![Cell::new(label), Cell::new(&value)]));
        }

        table.printstd();
    }
}

//per-period returns, the first one measured from the starting capital
fn period_returns(initial_capital: f64, values: &[f64]) -> Vec<f64> {
    if values.is_empty() || initial_capital <= 0.0 {
        return calculate_returns(values);
    }
    let mut with_start = Vec::with_capacity(values.len() + 1);
    with_start.push(initial_capital);
    with_start.extend_from_slice(values);
    calculate_returns(&with_start)
}

//compounds the total return over the calendar span of the curve to one year
fn annualize(equity_curve: &[EquityPoint], total_return: f64) -> f64 {
    let (first, last) = match (equity_curve.first(), equity_curve.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return 0.0,
    };

    let days = (last.timestamp - first.timestamp).num_seconds() as f64 / 86_400.0;
    let years = days / DAYS_PER_YEAR;
    if years <= 0.0 {
        return 0.0;
    }

    let growth = 1.0 + total_return;
    if growth <= 0.0 {
        return -1.0;
    }
    growth.powf(1.0 / years) - 1.0
}

struct TradeStats {
    num_trades: usize,
    num_winning_trades: usize,
    num_losing_trades: usize,
    win_rate: f64,
    avg_win: f64,
    avg_loss: f64,
    profit_factor: Option<f64>,
    largest_win: f64,
    largest_loss: f64,
}

fn calculate_trade_statistics(trades: &[TradeRecord]) -> TradeStats {
    let closed: Vec<&TradeRecord> = trades.iter().filter(|t| t.is_closed()).collect();

    let (winners, others): (Vec<&TradeRecord>, Vec<&TradeRecord>) =
        closed.iter().copied().partition(|t| t.is_win());
    let winning_trades: Vec<f64> = winners.iter().filter_map(|t| t.realized_pnl).collect();
    let losing_trades: Vec<f64> = others
        .iter()
        .filter_map(|t| t.realized_pnl)
        .filter(|&pnl| pnl < 0.0)
        .collect();

    let num_winning = winning_trades.len();
    let num_losing = losing_trades.len();
    let total = closed.len();

    let win_rate = if total > 0 {
        num_winning as f64 / total as f64
    } else {
        0.0
    };

    let avg_win = if num_winning > 0 {
        winning_trades.iter().sum::<f64>() / num_winning as f64
    } else {
        0.0
    };

    let avg_loss = if num_losing > 0 {
        losing_trades.iter().sum::<f64>() / num_losing as f64
    } else {
        0.0
    };

    let total_wins: f64 = winning_trades.iter().sum();
    let total_losses: f64 = losing_trades.iter().sum::<f64>().abs();

    let profit_factor = if total_losses > 0.0 {
        Some(total_wins / total_losses)
    } else {
        None
    };

    let largest_win = winning_trades.iter().fold(0.0f64, |a, &b| a.max(b));
    let largest_loss = losing_trades.iter().fold(0.0f64, |a, &b| a.min(b));

    TradeStats {
        num_trades: total,
        num_winning_trades: num_winning,
        num_losing_trades: num_losing,
        win_rate,
        avg_win,
        avg_loss,
        profit_factor,
        largest_win,
        largest_loss,
    }
}

fn calculate_sharpe_ratio(returns: &[f64], rf_per_period: f64, periods_per_year: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }

    let mean = returns.mean();
    let std_dev = returns.std_dev();

    if std_dev == 0.0 || !std_dev.is_finite() {
        return 0.0;
    }

    (mean - rf_per_period) / std_dev * periods_per_year.sqrt()
}

fn calculate_sortino_ratio(returns: &[f64], rf_per_period: f64, periods_per_year: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }

    let mean = returns.mean();

    //downside deviation over negative returns only
    let negative_returns: Vec<f64> = returns.iter().filter(|&&r| r < 0.0).copied().collect();
    if negative_returns.len() < 2 {
        return 0.0;
    }

    let downside_dev = negative_returns.std_dev();
    if downside_dev == 0.0 || !downside_dev.is_finite() {
        return 0.0;
    }

    (mean - rf_per_period) / downside_dev * periods_per_year.sqrt()
}

//fraction of equity points with an open position
fn calculate_exposure(equity_curve: &[EquityPoint]) -> f64 {
    if equity_curve.is_empty() {
        return 0.0;
    }
    let in_market = equity_curve.iter().filter(|p| p.position_qty != 0).count();
    in_market as f64 / equity_curve.len() as f64
}

//positive periods among periods that moved
fn calculate_period_win_rate(returns: &[f64]) -> f64 {
    let moved = returns.iter().filter(|&&r| r != 0.0).count();
    if moved == 0 {
        return 0.0;
    }
    returns.iter().filter(|&&r| r > 0.0).count() as f64 / moved as f64
}
