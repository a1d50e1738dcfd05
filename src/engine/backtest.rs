use crate::data::{Bar, BarSeries};
use crate::engine::error::BacktestError;
use crate::engine::execution::{
    ExecutionEngine, ExecutionError, ExecutionReport, FillTiming, PendingDecision, PositionSizing,
};
use crate::metrics::{AnalyzerConfig, EquityPoint, SummaryMetrics};
use crate::portfolio::{Account, TradeRecord};
use crate::strategy::{Decision, Strategy, StrategyContext, StrategySetup};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

//configuration for a backtest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub initial_capital: f64,
    //fraction of notional charged on every fill
    pub transaction_cost: f64,
    pub allow_short: bool,
    //lets cash go negative on opens instead of rejecting them
    pub allow_margin: bool,
    pub position_sizing: PositionSizing,
    //bars before the first decision; None uses the strategy's minimum
    pub lookback_window: Option<usize>,
    pub fill_timing: FillTiming,
    //close any open position at the last close
    pub liquidate_at_end: bool,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            initial_capital: 100_000.0,
            transaction_cost: 0.0,
            allow_short: false,
            allow_margin: false,
            position_sizing: PositionSizing::FullCapital,
            lookback_window: None,
            fill_timing: FillTiming::CurrentClose,
            liquidate_at_end: false,
        }
    }
}

impl BacktestConfig {
    pub fn validate(&self) -> Result<(), BacktestError> {
        if !self.initial_capital.is_finite() || self.initial_capital <= 0.0 {
            return Err(BacktestError::InvalidConfig(format!(
                "initial capital must be positive, got {}",
                self.initial_capital
            )));
        }
        if !(0.0..1.0).contains(&self.transaction_cost) {
            return Err(BacktestError::InvalidConfig(format!(
                "transaction cost must be in [0, 1), got {}",
                self.transaction_cost
            )));
        }
        self.position_sizing
            .validate()
            .map_err(BacktestError::InvalidConfig)
    }
}

/// One strategy decision and what became of it.
///
/// `executed_at` is the bar whose price filled the decision: the same bar
/// under [`FillTiming::CurrentClose`], the next one under
/// [`FillTiming::NextOpen`], and `None` for holds, rejections and decisions
/// that never reached a fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub bar_index: usize,
    pub timestamp: DateTime<Utc>,
    pub decision: Decision,
    pub executed_at: Option<usize>,
    pub rejection: Option<ExecutionError>,
}

//execution trace of a finished run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub symbol: String,
    pub strategy_name: String,
    pub initial_capital: f64,
    pub lookback_window: usize,
    //closed round trips in closing order
    pub trades: Vec<TradeRecord>,
    //position still open after the last bar
    pub open_trade: Option<TradeRecord>,
    //one point per processed bar
    pub equity_curve: Vec<EquityPoint>,
    pub decisions: Vec<DecisionRecord>,
    pub final_account: Account,
}

impl BacktestResult {
    pub fn final_equity(&self) -> f64 {
        self.equity_curve
            .last()
            .map(|p| p.equity)
            .unwrap_or(self.initial_capital)
    }

    //decisions that were skipped for lack of capital or short permission
    pub fn rejections(&self) -> impl Iterator<Item = &DecisionRecord> {
        self.decisions.iter().filter(|d| d.rejection.is_some())
    }

    //computes statistics from the trace
    pub fn analyze(&self, config: &AnalyzerConfig) -> SummaryMetrics {
        SummaryMetrics::from_trace(
            &self.equity_curve,
            &self.trades,
            self.initial_capital,
            config,
        )
    }
}

/// Replays a bar series through one strategy.
///
/// Construction validates everything up front, so a constructed engine only
/// fails while running if the strategy does. The series is borrowed
/// read-only and may back any number of engines at once.
pub struct BacktestEngine<'a, S: Strategy + ?Sized> {
    config: BacktestConfig,
    series: &'a BarSeries,
    strategy: &'a mut S,
    lookback: usize,
    account: Account,
    execution: ExecutionEngine,
    equity_curve: Vec<EquityPoint>,
    decisions: Vec<DecisionRecord>,
}

impl<'a, S: Strategy + ?Sized> BacktestEngine<'a, S> {
    //creates a new backtest engine and initializes the strategy
    pub fn new(
        series: &'a BarSeries,
        strategy: &'a mut S,
        config: BacktestConfig,
    ) -> Result<Self, BacktestError> {
        config.validate()?;

        //invalid bars fail the run before it starts
        for bar in series.bars() {
            bar.validate()?;
        }

        let lookback = config
            .lookback_window
            .unwrap_or_else(|| strategy.min_lookback());
        if series.len() <= lookback {
            return Err(BacktestError::EmptySeries {
                bars: series.len(),
                lookback,
            });
        }

        let setup = StrategySetup {
            symbol: series.symbol().to_string(),
            initial_capital: config.initial_capital,
            lookback_window: lookback,
        };
        strategy.initialize(&setup).map_err(|e| {
            BacktestError::InvalidConfig(format!("{} rejected its setup: {}", strategy.name(), e))
        })?;

        let execution = ExecutionEngine::new(
            config.transaction_cost,
            config.allow_short,
            config.allow_margin,
            config.position_sizing,
        );

        Ok(BacktestEngine {
            account: Account::new(config.initial_capital),
            execution,
            equity_curve: Vec::with_capacity(series.len() - lookback),
            decisions: Vec::with_capacity(series.len() - lookback),
            config,
            series,
            strategy,
            lookback,
        })
    }

    //bars skipped before the first decision
    pub fn lookback(&self) -> usize {
        self.lookback
    }

    //runs the backtest to the last bar
    pub fn run(mut self) -> Result<BacktestResult, BacktestError> {
        let series = self.series;
        let bars = series.bars();
        let last_index = bars.len() - 1;

        info!(
            symbol = series.symbol(),
            strategy = self.strategy.name(),
            bars = bars.len(),
            lookback = self.lookback,
            fill_timing = ?self.config.fill_timing,
            "starting backtest"
        );

        for i in self.lookback..bars.len() {
            let bar = &bars[i];

            //a decision queued on the previous bar fills at this open
            if let Some(pending) = self.execution.take_pending() {
                self.execute_pending(pending, i, bar);
            }

            let decision = {
                let context = StrategyContext::new(
                    series.symbol(),
                    &bars[..=i],
                    &self.account.position,
                    self.account.cash,
                );
                self.strategy
                    .decide(&context)
                    .map_err(|source| BacktestError::Strategy {
                        bar_index: i,
                        source,
                    })?
            };

            let log_index = self.decisions.len();
            self.decisions.push(DecisionRecord {
                bar_index: i,
                timestamp: bar.timestamp,
                decision,
                executed_at: None,
                rejection: None,
            });

            if !decision.is_hold() {
                match self.config.fill_timing {
                    FillTiming::CurrentClose => {
                        let report = self.execution.execute(
                            decision,
                            &mut self.account,
                            i,
                            bar.timestamp,
                            bar.close,
                        );
                        self.record_outcome(log_index, i, report);
                    }
                    FillTiming::NextOpen => {
                        self.execution.queue(PendingDecision {
                            decision,
                            bar_index: i,
                            log_index,
                        });
                    }
                }
            }

            if i == last_index {
                self.finish(bar);
            }

            self.record_equity(bar);
        }

        let open_trade = self.account.position.open_trade();
        let result = BacktestResult {
            symbol: series.symbol().to_string(),
            strategy_name: self.strategy.name().to_string(),
            initial_capital: self.config.initial_capital,
            lookback_window: self.lookback,
            trades: self.account.trade_log.clone(),
            open_trade,
            equity_curve: self.equity_curve,
            decisions: self.decisions,
            final_account: self.account,
        };

        info!(
            trades = result.trades.len(),
            final_equity = result.final_equity(),
            rejections = result.rejections().count(),
            "backtest complete"
        );

        Ok(result)
    }

    fn execute_pending(&mut self, pending: PendingDecision, i: usize, bar: &Bar) {
        debug!(
            decided_at = pending.bar_index,
            bar = i,
            decision = ?pending.decision,
            "filling queued decision at open"
        );
        let report = self.execution.execute(
            pending.decision,
            &mut self.account,
            i,
            bar.timestamp,
            bar.open,
        );
        self.record_outcome(pending.log_index, i, report);
    }

    fn record_outcome(&mut self, log_index: usize, executed_at: usize, report: ExecutionReport) {
        let Some(record) = self.decisions.get_mut(log_index) else {
            return;
        };

        if let Some(error) = &report.rejection {
            warn!(
                bar = record.bar_index,
                decision = ?record.decision,
                %error,
                "decision skipped"
            );
        }
        if !report.fills.is_empty() {
            record.executed_at = Some(executed_at);
        }
        record.rejection = report.rejection;
    }

    //end-of-series handling on the last bar, before its equity point
    fn finish(&mut self, bar: &Bar) {
        if let Some(pending) = self.execution.take_pending() {
            warn!(
                bar = pending.bar_index,
                decision = ?pending.decision,
                "no bar left to fill queued decision, dropping it"
            );
        }

        if self.config.liquidate_at_end && !self.account.position.is_flat() {
            info!(
                qty = self.account.position.net_qty,
                price = bar.close,
                "liquidating open position at last close"
            );
            let report = self.execution.execute(
                Decision::Close,
                &mut self.account,
                self.series.len() - 1,
                bar.timestamp,
                bar.close,
            );
            if let Some(error) = report.rejection {
                warn!(%error, "final liquidation failed");
            }
        }
    }

    fn record_equity(&mut self, bar: &Bar) {
        self.equity_curve.push(EquityPoint {
            timestamp: bar.timestamp,
            equity: self.account.equity(bar.close),
            cash: self.account.cash,
            position_qty: self.account.position.net_qty,
            realized_pnl: self.account.realized_pnl,
            costs: self.account.total_costs,
            unrealized_pnl: self.account.unrealized_pnl(bar.close),
        });
    }
}

//convenience wrapper: builds an engine and runs it
pub fn run_backtest<S: Strategy + ?Sized>(
    series: &BarSeries,
    strategy: &mut S,
    config: BacktestConfig,
) -> Result<BacktestResult, BacktestError> {
    BacktestEngine::new(series, strategy, config)?.run()
}
