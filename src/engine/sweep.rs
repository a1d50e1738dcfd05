//! Parameter sweeps: many independent backtests over one read-only series.

use crate::config::{MacdParams, StrategyParams};
use crate::data::BarSeries;
use crate::engine::backtest::{BacktestConfig, BacktestEngine};
use crate::engine::error::BacktestError;
use crate::metrics::{AnalyzerConfig, SummaryMetrics};
use rayon::prelude::*;
use std::cmp::Ordering;
use tracing::{debug, info};

//one backtest of a sweep
#[derive(Debug, Clone, PartialEq)]
pub struct SweepJob {
    pub label: String,
    pub config: BacktestConfig,
    pub strategy: StrategyParams,
}

#[derive(Debug, Clone)]
pub struct SweepOutcome {
    pub label: String,
    pub strategy: StrategyParams,
    pub result: Result<SummaryMetrics, BacktestError>,
}

impl SweepOutcome {
    pub fn metrics(&self) -> Option<&SummaryMetrics> {
        self.result.as_ref().ok()
    }
}

//grid of MACD periods; fast >= slow combinations are skipped
#[derive(Debug, Clone, PartialEq)]
pub struct MacdGrid {
    pub fast_periods: Vec<usize>,
    pub slow_periods: Vec<usize>,
    pub signal_periods: Vec<usize>,
}

impl Default for MacdGrid {
    fn default() -> Self {
        MacdGrid {
            fast_periods: vec![8, 12, 16],
            slow_periods: vec![21, 26, 34],
            signal_periods: vec![5, 9],
        }
    }
}

impl MacdGrid {
    //upper bound on the number of jobs
    pub fn size(&self) -> usize {
        self.fast_periods.len() * self.slow_periods.len() * self.signal_periods.len()
    }

    //one job per valid combination, varying the periods of a base parameter set
    pub fn jobs(&self, base_config: &BacktestConfig, base_params: &MacdParams) -> Vec<SweepJob> {
        let mut jobs = Vec::with_capacity(self.size());

        for &fast in &self.fast_periods {
            for &slow in &self.slow_periods {
                if fast >= slow {
                    continue;
                }
                for &signal in &self.signal_periods {
                    let params = MacdParams {
                        fast_period: fast,
                        slow_period: slow,
                        signal_period: signal,
                        ..base_params.clone()
                    };
                    jobs.push(SweepJob {
                        label: format!("macd({},{},{})", fast, slow, signal),
                        config: base_config.clone(),
                        strategy: StrategyParams::Macd(params),
                    });
                }
            }
        }

        jobs
    }
}

//runs one job with its own strategy and engine
pub fn run_job(
    series: &BarSeries,
    job: &SweepJob,
    analyzer: &AnalyzerConfig,
) -> Result<SummaryMetrics, BacktestError> {
    let mut strategy = job.strategy.build();
    let result = BacktestEngine::new(series, strategy.as_mut(), job.config.clone())?.run()?;
    debug!(label = %job.label, final_equity = result.final_equity(), "sweep job done");
    Ok(result.analyze(analyzer))
}

/// Runs every job in parallel.
///
/// Jobs share nothing but the series. Outcomes come back in job order and a
/// failing job does not affect the others.
pub fn run_sweep(
    series: &BarSeries,
    jobs: &[SweepJob],
    analyzer: &AnalyzerConfig,
) -> Vec<SweepOutcome> {
    info!(jobs = jobs.len(), symbol = series.symbol(), "starting sweep");

    jobs.par_iter()
        .map(|job| SweepOutcome {
            label: job.label.clone(),
            strategy: job.strategy.clone(),
            result: run_job(series, job, analyzer),
        })
        .collect()
}

//successful outcomes sorted by sharpe ratio, best first
pub fn rank_by_sharpe(outcomes: &[SweepOutcome]) -> Vec<&SweepOutcome> {
    let mut ranked: Vec<&SweepOutcome> = outcomes.iter().filter(|o| o.result.is_ok()).collect();
    ranked.sort_by(|a, b| {
        let sa = a.metrics().map_or(f64::NEG_INFINITY, |m| m.sharpe_ratio);
        let sb = b.metrics().map_or(f64::NEG_INFINITY, |m| m.sharpe_ratio);
        sb.partial_cmp(&sa).unwrap_or(Ordering::Equal)
    });
    ranked
}
