use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One mark-to-market sample, taken at a processed bar's close.
///
/// `equity = cash + position_qty * close`. The running totals let a reader
/// check `equity = initial + realized_pnl - costs + unrealized_pnl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub equity: f64,
    pub cash: f64,
    pub position_qty: i64,
    //cumulative realized pnl before costs
    pub realized_pnl: f64,
    //cumulative transaction costs
    pub costs: f64,
    pub unrealized_pnl: f64,
}

//extracts the equity values of a curve
pub fn equity_values(curve: &[EquityPoint]) -> Vec<f64> {
    curve.iter().map(|p| p.equity).collect()
}

//calculates returns from equity values
pub fn calculate_returns(equity_values: &[f64]) -> Vec<f64> {
    if equity_values.len() < 2 {
        return vec![];
    }

    equity_values
        .windows(2)
        .map(|w| {
            if w[0] != 0.0 {
                (w[1] - w[0]) / w[0]
            } else {
                0.0
            }
        })
        .collect()
}

//drawdown from the running peak at every point, as a fraction of that peak
pub fn drawdown_series(equity_values: &[f64]) -> Vec<f64> {
    let mut peak = f64::NEG_INFINITY;
    equity_values
        .iter()
        .map(|&equity| {
            peak = peak.max(equity);
            if peak > 0.0 {
                ((peak - equity) / peak).clamp(0.0, 1.0)
            } else {
                0.0
            }
        })
        .collect()
}

//calculates maximum drawdown from equity values
pub fn max_drawdown(equity_values: &[f64]) -> f64 {
    drawdown_series(equity_values)
        .into_iter()
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_drawdown_of_hand_built_curve() {
        let dd = max_drawdown(&[100.0, 110.0, 90.0, 95.0]);
        assert!((dd - 20.0 / 110.0).abs() < 1e-12);
    }

    #[test]
    fn drawdown_is_zero_on_rising_curve() {
        assert_eq!(max_drawdown(&[1.0, 2.0, 3.0]), 0.0);
        assert_eq!(max_drawdown(&[]), 0.0);
    }

    #[test]
    fn drawdown_series_tracks_running_peak() {
        let series = drawdown_series(&[100.0, 80.0, 120.0, 60.0]);
        assert_eq!(series[0], 0.0);
        assert!((series[1] - 0.2).abs() < 1e-12);
        assert_eq!(series[2], 0.0);
        assert!((series[3] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn returns_between_consecutive_points() {
        let returns = calculate_returns(&[100.0, 110.0, 99.0]);
        assert_eq!(returns.len(), 2);
        assert!((returns[0] - 0.1).abs() < 1e-12);
        assert!((returns[1] + 0.1).abs() < 1e-12);
        assert!(calculate_returns(&[100.0]).is_empty());
    }
}
