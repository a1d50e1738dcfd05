use crate::config::MacdParams;
use crate::data::Bar;
use crate::strategy::indicators::{Ema, Macd, MacdValue, Sma};
use crate::strategy::{Decision, Strategy, StrategyContext, StrategyError, StrategySetup};
use tracing::debug;

//macd histogram strategy
//buys when the histogram flips from below to above the threshold
//closes when it flips back, or on an optional trend break, take-profit or stop-loss
#[derive(Debug, Clone)]
pub struct MacdHistogramStrategy {
    params: MacdParams,

    //state
    macd: Macd,
    trend: Option<Ema>,
    volume_ma: Option<Sma>,
    processed: usize,
    prev: Option<MacdValue>,
    current: Option<MacdValue>,
    trend_value: Option<f64>,
    volume_avg: Option<f64>,
}

impl MacdHistogramStrategy {
    pub fn new(params: MacdParams) -> Self {
        let mut strategy = MacdHistogramStrategy {
            macd: Macd::new(params.fast_period, params.slow_period, params.signal_period),
            trend: None,
            volume_ma: None,
            processed: 0,
            prev: None,
            current: None,
            trend_value: None,
            volume_avg: None,
            params,
        };
        strategy.reset();
        strategy
    }

    pub fn params(&self) -> &MacdParams {
        &self.params
    }

    fn reset(&mut self) {
        let p = &self.params;
        self.macd = Macd::new(p.fast_period, p.slow_period, p.signal_period);
        self.trend = p.trend_ema_period.map(Ema::new);
        self.volume_ma = p.volume_ma_period.map(Sma::new);
        self.processed = 0;
        self.prev = None;
        self.current = None;
        self.trend_value = None;
        self.volume_avg = None;
    }

    fn validate(&self) -> Result<(), StrategyError> {
        let p = &self.params;
        if p.fast_period == 0 || p.slow_period == 0 || p.signal_period == 0 {
            return Err(StrategyError::InvalidParameter(
                "MACD periods must be at least 1".to_string(),
            ));
        }
        if p.fast_period >= p.slow_period {
            return Err(StrategyError::InvalidParameter(format!(
                "fast period ({}) must be shorter than slow period ({})",
                p.fast_period, p.slow_period
            )));
        }
        if p.trend_ema_period == Some(0) || p.volume_ma_period == Some(0) {
            return Err(StrategyError::InvalidParameter(
                "filter periods must be at least 1".to_string(),
            ));
        }
        for (name, value) in [("take_profit_pct", p.take_profit_pct), ("stop_loss_pct", p.stop_loss_pct)] {
            if value.map_or(false, |v| v <= 0.0) {
                return Err(StrategyError::InvalidParameter(format!("{} must be positive", name)));
            }
        }
        Ok(())
    }

    //feeds bars not yet seen into the indicators
    fn catch_up(&mut self, bars: &[Bar]) -> Result<(), StrategyError> {
        if bars.len() < self.processed {
            return Err(StrategyError::Failed(format!(
                "bar history shrank from {} to {} bars",
                self.processed,
                bars.len()
            )));
        }

        for bar in &bars[self.processed..] {
            self.prev = self.current;
            self.current = self.macd.update(bar.close);
            if let Some(trend) = self.trend.as_mut() {
                self.trend_value = trend.update(bar.close);
            }
            if let Some(volume_ma) = self.volume_ma.as_mut() {
                self.volume_avg = volume_ma.update(bar.volume);
            }
        }
        self.processed = bars.len();
        Ok(())
    }

    fn should_buy(&self, bar: &Bar, prev: &MacdValue, curr: &MacdValue) -> bool {
        let p = &self.params;

        //histogram turns up through the threshold
        let cross_up = prev.histogram < p.threshold && curr.histogram > p.threshold;
        if !cross_up {
            return false;
        }

        //price above the trend line
        if self.trend.is_some() && !self.trend_value.map_or(false, |t| bar.close > t) {
            return false;
        }

        //volume expansion
        if self.volume_ma.is_some()
            && !self
                .volume_avg
                .map_or(false, |avg| bar.volume > avg * p.volume_factor)
        {
            return false;
        }

        !p.require_macd_above_zero || curr.macd > 0.0
    }

    fn should_sell(
        &self,
        bar: &Bar,
        entry_price: f64,
        prev: &MacdValue,
        curr: &MacdValue,
    ) -> bool {
        let p = &self.params;

        if entry_price > 0.0 {
            let change = (bar.close - entry_price) / entry_price;
            if p.take_profit_pct.map_or(false, |tp| change >= tp) {
                debug!(change, "take-profit exit");
                return true;
            }
            if p.stop_loss_pct.map_or(false, |sl| -change >= sl) {
                debug!(change, "stop-loss exit");
                return true;
            }
        }

        //histogram turns down through the negative threshold
        if prev.histogram > -p.threshold && curr.histogram < -p.threshold {
            return true;
        }

        //price below the trend line
        self.trend_value.map_or(false, |t| bar.close < t)
    }
}

impl Strategy for MacdHistogramStrategy {
    fn name(&self) -> &str {
        "MACD Histogram"
    }

    fn min_lookback(&self) -> usize {
        let p = &self.params;
        //one extra bar so the previous histogram exists
        let macd = p.slow_period.max(p.fast_period) + p.signal_period - 1;
        let trend = p.trend_ema_period.map_or(0, |n| n.saturating_sub(1));
        let volume = p.volume_ma_period.map_or(0, |n| n.saturating_sub(1));
        macd.max(trend).max(volume)
    }

    fn initialize(&mut self, _setup: &StrategySetup) -> Result<(), StrategyError> {
        self.validate()?;
        self.reset();
        Ok(())
    }

    fn decide(&mut self, context: &StrategyContext<'_>) -> Result<Decision, StrategyError> {
        self.catch_up(context.get_all_bars())?;

        let (bar, prev, curr) = match (context.last_bar(), self.prev, self.current) {
            (Some(bar), Some(prev), Some(curr)) => (bar, prev, curr),
            _ => return Ok(Decision::Hold),
        };

        let position = context.current_position();

        if position.is_flat() {
            if self.should_buy(bar, &prev, &curr) {
                return Ok(Decision::Buy(self.params.qty));
            }
        } else if position.is_long() && self.should_sell(bar, position.avg_entry_price, &prev, &curr) {
            return Ok(Decision::Close);
        }

        Ok(Decision::Hold)
    }
}
