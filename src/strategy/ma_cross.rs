use crate::config::MaCrossParams;
use crate::strategy::{sma, Decision, Strategy, StrategyContext, StrategyError, StrategySetup};

//moving average crossover strategy
//goes long when the short sma crosses above the long sma
//closes the long when it crosses back below
#[derive(Debug, Clone)]
pub struct MaCrossStrategy {
    params: MaCrossParams,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cross {
    Golden,
    Death,
}

impl MaCrossStrategy {
    pub fn new(params: MaCrossParams) -> Self {
        MaCrossStrategy { params }
    }

    //short and long sma over the window ending `offset` bars before the last
    fn averages(&self, closes: &[f64], offset: usize) -> Option<(f64, f64)> {
        let end = closes.len().checked_sub(offset)?;
        let window = &closes[..end];
        if window.len() < self.params.long_period {
            return None;
        }
        let short = sma(&window[window.len().saturating_sub(self.params.short_period)..])?;
        let long = sma(&window[window.len() - self.params.long_period..])?;
        Some((short, long))
    }

    //compares this bar's averages with the previous bar's
    fn check_crossover(&self, closes: &[f64]) -> Option<Cross> {
        let (prev_short, prev_long) = self.averages(closes, 1)?;
        let (short, long) = self.averages(closes, 0)?;

        if prev_short <= prev_long && short > long {
            return Some(Cross::Golden);
        }
        if prev_short >= prev_long && short < long {
            return Some(Cross::Death);
        }
        None
    }
}

impl Strategy for MaCrossStrategy {
    fn name(&self) -> &str {
        "MA Crossover"
    }

    fn min_lookback(&self) -> usize {
        //long window on the previous bar as well
        self.params.long_period
    }

    fn initialize(&mut self, _setup: &StrategySetup) -> Result<(), StrategyError> {
        let p = &self.params;
        if p.short_period == 0 || p.short_period >= p.long_period {
            return Err(StrategyError::InvalidParameter(format!(
                "need 0 < short period ({}) < long period ({})",
                p.short_period, p.long_period
            )));
        }
        Ok(())
    }

    fn decide(&mut self, context: &StrategyContext<'_>) -> Result<Decision, StrategyError> {
        let closes = context.get_close_prices(self.params.long_period + 1);
        let position = context.current_position();

        let decision = match self.check_crossover(&closes) {
            Some(Cross::Golden) if position.is_flat() => Decision::Buy(self.params.qty),
            Some(Cross::Death) if position.is_long() => Decision::Close,
            _ => Decision::Hold,
        };
        Ok(decision)
    }
}
