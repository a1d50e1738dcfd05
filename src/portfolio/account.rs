use crate::engine::execution::{Fill, FillEffect, OrderSide};
use crate::portfolio::position::{Position, PositionError};
use crate::portfolio::trade::{Side, TradeRecord};
use serde::{Deserialize, Serialize};

//cash, the single position and the trade log of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    //starting capital, fixed for the run
    pub initial_capital: f64,

    //current cash (sale proceeds in, purchase outlays and costs out)
    pub cash: f64,

    //open position
    pub position: Position,

    //closed round trips, append-only
    pub trade_log: Vec<TradeRecord>,

    //cumulative realized pnl before costs
    pub realized_pnl: f64,

    //cumulative transaction costs charged
    pub total_costs: f64,
}

impl Account {
    //creates a new flat account with the starting capital as cash
    pub fn new(initial_capital: f64) -> Self {
        Account {
            initial_capital,
            cash: initial_capital,
            position: Position::flat(),
            trade_log: Vec::new(),
            realized_pnl: 0.0,
            total_costs: 0.0,
        }
    }

    //settles a fill: moves cash, updates the position, logs any closed round trip
    pub fn process_fill(&mut self, fill: &Fill) -> Result<Option<TradeRecord>, PositionError> {
        //the position is updated first so a refused open leaves cash untouched
        let trade = match fill.effect {
            FillEffect::Open => {
                let side = match fill.side {
                    OrderSide::Buy => Side::Long,
                    OrderSide::Sell => Side::Short,
                };
                self.position
                    .open(side, fill.qty, fill.price, fill.cost, fill.timestamp)?;
                None
            }
            FillEffect::Reduce => {
                match self
                    .position
                    .reduce(fill.qty, fill.price, fill.cost, fill.timestamp)
                {
                    Some(trade) => Some(trade),
                    //nothing to reduce
                    None => return Ok(None),
                }
            }
        };

        let notional = fill.notional_value();
        match fill.side {
            OrderSide::Buy => self.cash -= notional + fill.cost,
            OrderSide::Sell => self.cash += notional - fill.cost,
        }
        self.total_costs += fill.cost;

        if let Some(trade) = &trade {
            if let Some(gross) = trade.gross_pnl() {
                self.realized_pnl += gross;
            }
            self.trade_log.push(trade.clone());
        }
        Ok(trade)
    }

    //cash plus the position marked at price
    pub fn equity(&self, price: f64) -> f64 {
        self.cash + self.position.market_value(price)
    }

    //returns total unrealized pnl at the given price
    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.position.unrealized_pnl(price)
    }

    //checks if the account can pay for an outlay without going negative
    pub fn has_sufficient_cash(&self, required: f64) -> bool {
        self.cash >= required
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn fill(side: OrderSide, effect: FillEffect, qty: u64, price: f64, cost: f64) -> Fill {
        Fill {
            id: 1,
            bar_index: 0,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
            side,
            effect,
            qty,
            price,
            cost,
        }
    }

    #[test]
    fn round_trip_settles_cash_and_logs_trade() {
        let mut account = Account::new(10_000.0);
        account
            .process_fill(&fill(OrderSide::Buy, FillEffect::Open, 10, 100.0, 0.0))
            .unwrap();
        assert!((account.cash - 9_000.0).abs() < 1e-9);
        assert!((account.equity(105.0) - 10_050.0).abs() < 1e-9);

        let trade = account
            .process_fill(&fill(OrderSide::Sell, FillEffect::Reduce, 10, 110.0, 0.0))
            .unwrap()
            .unwrap();
        assert!((trade.realized_pnl.unwrap() - 100.0).abs() < 1e-9);
        assert!((account.cash - 10_100.0).abs() < 1e-9);
        assert_eq!(account.trade_log.len(), 1);
        assert!(account.position.is_flat());
    }

    #[test]
    fn costs_reduce_cash_on_both_legs() {
        let mut account = Account::new(1_000.0);
        account.process_fill(&fill(OrderSide::Buy, FillEffect::Open, 1, 100.0, 1.0)).unwrap();
        account.process_fill(&fill(OrderSide::Sell, FillEffect::Reduce, 1, 100.0, 1.0)).unwrap();

        assert!((account.cash - 998.0).abs() < 1e-9);
        assert!((account.total_costs - 2.0).abs() < 1e-9);
        assert!((account.trade_log[0].realized_pnl.unwrap() + 2.0).abs() < 1e-9);
    }

    #[test]
    fn refused_open_leaves_account_untouched() {
        let mut account = Account::new(1_000.0);
        let result = account.process_fill(&fill(OrderSide::Buy, FillEffect::Open, u64::MAX, 1.0, 0.0));
        assert!(result.is_err());
        assert_eq!(account.cash, 1_000.0);
        assert_eq!(account.total_costs, 0.0);
        assert!(account.position.is_flat());
    }

    #[test]
    fn short_sale_credits_cash_and_marks_negative() {
        let mut account = Account::new(1_000.0);
        account.process_fill(&fill(OrderSide::Sell, FillEffect::Open, 5, 100.0, 0.0)).unwrap();
        assert!((account.cash - 1_500.0).abs() < 1e-9);
        assert!((account.equity(90.0) - 1_050.0).abs() < 1e-9);
    }
}
