use crate::portfolio::trade::{Side, TradeRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PositionError {
    #[error("Adding {added} to a position of {held} exceeds the largest position size")]
    Overflow { held: u64, added: u64 },
}

//the single open position of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    //net quantity (positive for long, negative for short, 0 for flat)
    pub net_qty: i64,

    //average entry price
    pub avg_entry_price: f64,

    //time the current position was first opened
    pub entry_time: Option<DateTime<Utc>>,

    //entry costs charged on the still-open quantity
    pub entry_costs: f64,
}

impl Position {
    //creates a new flat position
    pub fn flat() -> Self {
        Position {
            net_qty: 0,
            avg_entry_price: 0.0,
            entry_time: None,
            entry_costs: 0.0,
        }
    }

    //returns true if the position is flat (no open position)
    pub fn is_flat(&self) -> bool {
        self.net_qty == 0
    }

    //returns true if the position is long
    pub fn is_long(&self) -> bool {
        self.net_qty > 0
    }

    //returns true if the position is short
    pub fn is_short(&self) -> bool {
        self.net_qty < 0
    }

    pub fn side(&self) -> Option<Side> {
        match self.net_qty {
            0 => None,
            q if q > 0 => Some(Side::Long),
            _ => Some(Side::Short),
        }
    }

    //absolute quantity held
    pub fn quantity(&self) -> u64 {
        self.net_qty.unsigned_abs()
    }

    //calculates unrealized pnl at a given price (before exit costs)
    pub fn unrealized_pnl(&self, current_price: f64) -> f64 {
        if self.net_qty == 0 {
            return 0.0;
        }
        (current_price - self.avg_entry_price) * self.net_qty as f64
    }

    //signed mark-to-market value, negative for shorts
    pub fn market_value(&self, current_price: f64) -> f64 {
        current_price * self.net_qty as f64
    }

    //net quantity after adding qty on side, None if it does not fit in an i64
    pub fn net_after_open(&self, side: Side, qty: u64) -> Option<i64> {
        let signed = i64::try_from(qty).ok()?.checked_mul(side.sign())?;
        //i64::MIN has no positive counterpart, so quantity() could not report it
        self.net_qty.checked_add(signed).filter(|&q| q != i64::MIN)
    }

    //opens a position or adds to one in the same direction
    pub fn open(
        &mut self,
        side: Side,
        qty: u64,
        price: f64,
        cost: f64,
        time: DateTime<Utc>,
    ) -> Result<(), PositionError> {
        let total_qty = self
            .net_after_open(side, qty)
            .ok_or(PositionError::Overflow {
                held: self.quantity(),
                added: qty,
            })?;

        //if position is flat, just establish new position
        if self.net_qty == 0 {
            self.net_qty = total_qty;
            self.avg_entry_price = price;
            self.entry_time = Some(time);
            self.entry_costs = cost;
            return Ok(());
        }

        debug_assert_eq!(self.side(), Some(side), "open must not reverse a position");

        //adding to position - update average entry price
        let total_cost = self.avg_entry_price * self.net_qty as f64
            + price * (total_qty - self.net_qty) as f64;
        self.avg_entry_price = total_cost / total_qty as f64;
        self.net_qty = total_qty;
        self.entry_costs += cost;
        Ok(())
    }

    //reduces the position by qty (never through zero) and returns the closed round trip
    pub fn reduce(
        &mut self,
        qty: u64,
        price: f64,
        exit_cost: f64,
        time: DateTime<Utc>,
    ) -> Option<TradeRecord> {
        let side = self.side()?;
        let held = self.quantity();
        let close_qty = qty.min(held);
        if close_qty == 0 {
            return None;
        }
        let closed = i64::try_from(close_qty).ok()?;

        //closed quantity carries its share of the entry costs
        let share = close_qty as f64 / held as f64;
        let entry_cost_share = self.entry_costs * share;

        let price_diff = match side {
            Side::Long => price - self.avg_entry_price,
            Side::Short => self.avg_entry_price - price,
        };
        let gross = price_diff * close_qty as f64;
        let costs = entry_cost_share + exit_cost;

        let record = TradeRecord {
            entry_time: self.entry_time.unwrap_or(time),
            exit_time: Some(time),
            side,
            quantity: close_qty,
            entry_price: self.avg_entry_price,
            exit_price: Some(price),
            realized_pnl: Some(gross - costs),
            costs,
        };

        self.net_qty -= closed * side.sign();
        self.entry_costs -= entry_cost_share;

        //if flat, reset entry state
        if self.net_qty == 0 {
            *self = Position::flat();
        }

        Some(record)
    }

    //the open leg as a trade record, if any
    pub fn open_trade(&self) -> Option<TradeRecord> {
        let side = self.side()?;
        Some(TradeRecord {
            entry_time: self.entry_time?,
            exit_time: None,
            side,
            quantity: self.quantity(),
            entry_price: self.avg_entry_price,
            exit_price: None,
            realized_pnl: None,
            costs: self.entry_costs,
        })
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::flat()
    }
}
