use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

//direction of a position or round trip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    //+1 for long, -1 for short
    pub fn sign(&self) -> i64 {
        match self {
            Side::Long => 1,
            Side::Short => -1,
        }
    }
}

/// One round trip in the trade log.
///
/// Prices are per unit, `costs` is the transaction cost charged on both
/// legs attributable to `quantity`, and `realized_pnl` is net of those
/// costs. `exit_*` and `realized_pnl` stay `None` while the trade is open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub entry_time: DateTime<Utc>,
    pub exit_time: Option<DateTime<Utc>>,
    pub side: Side,
    pub quantity: u64,
    pub entry_price: f64,
    pub exit_price: Option<f64>,
    pub realized_pnl: Option<f64>,
    pub costs: f64,
}

impl TradeRecord {
    pub fn is_closed(&self) -> bool {
        self.exit_time.is_some()
    }

    pub fn is_win(&self) -> bool {
        self.realized_pnl.map_or(false, |pnl| pnl > 0.0)
    }

    //pnl before costs, only for closed trades
    pub fn gross_pnl(&self) -> Option<f64> {
        self.realized_pnl.map(|pnl| pnl + self.costs)
    }
}
