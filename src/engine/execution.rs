use crate::portfolio::{Account, Side, TradeRecord};
use crate::strategy::Decision;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

//order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    //side that reduces a position of the given direction
    pub fn closing(side: Side) -> Self {
        match side {
            Side::Long => OrderSide::Sell,
            Side::Short => OrderSide::Buy,
        }
    }
}

//whether a fill opens/extends exposure or reduces it toward flat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FillEffect {
    Open,
    Reduce,
}

//a single executed leg; never crosses zero exposure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub id: u64,
    pub bar_index: usize,
    pub timestamp: DateTime<Utc>,
    pub side: OrderSide,
    pub effect: FillEffect,
    pub qty: u64,
    pub price: f64,
    pub cost: f64,
}

impl Fill {
    //returns the notional value of the fill
    pub fn notional_value(&self) -> f64 {
        self.price * self.qty as f64
    }
}

/// Why a decision was skipped for a bar.
///
/// These never end a run; the engine records them on the decision log
/// and carries on with the next bar.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecutionError {
    #[error("Insufficient capital: need {required:.2}, have {available:.2}")]
    InsufficientCapital { required: f64, available: f64 },
    #[error("Short selling is not allowed")]
    ShortNotAllowed,
    #[error("Order quantity is zero")]
    ZeroQuantity,
    #[error("Order quantity {qty} exceeds the largest position size")]
    QuantityTooLarge { qty: u64 },
}

//how an unsized BUY/SELL that opens exposure is turned into a quantity
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PositionSizing {
    #[default]
    FullCapital,
    FixedQuantity { quantity: u64 },
    FractionOfCapital { fraction: f64 },
}

impl PositionSizing {
    //parses "full", "fixed:<qty>" or "fraction:<f>"
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase();
        match s.split_once(':') {
            None if s == "full" || s == "full_capital" => Some(PositionSizing::FullCapital),
            Some(("fixed", qty)) => qty
                .parse()
                .ok()
                .map(|quantity| PositionSizing::FixedQuantity { quantity }),
            Some(("fraction", f)) => f
                .parse()
                .ok()
                .map(|fraction| PositionSizing::FractionOfCapital { fraction }),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match *self {
            PositionSizing::FullCapital => Ok(()),
            PositionSizing::FixedQuantity { quantity } if quantity == 0 => {
                Err("fixed position size must be at least 1".to_string())
            }
            PositionSizing::FixedQuantity { .. } => Ok(()),
            PositionSizing::FractionOfCapital { fraction } => {
                if fraction > 0.0 && fraction <= 1.0 {
                    Ok(())
                } else {
                    Err(format!("capital fraction must be in (0, 1], got {}", fraction))
                }
            }
        }
    }

    //resolves a quantity against the capital available for the trade
    pub fn resolve(&self, capital: f64, price: f64, transaction_cost: f64) -> u64 {
        match *self {
            PositionSizing::FixedQuantity { quantity } => quantity,
            PositionSizing::FullCapital => affordable(capital, price, transaction_cost),
            PositionSizing::FractionOfCapital { fraction } => {
                affordable(capital * fraction, price, transaction_cost)
            }
        }
    }
}

//when a decision made on bar i is filled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillTiming {
    //at the close of bar i, the price the strategy just saw
    #[default]
    CurrentClose,
    //at the open of bar i+1
    NextOpen,
}

impl FillTiming {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "close" | "current_close" => Some(FillTiming::CurrentClose),
            "open" | "next_open" => Some(FillTiming::NextOpen),
            _ => None,
        }
    }
}

//transaction cost charged on a leg
pub fn transaction_cost(price: f64, qty: u64, rate: f64) -> f64 {
    price * qty as f64 * rate
}

//cash needed to buy qty units including cost
pub fn outlay(price: f64, qty: u64, rate: f64) -> f64 {
    price * qty as f64 + transaction_cost(price, qty, rate)
}

//explicit sizes must be positive and fit a signed position
fn check_size(size: Option<u64>) -> Result<(), ExecutionError> {
    match size {
        Some(0) => Err(ExecutionError::ZeroQuantity),
        Some(qty) if i64::try_from(qty).is_err() => Err(ExecutionError::QuantityTooLarge { qty }),
        _ => Ok(()),
    }
}

//largest whole quantity whose outlay fits in budget
fn affordable(budget: f64, price: f64, rate: f64) -> u64 {
    if budget <= 0.0 || price <= 0.0 {
        return 0;
    }
    let mut qty = (budget / (price * (1.0 + rate))).floor() as u64;
    while qty > 0 && outlay(price, qty, rate) > budget {
        qty -= 1;
    }
    qty
}

//what applying one decision produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionReport {
    pub fills: Vec<Fill>,
    pub closed_trades: Vec<TradeRecord>,
    pub rejection: Option<ExecutionError>,
}

impl ExecutionReport {
    fn reject(&mut self, error: ExecutionError) {
        self.rejection = Some(error);
    }
}

//a NextOpen decision waiting for the following bar
#[derive(Debug, Clone, PartialEq)]
pub struct PendingDecision {
    pub decision: Decision,
    pub bar_index: usize,
    pub log_index: usize,
}

//fill context for one decision
#[derive(Debug, Clone, Copy)]
struct Quote {
    bar_index: usize,
    timestamp: DateTime<Utc>,
    price: f64,
}

/// Turns strategy decisions into fills against an [`Account`].
///
/// Exposure is never flipped in one fill: a BUY larger than an open short
/// (or a SELL larger than an open long) becomes a reduce leg followed by a
/// separate open leg, and each leg is checked on its own.
pub struct ExecutionEngine {
    transaction_cost: f64,
    allow_short: bool,
    allow_margin: bool,
    sizing: PositionSizing,
    next_fill_id: u64,
    pending: Option<PendingDecision>,
}

impl ExecutionEngine {
    pub fn new(
        transaction_cost: f64,
        allow_short: bool,
        allow_margin: bool,
        sizing: PositionSizing,
    ) -> Self {
        ExecutionEngine {
            transaction_cost,
            allow_short,
            allow_margin,
            sizing,
            next_fill_id: 1,
            pending: None,
        }
    }

    //queues a decision to be filled on the next bar, replacing any earlier one
    pub fn queue(&mut self, pending: PendingDecision) -> Option<PendingDecision> {
        self.pending.replace(pending)
    }

    pub fn take_pending(&mut self) -> Option<PendingDecision> {
        self.pending.take()
    }

    //applies a decision at the given price
    pub fn execute(
        &mut self,
        decision: Decision,
        account: &mut Account,
        bar_index: usize,
        timestamp: DateTime<Utc>,
        price: f64,
    ) -> ExecutionReport {
        let quote = Quote {
            bar_index,
            timestamp,
            price,
        };
        let mut report = ExecutionReport::default();

        match decision {
            Decision::Hold => {}
            Decision::Close => {
                if let Some(side) = account.position.side() {
                    let qty = account.position.quantity();
                    let side = OrderSide::closing(side);
                    self.fill(&mut report, account, quote, side, FillEffect::Reduce, qty);
                }
            }
            Decision::Buy(size) => self.buy(size, account, quote, &mut report),
            Decision::Sell(size) => self.sell(size, account, quote, &mut report),
        }

        report
    }

    fn buy(
        &mut self,
        size: Option<u64>,
        account: &mut Account,
        quote: Quote,
        report: &mut ExecutionReport,
    ) {
        if let Err(e) = check_size(size) {
            return report.reject(e);
        }

        if account.position.is_short() {
            //cover first; an unsized buy covers the whole short
            let held = account.position.quantity();
            let qty = size.unwrap_or(held);
            let cover = qty.min(held);
            self.fill(report, account, quote, OrderSide::Buy, FillEffect::Reduce, cover);

            let remainder = qty - cover;
            if remainder > 0 {
                self.open_long(remainder, account, quote, report);
            }
            return;
        }

        let qty = match size {
            Some(qty) => qty,
            None => self
                .sizing
                .resolve(account.cash, quote.price, self.transaction_cost),
        };

        if qty == 0 {
            return report.reject(ExecutionError::InsufficientCapital {
                required: outlay(quote.price, 1, self.transaction_cost),
                available: account.cash,
            });
        }

        self.open_long(qty, account, quote, report);
    }

    fn sell(
        &mut self,
        size: Option<u64>,
        account: &mut Account,
        quote: Quote,
        report: &mut ExecutionReport,
    ) {
        if let Err(e) = check_size(size) {
            return report.reject(e);
        }

        if account.position.is_long() {
            //an unsized sell closes the whole long
            let held = account.position.quantity();
            let qty = size.unwrap_or(held);
            let close = qty.min(held);
            self.fill(report, account, quote, OrderSide::Sell, FillEffect::Reduce, close);

            let remainder = qty - close;
            if remainder > 0 {
                self.open_short(remainder, account, quote, report);
            }
            return;
        }

        if !self.allow_short {
            return report.reject(ExecutionError::ShortNotAllowed);
        }

        let qty = match size {
            Some(qty) => qty,
            None => self.sizing.resolve(
                self.short_capacity(account, quote.price),
                quote.price,
                self.transaction_cost,
            ),
        };

        if qty == 0 {
            return report.reject(ExecutionError::InsufficientCapital {
                required: outlay(quote.price, 1, self.transaction_cost),
                available: self.short_capacity(account, quote.price),
            });
        }

        self.open_short(qty, account, quote, report);
    }

    fn open_long(
        &mut self,
        qty: u64,
        account: &mut Account,
        quote: Quote,
        report: &mut ExecutionReport,
    ) {
        if account.position.net_after_open(Side::Long, qty).is_none() {
            return report.reject(ExecutionError::QuantityTooLarge { qty });
        }

        let required = outlay(quote.price, qty, self.transaction_cost);
        if !self.allow_margin && !account.has_sufficient_cash(required) {
            return report.reject(ExecutionError::InsufficientCapital {
                required,
                available: account.cash,
            });
        }
        self.fill(report, account, quote, OrderSide::Buy, FillEffect::Open, qty);
    }

    fn open_short(
        &mut self,
        qty: u64,
        account: &mut Account,
        quote: Quote,
        report: &mut ExecutionReport,
    ) {
        if !self.allow_short {
            return report.reject(ExecutionError::ShortNotAllowed);
        }

        if account.position.net_after_open(Side::Short, qty).is_none() {
            return report.reject(ExecutionError::QuantityTooLarge { qty });
        }

        //without margin, total short notional must stay covered by equity
        let required = outlay(quote.price, qty, self.transaction_cost);
        let available = self.short_capacity(account, quote.price);
        if !self.allow_margin && required > available {
            return report.reject(ExecutionError::InsufficientCapital {
                required,
                available,
            });
        }
        self.fill(report, account, quote, OrderSide::Sell, FillEffect::Open, qty);
    }

    //equity not already backing an open short
    fn short_capacity(&self, account: &Account, price: f64) -> f64 {
        let short_notional = if account.position.is_short() {
            account.position.quantity() as f64 * price
        } else {
            0.0
        };
        account.equity(price) - short_notional
    }

    fn fill(
        &mut self,
        report: &mut ExecutionReport,
        account: &mut Account,
        quote: Quote,
        side: OrderSide,
        effect: FillEffect,
        qty: u64,
    ) {
        if qty == 0 {
            return;
        }

        let fill = Fill {
            id: self.next_fill_id,
            bar_index: quote.bar_index,
            timestamp: quote.timestamp,
            side,
            effect,
            qty,
            price: quote.price,
            cost: transaction_cost(quote.price, qty, self.transaction_cost),
        };
        match account.process_fill(&fill) {
            Ok(trade) => report.closed_trades.extend(trade),
            Err(e) => {
                debug!(bar = quote.bar_index, error = %e, "fill refused");
                return report.reject(ExecutionError::QuantityTooLarge { qty });
            }
        }
        self.next_fill_id += 1;

        debug!(
            bar = quote.bar_index,
            side = ?fill.side,
            effect = ?fill.effect,
            qty = fill.qty,
            price = fill.price,
            cost = fill.cost,
            "fill"
        );

        report.fills.push(fill);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
    }

    fn engine(allow_short: bool, sizing: PositionSizing) -> ExecutionEngine {
        ExecutionEngine::new(0.0, allow_short, false, sizing)
    }

    #[test]
    fn full_capital_buys_whole_units_only() {
        assert_eq!(PositionSizing::FullCapital.resolve(1_000.0, 30.0, 0.0), 33);
        assert_eq!(PositionSizing::FullCapital.resolve(1_000.0, 100.0, 0.01), 9);
        assert_eq!(
            PositionSizing::FractionOfCapital { fraction: 0.5 }.resolve(1_000.0, 100.0, 0.0),
            5
        );
        assert_eq!(PositionSizing::FullCapital.resolve(50.0, 100.0, 0.0), 0);
    }

    #[test]
    fn parse_sizing_and_timing() {
        assert_eq!(PositionSizing::parse("full"), Some(PositionSizing::FullCapital));
        assert_eq!(
            PositionSizing::parse("fixed:10"),
            Some(PositionSizing::FixedQuantity { quantity: 10 })
        );
        assert_eq!(
            PositionSizing::parse("fraction:0.95"),
            Some(PositionSizing::FractionOfCapital { fraction: 0.95 })
        );
        assert_eq!(PositionSizing::parse("half"), None);
        assert_eq!(FillTiming::parse("next_open"), Some(FillTiming::NextOpen));
    }

    #[test]
    fn validate_rejects_bad_sizing() {
        assert!(PositionSizing::FixedQuantity { quantity: 0 }.validate().is_err());
        assert!(PositionSizing::FractionOfCapital { fraction: 1.5 }.validate().is_err());
        assert!(PositionSizing::FractionOfCapital { fraction: 0.95 }.validate().is_ok());
    }

    #[test]
    fn oversized_buy_is_rejected_without_touching_account() {
        let mut account = Account::new(1_000.0);
        let mut exec = engine(false, PositionSizing::FullCapital);

        let report = exec.execute(Decision::Buy(Some(20)), &mut account, 0, ts(), 100.0);
        assert!(matches!(
            report.rejection,
            Some(ExecutionError::InsufficientCapital { .. })
        ));
        assert!(report.fills.is_empty());
        assert!(account.position.is_flat());
        assert_eq!(account.cash, 1_000.0);
    }

    #[test]
    fn sell_when_flat_needs_short_permission() {
        let mut account = Account::new(1_000.0);
        let mut exec = engine(false, PositionSizing::FullCapital);
        let report = exec.execute(Decision::Sell(None), &mut account, 0, ts(), 100.0);
        assert_eq!(report.rejection, Some(ExecutionError::ShortNotAllowed));

        let mut exec = engine(true, PositionSizing::FullCapital);
        let report = exec.execute(Decision::Sell(None), &mut account, 0, ts(), 100.0);
        assert!(report.rejection.is_none());
        assert_eq!(account.position.net_qty, -10);
    }

    #[test]
    fn flip_is_split_into_close_and_open() {
        let mut account = Account::new(1_000.0);
        let mut exec = engine(true, PositionSizing::FullCapital);
        exec.execute(Decision::Buy(Some(5)), &mut account, 0, ts(), 100.0);

        let report = exec.execute(Decision::Sell(Some(8)), &mut account, 1, ts(), 100.0);
        assert_eq!(report.fills.len(), 2);
        assert_eq!(report.fills[0].effect, FillEffect::Reduce);
        assert_eq!(report.fills[0].qty, 5);
        assert_eq!(report.fills[1].effect, FillEffect::Open);
        assert_eq!(report.fills[1].qty, 3);
        assert_eq!(report.closed_trades.len(), 1);
        assert_eq!(account.position.net_qty, -3);
    }

    #[test]
    fn flip_without_short_permission_only_closes() {
        let mut account = Account::new(1_000.0);
        let mut exec = engine(false, PositionSizing::FullCapital);
        exec.execute(Decision::Buy(Some(5)), &mut account, 0, ts(), 100.0);

        let report = exec.execute(Decision::Sell(Some(8)), &mut account, 1, ts(), 100.0);
        assert_eq!(report.fills.len(), 1);
        assert_eq!(report.rejection, Some(ExecutionError::ShortNotAllowed));
        assert!(account.position.is_flat());
        assert_eq!(account.trade_log.len(), 1);
    }

    #[test]
    fn sizes_beyond_i64_are_rejected_even_on_margin() {
        let mut account = Account::new(10_000.0);
        let mut exec = ExecutionEngine::new(0.0, true, true, PositionSizing::FullCapital);

        let report = exec.execute(Decision::Buy(Some(u64::MAX)), &mut account, 0, ts(), 100.0);
        assert_eq!(
            report.rejection,
            Some(ExecutionError::QuantityTooLarge { qty: u64::MAX })
        );
        assert!(report.fills.is_empty());
        assert!(account.position.is_flat());
        assert_eq!(account.cash, 10_000.0);

        let report = exec.execute(Decision::Sell(Some(u64::MAX)), &mut account, 1, ts(), 100.0);
        assert_eq!(
            report.rejection,
            Some(ExecutionError::QuantityTooLarge { qty: u64::MAX })
        );
        assert!(account.position.is_flat());
    }

    #[test]
    fn adding_past_the_position_limit_is_rejected() {
        let mut account = Account::new(10_000.0);
        let mut exec = ExecutionEngine::new(0.0, false, true, PositionSizing::FullCapital);
        let max = i64::MAX as u64;

        let report = exec.execute(Decision::Buy(Some(max)), &mut account, 0, ts(), 1.0);
        assert!(report.rejection.is_none());
        assert_eq!(account.position.net_qty, i64::MAX);

        let cash = account.cash;
        let report = exec.execute(Decision::Buy(Some(1)), &mut account, 1, ts(), 1.0);
        assert_eq!(report.rejection, Some(ExecutionError::QuantityTooLarge { qty: 1 }));
        assert_eq!(account.position.net_qty, i64::MAX);
        assert_eq!(account.cash, cash);
    }

    #[test]
    fn close_when_flat_is_a_no_op() {
        let mut account = Account::new(1_000.0);
        let mut exec = engine(false, PositionSizing::FullCapital);
        let report = exec.execute(Decision::Close, &mut account, 0, ts(), 100.0);
        assert!(report.fills.is_empty());
        assert!(report.rejection.is_none());
    }

    #[test]
    fn fill_ids_increase() {
        let mut account = Account::new(10_000.0);
        let mut exec = engine(false, PositionSizing::FixedQuantity { quantity: 1 });
        let a = exec.execute(Decision::Buy(None), &mut account, 0, ts(), 100.0);
        let b = exec.execute(Decision::Close, &mut account, 1, ts(), 100.0);
        assert_eq!(a.fills[0].id, 1);
        assert_eq!(b.fills[0].id, 2);
    }
}
