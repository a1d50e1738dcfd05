pub mod account;
pub mod position;
pub mod trade;

pub use account::Account;
pub use position::{Position, PositionError};
pub use trade::{Side, TradeRecord};
