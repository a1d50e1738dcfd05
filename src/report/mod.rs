pub mod export;

pub use export::{write_equity_csv, write_summary_json, write_trades_csv, RunReport};
