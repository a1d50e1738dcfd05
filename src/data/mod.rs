pub mod bar;
pub mod loader;
pub mod source;

pub use bar::{Bar, BarError, BarSeries};
pub use loader::{filter_by_date_range, filter_by_symbol, load_csv, load_series, save_csv};
pub use source::{CsvDataSource, DataRequest, DataSource};
