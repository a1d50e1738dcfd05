use crate::data::bar::BarSeries;
use crate::data::loader::{load_series, save_csv};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use tracing::info;

//what a caller asks a data source for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRequest {
    pub symbol: String,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DataRequest {
    pub fn new(symbol: impl Into<String>) -> Self {
        DataRequest {
            symbol: symbol.into(),
            start: None,
            end: None,
        }
    }

    pub fn with_range(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.start = start;
        self.end = end;
        self
    }
}

/// Supplies validated bar series to the engine.
///
/// A failed fetch surfaces as an error before any engine is built.
/// Retrying is the source's business; the engine never retries.
pub trait DataSource {
    fn fetch(&self, request: &DataRequest) -> Result<BarSeries>;
}

//reads bars from a csv file, or from `<dir>/<symbol>.csv` when given a directory
#[derive(Debug, Clone)]
pub struct CsvDataSource {
    path: PathBuf,
}

impl CsvDataSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CsvDataSource { path: path.into() }
    }

    fn file_for(&self, symbol: &str) -> PathBuf {
        if self.path.is_dir() {
            self.path.join(format!("{}.csv", symbol))
        } else {
            self.path.clone()
        }
    }

    //writes a fetched series into the cache layout this source reads
    pub fn store(&self, series: &BarSeries) -> Result<PathBuf> {
        let target = self.file_for(series.symbol());
        if let Some(parent) = target.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .context(format!("Failed to create cache directory {:?}", parent))?;
            }
        }
        save_csv(series.bars(), &target)?;
        info!(symbol = series.symbol(), bars = series.len(), path = ?target, "cached bar series");
        Ok(target)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DataSource for CsvDataSource {
    fn fetch(&self, request: &DataRequest) -> Result<BarSeries> {
        let file = self.file_for(&request.symbol);
        let series = load_series(&file, &request.symbol, request.start, request.end)
            .context(format!("Failed to fetch {} from {:?}", request.symbol, file))?;

        info!(
            symbol = %request.symbol,
            bars = series.len(),
            "loaded bar series from csv"
        );
        Ok(series)
    }
}
