use crate::data::bar::{Bar, BarSeries};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::path::Path;

//accepts both the lowercase layout written by save_csv and the
//capitalised Date/Open/High/Low/Close/Volume layout of exported quotes
#[derive(Debug, Deserialize)]
struct CsvRecord {
    #[serde(alias = "Date", alias = "date", alias = "Timestamp")]
    timestamp: String,
    #[serde(alias = "Open")]
    open: f64,
    #[serde(alias = "High")]
    high: f64,
    #[serde(alias = "Low")]
    low: f64,
    #[serde(alias = "Close")]
    close: f64,
    #[serde(alias = "Volume")]
    volume: f64,
    #[serde(default, alias = "Symbol")]
    symbol: Option<String>,
}

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    symbol: &'a str,
}

//parses rfc3339 timestamps, plain dates and naive "date time" stamps
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(dt) = date.and_hms_opt(0, 0, 0) {
            return Ok(dt.and_utc());
        }
    }

    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .context(format!("Unrecognised timestamp '{}'", raw))?;
    Ok(naive.and_utc())
}

//loads bars from a csv file
//rows without a symbol column take the file stem as their symbol
pub fn load_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Bar>> {
    let path = path.as_ref();
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .context(format!("Failed to open CSV file: {:?}", path))?;

    let default_symbol = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut bars = Vec::new();

    for (index, result) in reader.deserialize().enumerate() {
        let record: CsvRecord =
            result.context(format!("Failed to parse CSV record at line {}", index + 2))?;

        let timestamp = parse_timestamp(&record.timestamp).context(format!(
            "Failed to parse timestamp '{}' at line {}",
            record.timestamp,
            index + 2
        ))?;

        let symbol = record
            .symbol
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| default_symbol.clone());

        bars.push(Bar::new_unchecked(
            timestamp,
            record.open,
            record.high,
            record.low,
            record.close,
            record.volume,
            symbol,
        ));
    }

    //sort by timestamp to ensure chronological order
    bars.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

    Ok(bars)
}

//writes bars to a csv file that load_csv reads back unchanged
pub fn save_csv<P: AsRef<Path>>(bars: &[Bar], path: P) -> Result<()> {
    let path = path.as_ref();
    let mut writer = WriterBuilder::new()
        .has_headers(true)
        .from_path(path)
        .context(format!("Failed to create CSV file: {:?}", path))?;

    for bar in bars {
        writer.serialize(CsvRow {
            timestamp: bar.timestamp.to_rfc3339(),
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
            symbol: &bar.symbol,
        })?;
    }

    writer.flush()?;
    Ok(())
}

//filters bars by symbol
pub fn filter_by_symbol(bars: &[Bar], symbol: &str) -> Vec<Bar> {
    bars.iter()
        .filter(|bar| bar.symbol == symbol)
        .cloned()
        .collect()
}

//keeps bars whose calendar date lies in [start, end]; either bound may be open
pub fn filter_by_date_range(
    bars: &[Bar],
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Vec<Bar> {
    bars.iter()
        .filter(|bar| {
            let date = bar.timestamp.date_naive();
            start.map_or(true, |s| date >= s) && end.map_or(true, |e| date <= e)
        })
        .cloned()
        .collect()
}

//loads, filters and validates a single-instrument series
pub fn load_series<P: AsRef<Path>>(
    path: P,
    symbol: &str,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<BarSeries> {
    let path = path.as_ref();
    let all_bars = load_csv(path)?;
    let bars = filter_by_date_range(&filter_by_symbol(&all_bars, symbol), start, end);

    if bars.is_empty() {
        anyhow::bail!("No data found for symbol {} in {:?}", symbol, path);
    }

    BarSeries::new(symbol, bars).context(format!("Invalid bar data for {} in {:?}", symbol, path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_supported_timestamp_formats() {
        let a = parse_timestamp("2024-03-01T00:00:00Z").unwrap();
        let b = parse_timestamp("2024-03-01").unwrap();
        let c = parse_timestamp("2024-03-01 00:00:00").unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert!(parse_timestamp("03/01/2024").is_err());
    }

    #[test]
    fn reads_capitalised_headers_and_ignores_extra_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("600570.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "Date,Open,High,Low,Close,Volume,Amount").unwrap();
        writeln!(file, "2024-01-03,10.5,11,10,10.8,1200,99").unwrap();
        writeln!(file, "2024-01-02,10,10.6,9.8,10.4,1000,99").unwrap();
        drop(file);

        let bars = load_csv(&path).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].symbol, "600570");
        assert!(bars[0].timestamp < bars[1].timestamp);
        assert_eq!(bars[0].close, 10.4);
    }

    #[test]
    fn date_range_is_inclusive() {
        let bars: Vec<Bar> = (1..=5)
            .map(|d| {
                Bar::new_unchecked(
                    parse_timestamp(&format!("2024-01-0{}", d)).unwrap(),
                    10.0,
                    10.0,
                    10.0,
                    10.0,
                    0.0,
                    "X".into(),
                )
            })
            .collect();

        let start = NaiveDate::from_ymd_opt(2024, 1, 2);
        let end = NaiveDate::from_ymd_opt(2024, 1, 4);
        assert_eq!(filter_by_date_range(&bars, start, end).len(), 3);
        assert_eq!(filter_by_date_range(&bars, None, end).len(), 4);
        assert_eq!(filter_by_date_range(&bars, start, None).len(), 4);
    }
}
