//! Daily price bars from CSV files.

use crate::models::PriceBar;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use log::{debug, info};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Failed to open {path}: {message}")]
    Open { path: String, message: String },

    #[error("Failed to parse CSV: {0}")]
    Csv(String),

    #[error("Missing required column '{0}'")]
    MissingColumn(&'static str),

    #[error("Row {row}: cannot parse timestamp '{value}'")]
    InvalidTimestamp { row: usize, value: String },

    #[error("Row {row}: {column} value '{value}' is not a finite number")]
    InvalidPrice {
        row: usize,
        column: &'static str,
        value: String,
    },

    #[error("Row {row}: timestamp {timestamp} is not after the previous row")]
    OutOfOrder { row: usize, timestamp: DateTime<Utc> },

    #[error("No price bars found")]
    Empty,
}

/// Inclusive date window applied after parsing.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DateWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateWindow {
    pub fn contains(&self, date: DateTime<Utc>) -> bool {
        self.start.map_or(true, |start| date >= start) && self.end.map_or(true, |end| date <= end)
    }
}

struct ColumnLayout {
    timestamp: usize,
    open: Option<usize>,
    high: Option<usize>,
    low: Option<usize>,
    close: usize,
    volume: Option<usize>,
}

impl ColumnLayout {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self, LoadError> {
        let find = |names: &[&str]| {
            headers
                .iter()
                .position(|header| names.contains(&header.trim().to_ascii_lowercase().as_str()))
        };

        Ok(Self {
            timestamp: find(&["timestamp", "date", "datetime", "time"])
                .ok_or(LoadError::MissingColumn("timestamp"))?,
            open: find(&["open"]),
            high: find(&["high"]),
            low: find(&["low"]),
            close: find(&["close", "adj_close", "price"]).ok_or(LoadError::MissingColumn("close"))?,
            volume: find(&["volume"]),
        })
    }
}

/// Load bars from a CSV file with a `timestamp,open,high,low,close[,volume]` header.
pub fn load_price_bars(path: &Path, window: DateWindow) -> Result<Vec<PriceBar>, LoadError> {
    let file = File::open(path).map_err(|e| LoadError::Open {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let bars = read_price_bars(BufReader::new(file), window)?;
    info!("Loaded {} price bars from {}", bars.len(), path.display());
    Ok(bars)
}

/// Parse bars from any CSV source. Rows must be strictly increasing in time.
pub fn read_price_bars<R: Read>(source: R, window: DateWindow) -> Result<Vec<PriceBar>, LoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(source);
    let headers = reader
        .headers()
        .map_err(|e| LoadError::Csv(e.to_string()))?
        .clone();
    let layout = ColumnLayout::from_headers(&headers)?;

    let mut bars = Vec::new();
    let mut previous: Option<DateTime<Utc>> = None;
    let mut skipped = 0usize;

    for (offset, record) in reader.records().enumerate() {
        let row = offset + 2;
        let record = record.map_err(|e| LoadError::Csv(e.to_string()))?;

        let raw_timestamp = record.get(layout.timestamp).unwrap_or("");
        let date = parse_timestamp(raw_timestamp).ok_or_else(|| LoadError::InvalidTimestamp {
            row,
            value: raw_timestamp.to_string(),
        })?;
        if let Some(previous) = previous {
            if date <= previous {
                return Err(LoadError::OutOfOrder {
                    row,
                    timestamp: date,
                });
            }
        }
        previous = Some(date);

        let close = price_field(&record, Some(layout.close), "close", row)?
            .ok_or(LoadError::MissingColumn("close"))?;
        let open = price_field(&record, layout.open, "open", row)?.unwrap_or(close);
        let high = price_field(&record, layout.high, "high", row)?.unwrap_or(close);
        let low = price_field(&record, layout.low, "low", row)?.unwrap_or(close);

        if !window.contains(date) {
            skipped += 1;
            continue;
        }

        let mut bar = PriceBar::new(date, open, high, low, close);
        if let Some(volume) = price_field(&record, layout.volume, "volume", row)? {
            bar = bar.with_volume(volume);
        }
        bars.push(bar);
    }

    if skipped > 0 {
        debug!("Skipped {} rows outside the requested date window", skipped);
    }
    if bars.is_empty() {
        return Err(LoadError::Empty);
    }
    Ok(bars)
}

fn price_field(
    record: &csv::StringRecord,
    index: Option<usize>,
    column: &'static str,
    row: usize,
) -> Result<Option<f64>, LoadError> {
    let Some(raw) = index.and_then(|index| record.get(index)) else {
        return Ok(None);
    };
    if raw.is_empty() && column == "volume" {
        return Ok(None);
    }
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(Some(value)),
        _ => Err(LoadError::InvalidPrice {
            row,
            column,
            value: raw.to_string(),
        }),
    }
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DD`, or unix seconds / milliseconds.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&parsed));
    }
    if let Ok(parsed) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return parsed
            .and_hms_opt(0, 0, 0)
            .map(|midnight| Utc.from_utc_datetime(&midnight));
    }
    if let Ok(epoch) = raw.parse::<i64>() {
        // Values this large are milliseconds.
        return if epoch.abs() >= 100_000_000_000 {
            Utc.timestamp_millis_opt(epoch).single()
        } else {
            Utc.timestamp_opt(epoch, 0).single()
        };
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = "timestamp,open,high,low,close,volume\n\
        2024-01-02,10,11,9,10.5,1000\n\
        2024-01-03,10.5,12,10,11.5,\n\
        2024-01-04,11.5,12,11,11.0,800\n";

    #[test]
    fn reads_ohlcv_rows() {
        let bars = read_price_bars(SAMPLE.as_bytes(), DateWindow::default()).unwrap();
        assert_eq!(bars.len(), 3);
        assert_eq!(bars[0].close, 10.5);
        assert_eq!(bars[0].volume, Some(1000.0));
        assert_eq!(bars[1].volume, None);
        assert_eq!(bars[2].high, 12.0);
    }

    #[test]
    fn accepts_several_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2024-03-01"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01 00:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01T00:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("1709251200"), Some(expected));
        assert_eq!(parse_timestamp("1709251200000"), Some(expected));
        assert_eq!(parse_timestamp("March 1st"), None);
    }

    #[test]
    fn close_only_files_fill_other_prices() {
        let csv = "date,close\n2024-01-02,5\n2024-01-03,6\n";
        let bars = read_price_bars(csv.as_bytes(), DateWindow::default()).unwrap();
        assert_eq!(bars[1].open, 6.0);
        assert_eq!(bars[1].low, 6.0);
    }

    #[test]
    fn rejects_bad_input() {
        let unordered = "timestamp,close\n2024-01-03,5\n2024-01-02,6\n";
        assert!(matches!(
            read_price_bars(unordered.as_bytes(), DateWindow::default()),
            Err(LoadError::OutOfOrder { row: 3, .. })
        ));

        let not_a_number = "timestamp,close\n2024-01-02,NaN\n";
        assert!(matches!(
            read_price_bars(not_a_number.as_bytes(), DateWindow::default()),
            Err(LoadError::InvalidPrice { column: "close", .. })
        ));

        let header_only = "timestamp,close\n";
        assert!(matches!(
            read_price_bars(header_only.as_bytes(), DateWindow::default()),
            Err(LoadError::Empty)
        ));

        let no_close = "timestamp,open\n2024-01-02,5\n";
        assert!(matches!(
            read_price_bars(no_close.as_bytes(), DateWindow::default()),
            Err(LoadError::MissingColumn("close"))
        ));
    }

    #[test]
    fn date_window_filters_rows() {
        let window = DateWindow {
            start: parse_timestamp("2024-01-03"),
            end: None,
        };
        let bars = read_price_bars(SAMPLE.as_bytes(), window).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].close, 11.5);
    }

    #[test]
    fn loads_from_disk() {
        let path = std::env::temp_dir().join(format!("price_bars_{}.csv", std::process::id()));
        let mut file = File::create(&path).unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        drop(file);

        let bars = load_price_bars(&path, DateWindow::default()).unwrap();
        assert_eq!(bars.len(), 3);
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(
            load_price_bars(&path, DateWindow::default()),
            Err(LoadError::Open { .. })
        ));
    }
}
