//! CSV candle loading.
//!
//! Expected header: `time,open,high,low,close[,volume]`. `time` is either
//! RFC 3339 or integer Unix seconds. Rows are indexed in file order
//! starting at 0; the loader does not validate OHLC values or ordering,
//! the pipeline rejects bad rows with a reason code so they show up in the
//! backtest result instead of aborting the load.

use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use smc_core::Candle;
use thiserror::Error;

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error at line {line}: {source}")]
    Csv {
        line: u64,
        #[source]
        source: csv::Error,
    },

    #[error("line {line}: unparseable timestamp '{value}'")]
    BadTimestamp { line: u64, value: String },

    #[error("{0} contains no candles")]
    Empty(String),
}

/// Candles for one instrument plus provenance.
#[derive(Debug, Clone)]
pub struct LoadedCandles {
    pub candles: Vec<Candle>,
    /// BLAKE3 over every OHLCV value in file order.
    pub dataset_hash: String,
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    time: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: Option<f64>,
}

/// Load candles from a CSV file.
pub fn load_candles(path: &Path) -> Result<LoadedCandles, LoadError> {
    let file = std::fs::File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let loaded = parse_candles(file)?;
    if loaded.candles.is_empty() {
        return Err(LoadError::Empty(path.display().to_string()));
    }
    tracing::debug!(
        path = %path.display(),
        candles = loaded.candles.len(),
        hash = %loaded.dataset_hash,
        "loaded candles"
    );
    Ok(loaded)
}

/// Parse candles from any CSV reader. An empty input yields no candles.
pub fn parse_candles<R: Read>(reader: R) -> Result<LoadedCandles, LoadError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut candles = Vec::new();
    for (i, result) in csv_reader.deserialize::<CsvRow>().enumerate() {
        // Header is line 1.
        let line = i as u64 + 2;
        let row = result.map_err(|source| LoadError::Csv { line, source })?;
        let time = parse_time(&row.time).ok_or_else(|| LoadError::BadTimestamp {
            line,
            value: row.time.clone(),
        })?;
        candles.push(Candle::new(
            i as u64,
            time,
            row.open,
            row.high,
            row.low,
            row.close,
            row.volume.unwrap_or(0.0),
        ));
    }

    let dataset_hash = dataset_hash(&candles);
    Ok(LoadedCandles {
        candles,
        dataset_hash,
    })
}

fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(secs) = raw.parse::<i64>() {
        return Utc.timestamp_opt(secs, 0).single();
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Deterministic BLAKE3 hash over candle times and OHLCV values.
pub fn dataset_hash(candles: &[Candle]) -> String {
    let mut hasher = blake3::Hasher::new();
    for c in candles {
        hasher.update(&c.time.timestamp().to_le_bytes());
        hasher.update(&c.open.to_le_bytes());
        hasher.update(&c.high.to_le_bytes());
        hasher.update(&c.low.to_le_bytes());
        hasher.update(&c.close.to_le_bytes());
        hasher.update(&c.volume.to_le_bytes());
    }
    hasher.finalize().to_hex().to_string()
}
