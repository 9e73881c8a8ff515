//! # Finsight Warehouse
//!
//! DuckDB-backed time-series store for finsight.
//!
//! ## Overview
//!
//! The warehouse persists the two raw series the prediction pipeline works from:
//!
//! - **Price bars**: OHLCV rows keyed by `(symbol, ts)`
//! - **Sentiment records**: scored headlines keyed by `(symbol, ts, headline)`
//!
//! Rows are immutable once written; re-ingesting an existing key is ignored and
//! does not count towards the number of newly persisted rows. Reads always come
//! back ordered ascending by timestamp.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use finsight_warehouse::{PriceBarRow, Warehouse};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let warehouse = Warehouse::open_default()?;
//!
//!     let bars = vec![PriceBarRow {
//!         symbol: "AAPL".to_string(),
//!         ts: "2024-01-02T00:00:00Z".to_string(),
//!         open: 187.15,
//!         high: 188.44,
//!         low: 183.89,
//!         close: 185.64,
//!         volume: 82_488_700,
//!     }];
//!
//!     let inserted = warehouse.ingest_price_bars("yahoo", "req-001", &bars, 120)?;
//!     println!("{inserted} new bars");
//!
//!     for bar in warehouse.price_bars("AAPL")? {
//!         println!("{} close={}", bar.ts, bar.close);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Tables
//!
//! | Table | Description |
//! |-------|-------------|
//! | `price_bars` | OHLCV bars per symbol |
//! | `sentiment_records` | Scored news headlines per symbol |
//! | `ingest_log` | Ingestion audit log |
//!
//! All user-provided values are bound as query parameters, never interpolated.

pub mod duckdb;
pub mod migrations;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use ::duckdb::{Connection, ToSql};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

pub use duckdb::{DuckDbConnectionManager, PooledConnection};

/// Strftime pattern producing RFC3339 UTC text from a `TIMESTAMP` column.
const RFC3339_MICROS: &str = "%Y-%m-%dT%H:%M:%S.%fZ";

/// Errors that can occur during warehouse operations.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// `DuckDB` database error.
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    /// I/O error (file system operations).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A row was rejected before reaching the database.
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

/// Configuration for the warehouse database.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    /// Root directory for finsight data.
    pub finsight_home: PathBuf,
    /// Path to the `DuckDB` database file.
    pub db_path: PathBuf,
    /// Maximum number of idle connections kept in the pool.
    pub max_pool_size: usize,
}

impl WarehouseConfig {
    /// Lay out the database under the given home directory.
    pub fn in_home(finsight_home: impl Into<PathBuf>) -> Self {
        let finsight_home = finsight_home.into();
        let db_path = finsight_home.join("cache").join("warehouse.duckdb");
        Self {
            finsight_home,
            db_path,
            max_pool_size: 4,
        }
    }
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self::in_home(resolve_finsight_home())
    }
}

/// A price bar row as stored in `price_bars`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceBarRow {
    /// Ticker symbol (e.g., "AAPL").
    pub symbol: String,
    /// Bar timestamp as RFC3339 UTC string.
    pub ts: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// A scored headline row as stored in `sentiment_records`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentimentRow {
    /// Ticker symbol.
    pub symbol: String,
    /// Time the headline was scored, RFC3339 UTC.
    pub ts: String,
    /// News headline text.
    pub headline: String,
    /// Sentiment score in [-1, 1].
    pub score: f64,
    /// Timestamp of the price bar this record refers to, if any.
    pub price_bar_ts: Option<String>,
}

/// The main warehouse interface for time-series storage.
#[derive(Clone)]
pub struct Warehouse {
    config: WarehouseConfig,
    manager: DuckDbConnectionManager,
}

impl Warehouse {
    /// Open a warehouse with default configuration.
    pub fn open_default() -> Result<Self, WarehouseError> {
        Self::open(WarehouseConfig::default())
    }

    /// Open a warehouse with the specified configuration, creating the schema if needed.
    pub fn open(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        if let Some(parent) = config.db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let manager = DuckDbConnectionManager::open(config.db_path.clone(), config.max_pool_size)?;
        let warehouse = Self { config, manager };
        warehouse.initialize()?;
        Ok(warehouse)
    }

    /// Apply schema migrations.
    pub fn initialize(&self) -> Result<(), WarehouseError> {
        let connection = self.manager.acquire()?;
        migrations::apply_migrations(&connection)?;
        Ok(())
    }

    /// Get the path to the database file.
    pub fn db_path(&self) -> &Path {
        self.manager.db_path()
    }

    /// Root directory this warehouse was opened under.
    pub fn home(&self) -> &Path {
        self.config.finsight_home.as_path()
    }

    /// Persist price bars, returning how many rows were new.
    ///
    /// Bars whose `(symbol, ts)` already exist are left untouched.
    pub fn ingest_price_bars(
        &self,
        source: &str,
        request_id: &str,
        rows: &[PriceBarRow],
        latency_ms: u64,
    ) -> Result<usize, WarehouseError> {
        if rows.is_empty() {
            return Ok(0);
        }
        for row in rows {
            validate_price_bar(row)?;
        }

        let connection = self.manager.acquire()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<usize, WarehouseError> {
            let before = count_rows(&connection, "price_bars")?;

            for row in rows {
                let volume = i64::try_from(row.volume).map_err(|_| {
                    WarehouseError::InvalidRecord(format!("volume {} out of range", row.volume))
                })?;
                let params: [&dyn ToSql; 8] = [
                    &row.symbol,
                    &row.ts,
                    &row.open,
                    &row.high,
                    &row.low,
                    &row.close,
                    &volume,
                    &source,
                ];
                connection.execute(
                    "INSERT OR IGNORE INTO price_bars \
                     (symbol, ts, open, high, low, close, volume, source, updated_at) \
                     VALUES (?, CAST(? AS TIMESTAMP), ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)",
                    params.as_slice(),
                )?;
            }

            let inserted = count_rows(&connection, "price_bars")? - before;
            let symbol = rows.first().map(|row| row.symbol.as_str());
            log_ingest(
                &connection,
                request_id,
                symbol,
                source,
                "price_bars",
                inserted,
                latency_ms,
            )?;
            Ok(inserted)
        })();

        let inserted = finalize_transaction(&connection, result)?;
        debug!(source, request_id, inserted, "ingested price bars");
        Ok(inserted)
    }

    /// Persist sentiment records, returning how many rows were new.
    pub fn ingest_sentiment(
        &self,
        source: &str,
        request_id: &str,
        rows: &[SentimentRow],
        latency_ms: u64,
    ) -> Result<usize, WarehouseError> {
        if rows.is_empty() {
            return Ok(0);
        }
        for row in rows {
            validate_sentiment(row)?;
        }

        let connection = self.manager.acquire()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<usize, WarehouseError> {
            let before = count_rows(&connection, "sentiment_records")?;

            for row in rows {
                let params: [&dyn ToSql; 6] = [
                    &row.symbol,
                    &row.ts,
                    &row.headline,
                    &row.score,
                    &row.price_bar_ts,
                    &source,
                ];
                connection.execute(
                    "INSERT OR IGNORE INTO sentiment_records \
                     (symbol, ts, headline, score, price_bar_ts, source, updated_at) \
                     VALUES (?, CAST(? AS TIMESTAMP), ?, ?, CAST(? AS TIMESTAMP), ?, CURRENT_TIMESTAMP)",
                    params.as_slice(),
                )?;
            }

            let inserted = count_rows(&connection, "sentiment_records")? - before;
            let symbol = rows.first().map(|row| row.symbol.as_str());
            log_ingest(
                &connection,
                request_id,
                symbol,
                source,
                "sentiment_records",
                inserted,
                latency_ms,
            )?;
            Ok(inserted)
        })();

        let inserted = finalize_transaction(&connection, result)?;
        debug!(source, request_id, inserted, "ingested sentiment records");
        Ok(inserted)
    }

    /// All price bars for a symbol, ascending by timestamp.
    pub fn price_bars(&self, symbol: &str) -> Result<Vec<PriceBarRow>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let sql = format!(
            "SELECT symbol, strftime(ts, '{RFC3339_MICROS}'), open, high, low, close, volume \
             FROM price_bars WHERE symbol = ? ORDER BY ts ASC"
        );
        let mut statement = connection.prepare(&sql)?;
        let rows = statement.query_map([symbol], |row| {
            let volume: i64 = row.get(6)?;
            Ok(PriceBarRow {
                symbol: row.get(0)?,
                ts: row.get(1)?,
                open: row.get(2)?,
                high: row.get(3)?,
                low: row.get(4)?,
                close: row.get(5)?,
                volume: u64::try_from(volume).unwrap_or_default(),
            })
        })?;

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// All sentiment records for a symbol, ascending by timestamp.
    pub fn sentiment(&self, symbol: &str) -> Result<Vec<SentimentRow>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let sql = format!(
            "SELECT symbol, strftime(ts, '{RFC3339_MICROS}'), headline, score, \
             strftime(price_bar_ts, '{RFC3339_MICROS}') \
             FROM sentiment_records WHERE symbol = ? ORDER BY ts ASC, headline ASC"
        );
        let mut statement = connection.prepare(&sql)?;
        let rows = statement.query_map([symbol], |row| {
            Ok(SentimentRow {
                symbol: row.get(0)?,
                ts: row.get(1)?,
                headline: row.get(2)?,
                score: row.get(3)?,
                price_bar_ts: row.get(4)?,
            })
        })?;

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

fn validate_price_bar(row: &PriceBarRow) -> Result<(), WarehouseError> {
    let prices = [
        ("open", row.open),
        ("high", row.high),
        ("low", row.low),
        ("close", row.close),
    ];
    for (field, value) in prices {
        if !value.is_finite() || value < 0.0 {
            return Err(WarehouseError::InvalidRecord(format!(
                "{} bar at {}: {field} must be a finite non-negative number",
                row.symbol, row.ts
            )));
        }
    }
    Ok(())
}

fn validate_sentiment(row: &SentimentRow) -> Result<(), WarehouseError> {
    if !row.score.is_finite() || !(-1.0..=1.0).contains(&row.score) {
        return Err(WarehouseError::InvalidRecord(format!(
            "{} sentiment at {}: score {} outside [-1, 1]",
            row.symbol, row.ts, row.score
        )));
    }
    Ok(())
}

fn count_rows(connection: &Connection, table: &'static str) -> Result<usize, WarehouseError> {
    let sql = format!("SELECT COUNT(*) FROM {table}");
    let count: i64 = connection.query_row(&sql, [], |row| row.get(0))?;
    Ok(usize::try_from(count).unwrap_or_default())
}

fn log_ingest(
    connection: &Connection,
    request_id: &str,
    symbol: Option<&str>,
    source: &str,
    dataset: &str,
    row_count: usize,
    latency_ms: u64,
) -> Result<(), WarehouseError> {
    let row_count = i64::try_from(row_count).unwrap_or(i64::MAX);
    let latency_ms = i64::try_from(latency_ms).unwrap_or(i64::MAX);
    let params: [&dyn ToSql; 6] = [
        &request_id,
        &symbol,
        &source,
        &dataset,
        &row_count,
        &latency_ms,
    ];
    connection.execute(
        "INSERT INTO ingest_log \
         (request_id, symbol, source, dataset, status, row_count, latency_ms, timestamp) \
         VALUES (?, ?, ?, ?, 'ok', ?, ?, CURRENT_TIMESTAMP)",
        params.as_slice(),
    )?;
    Ok(())
}

/// Commit on success, roll back on failure.
fn finalize_transaction<T>(
    connection: &Connection,
    result: Result<T, WarehouseError>,
) -> Result<T, WarehouseError> {
    match result {
        Ok(value) => {
            connection.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            let _ = connection.execute_batch("ROLLBACK");
            Err(error)
        }
    }
}

/// Resolve the finsight home directory from environment or default.
pub fn resolve_finsight_home() -> PathBuf {
    if let Some(path) = env::var_os("FINSIGHT_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".finsight");
    }

    PathBuf::from(".finsight")
}
