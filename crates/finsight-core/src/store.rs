//! Time-series storage contract and its DuckDB implementation.

use std::future::Future;
use std::pin::Pin;

use finsight_warehouse::{PriceBarRow, SentimentRow, Warehouse, WarehouseError};
use tracing::info;

use crate::{PipelineError, PriceBar, SentimentRecord, Symbol, UtcDateTime, ValidationError};

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, PipelineError>> + Send + 'a>>;

/// Persistent, append-only store of price bars and sentiment records.
///
/// Reads return rows ascending by timestamp. Inserts ignore rows whose key
/// already exists and report only the newly persisted count.
pub trait TimeSeriesStore: Send + Sync {
    fn insert_price_bars<'a>(
        &'a self,
        source: &'a str,
        bars: &'a [PriceBar],
        latency_ms: u64,
    ) -> StoreFuture<'a, usize>;

    fn insert_sentiment<'a>(
        &'a self,
        source: &'a str,
        records: &'a [SentimentRecord],
        latency_ms: u64,
    ) -> StoreFuture<'a, usize>;

    fn price_bars<'a>(&'a self, symbol: &'a Symbol) -> StoreFuture<'a, Vec<PriceBar>>;

    fn sentiment_records<'a>(&'a self, symbol: &'a Symbol) -> StoreFuture<'a, Vec<SentimentRecord>>;
}

/// Run a blocking warehouse call off the async runtime.
async fn blocking<T, F>(call: F) -> Result<T, PipelineError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, WarehouseError> + Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| PipelineError::upstream(format!("warehouse task failed: {e}")))?
        .map_err(PipelineError::from)
}

fn corrupt(error: ValidationError) -> PipelineError {
    PipelineError::upstream(format!("stored row failed validation: {error}"))
}

fn bar_to_row(bar: &PriceBar) -> PriceBarRow {
    PriceBarRow {
        symbol: bar.symbol.to_string(),
        ts: bar.ts.format_rfc3339(),
        open: bar.open,
        high: bar.high,
        low: bar.low,
        close: bar.close,
        volume: bar.volume,
    }
}

fn row_to_bar(row: PriceBarRow) -> Result<PriceBar, ValidationError> {
    PriceBar::new(
        Symbol::parse(&row.symbol)?,
        UtcDateTime::parse(&row.ts)?,
        row.open,
        row.high,
        row.low,
        row.close,
        row.volume,
    )
}

fn record_to_row(record: &SentimentRecord) -> SentimentRow {
    SentimentRow {
        symbol: record.symbol.to_string(),
        ts: record.ts.format_rfc3339(),
        headline: record.headline.clone(),
        score: record.score,
        price_bar_ts: record.price_bar_ts.map(UtcDateTime::format_rfc3339),
    }
}

fn row_to_record(row: SentimentRow) -> Result<SentimentRecord, ValidationError> {
    let record = SentimentRecord::new(
        Symbol::parse(&row.symbol)?,
        UtcDateTime::parse(&row.ts)?,
        row.headline,
        row.score,
    )?;
    match row.price_bar_ts {
        Some(ts) => Ok(record.with_price_bar(UtcDateTime::parse(&ts)?)),
        None => Ok(record),
    }
}

impl TimeSeriesStore for Warehouse {
    fn insert_price_bars<'a>(
        &'a self,
        source: &'a str,
        bars: &'a [PriceBar],
        latency_ms: u64,
    ) -> StoreFuture<'a, usize> {
        let warehouse = self.clone();
        let source = source.to_owned();
        let rows: Vec<PriceBarRow> = bars.iter().map(bar_to_row).collect();
        Box::pin(async move {
            let request_id = uuid::Uuid::new_v4().to_string();
            let total = rows.len();
            let inserted = blocking(move || {
                warehouse.ingest_price_bars(&source, &request_id, &rows, latency_ms)
            })
            .await?;
            info!(total, inserted, "stored price bars");
            Ok(inserted)
        })
    }

    fn insert_sentiment<'a>(
        &'a self,
        source: &'a str,
        records: &'a [SentimentRecord],
        latency_ms: u64,
    ) -> StoreFuture<'a, usize> {
        let warehouse = self.clone();
        let source = source.to_owned();
        let rows: Vec<SentimentRow> = records.iter().map(record_to_row).collect();
        Box::pin(async move {
            let request_id = uuid::Uuid::new_v4().to_string();
            let total = rows.len();
            let inserted = blocking(move || {
                warehouse.ingest_sentiment(&source, &request_id, &rows, latency_ms)
            })
            .await?;
            info!(total, inserted, "stored sentiment records");
            Ok(inserted)
        })
    }

    fn price_bars<'a>(&'a self, symbol: &'a Symbol) -> StoreFuture<'a, Vec<PriceBar>> {
        let warehouse = self.clone();
        let symbol = symbol.to_string();
        Box::pin(async move {
            let rows = blocking(move || warehouse.price_bars(&symbol)).await?;
            rows.into_iter()
                .map(|row| row_to_bar(row).map_err(corrupt))
                .collect()
        })
    }

    fn sentiment_records<'a>(&'a self, symbol: &'a Symbol) -> StoreFuture<'a, Vec<SentimentRecord>> {
        let warehouse = self.clone();
        let symbol = symbol.to_string();
        Box::pin(async move {
            let rows = blocking(move || warehouse.sentiment(&symbol)).await?;
            rows.into_iter()
                .map(|row| row_to_record(row).map_err(corrupt))
                .collect()
        })
    }
}
