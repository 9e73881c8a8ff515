//! Request-level pipeline: ingest, analyze, train, predict and data reads.

use std::sync::Arc;
use std::time::Instant;

use finsight_core::{
    price_source, sentiment_source, CacheOperation, FinsightConfig, PipelineError, PredictionCache,
    PriceSource, SentimentSource, Symbol, TimeSeriesStore, UtcDateTime,
};
use finsight_warehouse::Warehouse;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::align::{align, AlignedRow};
use crate::features::{build, FeatureRow};
use crate::gbm::GbmParams;
use crate::model::ModelManager;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainStatus {
    pub status: String,
    pub symbol: Symbol,
    pub rows: usize,
    pub trained_at: UtcDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub symbol: Symbol,
    pub predicted_close: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockPoint {
    pub timestamp: UtcDateTime,
    pub close_price: f64,
    pub volume: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentPoint {
    pub timestamp: UtcDateTime,
    pub sentiment_score: f64,
}

/// Wires sources, store, models and cache into the request-facing operations.
///
/// Constructed once per process and shared by every request handler.
#[derive(Clone)]
pub struct PredictionService {
    store: Arc<dyn TimeSeriesStore>,
    prices: Arc<dyn PriceSource>,
    news: Arc<dyn SentimentSource>,
    models: ModelManager,
    cache: PredictionCache,
    price_period_days: u32,
    align_tolerance: Option<time::Duration>,
}

impl PredictionService {
    pub fn new(
        store: Arc<dyn TimeSeriesStore>,
        prices: Arc<dyn PriceSource>,
        news: Arc<dyn SentimentSource>,
        models: ModelManager,
        cache: PredictionCache,
    ) -> Self {
        Self {
            store,
            prices,
            news,
            models,
            cache,
            price_period_days: 100,
            align_tolerance: None,
        }
    }

    /// Open the warehouse under the configured home and pick the data sources.
    pub fn from_config(config: &FinsightConfig) -> Result<Self, PipelineError> {
        let warehouse = Warehouse::open(config.warehouse_config())?;
        let prices = price_source(config);
        let news = sentiment_source(config);
        info!(
            home = %config.home.display(),
            offline = config.offline,
            prices = prices.name(),
            news = news.name(),
            "prediction service configured"
        );

        Ok(Self::new(
            Arc::new(warehouse),
            prices,
            news,
            ModelManager::new(config.models_dir(), GbmParams::default()),
            PredictionCache::new(config.ttls),
        )
        .with_price_period_days(config.price_period_days)
        .with_align_tolerance(config.align_tolerance))
    }

    pub fn with_price_period_days(mut self, days: u32) -> Self {
        self.price_period_days = days;
        self
    }

    pub fn with_align_tolerance(mut self, tolerance: Option<time::Duration>) -> Self {
        self.align_tolerance = tolerance;
        self
    }

    pub fn cache(&self) -> &PredictionCache {
        &self.cache
    }

    pub fn price_source(&self) -> Arc<dyn PriceSource> {
        Arc::clone(&self.prices)
    }

    pub fn models(&self) -> &ModelManager {
        &self.models
    }

    /// Fetch price bars and persist them; returns the newly stored count.
    pub async fn ingest(&self, symbol: &Symbol) -> Result<usize, PipelineError> {
        let started = Instant::now();
        let bars = self.prices.price_bars(symbol, self.price_period_days).await?;
        if bars.is_empty() {
            return Err(PipelineError::NotFound(format!("no price data for {symbol}")));
        }
        let latency_ms = elapsed_ms(started);

        let inserted = self
            .store
            .insert_price_bars(self.prices.name(), &bars, latency_ms)
            .await?;
        info!(%symbol, fetched = bars.len(), inserted, latency_ms, "ingested price bars");
        Ok(inserted)
    }

    /// Fetch and score headlines and persist them; returns the newly stored
    /// count. Records are attributed to the latest stored bar, if any.
    pub async fn analyze(&self, symbol: &Symbol) -> Result<usize, PipelineError> {
        let started = Instant::now();
        let records = self.news.sentiment_records(symbol).await?;
        if records.is_empty() {
            return Err(PipelineError::NotFound(format!("no news for {symbol}")));
        }
        let latency_ms = elapsed_ms(started);

        let latest_bar = self.store.price_bars(symbol).await?.last().map(|bar| bar.ts);
        let records: Vec<_> = match latest_bar {
            Some(ts) => records.into_iter().map(|record| record.with_price_bar(ts)).collect(),
            None => records,
        };

        let inserted = self
            .store
            .insert_sentiment(self.news.name(), &records, latency_ms)
            .await?;
        info!(%symbol, fetched = records.len(), inserted, latency_ms, "stored sentiment");
        Ok(inserted)
    }

    async fn aligned(&self, symbol: &Symbol) -> Result<Vec<AlignedRow>, PipelineError> {
        let prices = self.store.price_bars(symbol).await?;
        let sentiment = self.store.sentiment_records(symbol).await?;
        if prices.is_empty() {
            return Err(PipelineError::insufficient(format!("no stored price bars for {symbol}")));
        }
        debug!(%symbol, prices = prices.len(), sentiment = sentiment.len(), "loaded series");
        align(&prices, &sentiment, self.align_tolerance)
    }

    /// Fit and persist the model for `symbol`. Cached for the train TTL.
    pub async fn train(&self, symbol: &Symbol) -> Result<TrainStatus, PipelineError> {
        self.cache
            .get_or_compute(CacheOperation::Train, symbol.as_str(), || async {
                let rows = build(&self.aligned(symbol).await?)?;
                let models = self.models.clone();
                let owned = symbol.clone();
                let model = blocking(move || models.train(&owned, &rows)).await?;
                Ok(TrainStatus {
                    status: String::from("trained"),
                    symbol: model.symbol,
                    rows: model.training_rows,
                    trained_at: model.trained_at,
                })
            })
            .await
    }

    /// Predict the next close for `symbol`, training first if no model exists.
    /// Cached for the predict TTL.
    pub async fn predict(&self, symbol: &Symbol) -> Result<Prediction, PipelineError> {
        self.cache
            .get_or_compute(CacheOperation::Predict, symbol.as_str(), || async {
                let rows = self.aligned(symbol).await?;
                let latest = rows
                    .last()
                    .map(FeatureRow::from_latest)
                    .ok_or_else(|| PipelineError::insufficient(format!("no aligned rows for {symbol}")))?;

                let models = self.models.clone();
                let owned = symbol.clone();
                let predicted_close =
                    blocking(move || models.predict(&owned, &latest, || build(&rows))).await?;
                info!(%symbol, predicted_close, "predicted next close");
                Ok(Prediction {
                    symbol: symbol.clone(),
                    predicted_close,
                })
            })
            .await
    }

    /// Stored closes and volumes, ascending. Cached for the data-read TTL.
    pub async fn stock_rows(&self, symbol: &Symbol) -> Result<Vec<StockPoint>, PipelineError> {
        self.cache
            .get_or_compute(CacheOperation::StockRows, symbol.as_str(), || async {
                let bars = self.store.price_bars(symbol).await?;
                Ok(bars
                    .into_iter()
                    .map(|bar| StockPoint {
                        timestamp: bar.ts,
                        close_price: bar.close,
                        volume: bar.volume,
                    })
                    .collect())
            })
            .await
    }

    /// Stored sentiment scores, ascending. Cached for the data-read TTL.
    pub async fn sentiment_rows(&self, symbol: &Symbol) -> Result<Vec<SentimentPoint>, PipelineError> {
        self.cache
            .get_or_compute(CacheOperation::SentimentRows, symbol.as_str(), || async {
                let records = self.store.sentiment_records(symbol).await?;
                Ok(records
                    .into_iter()
                    .map(|record| SentimentPoint {
                        timestamp: record.ts,
                        sentiment_score: record.score,
                    })
                    .collect())
            })
            .await
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Run model fitting or file I/O off the async runtime.
async fn blocking<T, F>(call: F) -> Result<T, PipelineError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, PipelineError> + Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| PipelineError::ModelUnavailable(format!("model task failed: {e}")))?
}
