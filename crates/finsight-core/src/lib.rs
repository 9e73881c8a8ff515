//! # Finsight Core
//!
//! Shared contracts for the finsight price/sentiment prediction pipeline.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Yahoo, NewsAPI and synthetic data sources |
//! | [`cache`] | `PredictionCache`, per-operation TTL memoization |
//! | [`circuit_breaker`] | Circuit breaker for upstream calls |
//! | [`config`] | Environment-driven configuration |
//! | [`data_source`] | `PriceSource` / `SentimentSource` traits and `SourceError` |
//! | [`domain`] | `Symbol`, `UtcDateTime`, `PriceBar`, `SentimentRecord`, `PriceTick` |
//! | [`error`] | `ValidationError` and the `PipelineError` taxonomy |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`realtime`] | Simulated price feed and subscriber hub |
//! | [`retry`] | Backoff policy for HTTP calls |
//! | [`sentiment`] | Headline scoring |
//! | [`store`] | `TimeSeriesStore` trait over the DuckDB warehouse |
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────┐
//! │ PriceSource  │   │ SentimentSource  │
//! └──────┬───────┘   └────────┬─────────┘
//!        │   ingest / analyze │
//!        ▼                    ▼
//! ┌─────────────────────────────────────┐
//! │          TimeSeriesStore            │
//! └──────────────────┬──────────────────┘
//!                    ▼
//!         align → features → model        (finsight-ml)
//!                    │
//!                    ▼
//!             PredictionCache
//! ```
//!
//! The realtime simulator reads the latest close through the same
//! `PriceSource` and cache, and fans ticks out through a `PriceHub`.

pub mod adapters;
pub mod cache;
pub mod circuit_breaker;
pub mod config;
pub mod data_source;
pub mod domain;
pub mod error;
pub mod http_client;
pub mod realtime;
pub mod retry;
pub mod sentiment;
pub mod store;

pub use adapters::{price_source, sentiment_source, NewsApiAdapter, SyntheticSource, YahooAdapter};
pub use cache::{CacheOperation, CacheTtls, PredictionCache};
pub use config::FinsightConfig;
pub use data_source::{PriceSource, SentimentSource, SourceError, SourceErrorKind};
pub use domain::{PriceBar, PriceTick, SentimentRecord, Symbol, UtcDateTime};
pub use error::{PipelineError, ValidationError};
pub use realtime::{
    FeedStatus, PriceHub, PriceSubscription, RealtimeSimulator, SimulatorConfig, SimulatorHandle,
};
pub use sentiment::{HeadlineScorer, LexiconScorer};
pub use store::TimeSeriesStore;
