//! Source adapters.
//!
//! | Adapter | Trait | Upstream |
//! |---------|-------|----------|
//! | [`YahooAdapter`] | `PriceSource` | Yahoo Finance chart API |
//! | [`NewsApiAdapter`] | `SentimentSource` | NewsAPI `everything` search |
//! | [`SyntheticSource`] | both | none, seeded random walk |

mod newsapi;
mod synthetic;
mod yahoo;

pub use newsapi::NewsApiAdapter;
pub use synthetic::SyntheticSource;
pub use yahoo::YahooAdapter;

use std::sync::Arc;

use crate::config::FinsightConfig;
use crate::data_source::{PriceSource, SentimentSource};

/// Price source selected by `FINSIGHT_OFFLINE`.
pub fn price_source(config: &FinsightConfig) -> Arc<dyn PriceSource> {
    if config.offline {
        Arc::new(SyntheticSource::default())
    } else {
        Arc::new(YahooAdapter::default())
    }
}

/// Headline source selected by `FINSIGHT_OFFLINE`.
pub fn sentiment_source(config: &FinsightConfig) -> Arc<dyn SentimentSource> {
    if config.offline {
        Arc::new(SyntheticSource::default())
    } else {
        Arc::new(NewsApiAdapter::new(config.news_api_key.clone()))
    }
}
