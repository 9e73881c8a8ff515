//! Data source contracts.
//!
//! Price and news acquisition sit behind two traits so the pipeline never
//! depends on a particular provider:
//!
//! | Trait | Produces | Implementations |
//! |-------|----------|-----------------|
//! | [`PriceSource`] | `Vec<PriceBar>` ascending by timestamp | Yahoo chart API, synthetic |
//! | [`SentimentSource`] | `Vec<SentimentRecord>` | NewsAPI + headline scorer, synthetic |
//!
//! Both fail with [`SourceErrorKind::NotFound`] when the symbol yields zero rows.

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use crate::{PriceBar, SentimentRecord, Symbol};

/// Boxed future returned by source adapters.
pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SourceError>> + Send + 'a>>;

/// Adapter-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    NotFound,
    Unavailable,
    RateLimited,
    InvalidRequest,
    Internal,
}

/// Structured source error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
    retryable: bool,
}

impl SourceError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::NotFound,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Unavailable,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::RateLimited,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::InvalidRequest,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Internal,
            message: message.into(),
            retryable: false,
        }
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::NotFound => "source.not_found",
            SourceErrorKind::Unavailable => "source.unavailable",
            SourceErrorKind::RateLimited => "source.rate_limited",
            SourceErrorKind::InvalidRequest => "source.invalid_request",
            SourceErrorKind::Internal => "source.internal",
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for SourceError {}

/// Historical price provider.
pub trait PriceSource: Send + Sync {
    /// Short identifier recorded in the ingest audit log.
    fn name(&self) -> &'static str;

    /// Daily bars covering the last `period_days` days, ascending by timestamp.
    fn price_bars<'a>(&'a self, symbol: &'a Symbol, period_days: u32)
        -> SourceFuture<'a, Vec<PriceBar>>;
}

/// News sentiment provider.
pub trait SentimentSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Freshly scored headlines for the symbol.
    fn sentiment_records<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a, Vec<SentimentRecord>>;
}
