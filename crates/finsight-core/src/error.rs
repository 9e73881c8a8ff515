use finsight_warehouse::WarehouseError;
use thiserror::Error;

use crate::data_source::{SourceError, SourceErrorKind};

/// Validation errors for domain values entering the pipeline.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol must start with an ASCII letter: '{ch}'")]
    SymbolInvalidStart { ch: char },
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },
    #[error("unix timestamp {value} is out of range")]
    TimestampOutOfRange { value: i64 },

    #[error("field '{field}' must be finite")]
    NonFiniteValue { field: &'static str },
    #[error("field '{field}' must be non-negative")]
    NegativeValue { field: &'static str },

    #[error("bar high must be >= low")]
    InvalidBarRange,
    #[error("bar open/close must be within high/low range")]
    InvalidBarBounds,

    #[error("sentiment score {value} is outside [-1, 1]")]
    ScoreOutOfRange { value: f64 },
    #[error("headline cannot be empty")]
    EmptyHeadline,
}

/// Failure taxonomy of the prediction pipeline.
///
/// Data-shape failures (`NotFound`, `InsufficientData`, `Validation`) are the
/// caller's problem; the rest are infrastructure failures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PipelineError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl PipelineError {
    pub fn insufficient(message: impl Into<String>) -> Self {
        Self::InsufficientData(message.into())
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::UpstreamUnavailable(message.into())
    }

    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "pipeline.not_found",
            Self::InsufficientData(_) => "pipeline.insufficient_data",
            Self::UpstreamUnavailable(_) => "pipeline.upstream_unavailable",
            Self::ModelUnavailable(_) => "pipeline.model_unavailable",
            Self::Validation(_) => "pipeline.validation",
        }
    }

    /// True for errors caused by the request or the data it refers to.
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::InsufficientData(_) | Self::Validation(_)
        )
    }
}

impl From<SourceError> for PipelineError {
    fn from(error: SourceError) -> Self {
        match error.kind() {
            SourceErrorKind::NotFound => Self::NotFound(error.message().to_owned()),
            _ => Self::UpstreamUnavailable(error.to_string()),
        }
    }
}

impl From<WarehouseError> for PipelineError {
    fn from(error: WarehouseError) -> Self {
        Self::UpstreamUnavailable(format!("warehouse: {error}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_shape_errors_are_client_errors() {
        assert!(PipelineError::NotFound("AAPL".into()).is_client_error());
        assert!(PipelineError::insufficient("1 row").is_client_error());
        assert!(PipelineError::Validation(ValidationError::EmptySymbol).is_client_error());
        assert!(!PipelineError::upstream("timeout").is_client_error());
        assert!(!PipelineError::ModelUnavailable("corrupt".into()).is_client_error());
    }

    #[test]
    fn source_not_found_keeps_its_meaning() {
        let error = PipelineError::from(SourceError::not_found("no bars for ZZZZ"));
        assert_eq!(error, PipelineError::NotFound("no bars for ZZZZ".into()));
        assert_eq!(error.code(), "pipeline.not_found");

        let error = PipelineError::from(SourceError::rate_limited("429"));
        assert_eq!(error.code(), "pipeline.upstream_unavailable");
    }

    #[test]
    fn warehouse_failures_are_upstream() {
        let error = PipelineError::from(WarehouseError::InvalidRecord("bad".into()));
        assert!(matches!(error, PipelineError::UpstreamUnavailable(_)));
    }
}
