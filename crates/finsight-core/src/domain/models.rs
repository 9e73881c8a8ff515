use serde::{Deserialize, Serialize};

use crate::{Symbol, UtcDateTime, ValidationError};

/// Daily OHLCV bar for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub symbol: Symbol,
    pub ts: UtcDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl PriceBar {
    pub fn new(
        symbol: Symbol,
        ts: UtcDateTime,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: u64,
    ) -> Result<Self, ValidationError> {
        validate_non_negative("open", open)?;
        validate_non_negative("high", high)?;
        validate_non_negative("low", low)?;
        validate_non_negative("close", close)?;

        if high < low {
            return Err(ValidationError::InvalidBarRange);
        }

        if open < low || open > high || close < low || close > high {
            return Err(ValidationError::InvalidBarBounds);
        }

        Ok(Self {
            symbol,
            ts,
            open,
            high,
            low,
            close,
            volume,
        })
    }
}

/// Scored news headline for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentRecord {
    pub symbol: Symbol,
    pub ts: UtcDateTime,
    pub headline: String,
    /// Polarity in [-1, 1]; negative is bearish.
    pub score: f64,
    /// Bar this headline was attributed to, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_bar_ts: Option<UtcDateTime>,
}

impl SentimentRecord {
    pub fn new(
        symbol: Symbol,
        ts: UtcDateTime,
        headline: impl Into<String>,
        score: f64,
    ) -> Result<Self, ValidationError> {
        let headline = headline.into();
        if headline.trim().is_empty() {
            return Err(ValidationError::EmptyHeadline);
        }
        if !score.is_finite() {
            return Err(ValidationError::NonFiniteValue { field: "score" });
        }
        if !(-1.0..=1.0).contains(&score) {
            return Err(ValidationError::ScoreOutOfRange { value: score });
        }

        Ok(Self {
            symbol,
            ts,
            headline,
            score,
            price_bar_ts: None,
        })
    }

    pub fn with_price_bar(mut self, price_bar_ts: UtcDateTime) -> Self {
        self.price_bar_ts = Some(price_bar_ts);
        self
    }
}

/// One simulated real-time price update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTick {
    pub symbol: Symbol,
    pub price: f64,
    pub timestamp: UtcDateTime,
}

fn validate_non_negative(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field });
    }
    if value < 0.0 {
        return Err(ValidationError::NegativeValue { field });
    }
    Ok(())
}
