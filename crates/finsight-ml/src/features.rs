//! Lag features over an aligned series.

use finsight_core::{PipelineError, UtcDateTime};
use serde::{Deserialize, Serialize};

use crate::align::AlignedRow;

/// Column order of [`FeatureRow::to_array`].
pub const FEATURE_NAMES: [&str; 3] = ["lag1_close", "volume", "lag1_sentiment"];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub lag1_close: f64,
    pub volume: f64,
    pub lag1_sentiment: f64,
}

impl FeatureRow {
    pub fn to_array(&self) -> [f64; 3] {
        [self.lag1_close, self.volume, self.lag1_sentiment]
    }

    /// Features for predicting the bar after `latest`.
    pub fn from_latest(latest: &AlignedRow) -> Self {
        Self {
            lag1_close: latest.close_price,
            volume: latest.volume as f64,
            lag1_sentiment: latest.sentiment_score,
        }
    }
}

/// Feature row paired with the close it should predict.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabeledRow {
    pub timestamp: UtcDateTime,
    pub features: FeatureRow,
    pub label: f64,
}

/// Build one labeled row per aligned row after the first.
///
/// Each row takes the previous row's close and sentiment and its own volume;
/// the label is its own close. The first row has no predecessor and is dropped.
pub fn build(rows: &[AlignedRow]) -> Result<Vec<LabeledRow>, PipelineError> {
    if rows.len() < 2 {
        return Err(PipelineError::insufficient(format!(
            "need at least 2 aligned rows for lag features, got {}",
            rows.len()
        )));
    }

    Ok(rows
        .windows(2)
        .map(|pair| {
            let (previous, current) = (&pair[0], &pair[1]);
            LabeledRow {
                timestamp: current.timestamp,
                features: FeatureRow {
                    lag1_close: previous.close_price,
                    volume: current.volume as f64,
                    lag1_sentiment: previous.sentiment_score,
                },
                label: current.close_price,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(day: u32, close: f64, volume: u64, sentiment: f64) -> AlignedRow {
        AlignedRow {
            timestamp: UtcDateTime::parse(&format!("2024-01-{day:02}T00:00:00Z")).expect("ts"),
            close_price: close,
            volume,
            sentiment_score: sentiment,
        }
    }

    #[test]
    fn single_row_is_insufficient() {
        let err = build(&[row(1, 100.0, 10, 0.0)]).expect_err("one row");
        assert!(matches!(err, PipelineError::InsufficientData(_)));
        assert!(matches!(build(&[]), Err(PipelineError::InsufficientData(_))));
    }

    #[test]
    fn lags_previous_close_and_sentiment() {
        let rows = vec![
            row(1, 100.0, 10, 0.5),
            row(2, 102.0, 20, -0.2),
            row(3, 101.0, 30, 0.0),
        ];

        let labeled = build(&rows).expect("features");

        assert_eq!(labeled.len(), 2);
        assert_eq!(
            labeled[0].features,
            FeatureRow {
                lag1_close: 100.0,
                volume: 20.0,
                lag1_sentiment: 0.5
            }
        );
        assert_eq!(labeled[0].label, 102.0);
        assert_eq!(labeled[1].features.lag1_close, 102.0);
        assert_eq!(labeled[1].features.lag1_sentiment, -0.2);
        assert_eq!(labeled[1].label, 101.0);
        assert_eq!(labeled[1].timestamp, rows[2].timestamp);
    }

    #[test]
    fn produces_n_minus_one_rows() {
        for n in 2..8_u32 {
            let rows: Vec<AlignedRow> = (1..=n).map(|day| row(day, f64::from(day), 1, 0.0)).collect();
            assert_eq!(build(&rows).expect("features").len(), (n - 1) as usize);
        }
    }

    #[test]
    fn latest_row_becomes_prediction_input() {
        let features = FeatureRow::from_latest(&row(9, 150.0, 42, 0.3));
        assert_eq!(features.to_array(), [150.0, 42.0, 0.3]);
    }
}
