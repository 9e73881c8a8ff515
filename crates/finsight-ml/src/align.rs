//! Nearest-timestamp join of a price series with a sentiment series.

use finsight_core::{PipelineError, PriceBar, SentimentRecord, UtcDateTime};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One price bar joined with its nearest sentiment score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignedRow {
    pub timestamp: UtcDateTime,
    pub close_price: f64,
    pub volume: u64,
    /// Neutral 0 when no sentiment is within tolerance.
    pub sentiment_score: f64,
}

/// Sentiment collapsed to one score per distinct timestamp.
#[derive(Debug, Clone, Copy)]
struct SentimentPoint {
    ts: UtcDateTime,
    score: f64,
}

fn collapse(records: &[SentimentRecord]) -> Vec<SentimentPoint> {
    let mut sorted: Vec<&SentimentRecord> = records.iter().collect();
    sorted.sort_by_key(|record| record.ts);

    let mut points: Vec<SentimentPoint> = Vec::with_capacity(sorted.len());
    let mut run_ts: Option<UtcDateTime> = None;
    let mut run_sum = 0.0;
    let mut run_len = 0_u32;

    for record in sorted {
        if run_ts != Some(record.ts) {
            if let Some(ts) = run_ts {
                points.push(SentimentPoint {
                    ts,
                    score: run_sum / f64::from(run_len),
                });
            }
            run_ts = Some(record.ts);
            run_sum = 0.0;
            run_len = 0;
        }
        run_sum += record.score;
        run_len += 1;
    }
    if let Some(ts) = run_ts {
        points.push(SentimentPoint {
            ts,
            score: run_sum / f64::from(run_len),
        });
    }

    points
}

fn nearest(points: &[SentimentPoint], ts: UtcDateTime) -> Option<&SentimentPoint> {
    let after = points.partition_point(|point| point.ts < ts);
    let later = points.get(after);
    let earlier = after.checked_sub(1).and_then(|index| points.get(index));

    match (earlier, later) {
        (Some(before), Some(after)) => {
            // Ties go to the earlier record.
            if after.ts.abs_diff(ts) < before.ts.abs_diff(ts) {
                Some(after)
            } else {
                Some(before)
            }
        }
        (Some(only), None) | (None, Some(only)) => Some(only),
        (None, None) => None,
    }
}

/// Join each price bar with the closest sentiment timestamp.
///
/// The output has one row per price bar, ascending by timestamp; bars sharing
/// a timestamp keep their input order. Sentiment records that share a
/// timestamp are averaged before matching. A match further than `tolerance`
/// away, or no sentiment at all, yields a score of 0.
///
/// # Errors
///
/// [`PipelineError::InsufficientData`] when `prices` is empty.
pub fn align(
    prices: &[PriceBar],
    sentiment: &[SentimentRecord],
    tolerance: Option<time::Duration>,
) -> Result<Vec<AlignedRow>, PipelineError> {
    if prices.is_empty() {
        return Err(PipelineError::insufficient("no price bars to align"));
    }

    let mut bars: Vec<&PriceBar> = prices.iter().collect();
    bars.sort_by_key(|bar| bar.ts);
    let points = collapse(sentiment);

    let rows: Vec<AlignedRow> = bars
        .into_iter()
        .map(|bar| {
            let sentiment_score = nearest(&points, bar.ts)
                .filter(|point| tolerance.map_or(true, |limit| point.ts.abs_diff(bar.ts) <= limit))
                .map_or(0.0, |point| point.score);
            AlignedRow {
                timestamp: bar.ts,
                close_price: bar.close,
                volume: bar.volume,
                sentiment_score,
            }
        })
        .collect();

    debug!(
        prices = rows.len(),
        sentiment = points.len(),
        matched = rows.iter().filter(|row| row.sentiment_score != 0.0).count(),
        "aligned series"
    );
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use finsight_core::Symbol;

    fn symbol() -> Symbol {
        Symbol::parse("AAPL").expect("symbol")
    }

    fn ts(raw: &str) -> UtcDateTime {
        UtcDateTime::parse(raw).expect("ts")
    }

    fn bar(raw: &str, close: f64, volume: u64) -> PriceBar {
        PriceBar::new(symbol(), ts(raw), close, close + 1.0, close - 1.0, close, volume).expect("bar")
    }

    fn record(raw: &str, score: f64) -> SentimentRecord {
        SentimentRecord::new(symbol(), ts(raw), "Apple headline", score).expect("record")
    }

    #[test]
    fn empty_prices_are_insufficient() {
        let err = align(&[], &[record("2024-01-01T00:00:00Z", 0.5)], None).expect_err("empty");
        assert!(matches!(err, PipelineError::InsufficientData(_)));
    }

    #[test]
    fn missing_sentiment_fills_neutral() {
        let prices = vec![
            bar("2024-01-01T00:00:00Z", 100.0, 10),
            bar("2024-01-02T00:00:00Z", 102.0, 20),
            bar("2024-01-03T00:00:00Z", 101.0, 30),
        ];

        let rows = align(&prices, &[], None).expect("aligned");

        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|row| row.sentiment_score == 0.0));
        let closes: Vec<f64> = rows.iter().map(|row| row.close_price).collect();
        assert_eq!(closes, vec![100.0, 102.0, 101.0]);
    }

    #[test]
    fn output_is_sorted_and_matches_input_length() {
        let prices = vec![
            bar("2024-01-03T00:00:00Z", 101.0, 30),
            bar("2024-01-01T00:00:00Z", 100.0, 10),
            bar("2024-01-02T00:00:00Z", 102.0, 20),
        ];
        let sentiment = vec![record("2024-01-02T06:00:00Z", 0.4)];

        let rows = align(&prices, &sentiment, None).expect("aligned");

        assert_eq!(rows.len(), prices.len());
        assert!(rows.windows(2).all(|pair| pair[0].timestamp <= pair[1].timestamp));
        assert!(rows.iter().all(|row| row.sentiment_score == 0.4));
    }

    #[test]
    fn nearest_match_is_direction_agnostic() {
        let prices = vec![
            bar("2024-01-01T00:00:00Z", 100.0, 10),
            bar("2024-01-05T00:00:00Z", 105.0, 10),
        ];
        let sentiment = vec![
            record("2024-01-01T20:00:00Z", -0.5),
            record("2024-01-04T22:00:00Z", 0.8),
        ];

        let rows = align(&prices, &sentiment, None).expect("aligned");

        assert_eq!(rows[0].sentiment_score, -0.5);
        assert_eq!(rows[1].sentiment_score, 0.8);
    }

    #[test]
    fn equidistant_tie_prefers_earlier_sentiment() {
        let prices = vec![bar("2024-01-02T00:00:00Z", 100.0, 10)];
        let sentiment = vec![
            record("2024-01-02T12:00:00Z", 0.9),
            record("2024-01-01T12:00:00Z", -0.3),
        ];

        let rows = align(&prices, &sentiment, None).expect("aligned");

        assert_eq!(rows[0].sentiment_score, -0.3);
    }

    #[test]
    fn same_timestamp_sentiment_is_averaged() {
        let prices = vec![bar("2024-01-02T00:00:00Z", 100.0, 10)];
        let sentiment = vec![
            record("2024-01-02T01:00:00Z", 0.2),
            record("2024-01-02T01:00:00Z", 0.6),
        ];

        let rows = align(&prices, &sentiment, None).expect("aligned");

        assert!((rows[0].sentiment_score - 0.4).abs() < 1e-12);
    }

    #[test]
    fn matches_beyond_tolerance_fall_back_to_neutral() {
        let prices = vec![
            bar("2024-01-01T00:00:00Z", 100.0, 10),
            bar("2024-01-20T00:00:00Z", 110.0, 10),
        ];
        let sentiment = vec![record("2024-01-03T00:00:00Z", 0.7)];

        let rows = align(&prices, &sentiment, Some(time::Duration::days(7))).expect("aligned");

        assert_eq!(rows[0].sentiment_score, 0.7);
        assert_eq!(rows[1].sentiment_score, 0.0);
    }

    #[test]
    fn inputs_are_not_mutated_and_result_is_deterministic() {
        let prices = vec![
            bar("2024-01-02T00:00:00Z", 102.0, 20),
            bar("2024-01-01T00:00:00Z", 100.0, 10),
        ];
        let sentiment = vec![record("2024-01-01T03:00:00Z", 0.1)];
        let before = prices.clone();

        let first = align(&prices, &sentiment, None).expect("aligned");
        let second = align(&prices, &sentiment, None).expect("aligned");

        assert_eq!(prices, before);
        assert_eq!(first, second);
    }
}
