//! Behavior-driven tests for the prediction pipeline
//!
//! These tests follow a symbol from ingestion to prediction and check what a
//! caller observes: counts, ordering, caching and per-symbol models.

use finsight_ml::{align, build, FeatureRow};
use finsight_tests::*;

// =============================================================================
// Pipeline: Ingestion
// =============================================================================

#[tokio::test]
async fn when_user_ingests_twice_only_new_rows_are_counted() {
    // Given: A fresh service
    let temp = tempdir().expect("tempdir");
    let (service, _) = offline_service(&temp);
    let aapl = symbol("AAPL");

    // When: The same symbol is ingested twice
    let first = service.ingest(&aapl).await.expect("first ingest");
    let second = service.ingest(&aapl).await.expect("second ingest");

    // Then: The second ingest stores nothing new
    assert!(first > 0, "first ingest should store bars");
    assert_eq!(second, 0, "re-ingest should be idempotent");
}

#[tokio::test]
async fn when_user_reads_stock_rows_they_are_ascending() {
    // Given: Ingested prices
    let temp = tempdir().expect("tempdir");
    let (service, _) = offline_service(&temp);
    let aapl = symbol("AAPL");
    service.ingest(&aapl).await.expect("ingest");

    // When: The data-read operation is called
    let rows = service.stock_rows(&aapl).await.expect("stock rows");

    // Then: Rows are strictly ascending by timestamp
    assert!(rows.len() > 1);
    assert!(rows.windows(2).all(|pair| pair[0].timestamp < pair[1].timestamp));
}

// =============================================================================
// Pipeline: Alignment and features
// =============================================================================

#[test]
fn when_prices_have_no_sentiment_every_row_is_neutral() {
    // Given: Three bars and no sentiment
    let aapl = symbol("AAPL");
    let bars = vec![
        flat_bar(&aapl, 1, 100.0, 1_000),
        flat_bar(&aapl, 2, 102.0, 1_200),
        flat_bar(&aapl, 3, 101.0, 900),
    ];

    // When: They are aligned and turned into features
    let aligned = align(&bars, &[], None).expect("align");
    let features = build(&aligned).expect("features");

    // Then: Every score is 0 and one row is dropped for the lag
    assert_eq!(aligned.len(), 3);
    assert!(aligned.iter().all(|row| row.sentiment_score == 0.0));
    assert_eq!(features.len(), 2);
    assert_eq!(features[0].features.lag1_close, 100.0);
    assert_eq!(features[1].label, 101.0);
}

#[test]
fn when_no_prices_exist_alignment_reports_insufficient_data() {
    // Given: A sentiment record but no prices
    let record = SentimentRecord::new(symbol("AAPL"), anchor(), "Apple rallies", 0.4).expect("record");

    // When: Alignment is attempted
    let result = align(&[], &[record], None);

    // Then: It fails with InsufficientData
    assert!(matches!(result, Err(PipelineError::InsufficientData(_))));
}

// =============================================================================
// Pipeline: Training and prediction
// =============================================================================

#[tokio::test]
async fn when_user_predicts_without_training_a_model_is_trained_first() {
    // Given: Stored prices and sentiment, no model
    let temp = tempdir().expect("tempdir");
    let (service, _) = offline_service(&temp);
    let aapl = symbol("AAPL");
    service.ingest(&aapl).await.expect("ingest");
    service.analyze(&aapl).await.expect("analyze");
    assert!(!service.models().model_path(&aapl).exists());

    // When: A prediction is requested
    let prediction = service.predict(&aapl).await.expect("predict");

    // Then: A finite close is returned and the model is persisted
    assert!(prediction.predicted_close.is_finite());
    assert!(service.models().model_path(&aapl).exists());
}

#[tokio::test]
async fn when_two_symbols_are_trained_each_keeps_its_own_model() {
    // Given: Two ingested symbols
    let temp = tempdir().expect("tempdir");
    let (service, _) = offline_service(&temp);
    let aapl = symbol("AAPL");
    let msft = symbol("MSFT");
    for sym in [&aapl, &msft] {
        service.ingest(sym).await.expect("ingest");
    }

    // When: Both are trained
    service.train(&aapl).await.expect("train aapl");
    let aapl_model = service.models().load(&aapl).expect("load").expect("aapl model");
    service.train(&msft).await.expect("train msft");

    // Then: Training MSFT did not replace the AAPL model
    let reloaded = service.models().load(&aapl).expect("load").expect("aapl model");
    assert_eq!(reloaded.regressor, aapl_model.regressor);
    assert_eq!(reloaded.symbol, aapl);
    assert!(service.models().load(&msft).expect("load").is_some());
}

#[tokio::test]
async fn when_user_retrains_within_the_window_the_cached_status_is_returned() {
    // Given: A trained symbol
    let temp = tempdir().expect("tempdir");
    let (service, _) = offline_service(&temp);
    let aapl = symbol("AAPL");
    service.ingest(&aapl).await.expect("ingest");
    let first = service.train(&aapl).await.expect("train");

    // When: Train is requested again inside the train TTL
    let second = service.train(&aapl).await.expect("train again");

    // Then: The same status comes back without refitting
    assert_eq!(first, second);
}

#[test]
fn when_training_data_is_identical_predictions_are_bit_identical() {
    // Given: Two managers in separate directories and the same rows
    let aapl = symbol("AAPL");
    let bars: Vec<PriceBar> = (1..=10)
        .map(|day| flat_bar(&aapl, day, 100.0 + f64::from(day % 4), 1_000 + u64::from(day) * 7))
        .collect();
    let rows = build(&align(&bars, &[], None).expect("align")).expect("features");
    let (first_dir, second_dir) = (tempdir().expect("tempdir"), tempdir().expect("tempdir"));

    // When: Each trains a model
    let first = ModelManager::new(first_dir.path(), GbmParams::default())
        .train(&aapl, &rows)
        .expect("train");
    let second = ModelManager::new(second_dir.path(), GbmParams::default())
        .train(&aapl, &rows)
        .expect("train");

    // Then: A fixed probe predicts the same bits
    let probe = FeatureRow {
        lag1_close: 102.0,
        volume: 1_050.0,
        lag1_sentiment: 0.0,
    };
    assert_eq!(
        first.predict(&probe).expect("predict").to_bits(),
        second.predict(&probe).expect("predict").to_bits()
    );
}

#[tokio::test]
async fn when_a_symbol_has_one_bar_training_is_refused() {
    // Given: A single stored bar
    let temp = tempdir().expect("tempdir");
    let (service, warehouse) = offline_service(&temp);
    let aapl = symbol("AAPL");
    warehouse
        .insert_price_bars("test", &[flat_bar(&aapl, 1, 100.0, 10)], 0)
        .await
        .expect("insert");

    // When: Training is requested
    let result = service.train(&aapl).await;

    // Then: It fails with InsufficientData and no model is written
    assert!(matches!(result, Err(PipelineError::InsufficientData(_))));
    assert!(!service.models().model_path(&aapl).exists());
}
