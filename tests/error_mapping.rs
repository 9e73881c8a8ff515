//! Behavior-driven tests for error handling at the HTTP boundary
//!
//! Data-shape problems must come back as 400 with a useful message;
//! infrastructure failures as 500 without internal detail.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use finsight_tests::*;
use finsight_web::{app, ApiError, AppState};
use serde_json::Value;
use tower::ServiceExt;

async fn get(state: Arc<AppState>, uri: &str) -> (StatusCode, Value) {
    let response = app(state)
        .oneshot(Request::get(uri).body(Body::empty()).expect("request"))
        .await
        .expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    (status, serde_json::from_slice(&bytes).expect("json body"))
}

fn state(temp: &TempDir) -> Arc<AppState> {
    let (service, _) = offline_service(temp);
    AppState::new(service, SimulatorConfig::default())
}

#[tokio::test]
async fn when_symbol_is_unknown_the_client_gets_400() {
    // Given: A source that does not know ZZZZ
    let temp = tempdir().expect("tempdir");

    // When: The client ingests it
    let (status, body) = get(state(&temp), "/ingest/ZZZZ").await;

    // Then: 400 with the not-found code and message
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "pipeline.not_found");
    assert!(body["error"].as_str().expect("message").contains("ZZZZ"));
}

#[tokio::test]
async fn when_data_is_missing_predict_returns_400() {
    // Given: An empty store
    let temp = tempdir().expect("tempdir");

    // When: The client asks for a prediction
    let (status, body) = get(state(&temp), "/predict/AAPL").await;

    // Then: 400 insufficient data
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "pipeline.insufficient_data");
}

#[tokio::test]
async fn when_the_model_store_is_broken_the_client_gets_a_generic_500() {
    // Given: Stored data, and a file where the models directory should be
    let temp = tempdir().expect("tempdir");
    let state = state(&temp);
    state.service.ingest(&symbol("AAPL")).await.expect("ingest");
    std::fs::write(temp.path().join("models"), b"not a directory").expect("block models dir");

    // When: Training tries to persist the model
    let (status, body) = get(state, "/train/AAPL").await;

    // Then: 500 without leaking paths or OS errors
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "internal server error");
    assert_eq!(body["code"], "pipeline.upstream_unavailable");
}

#[test]
fn when_errors_are_classified_data_shape_is_client_side() {
    // Given / When / Then: each taxonomy member maps to its status
    let cases = [
        (PipelineError::NotFound("ZZZZ".into()), StatusCode::BAD_REQUEST),
        (PipelineError::insufficient("1 bar"), StatusCode::BAD_REQUEST),
        (PipelineError::upstream("timeout"), StatusCode::INTERNAL_SERVER_ERROR),
        (
            PipelineError::ModelUnavailable("corrupt".into()),
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
    ];
    for (error, expected) in cases {
        assert_eq!(ApiError(error).status(), expected);
    }
}
