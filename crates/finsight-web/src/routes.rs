use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use finsight_core::Symbol;
use finsight_ml::{Prediction, SentimentPoint, StockPoint, TrainStatus};
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::state::AppState;
use crate::ws;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ingest/:symbol", get(ingest))
        .route("/analyze/:symbol", get(analyze))
        .route("/train/:symbol", get(train))
        .route("/predict/:symbol", get(predict))
        .route("/db/stock/:symbol", get(stock_rows))
        .route("/db/sentiment/:symbol", get(sentiment_rows))
        .route("/ws/:symbol", get(ws::ws_handler))
        .route("/health", get(health))
}

async fn ingest(
    State(state): State<Arc<AppState>>,
    Path(raw): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let symbol = Symbol::parse(&raw)?;
    let inserted = state.service.ingest(&symbol).await?;
    Ok(Json(json!({
        "message": format!("Data for {symbol} ingested"),
        "symbol": symbol,
        "inserted": inserted,
    })))
}

async fn analyze(
    State(state): State<Arc<AppState>>,
    Path(raw): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let symbol = Symbol::parse(&raw)?;
    let inserted = state.service.analyze(&symbol).await?;
    Ok(Json(json!({
        "message": format!("Sentiment for {symbol} analyzed and saved"),
        "symbol": symbol,
        "inserted": inserted,
    })))
}

async fn train(
    State(state): State<Arc<AppState>>,
    Path(raw): Path<String>,
) -> Result<Json<TrainStatus>, ApiError> {
    let symbol = Symbol::parse(&raw)?;
    Ok(Json(state.service.train(&symbol).await?))
}

async fn predict(
    State(state): State<Arc<AppState>>,
    Path(raw): Path<String>,
) -> Result<Json<Prediction>, ApiError> {
    let symbol = Symbol::parse(&raw)?;
    Ok(Json(state.service.predict(&symbol).await?))
}

async fn stock_rows(
    State(state): State<Arc<AppState>>,
    Path(raw): Path<String>,
) -> Result<Json<Vec<StockPoint>>, ApiError> {
    let symbol = Symbol::parse(&raw)?;
    Ok(Json(state.service.stock_rows(&symbol).await?))
}

async fn sentiment_rows(
    State(state): State<Arc<AppState>>,
    Path(raw): Path<String>,
) -> Result<Json<Vec<SentimentPoint>>, ApiError> {
    let symbol = Symbol::parse(&raw)?;
    Ok(Json(state.service.sentiment_rows(&symbol).await?))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let feeds: serde_json::Map<String, Value> = state
        .feed_statuses()
        .into_iter()
        .map(|(symbol, status)| (symbol.to_string(), json!(status)))
        .collect();
    Json(json!({ "status": "healthy", "feeds": feeds }))
}
