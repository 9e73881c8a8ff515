//! HTTP and WebSocket transport for the finsight pipeline.
//!
//! | Route | Response |
//! |-------|----------|
//! | `GET /ingest/{symbol}` | `{message, symbol, inserted}` |
//! | `GET /analyze/{symbol}` | `{message, symbol, inserted}` |
//! | `GET /train/{symbol}` | `{status, symbol, rows, trained_at}` |
//! | `GET /predict/{symbol}` | `{symbol, predicted_close}` |
//! | `GET /db/stock/{symbol}` | `[{timestamp, close_price, volume}]` |
//! | `GET /db/sentiment/{symbol}` | `[{timestamp, sentiment_score}]` |
//! | `GET /health` | `{status: "healthy", feeds}` |
//! | `GET /ws/{symbol}` | WebSocket stream of `{symbol, price, timestamp}` |
//!
//! Errors are `{error, code}`: 400 for unknown symbols and too little data,
//! 500 for everything else.

pub mod error;
pub mod routes;
pub mod state;
pub mod ws;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use state::AppState;

pub fn app(state: Arc<AppState>) -> Router {
    routes::routes()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
