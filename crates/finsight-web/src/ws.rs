use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use finsight_core::{PriceSubscription, Symbol};
use futures::{SinkExt, StreamExt};
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::state::AppState;

/// Upgrade to a WebSocket streaming `{symbol, price, timestamp}` ticks.
///
/// The symbol's feed is started on first use and stopped by the reaper once
/// the last socket for it has closed. Subscribe before ensuring the feed, so
/// a new feed always has a receiver.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(raw): Path<String>,
) -> Result<Response, ApiError> {
    let symbol = Symbol::parse(&raw)?;
    let ticks = state.hub().subscribe(&symbol);
    state.ensure_feed(&symbol);
    Ok(ws
        .on_upgrade(move |socket| handle_socket(socket, ticks))
        .into_response())
}

async fn handle_socket(socket: WebSocket, mut ticks: PriceSubscription) {
    let (mut sender, mut receiver) = socket.split();
    let symbol = ticks.symbol().clone();
    debug!(%symbol, "price subscriber connected");

    loop {
        tokio::select! {
            tick = ticks.next() => {
                let Some(tick) = tick else { break };
                let text = match serde_json::to_string(&tick) {
                    Ok(text) => text,
                    Err(error) => {
                        warn!(%symbol, %error, "failed to encode tick");
                        continue;
                    }
                };
                if sender.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }

    debug!(%symbol, "price subscriber disconnected");
}
