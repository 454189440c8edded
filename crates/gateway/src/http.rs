// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP surface (`spec.md` §6): health/online/metrics endpoints plus the
//! `GET /ws` upgrade, structured the same way as the teacher's
//! `transport/http.rs` handlers (`State<Arc<...>>` extractor, `Json<...>`
//! response types).

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::GatewayState;
use crate::ws::connection::handle_socket;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub connections: usize,
    pub uptime: u64,
}

#[derive(Debug, Serialize)]
pub struct OnlineResponse {
    pub count: usize,
}

pub fn build_router(state: Arc<GatewayState>, metrics_handle: Option<PrometheusHandle>) -> Router {
    Router::new()
        .route("/ws", get(ws_upgrade))
        .route("/health", get(health))
        .route("/api/online", get(online))
        .route("/metrics", get(move || render_metrics(metrics_handle.clone())))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `GET /ws` — WebSocket upgrade for a new anonymous session. Phase 1 of
/// the four-phase shutdown (`spec.md` §4.A): once draining, reject new
/// upgrades with 503 rather than accepting a connection we're about to tear
/// down. Also rejects with 503 once `max_connections` live sessions are
/// already held (`spec.md` §4.A/§6 `WHISPER_MAX_CONNECTIONS`), and enforces
/// the per-source-address new-connection rate limit (`spec.md` §4.D: 5 new
/// connections / 60s / source address) before the socket is handed to the
/// gateway.
async fn ws_upgrade(
    State(state): State<Arc<GatewayState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> axum::response::Response {
    if state.is_draining() {
        return (StatusCode::SERVICE_UNAVAILABLE, "draining").into_response();
    }
    if state.connections.count() >= state.config.max_connections {
        return (StatusCode::SERVICE_UNAVAILABLE, "max connections reached").into_response();
    }
    if state.abuse.rate_limiter.check_new_connection(&addr.ip().to_string()).await.is_err() {
        return (StatusCode::TOO_MANY_REQUESTS, "rate limited").into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(state, socket)).into_response()
}

/// `GET /health` — liveness probe, reports whether this instance is
/// draining so a load balancer can stop routing new connections here.
async fn health(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    let status = if state.is_draining() { "draining" } else { "ok" };
    Json(HealthResponse {
        status: status.to_owned(),
        connections: state.connections.count(),
        uptime: state.uptime_secs(),
    })
}

/// `GET /api/online` — current connected-session count.
async fn online(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(OnlineResponse { count: state.connections.count() })
}

/// `GET /metrics` — Prometheus text exposition format, or a plain 200 when
/// metrics are disabled.
async fn render_metrics(handle: Option<PrometheusHandle>) -> impl IntoResponse {
    match handle {
        Some(h) => h.render(),
        None => "metrics disabled\n".to_owned(),
    }
}
