// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Integration tests for the gateway's HTTP surface (`spec.md` §6).
//!
//! Uses `axum_test::TestServer` — no real TCP needed.

use std::sync::Arc;

use axum_test::TestServer;

use whisper_gateway::abuse::filter::ContentFilter;
use whisper_gateway::abuse::AbuseLayer;
use whisper_gateway::bus::MemoryBus;
use whisper_gateway::config::GatewayConfig;
use whisper_gateway::http::build_router;
use whisper_gateway::state::GatewayState;
use whisper_gateway::store::MemoryStore;

fn test_config() -> GatewayConfig {
    GatewayConfig {
        host: "127.0.0.1".into(),
        port: 0,
        server_name: Some("test-gateway".into()),
        worker_pool_size: 256,
        max_connections: 1_000,
        read_timeout_ms: 10_000,
        write_timeout_ms: 10_000,
        max_frame_bytes: 4096,
        heartbeat_interval_ms: 30_000,
        heartbeat_grace_ms: 10_000,
        store_url: "memory://".into(),
        bus_url: "memory://".into(),
        db_url: "sqlite::memory:".into(),
        content_filter_path: None,
        shutdown_drain_ms: 30_000,
        metrics_enabled: false,
    }
}

async fn test_state() -> anyhow::Result<Arc<GatewayState>> {
    let store = Arc::new(MemoryStore::new());
    let bus = Arc::new(MemoryBus::new());
    let abuse = AbuseLayer::new(store.clone(), ContentFilter::empty(), "sqlite::memory:").await?;
    Ok(GatewayState::new(test_config(), store, bus, abuse))
}

fn test_server(state: Arc<GatewayState>) -> anyhow::Result<TestServer> {
    let router = build_router(state, None);
    Ok(TestServer::new(router)?)
}

#[tokio::test]
async fn health_reports_ok_and_zero_connections() -> anyhow::Result<()> {
    let server = test_server(test_state().await?)?;

    let response = server.get("/health").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["connections"], 0);
    assert!(body["uptime"].is_number());
    Ok(())
}

#[tokio::test]
async fn online_reports_zero_with_no_open_sockets() -> anyhow::Result<()> {
    let server = test_server(test_state().await?)?;

    let response = server.get("/api/online").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["count"], 0);
    Ok(())
}

#[tokio::test]
async fn health_reports_draining_once_the_drain_flag_is_set() -> anyhow::Result<()> {
    let state = test_state().await?;
    state.begin_drain();
    let server = test_server(state)?;

    let response = server.get("/health").await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "draining");
    Ok(())
}

#[tokio::test]
async fn metrics_endpoint_is_reachable_even_when_disabled() -> anyhow::Result<()> {
    let server = test_server(test_state().await?)?;

    let response = server.get("/metrics").await;
    response.assert_status_ok();
    assert!(response.text().contains("metrics disabled"));
    Ok(())
}
