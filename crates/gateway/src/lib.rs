// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Whisper gateway: anonymous, account-less, ephemeral 1:1 chat over a
//! WebSocket protocol, with tiered interest matching and a fingerprint-based
//! abuse/ban layer (`spec.md` overview).

pub mod abuse;
pub mod bus;
pub mod config;
pub mod error;
pub mod http;
pub mod matcher;
pub mod metrics;
pub mod protocol;
pub mod state;
pub mod store;
pub mod ws;

use std::sync::Arc;

use tokio::net::TcpListener;

use crate::abuse::filter::ContentFilter;
use crate::abuse::AbuseLayer;
use crate::bus::{Bus, MemoryBus, NatsBus};
use crate::config::GatewayConfig;
use crate::matcher::Matcher;
use crate::state::GatewayState;
use crate::store::{MemoryStore, RedisStore, Store};

/// Run the gateway until shutdown. Builds every collaborator, spawns the
/// background services, serves the HTTP/WS router, and drains in place on
/// `Ctrl-C`/SIGTERM.
pub async fn run(config: GatewayConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);

    let metrics_handle = metrics::install(config.metrics_enabled);

    let store = connect_store(&config.store_url).await?;
    let bus = connect_bus(&config.bus_url).await?;
    let filter = match &config.content_filter_path {
        Some(path) => ContentFilter::load(path).await?,
        None => ContentFilter::empty(),
    };
    let abuse = AbuseLayer::new(store.clone(), filter, &config.db_url).await?;

    let reports = abuse.reports.clone();
    let state = GatewayState::new(config.clone(), store.clone(), bus.clone(), abuse);

    let matcher = Arc::new(Matcher::new(store, bus));
    matcher.spawn(state.shutdown.clone());
    ws::heartbeat::spawn(state.clone(), state.shutdown.clone());
    abuse::report::spawn_retention_sweep(reports, state.shutdown.clone());

    tracing::info!(%addr, "whisper gateway listening");

    let router = http::build_router(state.clone(), metrics_handle);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router.into_make_service_with_connect_info::<std::net::SocketAddr>())
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await?;

    drain(&state).await;
    Ok(())
}

async fn connect_store(url: &str) -> anyhow::Result<Arc<dyn Store>> {
    if url == "memory://" {
        Ok(Arc::new(MemoryStore::new()))
    } else {
        Ok(Arc::new(RedisStore::connect(url).await?))
    }
}

async fn connect_bus(url: &str) -> anyhow::Result<Arc<dyn Bus>> {
    if url == "memory://" {
        Ok(Arc::new(MemoryBus::new()))
    } else {
        Ok(Arc::new(NatsBus::connect(url).await?))
    }
}

/// Resolves once an OS shutdown signal arrives, setting the drain flag so
/// in-flight requests see `is_draining()` before the listener actually stops
/// accepting new connections (phase 1 of the four-phase shutdown in
/// `spec.md` §4.A).
async fn shutdown_signal(state: Arc<GatewayState>) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let Ok(mut sig) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) else {
            std::future::pending::<()>().await;
            return;
        };
        sig.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("whisper gateway: shutdown signal received, draining");
    state.begin_drain();
}

/// Phases 3/4 of the four-phase shutdown: once the HTTP listener has
/// stopped accepting (axum's graceful shutdown future already resolved),
/// tear down every still-live session, waiting up to `shutdown_drain_ms`
/// before force-closing stragglers.
async fn drain(state: &Arc<GatewayState>) {
    let deadline = tokio::time::Instant::now() + state.config.shutdown_drain();
    loop {
        let live: Vec<String> = state.connections.all().iter().map(|c| c.session_id.clone()).collect();
        if live.is_empty() || tokio::time::Instant::now() >= deadline {
            for session_id in live {
                ws::connection::teardown(state, &session_id).await;
            }
            break;
        }
        for conn in state.connections.all() {
            conn.request_close();
        }
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    }
    state.shutdown.cancel();
    tracing::info!("whisper gateway: drain complete");
}
