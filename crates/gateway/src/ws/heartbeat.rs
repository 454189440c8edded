// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Heartbeat loop (`spec.md` §4.A): every `interval`, evict connections that
//! have gone quiet past `interval + grace`, otherwise ping them.

use std::sync::Arc;

use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::state::GatewayState;
use crate::store::now_secs;

use super::connection;

/// Launch the heartbeat loop as an independent background task, stopping on
/// `shutdown` (`spec.md` §9 "cooperative background loops").
pub fn spawn(state: Arc<GatewayState>, shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut tick = interval(state.config.heartbeat_interval());
        loop {
            tokio::select! {
                _ = tick.tick() => run_once(&state).await,
                _ = shutdown.cancelled() => break,
            }
        }
        debug!("heartbeat: loop stopped");
    });
}

async fn run_once(state: &Arc<GatewayState>) {
    let now = now_secs();
    let grace_secs = state.config.heartbeat_grace().as_secs();
    let threshold = state.config.heartbeat_interval().as_secs() + grace_secs;

    for conn in state.connections.all() {
        if now.saturating_sub(conn.last_active()) > threshold {
            debug!(session_id = %conn.session_id, "heartbeat: evicting idle connection");
            conn.request_close();
            connection::teardown(state, &conn.session_id).await;
        } else {
            let _ = conn.ping().await;
        }
    }
}
