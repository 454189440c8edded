// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Metrics facade (`spec.md` §6 `GET /metrics`). The `metrics` macros are
//! always compiled in; a `metrics-exporter-prometheus` recorder is the
//! concrete backend installed at startup, the same facade/backend split
//! the rest of the example corpus uses for observability.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub const CONNECTIONS_ACTIVE: &str = "whisper_connections_active";
pub const CONNECTIONS_TOTAL: &str = "whisper_connections_total";
pub const MESSAGES_TOTAL: &str = "whisper_messages_total";
pub const MATCHES_TOTAL: &str = "whisper_matches_total";
pub const BANS_TOTAL: &str = "whisper_bans_total";
pub const QUEUE_DEPTH: &str = "whisper_queue_depth";
pub const MATCH_WAIT_SECONDS: &str = "whisper_match_wait_seconds";

/// Install the global Prometheus recorder and return a handle whose
/// `render()` backs `GET /metrics`. `None` if metrics are disabled.
pub fn install(enabled: bool) -> Option<PrometheusHandle> {
    if !enabled {
        return None;
    }
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(err = %e, "metrics: failed to install Prometheus recorder");
            None
        }
    }
}

pub fn record_connection_opened() {
    metrics::counter!(CONNECTIONS_TOTAL).increment(1);
    metrics::gauge!(CONNECTIONS_ACTIVE).increment(1.0);
}

pub fn record_connection_closed() {
    metrics::gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
}

pub fn record_message() {
    metrics::counter!(MESSAGES_TOTAL).increment(1);
}

pub fn record_match(tier: &'static str, wait_secs: f64) {
    metrics::counter!(MATCHES_TOTAL, "tier" => tier).increment(1);
    metrics::histogram!(MATCH_WAIT_SECONDS).record(wait_secs);
}

pub fn record_ban() {
    metrics::counter!(BANS_TOTAL).increment(1);
}

pub fn record_queue_depth(depth: f64) {
    metrics::gauge!(QUEUE_DEPTH).set(depth);
}
