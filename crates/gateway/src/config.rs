// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

/// Configuration for the Whisper gateway daemon.
#[derive(Debug, Clone, clap::Args)]
pub struct GatewayConfig {
    /// Host to bind on.
    #[arg(long, default_value = "0.0.0.0", env = "WHISPER_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8080, env = "WHISPER_PORT")]
    pub port: u16,

    /// Friendly name for this gateway instance (the `owner` field on sessions).
    #[arg(long, env = "WHISPER_SERVER_NAME")]
    pub server_name: Option<String>,

    /// Bounded worker-pool size for per-connection frame processing.
    #[arg(long, default_value_t = 256, env = "WHISPER_WORKER_POOL_SIZE")]
    pub worker_pool_size: usize,

    /// Maximum concurrent connections this instance accepts.
    #[arg(long, default_value_t = 1_000_000, env = "WHISPER_MAX_CONNECTIONS")]
    pub max_connections: usize,

    /// Per-frame read deadline in milliseconds.
    #[arg(long, default_value_t = 10_000, env = "WHISPER_READ_TIMEOUT_MS")]
    pub read_timeout_ms: u64,

    /// Per-frame write deadline in milliseconds.
    #[arg(long, default_value_t = 10_000, env = "WHISPER_WRITE_TIMEOUT_MS")]
    pub write_timeout_ms: u64,

    /// Maximum accepted data-frame size in bytes.
    #[arg(long, default_value_t = 4096, env = "WHISPER_MAX_FRAME_BYTES")]
    pub max_frame_bytes: usize,

    /// Heartbeat interval in milliseconds.
    #[arg(long, default_value_t = 30_000, env = "WHISPER_HEARTBEAT_INTERVAL_MS")]
    pub heartbeat_interval_ms: u64,

    /// Extra grace period added to the heartbeat interval before eviction.
    #[arg(long, default_value_t = 10_000, env = "WHISPER_HEARTBEAT_GRACE_MS")]
    pub heartbeat_grace_ms: u64,

    /// Key-value store connection URL (`redis://...` or `memory://` for the
    /// in-process test backend).
    #[arg(long, default_value = "memory://", env = "WHISPER_STORE_URL")]
    pub store_url: String,

    /// Pub/sub bus connection URL (`nats://...` or `memory://` for the
    /// in-process test backend).
    #[arg(long, default_value = "memory://", env = "WHISPER_BUS_URL")]
    pub bus_url: String,

    /// Durable abuse-report database URL (`sqlite://...`).
    #[arg(long, default_value = "sqlite::memory:", env = "WHISPER_DB_URL")]
    pub db_url: String,

    /// Path to a newline-delimited content-filter blocklist file. Absent
    /// means an empty blocklist (the keyword list itself is out of scope).
    #[arg(long, env = "WHISPER_CONTENT_FILTER_PATH")]
    pub content_filter_path: Option<std::path::PathBuf>,

    /// Shutdown drain deadline in milliseconds.
    #[arg(long, default_value_t = 30_000, env = "WHISPER_SHUTDOWN_DRAIN_MS")]
    pub shutdown_drain_ms: u64,

    /// Enable the Prometheus metrics recorder.
    #[arg(long, default_value_t = true, env = "WHISPER_METRICS_ENABLED")]
    pub metrics_enabled: bool,
}

impl GatewayConfig {
    pub fn read_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.write_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn heartbeat_grace(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.heartbeat_grace_ms)
    }

    pub fn shutdown_drain(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.shutdown_drain_ms)
    }

    pub fn owner_id(&self) -> String {
        self.server_name.clone().unwrap_or_else(|| {
            std::env::var("HOSTNAME").unwrap_or_else(|_| "whisper-gateway".to_owned())
        })
    }
}
