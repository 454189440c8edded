// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

/// Configuration for the moderation worker — a small standalone process
/// with no HTTP surface of its own, so it carries only a bus connection
/// and an optional severity-term list.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "whisper-moderation-worker", version, about = "Reference moderation scorer for Whisper chats.")]
pub struct WorkerConfig {
    /// Pub/sub bus connection URL (`nats://...` or `memory://` for tests —
    /// `memory://` only makes sense when sharing a process with the gateway,
    /// so it exists for test harnesses, not standalone deployment).
    #[arg(long, default_value = "nats://127.0.0.1:4222", env = "WHISPER_BUS_URL")]
    pub bus_url: String,

    /// Path to a newline-delimited list of terms that escalate a message
    /// straight to `blocked`. Absent means the regex-only heuristics apply.
    #[arg(long, env = "WHISPER_MODERATION_SEVERE_TERMS_PATH")]
    pub severe_terms_path: Option<std::path::PathBuf>,
}
