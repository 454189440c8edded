// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end binary smoke tests.
//!
//! Spawns the real `whisperd` binary as a subprocess and exercises it over
//! HTTP and WebSocket, the same way the rest of the corpus drives its
//! process-level smoke tests.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

/// Resolve the path to the compiled `whisperd` binary.
pub fn whisperd_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs → tests → workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("whisperd")
}

/// Find a free TCP port by binding to :0 then releasing.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// A running `whisperd` process that is killed on drop.
pub struct WhisperProcess {
    child: Child,
    port: u16,
}

impl WhisperProcess {
    /// Spawn `whisperd` on a free port with in-process store/bus backends
    /// so the smoke suite has no external service dependency.
    pub fn start() -> anyhow::Result<Self> {
        let binary = whisperd_binary();
        anyhow::ensure!(binary.exists(), "whisperd binary not found at {}", binary.display());

        let port = free_port()?;
        let child = Command::new(&binary)
            .args(["--host", "127.0.0.1", "--port"])
            .arg(port.to_string())
            .env("WHISPER_STORE_URL", "memory://")
            .env("WHISPER_BUS_URL", "memory://")
            .env("WHISPER_DB_URL", "sqlite::memory:")
            .env("RUST_LOG", "warn")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        Ok(Self { child, port })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Base URL for HTTP requests.
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// WebSocket URL for the chat upgrade.
    pub fn ws_url(&self) -> String {
        format!("ws://127.0.0.1:{}/ws", self.port)
    }

    /// Poll `/health` until it responds successfully.
    pub async fn wait_healthy(&self, timeout: Duration) -> anyhow::Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        let client = reqwest::Client::new();
        let url = format!("{}/health", self.base_url());
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("whisperd did not become healthy within {timeout:?}");
            }
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status().is_success() {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

impl Drop for WhisperProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
