// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end smoke tests that spawn the real `whisperd` binary and
//! exercise the HTTP and WebSocket surfaces over a real TCP socket.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

use whisper_specs::WhisperProcess;

const TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::test]
async fn http_health() -> anyhow::Result<()> {
    let whisper = WhisperProcess::start()?;
    whisper.wait_healthy(TIMEOUT).await?;

    let resp: serde_json::Value = reqwest::get(format!("{}/health", whisper.base_url())).await?.json().await?;

    assert_eq!(resp["status"], "ok");
    assert!(resp["connections"].is_number());
    assert!(resp["uptime"].is_number());
    Ok(())
}

#[tokio::test]
async fn http_online_count_reflects_open_sockets() -> anyhow::Result<()> {
    let whisper = WhisperProcess::start()?;
    whisper.wait_healthy(TIMEOUT).await?;
    let client = reqwest::Client::new();

    let before: serde_json::Value = client
        .get(format!("{}/api/online", whisper.base_url()))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(before["count"], 0);

    let (mut ws, _) = tokio_tungstenite::connect_async(whisper.ws_url()).await?;
    // Wait for the session_created frame so the connection is fully registered.
    let _ = ws.next().await;

    let after: serde_json::Value =
        client.get(format!("{}/api/online", whisper.base_url())).send().await?.json().await?;
    assert_eq!(after["count"], 1);

    ws.close(None).await?;
    Ok(())
}

#[tokio::test]
async fn http_metrics_exposes_prometheus_text() -> anyhow::Result<()> {
    let whisper = WhisperProcess::start()?;
    whisper.wait_healthy(TIMEOUT).await?;

    let body = reqwest::get(format!("{}/metrics", whisper.base_url())).await?.text().await?;
    assert!(body.contains("whisper_connections_active") || body.contains("metrics disabled"));
    Ok(())
}

#[tokio::test]
async fn ws_session_created_on_connect() -> anyhow::Result<()> {
    let whisper = WhisperProcess::start()?;
    whisper.wait_healthy(TIMEOUT).await?;

    let (mut ws, _) = tokio_tungstenite::connect_async(whisper.ws_url()).await?;
    let frame = ws.next().await.ok_or_else(|| anyhow::anyhow!("connection closed before first frame"))??;
    let Message::Text(text) = frame else { anyhow::bail!("expected a text frame") };
    let msg: serde_json::Value = serde_json::from_str(&text)?;

    assert_eq!(msg["type"], "session_created");
    assert!(msg["session_id"].is_string());
    Ok(())
}

#[tokio::test]
async fn ws_ping_pong() -> anyhow::Result<()> {
    let whisper = WhisperProcess::start()?;
    whisper.wait_healthy(TIMEOUT).await?;

    let (mut ws, _) = tokio_tungstenite::connect_async(whisper.ws_url()).await?;
    let _session_created = ws.next().await;

    ws.send(Message::Text(r#"{"type":"ping"}"#.into())).await?;
    let frame = ws.next().await.ok_or_else(|| anyhow::anyhow!("no pong received"))??;
    let Message::Text(text) = frame else { anyhow::bail!("expected a text frame") };
    let msg: serde_json::Value = serde_json::from_str(&text)?;

    assert_eq!(msg["type"], "pong");
    Ok(())
}

#[tokio::test]
async fn ws_oversized_frame_is_rejected() -> anyhow::Result<()> {
    let whisper = WhisperProcess::start()?;
    whisper.wait_healthy(TIMEOUT).await?;

    let (mut ws, _) = tokio_tungstenite::connect_async(whisper.ws_url()).await?;
    let _session_created = ws.next().await;

    let oversized = format!(r#"{{"type":"message","chat_id":"x","text":"{}"}}"#, "a".repeat(5000));
    ws.send(Message::Text(oversized.into())).await?;

    let frame = ws.next().await.ok_or_else(|| anyhow::anyhow!("no error frame received"))??;
    let Message::Text(text) = frame else { anyhow::bail!("expected a text frame") };
    let msg: serde_json::Value = serde_json::from_str(&text)?;

    assert_eq!(msg["type"], "error");
    assert_eq!(msg["code"], "frame_too_large");
    Ok(())
}
