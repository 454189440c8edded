// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reference implementation of the external moderation collaborator
//! (Component G): subscribes to `moderation.check`, scores each message,
//! and publishes a verdict to `moderation.result.<session_id>`. Advisory
//! only — it never sits on the message delivery path.

pub mod config;
pub mod scorer;

use std::sync::Arc;

use tracing::{debug, warn};

use whisper_gateway::abuse::moderation::{ModerationCheck, ModerationResult};
use whisper_gateway::bus::{topics, Bus, MemoryBus, NatsBus};

use crate::config::WorkerConfig;
use crate::scorer::Scorer;

pub async fn run(config: WorkerConfig) -> anyhow::Result<()> {
    let bus = connect_bus(&config.bus_url).await?;
    let scorer = match &config.severe_terms_path {
        Some(path) => Scorer::load(path).await?,
        None => Scorer::empty(),
    };

    tracing::info!(bus_url = %config.bus_url, "whisper moderation worker listening");
    let mut checks = bus.subscribe(&topics::moderation_check()).await?;
    while let Some(payload) = checks.recv().await {
        if let Err(e) = handle_check(&bus, &scorer, &payload).await {
            warn!(err = %e, "moderation worker: failed to process a check");
        }
    }
    Ok(())
}

async fn connect_bus(url: &str) -> anyhow::Result<Arc<dyn Bus>> {
    if url == "memory://" {
        Ok(Arc::new(MemoryBus::new()))
    } else {
        Ok(Arc::new(NatsBus::connect(url).await?))
    }
}

async fn handle_check(bus: &Arc<dyn Bus>, scorer: &Scorer, payload: &[u8]) -> anyhow::Result<()> {
    let check: ModerationCheck = serde_json::from_slice(payload)?;
    let Some(reason) = scorer.score(&check.text) else {
        debug!(session_id = %check.session_id, "moderation worker: message passed");
        return Ok(());
    };

    let result = ModerationResult { chat_id: check.chat_id, blocked: true, reason: Some(reason) };
    let result_payload = serde_json::to_vec(&result)?;
    bus.publish(&topics::moderation_result(&check.session_id), result_payload).await?;
    debug!(session_id = %check.session_id, "moderation worker: message flagged");
    Ok(())
}
