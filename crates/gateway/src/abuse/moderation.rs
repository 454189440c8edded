// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Asynchronous moderation hand-off (`spec.md` §4.D). Every accepted
//! message is published to `moderation.check`; the moderation worker is an
//! external collaborator that scores it and publishes to a per-session
//! result topic. This is advisory and must never sit on the delivery path.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::bus::{topics, Bus};
use crate::error::BusError;

/// Payload published to `moderation.check`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ModerationCheck {
    pub session_id: String,
    pub chat_id: String,
    pub text: String,
    pub ts: u64,
}

/// Payload published to `moderation.result.<session_id>` by the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationResult {
    pub chat_id: String,
    pub blocked: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Fire-and-forget publish of a message for asynchronous scoring. Off the
/// delivery path: a publish failure is logged, never surfaced to the sender.
pub async fn submit(bus: &Arc<dyn Bus>, check: ModerationCheck) {
    let payload = match serde_json::to_vec(&check) {
        Ok(p) => p,
        Err(e) => {
            warn!(err = %e, "moderation: failed to encode check payload");
            return;
        }
    };
    if let Err(e) = bus.publish(&topics::moderation_check(), payload).await {
        warn!(err = %e, "moderation: failed to publish check");
    }
}

pub fn decode_result(payload: &[u8]) -> Result<ModerationResult, BusError> {
    serde_json::from_slice(payload).map_err(|e| BusError::Backend(e.to_string()))
}
