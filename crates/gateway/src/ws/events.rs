// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bus payload shapes for the `chat.<chat_id>` topic, and the unified
//! inbox event a connection's event loop selects over alongside raw client
//! frames.

use serde::{Deserialize, Serialize};

use crate::abuse::moderation::ModerationResult;
use crate::matcher::{MatchFoundEvent, MatchNotifyEvent};

/// Payload published to `chat.<chat_id>` by either participant. Carries
/// `from` so subscribers can filter out their own echo.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChatEvent {
    Message { from: String, text: String, ts: u64 },
    Typing { from: String, is_typing: bool },
    EndChat { from: String },
}

impl ChatEvent {
    pub fn from_session(&self) -> &str {
        match self {
            ChatEvent::Message { from, .. } => from,
            ChatEvent::Typing { from, .. } => from,
            ChatEvent::EndChat { from } => from,
        }
    }
}

/// Everything a connection's event loop can react to besides a raw client
/// frame: each bus subscription's forwarder task decodes its topic's wire
/// shape into one of these and pushes it into the connection's shared inbox.
#[derive(Debug)]
pub enum InboxEvent {
    MatchFound(MatchFoundEvent),
    MatchNotify(MatchNotifyEvent),
    Chat(ChatEvent),
    ModerationResult(ModerationResult),
}
