// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server → client message shapes (`spec.md` §6).

use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;

/// Every outbound message type the gateway may send, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    SessionCreated { session_id: String },
    MatchingStarted { timeout: u64 },
    MatchFound { chat_id: String, shared_interests: Vec<String>, accept_deadline: u64 },
    MatchAccepted { chat_id: String },
    MatchDeclined {},
    MatchTimeout {},
    Message { from: PartnerTag, text: String, ts: u64 },
    Typing { is_typing: bool },
    PartnerLeft {},
    RateLimited { retry_after: u64 },
    Banned { duration: u64, reason: String },
    Error { code: ErrorCode, message: String },
    Pong {},
}

/// Wire-level constant: outbound chat messages always report `from: "partner"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartnerTag {
    Partner,
}

impl ServerMessage {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error { code, message: message.into() }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
