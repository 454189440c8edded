// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client → server message shapes (`spec.md` §6).

use serde::{Deserialize, Serialize};

/// A closed enum of abuse-report reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportReason {
    Harassment,
    Spam,
    Explicit,
    Other,
}

/// Every inbound message type a client may send, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    SetFingerprint { fingerprint: String },
    FindMatch { interests: Vec<String> },
    CancelMatch {},
    AcceptMatch { chat_id: String },
    DeclineMatch { chat_id: String },
    Message { chat_id: String, text: String },
    Typing { chat_id: String, is_typing: bool },
    EndChat { chat_id: String },
    Report { chat_id: String, reason: ReportReason },
    Ping {},
}
