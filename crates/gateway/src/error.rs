// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error kinds for the Whisper gateway, mapped onto the wire-level `error`
//! frame codes in the client protocol.

use serde::{Deserialize, Serialize};

/// Stable machine-readable error codes sent to clients in `error` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    ParseError,
    UnsupportedType,
    InvalidChat,
    InvalidMessage,
    MessageBlocked,
    FrameTooLarge,
    ContentWarning,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ParseError => "parse_error",
            Self::UnsupportedType => "unsupported_type",
            Self::InvalidChat => "invalid_chat",
            Self::InvalidMessage => "invalid_message",
            Self::MessageBlocked => "message_blocked",
            Self::FrameTooLarge => "frame_too_large",
            Self::ContentWarning => "content_warning",
        }
    }
}

/// Client-malformed or protocol-level errors (spec error kind (a)).
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed frame")]
    ParseError,
    #[error("unsupported message type: {0}")]
    UnsupportedType(String),
    #[error("frame too large ({0} bytes)")]
    FrameTooLarge(usize),
}

impl From<&ProtocolError> for ErrorCode {
    fn from(e: &ProtocolError) -> Self {
        match e {
            ProtocolError::ParseError => ErrorCode::ParseError,
            ProtocolError::UnsupportedType(_) => ErrorCode::UnsupportedType,
            ProtocolError::FrameTooLarge(_) => ErrorCode::FrameTooLarge,
        }
    }
}

/// Errors from the ephemeral key-value store (spec error kind (c), transient-backend).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("store call timed out")]
    Timeout,
    #[error("session not found")]
    NotFound,
}

/// Errors from the pub/sub bus adapter (spec error kind (c), transient-backend).
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("bus backend error: {0}")]
    Backend(String),
    #[error("bus call timed out")]
    Timeout,
}

/// Errors from the abuse/ban layer.
#[derive(Debug, thiserror::Error)]
pub enum AbuseError {
    #[error("rate limited, retry after {retry_after}s")]
    RateLimited { retry_after: u64 },
    #[error("message blocked by content filter")]
    ContentBlocked,
    #[error("fingerprint is banned: {reason} ({remaining}s remaining)")]
    Banned { reason: String, remaining: u64 },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Top-level gateway error, unifying the per-component error kinds at the
/// handler boundary. Only `Protocol` and `Abuse` variants ever reach a
/// client-visible `error`/`rate_limited`/`banned` frame; `Store`/`Bus` are
/// logged and handled per the fail-open/fail-closed policy of the caller.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error(transparent)]
    Abuse(#[from] AbuseError),
    #[error("fatal initialization error: {0}")]
    FatalInit(String),
}
