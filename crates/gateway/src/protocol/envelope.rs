// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lightweight envelope parsing — extracts `type` without a full typed decode.

use serde::Deserialize;

use crate::error::ProtocolError;

/// Partial view of a client message, enough to route it to a handler.
#[derive(Deserialize)]
struct Envelope<'a> {
    #[serde(rename = "type")]
    kind: Option<&'a str>,
}

/// Extract the `type` field from a raw JSON frame without decoding the rest.
///
/// Mirrors the `extract_route_info` technique: a partial `serde_json`
/// deserialization pulls out just the routing key, leaving full payload
/// decoding to the matched handler.
pub fn peek_type(raw: &str) -> Result<&str, ProtocolError> {
    let envelope: Envelope<'_> =
        serde_json::from_str(raw).map_err(|_| ProtocolError::ParseError)?;
    envelope.kind.ok_or(ProtocolError::ParseError)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peek_type_extracts_known_type() -> anyhow::Result<()> {
        let raw = r#"{"type":"find_match","interests":["music"]}"#;
        assert_eq!(peek_type(raw).map_err(|e| anyhow::anyhow!(e.to_string()))?, "find_match");
        Ok(())
    }

    #[test]
    fn peek_type_rejects_malformed_json() {
        assert!(peek_type("{not json").is_err());
    }

    #[test]
    fn peek_type_rejects_missing_type() {
        assert!(peek_type(r#"{"interests":["music"]}"#).is_err());
    }
}
