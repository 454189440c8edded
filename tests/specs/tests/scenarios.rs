// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end pairing/chat scenarios (`spec.md` §8) driven over real
//! WebSocket connections against the compiled `whisperd` binary, the same
//! way `smoke.rs` drives the HTTP/WS surface.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use whisper_specs::WhisperProcess;

const TIMEOUT: Duration = Duration::from_secs(10);
const LONG_TIMEOUT: Duration = Duration::from_secs(40);

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

async fn connect(whisper: &WhisperProcess) -> anyhow::Result<WsStream> {
    let (ws, _) = connect_async(whisper.ws_url()).await?;
    Ok(ws)
}

async fn send(ws: &mut WsStream, msg: serde_json::Value) -> anyhow::Result<()> {
    ws.send(Message::Text(msg.to_string().into())).await?;
    Ok(())
}

/// Read frames until one whose `type` field equals `want`, up to a short
/// deadline. Frames of other types (e.g. a stray `pong`) are skipped.
async fn recv_type(ws: &mut WsStream, want: &str) -> anyhow::Result<serde_json::Value> {
    recv_type_within(ws, want, TIMEOUT).await
}

/// Same as [`recv_type`], but with an explicit deadline — for scenarios that
/// hinge on the matcher's own multi-second wait thresholds.
async fn recv_type_within(ws: &mut WsStream, want: &str, deadline: Duration) -> anyhow::Result<serde_json::Value> {
    tokio::time::timeout(deadline, async {
        loop {
            let frame = ws.next().await.ok_or_else(|| anyhow::anyhow!("connection closed"))??;
            let Message::Text(text) = frame else { continue };
            let value: serde_json::Value = serde_json::from_str(&text)?;
            if value["type"] == want {
                return Ok(value);
            }
        }
    })
    .await?
}

/// Scenario 1 (`spec.md` §8): two sessions requesting the same exact
/// interest set are matched by tier 1, with no wait.
#[tokio::test]
async fn exact_interest_match_pairs_both_sides() -> anyhow::Result<()> {
    let whisper = WhisperProcess::start()?;
    whisper.wait_healthy(TIMEOUT).await?;

    let mut a = connect(&whisper).await?;
    let mut b = connect(&whisper).await?;
    recv_type(&mut a, "session_created").await?;
    recv_type(&mut b, "session_created").await?;

    send(&mut a, serde_json::json!({"type": "find_match", "interests": ["music", "gaming"]})).await?;
    send(&mut b, serde_json::json!({"type": "find_match", "interests": ["gaming", "music"]})).await?;
    recv_type(&mut a, "matching_started").await?;
    recv_type(&mut b, "matching_started").await?;

    let found_a = recv_type(&mut a, "match_found").await?;
    let found_b = recv_type(&mut b, "match_found").await?;
    assert_eq!(found_a["chat_id"], found_b["chat_id"]);

    Ok(())
}

/// Scenario 2: both sides accept, the chat goes active, and messages flow
/// with `from: "partner"` and self-echo suppressed.
#[tokio::test]
async fn accepted_match_relays_messages_between_partners() -> anyhow::Result<()> {
    let whisper = WhisperProcess::start()?;
    whisper.wait_healthy(TIMEOUT).await?;

    let mut a = connect(&whisper).await?;
    let mut b = connect(&whisper).await?;
    recv_type(&mut a, "session_created").await?;
    recv_type(&mut b, "session_created").await?;

    send(&mut a, serde_json::json!({"type": "find_match", "interests": ["books"]})).await?;
    send(&mut b, serde_json::json!({"type": "find_match", "interests": ["books"]})).await?;
    recv_type(&mut a, "matching_started").await?;
    recv_type(&mut b, "matching_started").await?;

    let found_a = recv_type(&mut a, "match_found").await?;
    let found_b = recv_type(&mut b, "match_found").await?;
    let chat_id = found_a["chat_id"].as_str().unwrap().to_owned();
    assert_eq!(found_b["chat_id"].as_str().unwrap(), chat_id);

    send(&mut a, serde_json::json!({"type": "accept_match", "chat_id": chat_id})).await?;
    send(&mut b, serde_json::json!({"type": "accept_match", "chat_id": chat_id})).await?;
    recv_type(&mut a, "match_accepted").await?;
    recv_type(&mut b, "match_accepted").await?;

    send(&mut a, serde_json::json!({"type": "message", "chat_id": chat_id, "text": "hey there"})).await?;
    let received = recv_type(&mut b, "message").await?;
    assert_eq!(received["from"], "partner");
    assert_eq!(received["text"], "hey there");

    // a never sees its own message echoed back.
    send(&mut b, serde_json::json!({"type": "typing", "chat_id": chat_id, "is_typing": true})).await?;
    let typing = recv_type(&mut a, "typing").await?;
    assert_eq!(typing["is_typing"], true);

    Ok(())
}

/// Scenario 3: one side declines, both are returned to idle with
/// `match_declined`.
#[tokio::test]
async fn declined_match_notifies_both_sides() -> anyhow::Result<()> {
    let whisper = WhisperProcess::start()?;
    whisper.wait_healthy(TIMEOUT).await?;

    let mut a = connect(&whisper).await?;
    let mut b = connect(&whisper).await?;
    recv_type(&mut a, "session_created").await?;
    recv_type(&mut b, "session_created").await?;

    send(&mut a, serde_json::json!({"type": "find_match", "interests": ["cats"]})).await?;
    send(&mut b, serde_json::json!({"type": "find_match", "interests": ["cats"]})).await?;
    recv_type(&mut a, "matching_started").await?;
    recv_type(&mut b, "matching_started").await?;

    let found_a = recv_type(&mut a, "match_found").await?;
    let chat_id = found_a["chat_id"].as_str().unwrap().to_owned();
    recv_type(&mut b, "match_found").await?;

    send(&mut b, serde_json::json!({"type": "decline_match", "chat_id": chat_id})).await?;
    recv_type(&mut a, "match_declined").await?;

    Ok(())
}

/// Scenario 4: once a chat is active, one side disconnecting notifies the
/// other with `partner_left`.
#[tokio::test]
async fn partner_disconnect_notifies_remaining_side() -> anyhow::Result<()> {
    let whisper = WhisperProcess::start()?;
    whisper.wait_healthy(TIMEOUT).await?;

    let mut a = connect(&whisper).await?;
    let mut b = connect(&whisper).await?;
    recv_type(&mut a, "session_created").await?;
    recv_type(&mut b, "session_created").await?;

    send(&mut a, serde_json::json!({"type": "find_match", "interests": ["movies"]})).await?;
    send(&mut b, serde_json::json!({"type": "find_match", "interests": ["movies"]})).await?;
    recv_type(&mut a, "matching_started").await?;
    recv_type(&mut b, "matching_started").await?;

    let found_a = recv_type(&mut a, "match_found").await?;
    let chat_id = found_a["chat_id"].as_str().unwrap().to_owned();
    recv_type(&mut b, "match_found").await?;

    send(&mut a, serde_json::json!({"type": "accept_match", "chat_id": chat_id})).await?;
    send(&mut b, serde_json::json!({"type": "accept_match", "chat_id": chat_id})).await?;
    recv_type(&mut a, "match_accepted").await?;
    recv_type(&mut b, "match_accepted").await?;

    b.close(None).await?;
    recv_type(&mut a, "partner_left").await?;

    Ok(())
}

/// Scenario 5: three reports against the same fingerprint within the
/// report window auto-bans it; the reported party's live connection is
/// closed with a `banned` frame.
#[tokio::test]
async fn third_report_against_a_fingerprint_triggers_an_auto_ban() -> anyhow::Result<()> {
    let whisper = WhisperProcess::start()?;
    whisper.wait_healthy(TIMEOUT).await?;

    let reported_fp = "fp-reported-scenario-5";

    for i in 0..3 {
        let mut reporter = connect(&whisper).await?;
        let mut reported = connect(&whisper).await?;
        recv_type(&mut reporter, "session_created").await?;
        recv_type(&mut reported, "session_created").await?;

        send(&mut reporter, serde_json::json!({"type": "set_fingerprint", "fingerprint": format!("fp-reporter-{i}")}))
            .await?;
        send(&mut reported, serde_json::json!({"type": "set_fingerprint", "fingerprint": reported_fp})).await?;

        send(&mut reporter, serde_json::json!({"type": "find_match", "interests": ["chess"]})).await?;
        send(&mut reported, serde_json::json!({"type": "find_match", "interests": ["chess"]})).await?;
        recv_type(&mut reporter, "matching_started").await?;
        recv_type(&mut reported, "matching_started").await?;

        let found = recv_type(&mut reporter, "match_found").await?;
        let chat_id = found["chat_id"].as_str().unwrap().to_owned();
        recv_type(&mut reported, "match_found").await?;

        send(&mut reporter, serde_json::json!({"type": "accept_match", "chat_id": chat_id})).await?;
        send(&mut reported, serde_json::json!({"type": "accept_match", "chat_id": chat_id})).await?;
        recv_type(&mut reporter, "match_accepted").await?;
        recv_type(&mut reported, "match_accepted").await?;

        send(&mut reporter, serde_json::json!({"type": "report", "chat_id": chat_id, "reason": "harassment"}))
            .await?;

        if i == 2 {
            let banned = recv_type(&mut reported, "banned").await?;
            assert_eq!(banned["reason"], "multiple_reports");
        }
    }

    Ok(())
}

/// A lone session with no one else in the queue times out after 30s of
/// waiting and is returned to idle, never reaching the matched state.
#[tokio::test]
async fn lone_session_times_out_after_thirty_seconds() -> anyhow::Result<()> {
    let whisper = WhisperProcess::start()?;
    whisper.wait_healthy(TIMEOUT).await?;

    let mut a = connect(&whisper).await?;
    recv_type(&mut a, "session_created").await?;

    send(&mut a, serde_json::json!({"type": "find_match", "interests": ["solitaire"]})).await?;
    recv_type(&mut a, "matching_started").await?;

    recv_type_within(&mut a, "match_timeout", LONG_TIMEOUT).await?;

    // A fresh find_match is accepted again, proving the earlier attempt left
    // no stale queue entry or session-status residue behind.
    send(&mut a, serde_json::json!({"type": "find_match", "interests": ["solitaire"]})).await?;
    recv_type(&mut a, "matching_started").await?;

    Ok(())
}

/// Two sessions with disjoint interest sets that share exactly one tag never
/// match on tier 1 (no exact set in common); once their wait crosses the
/// relaxed-tier threshold they're paired on that single shared tag.
#[tokio::test]
async fn single_shared_tag_pairs_once_the_wait_crosses_the_relaxed_threshold() -> anyhow::Result<()> {
    let whisper = WhisperProcess::start()?;
    whisper.wait_healthy(TIMEOUT).await?;

    let mut a = connect(&whisper).await?;
    recv_type(&mut a, "session_created").await?;
    send(&mut a, serde_json::json!({"type": "find_match", "interests": ["gaming", "music", "anime"]})).await?;
    recv_type(&mut a, "matching_started").await?;

    let mut b = connect(&whisper).await?;
    recv_type(&mut b, "session_created").await?;
    send(&mut b, serde_json::json!({"type": "find_match", "interests": ["sports", "music", "travel"]})).await?;
    recv_type(&mut b, "matching_started").await?;

    let found_a = recv_type_within(&mut a, "match_found", LONG_TIMEOUT).await?;
    let found_b = recv_type_within(&mut b, "match_found", LONG_TIMEOUT).await?;
    assert_eq!(found_a["chat_id"], found_b["chat_id"]);
    assert_eq!(found_a["shared_interests"], serde_json::json!(["music"]));

    Ok(())
}

/// If only one side accepts a pending match before the 15s accept deadline,
/// the cleanup loop declines it for both and frees the chat record so a
/// later find_match by either side starts clean.
#[tokio::test]
async fn unaccepted_match_is_declined_once_the_accept_deadline_passes() -> anyhow::Result<()> {
    let whisper = WhisperProcess::start()?;
    whisper.wait_healthy(TIMEOUT).await?;

    let mut a = connect(&whisper).await?;
    let mut b = connect(&whisper).await?;
    recv_type(&mut a, "session_created").await?;
    recv_type(&mut b, "session_created").await?;

    send(&mut a, serde_json::json!({"type": "find_match", "interests": ["jazz"]})).await?;
    send(&mut b, serde_json::json!({"type": "find_match", "interests": ["jazz"]})).await?;
    recv_type(&mut a, "matching_started").await?;
    recv_type(&mut b, "matching_started").await?;

    let found_a = recv_type(&mut a, "match_found").await?;
    let chat_id = found_a["chat_id"].as_str().unwrap().to_owned();
    recv_type(&mut b, "match_found").await?;

    // Only `a` accepts; `b` never responds before the deadline passes.
    send(&mut a, serde_json::json!({"type": "accept_match", "chat_id": chat_id})).await?;

    recv_type_within(&mut a, "match_declined", LONG_TIMEOUT).await?;

    // The chat is gone; `a` can start matching again from a clean slate.
    send(&mut a, serde_json::json!({"type": "find_match", "interests": ["jazz"]})).await?;
    recv_type(&mut a, "matching_started").await?;

    Ok(())
}
