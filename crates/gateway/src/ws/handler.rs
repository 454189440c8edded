// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed handlers for every client message variant, plus the reaction to
//! each bus-delivered inbox event (`spec.md` §4.A, §4.C, §4.D, §4.E).

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::warn;

use crate::abuse::moderation::{self, ModerationCheck};
use crate::bus::topics;
use crate::error::{AbuseError, ErrorCode};
use crate::matcher::{MatchCancel, MatchNotifyEvent, MatchRequest};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::GatewayState;
use crate::store::{hash_interests, now_secs, AcceptOutcome, SessionStatus};

use super::events::{ChatEvent, InboxEvent};
use super::registry::Connection;

pub async fn handle_client_message(
    state: &Arc<GatewayState>,
    conn: &Arc<Connection>,
    inbox_tx: &mpsc::Sender<InboxEvent>,
    msg: ClientMessage,
) {
    let session_id = conn.session_id.clone();
    let result = match msg {
        ClientMessage::SetFingerprint { fingerprint } => set_fingerprint(state, conn, &session_id, fingerprint).await,
        ClientMessage::FindMatch { interests } => find_match(state, conn, inbox_tx, &session_id, interests).await,
        ClientMessage::CancelMatch {} => cancel_match(state, &session_id).await,
        ClientMessage::AcceptMatch { chat_id } => accept_match(state, conn, inbox_tx, &session_id, chat_id).await,
        ClientMessage::DeclineMatch { chat_id } => decline_match(state, conn, &session_id, chat_id).await,
        ClientMessage::Message { chat_id, text } => relay_message(state, conn, &session_id, chat_id, text).await,
        ClientMessage::Typing { chat_id, is_typing } => relay_typing(state, &session_id, chat_id, is_typing).await,
        ClientMessage::EndChat { chat_id } => end_chat(state, &session_id, chat_id).await,
        ClientMessage::Report { chat_id, reason } => report(state, &session_id, chat_id, reason).await,
        ClientMessage::Ping {} => {
            let _ = conn.send(ServerMessage::Pong {}).await;
            Ok(())
        }
    };

    if let Err(e) = result {
        respond_to_error(conn, e).await;
    }
}

async fn respond_to_error(conn: &Arc<Connection>, err: AbuseError) {
    let msg = match err {
        AbuseError::RateLimited { retry_after } => ServerMessage::RateLimited { retry_after },
        AbuseError::ContentBlocked => ServerMessage::error(ErrorCode::MessageBlocked, "message blocked by content filter"),
        AbuseError::Banned { reason, remaining } => ServerMessage::Banned { duration: remaining, reason },
        AbuseError::Store(e) => ServerMessage::error(ErrorCode::InvalidMessage, e.to_string()),
    };
    let _ = conn.send(msg).await;
}

async fn set_fingerprint(
    state: &Arc<GatewayState>,
    conn: &Arc<Connection>,
    session_id: &str,
    fingerprint: String,
) -> Result<(), AbuseError> {
    if let Some((remaining, reason)) = state.store.get_ban(&fingerprint).await? {
        conn.send(ServerMessage::Banned { duration: remaining, reason }).await.ok();
        conn.request_close();
        return Ok(());
    }
    state.store.set_fingerprint(session_id, &fingerprint).await?;
    Ok(())
}

async fn find_match(
    state: &Arc<GatewayState>,
    conn: &Arc<Connection>,
    inbox_tx: &mpsc::Sender<InboxEvent>,
    session_id: &str,
    interests: Vec<String>,
) -> Result<(), AbuseError> {
    let fingerprint = state.store.get_session(session_id).await?.and_then(|s| s.fingerprint);
    let rate_limit_key = fingerprint.as_deref().unwrap_or(session_id);
    state.abuse.rate_limiter.check_match_request(rate_limit_key).await?;

    let interests = state.abuse.filter.filter_tags(&interests);

    state.store.update_status(session_id, SessionStatus::Matching).await?;
    state.store.set_interests(session_id, &interests).await?;

    subscribe_match_topics(state, conn, inbox_tx, session_id).await;

    let request = MatchRequest { session_id: session_id.to_owned(), interests };
    if let Ok(payload) = serde_json::to_vec(&request) {
        let _ = state.bus.publish(&topics::match_request(), payload).await;
    }

    conn.send(ServerMessage::MatchingStarted { timeout: crate::matcher::TIMEOUT_WAIT_SECS }).await.ok();
    Ok(())
}

async fn cancel_match(state: &Arc<GatewayState>, session_id: &str) -> Result<(), AbuseError> {
    state.store.update_status(session_id, SessionStatus::Idle).await?;
    let cancel = MatchCancel { session_id: session_id.to_owned() };
    if let Ok(payload) = serde_json::to_vec(&cancel) {
        let _ = state.bus.publish(&topics::match_cancel(), payload).await;
    }
    state.subscriptions.remove(&topics::match_found(session_id), session_id).await;
    state.subscriptions.remove(&topics::match_notify(session_id), session_id).await;
    Ok(())
}

async fn accept_match(
    state: &Arc<GatewayState>,
    conn: &Arc<Connection>,
    inbox_tx: &mpsc::Sender<InboxEvent>,
    session_id: &str,
    chat_id: String,
) -> Result<(), AbuseError> {
    let outcome = state.store.accept_match(&chat_id, session_id).await?;
    match outcome {
        AcceptOutcome::BothAccepted => {
            let Some(chat) = state.store.get_chat(&chat_id).await? else { return Ok(()) };
            enter_active_chat(state, conn, inbox_tx, session_id, &chat_id).await;
            conn.send(ServerMessage::MatchAccepted { chat_id: chat_id.clone() }).await.ok();

            if let Some(partner) = chat.partner_of(session_id) {
                let event = MatchNotifyEvent::Accepted { chat_id: chat_id.clone() };
                if let Ok(payload) = serde_json::to_vec(&event) {
                    let _ = state.bus.publish(&topics::match_notify(partner), payload).await;
                }
            }
        }
        AcceptOutcome::Waiting => {}
        AcceptOutcome::NotParticipant | AcceptOutcome::InvalidState => {
            conn.send(ServerMessage::error(ErrorCode::InvalidChat, "no such pending chat")).await.ok();
        }
    }
    Ok(())
}

async fn decline_match(
    state: &Arc<GatewayState>,
    conn: &Arc<Connection>,
    session_id: &str,
    chat_id: String,
) -> Result<(), AbuseError> {
    let Some(chat) = state.store.get_chat(&chat_id).await? else {
        conn.send(ServerMessage::error(ErrorCode::InvalidChat, "no such pending chat")).await.ok();
        return Ok(());
    };
    if !chat.has_participant(session_id) {
        conn.send(ServerMessage::error(ErrorCode::InvalidChat, "not a participant")).await.ok();
        return Ok(());
    }

    state.store.delete_chat(&chat_id).await?;
    state.store.update_status(session_id, SessionStatus::Idle).await?;

    if let Some(partner) = chat.partner_of(session_id) {
        let event = MatchNotifyEvent::Declined { chat_id: chat_id.clone() };
        if let Ok(payload) = serde_json::to_vec(&event) {
            let _ = state.bus.publish(&topics::match_notify(partner), payload).await;
        }
    }
    conn.send(ServerMessage::MatchDeclined {}).await.ok();
    Ok(())
}

async fn relay_message(
    state: &Arc<GatewayState>,
    conn: &Arc<Connection>,
    session_id: &str,
    chat_id: String,
    text: String,
) -> Result<(), AbuseError> {
    let Some(chat) = require_active_participant(state, conn, session_id, &chat_id).await? else {
        return Ok(());
    };

    state.abuse.rate_limiter.check_message(session_id).await?;
    state.abuse.filter.check_message(&text)?;

    let ts = now_secs();
    state
        .abuse
        .context_buffers
        .push(&chat_id, crate::abuse::context_buffer::BufferedMessage { from: session_id.to_owned(), text: text.clone(), ts })
        .await;

    crate::metrics::record_message();

    let event = ChatEvent::Message { from: session_id.to_owned(), text: text.clone(), ts };
    if let Ok(payload) = serde_json::to_vec(&event) {
        let _ = state.bus.publish(&topics::chat(&chat_id), payload).await;
    }

    moderation::submit(&state.bus, ModerationCheck { session_id: session_id.to_owned(), chat_id, text, ts }).await;
    let _ = chat;
    Ok(())
}

async fn relay_typing(
    state: &Arc<GatewayState>,
    session_id: &str,
    chat_id: String,
    is_typing: bool,
) -> Result<(), AbuseError> {
    let Some(session) = state.store.get_session(session_id).await? else { return Ok(()) };
    if session.status != SessionStatus::Chatting || session.chat_id.as_deref() != Some(chat_id.as_str()) {
        return Ok(());
    }
    let event = ChatEvent::Typing { from: session_id.to_owned(), is_typing };
    if let Ok(payload) = serde_json::to_vec(&event) {
        let _ = state.bus.publish(&topics::chat(&chat_id), payload).await;
    }
    Ok(())
}

async fn end_chat(state: &Arc<GatewayState>, session_id: &str, chat_id: String) -> Result<(), AbuseError> {
    let Some(chat) = state.store.get_chat(&chat_id).await? else { return Ok(()) };
    if !chat.has_participant(session_id) {
        return Ok(());
    }

    let event = ChatEvent::EndChat { from: session_id.to_owned() };
    if let Ok(payload) = serde_json::to_vec(&event) {
        let _ = state.bus.publish(&topics::chat(&chat_id), payload).await;
    }

    state.store.delete_chat(&chat_id).await?;
    state.store.clear_chat_id(session_id).await?;
    state.store.update_status(session_id, SessionStatus::Idle).await?;
    state.abuse.context_buffers.clear(&chat_id);
    state.subscriptions.remove(&topics::chat(&chat_id), session_id).await;
    Ok(())
}

async fn report(
    state: &Arc<GatewayState>,
    session_id: &str,
    chat_id: String,
    reason: crate::protocol::ReportReason,
) -> Result<(), AbuseError> {
    let Some(chat) = state.store.get_chat(&chat_id).await? else { return Ok(()) };
    if !chat.has_participant(session_id) {
        return Ok(());
    }
    let Some(partner_id) = chat.partner_of(session_id).map(str::to_owned) else { return Ok(()) };

    let reporter_fp = state.store.get_session(session_id).await?.and_then(|s| s.fingerprint);
    let reported_fp = state.store.get_session(&partner_id).await?.and_then(|s| s.fingerprint);

    let Some(reported_fp) = reported_fp else { return Ok(()) };

    let messages = state.abuse.context_buffers.snapshot(&chat_id).await;
    if reporter_fp.is_some() {
        if let Err(e) = state
            .abuse
            .reports
            .insert(reporter_fp.as_deref(), &reported_fp, &chat_id, reason, &messages, now_secs() as i64)
            .await
        {
            warn!(err = %e, "report: failed to persist durable row");
        }
    }

    let banned = state.abuse.escalation.record_report(&reported_fp, now_secs() as i64).await;
    if banned {
        if let Some((remaining, ban_reason)) = state.store.get_ban(&reported_fp).await? {
            if let Some(partner_conn) = state.connections.get(&partner_id) {
                partner_conn.send(ServerMessage::Banned { duration: remaining, reason: ban_reason }).await.ok();
                partner_conn.request_close();
            }
        }
    }
    Ok(())
}

/// Subscribe to the two per-session topics that drive this session's
/// matching lifecycle, forwarding decoded payloads into its inbox.
async fn subscribe_match_topics(
    state: &Arc<GatewayState>,
    _conn: &Arc<Connection>,
    inbox_tx: &mpsc::Sender<InboxEvent>,
    session_id: &str,
) {
    spawn_forwarder(state, &topics::match_found(session_id), session_id, inbox_tx.clone(), |payload| {
        serde_json::from_slice(payload).ok().map(InboxEvent::MatchFound)
    })
    .await;
    spawn_forwarder(state, &topics::match_notify(session_id), session_id, inbox_tx.clone(), |payload| {
        serde_json::from_slice(payload).ok().map(InboxEvent::MatchNotify)
    })
    .await;
}

async fn enter_active_chat(
    state: &Arc<GatewayState>,
    conn: &Arc<Connection>,
    inbox_tx: &mpsc::Sender<InboxEvent>,
    session_id: &str,
    chat_id: &str,
) {
    if let Err(e) = state.store.update_status(session_id, SessionStatus::Chatting).await {
        warn!(err = %e, "failed to mark session chatting");
    }
    if let Err(e) = state.store.set_chat_id(session_id, chat_id).await {
        warn!(err = %e, "failed to set session chat_id");
    }
    let _ = conn;

    let self_id = session_id.to_owned();
    spawn_forwarder(state, &topics::chat(chat_id), session_id, inbox_tx.clone(), move |payload| {
        let event: ChatEvent = serde_json::from_slice(payload).ok()?;
        // Self-echo suppression: a subscriber filters out events it published itself.
        if event.from_session() == self_id {
            None
        } else {
            Some(InboxEvent::Chat(event))
        }
    })
    .await;
    spawn_forwarder(state, &topics::moderation_result(session_id), session_id, inbox_tx.clone(), |payload| {
        moderation::decode_result(payload).ok().map(InboxEvent::ModerationResult)
    })
    .await;
}

async fn spawn_forwarder(
    state: &Arc<GatewayState>,
    topic: &str,
    session_id: &str,
    inbox_tx: mpsc::Sender<InboxEvent>,
    decode: impl Fn(&[u8]) -> Option<InboxEvent> + Send + 'static,
) {
    let Ok(mut sub) = state.bus.subscribe(topic).await else {
        warn!(topic, "failed to subscribe");
        return;
    };
    let handle = tokio::spawn(async move {
        while let Some(payload) = sub.recv().await {
            if let Some(event) = decode(&payload) {
                if inbox_tx.send(event).await.is_err() {
                    break;
                }
            }
        }
    });
    // The Subscription itself isn't stored here: the forwarder task above
    // owns it and exits (dropping it) when the inbox channel closes, i.e.
    // when the connection tears down. Registering the task's abort handle
    // lets `cancel_match`/`end_chat`/`drain_session` tear the forwarder
    // (and its Subscription) down before that point.
    state.subscriptions.insert(topic, session_id, handle.abort_handle()).await;
}

async fn require_active_participant(
    state: &Arc<GatewayState>,
    conn: &Arc<Connection>,
    session_id: &str,
    chat_id: &str,
) -> Result<Option<crate::store::Chat>, AbuseError> {
    let Some(chat) = state.store.get_chat(chat_id).await? else {
        conn.send(ServerMessage::error(ErrorCode::InvalidChat, "no such chat")).await.ok();
        return Ok(None);
    };
    if !chat.has_participant(session_id) {
        conn.send(ServerMessage::error(ErrorCode::InvalidChat, "not a participant")).await.ok();
        return Ok(None);
    }
    Ok(Some(chat))
}

pub async fn handle_inbox_event(
    state: &Arc<GatewayState>,
    conn: &Arc<Connection>,
    inbox_tx: &mpsc::Sender<InboxEvent>,
    session_id: &str,
    event: InboxEvent,
) {
    match event {
        InboxEvent::MatchFound(found) => {
            conn.send(ServerMessage::MatchFound {
                chat_id: found.chat_id,
                shared_interests: found.shared_interests,
                accept_deadline: found.accept_deadline,
            })
            .await
            .ok();
        }
        InboxEvent::MatchNotify(MatchNotifyEvent::Accepted { chat_id }) => {
            enter_active_chat(state, conn, inbox_tx, session_id, &chat_id).await;
            conn.send(ServerMessage::MatchAccepted { chat_id }).await.ok();
        }
        InboxEvent::MatchNotify(MatchNotifyEvent::Declined { chat_id: _ }) => {
            let _ = state.store.update_status(session_id, SessionStatus::Idle).await;
            conn.send(ServerMessage::MatchDeclined {}).await.ok();
        }
        InboxEvent::MatchNotify(MatchNotifyEvent::QueueTimeout) => {
            let _ = state.store.update_status(session_id, SessionStatus::Idle).await;
            conn.send(ServerMessage::MatchTimeout {}).await.ok();
        }
        InboxEvent::Chat(ChatEvent::Message { text, ts, .. }) => {
            conn.send(ServerMessage::Message { from: crate::protocol::PartnerTag::Partner, text, ts }).await.ok();
        }
        InboxEvent::Chat(ChatEvent::Typing { is_typing, .. }) => {
            conn.send(ServerMessage::Typing { is_typing }).await.ok();
        }
        InboxEvent::Chat(ChatEvent::EndChat { .. }) => {
            let _ = state.store.clear_chat_id(session_id).await;
            let _ = state.store.update_status(session_id, SessionStatus::Idle).await;
            conn.send(ServerMessage::PartnerLeft {}).await.ok();
        }
        InboxEvent::ModerationResult(result) => {
            if result.blocked {
                let reason = result.reason.unwrap_or_else(|| "flagged by moderation".to_owned());
                conn.send(ServerMessage::error(ErrorCode::ContentWarning, reason)).await.ok();
            }
        }
    }
}
