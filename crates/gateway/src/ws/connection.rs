// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-connection lifetime (`spec.md` §4.A): upgrade, session creation,
//! frame dispatch, subscription bookkeeping, and teardown.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::bus::topics;
use crate::error::ErrorCode;
use crate::protocol::{peek_type, ClientMessage, ServerMessage};
use crate::state::GatewayState;
use crate::store::{now_secs, SessionStatus};

use super::events::InboxEvent;
use super::handler;
use super::registry::{Connection, OutboundFrame};

pub async fn handle_socket(state: Arc<GatewayState>, socket: WebSocket) {
    let session_id = Uuid::new_v4().to_string();
    if let Err(e) = state.store.create_session(&session_id, &state.owner_id()).await {
        warn!(err = %e, "ws: failed to create session, closing upgrade");
        return;
    }

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<OutboundFrame>();
    let (inbox_tx, mut inbox_rx) = mpsc::channel::<InboxEvent>(64);

    let conn = Arc::new(Connection::new(session_id.clone(), out_tx.clone(), now_secs()));
    state.connections.add(conn.clone());
    crate::metrics::record_connection_opened();

    // Writer: the only task that ever touches ws_tx, so writes never race.
    // Each send carries its own write deadline (`spec.md` §4.A "Writes") so
    // a transient slow/blocked consumer can't stall every later frame —
    // including heartbeat pings queued behind it; the deadline is cleared
    // by simply not reusing it across sends, so a slow write never poisons
    // the next one.
    let write_timeout = state.config.write_timeout();
    let writer_conn = conn.clone();
    let writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            let wire = match frame {
                OutboundFrame::Json(msg) => {
                    let Ok(json) = msg.to_json() else { continue };
                    WsMessage::Text(json.into())
                }
                OutboundFrame::Ping => WsMessage::Ping(Vec::new().into()),
            };
            match tokio::time::timeout(write_timeout, ws_tx.send(wire)).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => break,
                Err(_elapsed) => {
                    warn!(session_id = %writer_conn.session_id, "ws: write deadline exceeded, closing connection");
                    writer_conn.request_close();
                    break;
                }
            }
        }
    });

    if let Err(e) = conn.send(ServerMessage::SessionCreated { session_id: session_id.clone() }).await {
        warn!(err = %e, "ws: failed to send session_created");
    }

    debug!(session_id = %session_id, "ws: connection established");

    // An otherwise-idle connection only reads close_requested when a frame
    // or inbox event wakes the select; this tick guarantees the heartbeat's
    // eviction (set on a *different* task) is noticed promptly rather than
    // waiting for the peer's next message.
    let mut close_check = tokio::time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            _ = close_check.tick() => {
                if conn.should_close() {
                    break;
                }
            }
            // A read deadline that expires is a stale notification, not a
            // dead peer (`spec.md` §4.A/§5(d)): the branch falls through
            // without closing the connection, and `Elapsed` is swallowed.
            // Dead peers are detected only by the heartbeat.
            frame = tokio::time::timeout(state.config.read_timeout(), ws_rx.next()) => {
                match frame {
                    Ok(Some(Ok(WsMessage::Text(text)))) => {
                        conn.touch(now_secs());
                        if !conn.try_claim_processing() {
                            continue;
                        }
                        // Bounded worker-pool slot (`spec.md` §4.A/§5): caps
                        // how many frames this instance processes at once
                        // across every connection, providing fair
                        // back-pressure instead of unbounded fan-out.
                        match state.worker_pool.acquire().await {
                            Ok(_permit) => handle_frame(&state, &conn, &inbox_tx, &text).await,
                            Err(_closed) => {}
                        }
                        conn.release_processing();
                        if conn.should_close() {
                            break;
                        }
                    }
                    Ok(Some(Ok(WsMessage::Binary(data)))) => {
                        conn.touch(now_secs());
                        if data.len() > state.config.max_frame_bytes {
                            let _ = conn
                                .send(ServerMessage::error(ErrorCode::FrameTooLarge, "frame exceeds max size"))
                                .await;
                        }
                        // Zero-length and otherwise-ignored binary frames are dropped silently.
                    }
                    Ok(Some(Ok(WsMessage::Ping(_)))) | Ok(Some(Ok(WsMessage::Pong(_)))) => {
                        conn.touch(now_secs());
                    }
                    Ok(Some(Ok(WsMessage::Close(_)))) | Ok(None) => break,
                    Ok(Some(Err(_))) => break,
                    Err(_elapsed) => {}
                }
            }
            event = inbox_rx.recv() => {
                let Some(event) = event else { continue };
                handler::handle_inbox_event(&state, &conn, &inbox_tx, &session_id, event).await;
                if conn.should_close() {
                    break;
                }
            }
            _ = state.shutdown.cancelled() => break,
        }
    }

    teardown(&state, &session_id).await;
    writer.abort();
}

async fn handle_frame(
    state: &Arc<GatewayState>,
    conn: &Arc<Connection>,
    inbox_tx: &mpsc::Sender<InboxEvent>,
    raw: &str,
) {
    if raw.len() > state.config.max_frame_bytes {
        let _ = conn.send(ServerMessage::error(ErrorCode::FrameTooLarge, "frame exceeds max size")).await;
        return;
    }
    if raw.is_empty() {
        return;
    }

    let kind = match peek_type(raw) {
        Ok(kind) => kind.to_owned(),
        Err(_) => {
            let _ = conn.send(ServerMessage::error(ErrorCode::ParseError, "malformed frame")).await;
            return;
        }
    };

    let msg: ClientMessage = match serde_json::from_str(raw) {
        Ok(m) => m,
        Err(_) => {
            let _ = conn
                .send(ServerMessage::error(ErrorCode::UnsupportedType, format!("unsupported type: {kind}")))
                .await;
            return;
        }
    };

    handler::handle_client_message(state, conn, inbox_tx, msg).await;
}

/// Four-phase-shutdown-aware teardown for a single connection (the per-
/// connection piece of `spec.md` §4.A's disconnect path; phase 3/4 of
/// shutdown invoke this for every still-live session).
pub async fn teardown(state: &Arc<GatewayState>, session_id: &str) {
    let Some(_conn) = state.connections.remove(session_id) else {
        return; // already torn down by a racing evictor
    };
    crate::metrics::record_connection_closed();

    state.subscriptions.drain_session(session_id).await;
    state.abuse.context_buffers.clear(session_id);

    let Ok(Some(session)) = state.store.get_session(session_id).await else {
        let _ = state.store.delete_session(session_id).await;
        return;
    };

    match session.status {
        SessionStatus::Matching => {
            let cancel = crate::matcher::MatchCancel { session_id: session_id.to_owned() };
            if let Ok(payload) = serde_json::to_vec(&cancel) {
                let _ = state.bus.publish(&topics::match_cancel(), payload).await;
            }
        }
        SessionStatus::Chatting => {
            if let Some(chat_id) = session.chat_id.clone() {
                notify_partner_left(state, session_id, &chat_id).await;
            }
        }
        SessionStatus::Idle => {}
    }

    let _ = state.store.delete_session(session_id).await;
    debug!(session_id, "ws: connection torn down");
}

async fn notify_partner_left(state: &Arc<GatewayState>, session_id: &str, chat_id: &str) {
    let event = super::events::ChatEvent::EndChat { from: session_id.to_owned() };
    if let Ok(payload) = serde_json::to_vec(&event) {
        let _ = state.bus.publish(&topics::chat(chat_id), payload).await;
    }
    let _ = state.store.delete_chat(chat_id).await;
}

