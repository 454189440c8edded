// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection registry (`spec.md` §4.A): a thread-safe mapping from session
//! id to a handle for that connection's outbound write side.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex};

use crate::protocol::ServerMessage;

/// What the connection's writer task can be asked to put on the wire: a
/// JSON application frame, or a transport-level WebSocket ping (`spec.md`
/// §4.A heartbeat — "send a protocol-level ping", i.e. a WS control frame,
/// not a JSON message).
#[derive(Debug)]
pub enum OutboundFrame {
    Json(ServerMessage),
    Ping,
}

/// Per-connection state shared between the connection's own task and every
/// other part of the gateway that needs to reach it (heartbeat, shutdown,
/// cross-session relay).
pub struct Connection {
    pub session_id: String,
    tx: mpsc::UnboundedSender<OutboundFrame>,
    /// Guards against two logical readers handling the same connection's
    /// next frame concurrently. Under the axum per-connection task model
    /// this is uncontended by construction, but it's kept as the same
    /// load-bearing dedup invariant the kernel-notifier + worker-pool
    /// design relies on, and is covered by its own test.
    processing: AtomicBool,
    last_active: AtomicU64,
    removed: AtomicBool,
    close_requested: AtomicBool,
    write_lock: Mutex<()>,
}

impl Connection {
    pub fn new(session_id: String, tx: mpsc::UnboundedSender<OutboundFrame>, now: u64) -> Self {
        Self {
            session_id,
            tx,
            processing: AtomicBool::new(false),
            last_active: AtomicU64::new(now),
            removed: AtomicBool::new(false),
            close_requested: AtomicBool::new(false),
            write_lock: Mutex::new(()),
        }
    }

    /// Ask the owning event loop to close this connection once it next
    /// checks — used after sending a terminal `banned` frame.
    pub fn request_close(&self) {
        self.close_requested.store(true, Ordering::Release);
    }

    pub fn should_close(&self) -> bool {
        self.close_requested.load(Ordering::Acquire)
    }

    /// Try to claim the processing flag. Returns `false` if another reader
    /// already holds it — the caller must return without reading.
    pub fn try_claim_processing(&self) -> bool {
        self.processing.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_ok()
    }

    pub fn release_processing(&self) {
        self.processing.store(false, Ordering::Release);
    }

    pub fn touch(&self, now: u64) {
        self.last_active.store(now, Ordering::Relaxed);
    }

    pub fn last_active(&self) -> u64 {
        self.last_active.load(Ordering::Relaxed)
    }

    /// Send a frame to this connection's write side. Serialized by the
    /// connection's own write lock so a heartbeat ping never interleaves
    /// with an application write.
    pub async fn send(&self, msg: ServerMessage) -> Result<(), crate::error::StoreError> {
        let _guard = self.write_lock.lock().await;
        self.tx.send(OutboundFrame::Json(msg)).map_err(|_| crate::error::StoreError::NotFound)
    }

    /// Send a transport-level WebSocket ping. Same write lock as `send`, so
    /// it never interleaves with an application write (`spec.md` §4.A).
    pub async fn ping(&self) -> Result<(), crate::error::StoreError> {
        let _guard = self.write_lock.lock().await;
        self.tx.send(OutboundFrame::Ping).map_err(|_| crate::error::StoreError::NotFound)
    }

    fn mark_removed(&self) -> bool {
        self.removed.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_ok()
    }
}

/// Bidirectional session-id-keyed connection table.
///
/// Removal is idempotent: two evictors racing to remove the same session
/// (read-error path, heartbeat path) must never both run the disconnect
/// hook.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<String, Arc<Connection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, conn: Arc<Connection>) {
        self.connections.insert(conn.session_id.clone(), conn);
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<Connection>> {
        self.connections.get(session_id).map(|c| c.clone())
    }

    /// Remove the connection for `session_id`. Returns the removed handle
    /// only the first time this is called for that session; a second call
    /// (from a racing evictor) returns `None` without re-running any
    /// disconnect side effect.
    pub fn remove(&self, session_id: &str) -> Option<Arc<Connection>> {
        let (_, conn) = self.connections.remove(session_id)?;
        if conn.mark_removed() {
            Some(conn)
        } else {
            None
        }
    }

    pub fn count(&self) -> usize {
        self.connections.len()
    }

    pub fn all(&self) -> Vec<Arc<Connection>> {
        self.connections.iter().map(|c| c.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn make_connection(id: &str) -> Arc<Connection> {
        let (tx, _rx) = mpsc::unbounded_channel();
        Arc::new(Connection::new(id.to_owned(), tx, 0))
    }

    #[test]
    fn remove_is_idempotent() {
        let registry = ConnectionRegistry::new();
        registry.add(make_connection("s1"));

        assert!(registry.remove("s1").is_some());
        assert!(registry.remove("s1").is_none());
    }

    #[test]
    fn remove_on_racing_evictors_fires_hook_at_most_once() {
        let registry = ConnectionRegistry::new();
        let conn = make_connection("s1");
        registry.add(conn.clone());

        // Simulate two evictors grabbing the same Arc from two concurrent
        // lookups before either calls remove().
        let first = registry.remove("s1");
        let second = registry.remove("s1");
        assert!(first.is_some());
        assert!(second.is_none());
    }

    #[test]
    fn processing_flag_rejects_concurrent_claim() {
        let conn = make_connection("s1");
        assert!(conn.try_claim_processing());
        assert!(!conn.try_claim_processing());
        conn.release_processing();
        assert!(conn.try_claim_processing());
    }

    #[test]
    fn count_and_all_reflect_current_membership() {
        let registry = ConnectionRegistry::new();
        registry.add(make_connection("s1"));
        registry.add(make_connection("s2"));
        assert_eq!(registry.count(), 2);
        assert_eq!(registry.all().len(), 2);
    }

    proptest::proptest! {
        /// `spec.md` §4.A: two evictors racing to remove the same session
        /// must never both run the disconnect hook — for any number of
        /// redundant removal attempts, exactly one yields a handle.
        #[test]
        fn remove_yields_a_handle_exactly_once_under_any_number_of_repeats(
            extra_attempts in 0usize..6,
        ) {
            let registry = ConnectionRegistry::new();
            registry.add(make_connection("s1"));

            let mut handles_returned = 0;
            if registry.remove("s1").is_some() {
                handles_returned += 1;
            }
            for _ in 0..extra_attempts {
                if registry.remove("s1").is_some() {
                    handles_returned += 1;
                }
            }
            prop_assert_eq!(handles_returned, 1);
            prop_assert!(registry.get("s1").is_none());
        }
    }
}
