// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subscription lifecycle bookkeeping, keyed by `(topic, session_id)` so
//! two local sessions can subscribe to the same chat topic without
//! overwriting each other's handle (`spec.md` §4.E, §5).
//!
//! Each entry is the `AbortHandle` of the forwarder task that owns the
//! underlying `Subscription` (see `ws::handler::spawn_forwarder`); aborting
//! it drops the `Subscription` and unsubscribes from the bus.

use std::collections::HashMap;

use tokio::sync::Mutex;
use tokio::task::AbortHandle;

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct Key {
    topic: String,
    session_id: String,
}

/// Mutex-protected subscription map, drained on connection close.
#[derive(Default)]
pub struct SubscriptionRegistry {
    entries: Mutex<HashMap<Key, AbortHandle>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the forwarder task for `(topic, session_id)`, replacing and
    /// aborting any handle already registered under that key.
    pub async fn insert(&self, topic: &str, session_id: &str, handle: AbortHandle) {
        let key = Key { topic: topic.to_owned(), session_id: session_id.to_owned() };
        if let Some(old) = self.entries.lock().await.insert(key, handle) {
            old.abort();
        }
    }

    /// Abort and drop the forwarder for `(topic, session_id)`, unsubscribing it.
    pub async fn remove(&self, topic: &str, session_id: &str) {
        let key = Key { topic: topic.to_owned(), session_id: session_id.to_owned() };
        if let Some(handle) = self.entries.lock().await.remove(&key) {
            handle.abort();
        }
    }

    /// Abort and drop every forwarder owned by `session_id`. Called once
    /// per connection on disconnect.
    pub async fn drain_session(&self, session_id: &str) {
        let mut entries = self.entries.lock().await;
        let stale: Vec<Key> = entries.keys().filter(|k| k.session_id == session_id).cloned().collect();
        for key in stale {
            if let Some(handle) = entries.remove(&key) {
                handle.abort();
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_handle() -> AbortHandle {
        tokio::spawn(async {
            std::future::pending::<()>().await;
        })
        .abort_handle()
    }

    #[tokio::test]
    async fn drain_session_removes_only_that_sessions_subscriptions() {
        let registry = SubscriptionRegistry::new();

        registry.insert("chat.c1", "s1", dummy_handle()).await;
        registry.insert("chat.c1", "s2", dummy_handle()).await;
        assert_eq!(registry.len().await, 2);

        registry.drain_session("s1").await;
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn insert_under_an_existing_key_aborts_the_old_handle() {
        let registry = SubscriptionRegistry::new();
        let first = dummy_handle();
        registry.insert("chat.c1", "s1", first.clone()).await;
        registry.insert("chat.c1", "s1", dummy_handle()).await;

        assert_eq!(registry.len().await, 1);
        assert!(first.is_finished());
    }
}
