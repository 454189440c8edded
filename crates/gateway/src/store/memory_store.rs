// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process store backend (`memory://`), used by tests and single-node
//! deployments that don't want a live Redis dependency.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::StoreError;

use super::{
    now_secs, AcceptOutcome, Chat, ChatStatus, QueueEntry, Session, SessionStatus, Store,
};

/// `dashmap`-backed store. Multi-key atomicity (accept, enqueue, dequeue) is
/// provided by a coarse mutex rather than per-key locking: contention is not
/// a concern for the small state this backend is meant to serve (tests,
/// single-node smoke runs).
pub struct MemoryStore {
    sessions: DashMap<String, Session>,
    chats: DashMap<String, Chat>,
    bans: DashMap<String, (String, u64)>,
    counters: DashMap<String, (i64, u64)>,
    queue_entries: DashMap<String, QueueEntry>,
    lock: Mutex<()>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            sessions: DashMap::new(),
            chats: DashMap::new(),
            bans: DashMap::new(),
            counters: DashMap::new(),
            queue_entries: DashMap::new(),
            lock: Mutex::new(()),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_session(&self, id: &str, owner: &str) -> Result<Session, StoreError> {
        let session = Session::new(id, owner, now_secs());
        self.sessions.insert(id.to_owned(), session.clone());
        Ok(session)
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>, StoreError> {
        Ok(self.sessions.get(id).map(|s| s.clone()))
    }

    async fn update_status(&self, id: &str, status: SessionStatus) -> Result<(), StoreError> {
        if let Some(mut s) = self.sessions.get_mut(id) {
            s.status = status;
            s.last_active = now_secs();
        }
        Ok(())
    }

    async fn set_interests(&self, id: &str, interests: &[String]) -> Result<(), StoreError> {
        if let Some(mut s) = self.sessions.get_mut(id) {
            s.interests = interests.to_vec();
            s.last_active = now_secs();
        }
        Ok(())
    }

    async fn set_fingerprint(&self, id: &str, fingerprint: &str) -> Result<(), StoreError> {
        if let Some(mut s) = self.sessions.get_mut(id) {
            if s.fingerprint.is_none() {
                s.fingerprint = Some(fingerprint.to_owned());
            }
        }
        Ok(())
    }

    async fn set_chat_id(&self, id: &str, chat_id: &str) -> Result<(), StoreError> {
        if let Some(mut s) = self.sessions.get_mut(id) {
            s.chat_id = Some(chat_id.to_owned());
        }
        Ok(())
    }

    async fn clear_chat_id(&self, id: &str) -> Result<(), StoreError> {
        if let Some(mut s) = self.sessions.get_mut(id) {
            s.chat_id = None;
        }
        Ok(())
    }

    async fn touch(&self, id: &str, now: u64) -> Result<(), StoreError> {
        if let Some(mut s) = self.sessions.get_mut(id) {
            s.last_active = now;
        }
        Ok(())
    }

    async fn delete_session(&self, id: &str) -> Result<(), StoreError> {
        self.sessions.remove(id);
        Ok(())
    }

    async fn create_pending_chat(
        &self,
        chat_id: &str,
        user_a: &str,
        user_b: &str,
        now: u64,
        accept_deadline: u64,
    ) -> Result<Chat, StoreError> {
        let chat = Chat {
            id: chat_id.to_owned(),
            user_a: user_a.to_owned(),
            user_b: user_b.to_owned(),
            status: ChatStatus::PendingAccept,
            accepted_a: false,
            accepted_b: false,
            created_at: now,
            accept_deadline,
        };
        self.chats.insert(chat_id.to_owned(), chat.clone());
        Ok(chat)
    }

    async fn get_chat(&self, chat_id: &str) -> Result<Option<Chat>, StoreError> {
        Ok(self.chats.get(chat_id).map(|c| c.clone()))
    }

    async fn accept_match(
        &self,
        chat_id: &str,
        session_id: &str,
    ) -> Result<AcceptOutcome, StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Backend("poisoned lock".into()))?;
        let Some(mut chat) = self.chats.get_mut(chat_id) else {
            return Ok(AcceptOutcome::InvalidState);
        };
        if chat.status != ChatStatus::PendingAccept {
            return Ok(AcceptOutcome::InvalidState);
        }
        if chat.user_a == session_id {
            chat.accepted_a = true;
        } else if chat.user_b == session_id {
            chat.accepted_b = true;
        } else {
            return Ok(AcceptOutcome::NotParticipant);
        }
        if chat.accepted_a && chat.accepted_b {
            chat.status = ChatStatus::Active;
            Ok(AcceptOutcome::BothAccepted)
        } else {
            Ok(AcceptOutcome::Waiting)
        }
    }

    async fn delete_chat(&self, chat_id: &str) -> Result<(), StoreError> {
        self.chats.remove(chat_id);
        Ok(())
    }

    async fn expired_pending_chats(&self, now: u64) -> Result<Vec<Chat>, StoreError> {
        Ok(self
            .chats
            .iter()
            .filter(|c| c.status == ChatStatus::PendingAccept && c.accept_deadline <= now)
            .map(|c| c.clone())
            .collect())
    }

    async fn enqueue(&self, entry: QueueEntry) -> Result<(), StoreError> {
        self.queue_entries.insert(entry.session_id.clone(), entry);
        Ok(())
    }

    async fn dequeue(&self, session_id: &str, _interests: &[String]) -> Result<(), StoreError> {
        self.queue_entries.remove(session_id);
        Ok(())
    }

    async fn queue_oldest_first(&self) -> Result<Vec<String>, StoreError> {
        let mut ordered: BTreeMap<u64, String> = BTreeMap::new();
        for entry in self.queue_entries.iter() {
            ordered.insert(entry.joined_at, entry.session_id.clone());
        }
        Ok(ordered.into_values().collect())
    }

    async fn queue_entry(&self, session_id: &str) -> Result<Option<QueueEntry>, StoreError> {
        Ok(self.queue_entries.get(session_id).map(|e| e.clone()))
    }

    async fn exact_hash_candidates(&self, hash: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .queue_entries
            .iter()
            .filter(|e| e.hash == hash)
            .map(|e| e.session_id.clone())
            .collect())
    }

    async fn tag_candidates(&self, tag: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .queue_entries
            .iter()
            .filter(|e| e.interests.iter().any(|t| t == tag))
            .map(|e| e.session_id.clone())
            .collect())
    }

    async fn incr_with_ttl(&self, key: &str, ttl_secs: u64) -> Result<i64, StoreError> {
        let now = now_secs();
        let mut entry = self.counters.entry(key.to_owned()).or_insert((0, now + ttl_secs));
        if now >= entry.1 {
            entry.0 = 0;
            entry.1 = now + ttl_secs;
        }
        entry.0 += 1;
        Ok(entry.0)
    }

    async fn set_ban(&self, fingerprint: &str, reason: &str, ttl_secs: u64) -> Result<(), StoreError> {
        self.bans.insert(fingerprint.to_owned(), (reason.to_owned(), now_secs() + ttl_secs));
        Ok(())
    }

    async fn get_ban(&self, fingerprint: &str) -> Result<Option<(u64, String)>, StoreError> {
        let Some(entry) = self.bans.get(fingerprint) else { return Ok(None) };
        let (reason, expires_at) = entry.clone();
        let now = now_secs();
        if expires_at <= now {
            drop(entry);
            self.bans.remove(fingerprint);
            return Ok(None);
        }
        Ok(Some((expires_at - now, reason)))
    }
}
