// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ephemeral session/chat key-value store (`spec.md` §4.B).
//!
//! The store is the authoritative source of session status; the matcher is
//! the authoritative source of chat status (but both live behind the same
//! [`Store`] trait, backed by the same key-value backend).

mod memory_store;
mod redis_store;

pub use memory_store::MemoryStore;
pub use redis_store::RedisStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub const SESSION_TTL_SECS: u64 = 3600;
pub const CHAT_TTL_SECS: u64 = 7200;
pub const QUEUE_ENTRY_TTL_SECS: u64 = 60;

/// Lifecycle state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Matching,
    Chatting,
}

/// A connected client's ephemeral identity and state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub status: SessionStatus,
    pub chat_id: Option<String>,
    pub owner: String,
    pub interests: Vec<String>,
    pub fingerprint: Option<String>,
    pub created_at: u64,
    pub last_active: u64,
}

impl Session {
    pub fn new(id: impl Into<String>, owner: impl Into<String>, now: u64) -> Self {
        Self {
            id: id.into(),
            status: SessionStatus::Idle,
            chat_id: None,
            owner: owner.into(),
            interests: Vec::new(),
            fingerprint: None,
            created_at: now,
            last_active: now,
        }
    }
}

/// Lifecycle state of a [`Chat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatStatus {
    PendingAccept,
    Active,
    Ended,
}

/// A pairing of two sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    pub user_a: String,
    pub user_b: String,
    pub status: ChatStatus,
    pub accepted_a: bool,
    pub accepted_b: bool,
    pub created_at: u64,
    pub accept_deadline: u64,
}

impl Chat {
    /// Whether `session_id` is one of the two participants.
    pub fn has_participant(&self, session_id: &str) -> bool {
        self.user_a == session_id || self.user_b == session_id
    }

    /// The other participant's session id, or `None` if `session_id` is not
    /// a participant of this chat.
    pub fn partner_of(&self, session_id: &str) -> Option<&str> {
        if self.user_a == session_id {
            Some(&self.user_b)
        } else if self.user_b == session_id {
            Some(&self.user_a)
        } else {
            None
        }
    }
}

/// Outcome of [`Store::accept_match`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptOutcome {
    /// Both sides have now accepted; the chat transitioned to `active`.
    BothAccepted,
    /// This side accepted; waiting on the partner.
    Waiting,
    /// `session_id` is not a participant of this chat.
    NotParticipant,
    /// The chat no longer exists, or is not in `pending_accept`.
    InvalidState,
}

/// A queue entry snapshot carried alongside matcher index reads.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub session_id: String,
    pub interests: Vec<String>,
    pub hash: String,
    pub joined_at: u64,
}

/// Typed wrapper over the ephemeral key-value backend (`spec.md` §4.B).
///
/// Every method here is a thin, TTL-aware operation against a single key or
/// small group of keys; multi-key atomicity (e.g. [`Store::accept_match`])
/// is implemented with backend-native scripting where the backend supports
/// it, and with an in-process lock in the test double.
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_session(&self, id: &str, owner: &str) -> Result<Session, StoreError>;
    async fn get_session(&self, id: &str) -> Result<Option<Session>, StoreError>;
    async fn update_status(&self, id: &str, status: SessionStatus) -> Result<(), StoreError>;
    async fn set_interests(&self, id: &str, interests: &[String]) -> Result<(), StoreError>;
    /// Idempotent, one-shot: a second call with a different value is ignored.
    async fn set_fingerprint(&self, id: &str, fingerprint: &str) -> Result<(), StoreError>;
    async fn set_chat_id(&self, id: &str, chat_id: &str) -> Result<(), StoreError>;
    async fn clear_chat_id(&self, id: &str) -> Result<(), StoreError>;
    async fn touch(&self, id: &str, now: u64) -> Result<(), StoreError>;
    async fn delete_session(&self, id: &str) -> Result<(), StoreError>;

    async fn create_pending_chat(
        &self,
        chat_id: &str,
        user_a: &str,
        user_b: &str,
        now: u64,
        accept_deadline: u64,
    ) -> Result<Chat, StoreError>;
    async fn get_chat(&self, chat_id: &str) -> Result<Option<Chat>, StoreError>;
    async fn accept_match(
        &self,
        chat_id: &str,
        session_id: &str,
    ) -> Result<AcceptOutcome, StoreError>;
    async fn delete_chat(&self, chat_id: &str) -> Result<(), StoreError>;
    /// Pending chats whose `accept_deadline` has passed `now`.
    async fn expired_pending_chats(&self, now: u64) -> Result<Vec<Chat>, StoreError>;

    // --- Matching queue indices (spec.md §4.C) ---
    async fn enqueue(&self, entry: QueueEntry) -> Result<(), StoreError>;
    async fn dequeue(&self, session_id: &str, interests: &[String]) -> Result<(), StoreError>;
    /// Session ids still present in the global time-ordered queue, oldest first.
    async fn queue_oldest_first(&self) -> Result<Vec<String>, StoreError>;
    async fn queue_entry(&self, session_id: &str) -> Result<Option<QueueEntry>, StoreError>;
    async fn exact_hash_candidates(&self, hash: &str) -> Result<Vec<String>, StoreError>;
    async fn tag_candidates(&self, tag: &str) -> Result<Vec<String>, StoreError>;

    // --- Rate limiting / bans (spec.md §4.D) ---
    /// Atomic increment with expiry-on-first-write; returns the post-increment value.
    async fn incr_with_ttl(&self, key: &str, ttl_secs: u64) -> Result<i64, StoreError>;
    async fn set_ban(&self, fingerprint: &str, reason: &str, ttl_secs: u64) -> Result<(), StoreError>;
    /// Remaining seconds and reason, if a ban is currently active.
    async fn get_ban(&self, fingerprint: &str) -> Result<Option<(u64, String)>, StoreError>;
}

/// Seconds since the Unix epoch, used throughout the store for TTL math and
/// timestamps. Centralized so tests can reason about it in one place.
pub fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Order-independent hash of an interest set (`spec.md` §8: hash(sort(X)) = hash(sort(π(X)))).
pub fn hash_interests(interests: &[String]) -> String {
    let mut sorted: Vec<&str> = interests.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted.dedup();
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    sorted.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}
