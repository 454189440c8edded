// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Redis-backed store (`redis://...`), the production backend.
//!
//! Sessions and chats are stored as JSON-encoded string values with
//! `EXPIRE` set on every write. The matching queue indices are Redis sorted
//! sets and sets, pipelined per `spec.md` §4.C. `accept_match` runs as a
//! single Lua script so the accept-flag flip and the pending-deadline index
//! update are atomic against concurrent calls from the partner side.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};

use crate::error::StoreError;

use super::{now_secs, AcceptOutcome, Chat, ChatStatus, QueueEntry, Session, SessionStatus, Store};
use super::{CHAT_TTL_SECS, QUEUE_ENTRY_TTL_SECS, SESSION_TTL_SECS};

fn session_key(id: &str) -> String {
    format!("session:{id}")
}
fn chat_key(id: &str) -> String {
    format!("chat:{id}")
}
const QUEUE_SEQ_KEY: &str = "queue:seq";
fn queue_hash_key(hash: &str) -> String {
    format!("queue:hash:{hash}")
}
fn queue_tag_key(tag: &str) -> String {
    format!("queue:tag:{tag}")
}
fn queue_meta_key(session_id: &str) -> String {
    format!("queue:meta:{session_id}")
}
const PENDING_DEADLINE_KEY: &str = "chat:pending_deadlines";
fn ban_key(fingerprint: &str) -> String {
    format!("ban:{fingerprint}")
}

/// Atomically flips the caller's accept flag on a pending chat and, if both
/// sides are now accepted, transitions it to `active` and drops it from the
/// pending-deadline index. Returns an integer outcome code mirrored by
/// [`AcceptOutcome`]: 1 = both accepted, 0 = waiting, -1 = not a participant,
/// -2 = invalid state (missing or not pending).
const ACCEPT_MATCH_SCRIPT: &str = r#"
local chat_key = KEYS[1]
local pending_key = KEYS[2]
local chat_id = ARGV[1]
local session_id = ARGV[2]

local raw = redis.call('GET', chat_key)
if not raw then
    return -2
end
local chat = cjson.decode(raw)
if chat.status ~= 'pending_accept' then
    return -2
end

if chat.user_a == session_id then
    chat.accepted_a = true
elseif chat.user_b == session_id then
    chat.accepted_b = true
else
    return -1
end

if chat.accepted_a and chat.accepted_b then
    chat.status = 'active'
    redis.call('ZREM', pending_key, chat_id)
    redis.call('SET', chat_key, cjson.encode(chat), 'KEEPTTL')
    return 1
else
    redis.call('SET', chat_key, cjson.encode(chat), 'KEEPTTL')
    return 0
end
"#;

pub struct RedisStore {
    conn: ConnectionManager,
    accept_match_script: Script,
}

impl RedisStore {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn, accept_match_script: Script::new(ACCEPT_MATCH_SCRIPT) })
    }

    fn map_err(e: redis::RedisError) -> StoreError {
        if e.is_timeout() {
            StoreError::Timeout
        } else {
            StoreError::Backend(e.to_string())
        }
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn create_session(&self, id: &str, owner: &str) -> Result<Session, StoreError> {
        let session = Session::new(id, owner, now_secs());
        let json = serde_json::to_string(&session).map_err(|e| StoreError::Backend(e.to_string()))?;
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(session_key(id), json, SESSION_TTL_SECS)
            .await
            .map_err(Self::map_err)?;
        Ok(session)
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(session_key(id)).await.map_err(Self::map_err)?;
        raw.map(|j| serde_json::from_str(&j).map_err(|e| StoreError::Backend(e.to_string())))
            .transpose()
    }

    async fn update_status(&self, id: &str, status: SessionStatus) -> Result<(), StoreError> {
        let Some(mut session) = self.get_session(id).await? else { return Ok(()) };
        session.status = status;
        session.last_active = now_secs();
        self.write_session(&session).await
    }

    async fn set_interests(&self, id: &str, interests: &[String]) -> Result<(), StoreError> {
        let Some(mut session) = self.get_session(id).await? else { return Ok(()) };
        session.interests = interests.to_vec();
        session.last_active = now_secs();
        self.write_session(&session).await
    }

    async fn set_fingerprint(&self, id: &str, fingerprint: &str) -> Result<(), StoreError> {
        let Some(mut session) = self.get_session(id).await? else { return Ok(()) };
        if session.fingerprint.is_some() {
            return Ok(());
        }
        session.fingerprint = Some(fingerprint.to_owned());
        self.write_session(&session).await
    }

    async fn set_chat_id(&self, id: &str, chat_id: &str) -> Result<(), StoreError> {
        let Some(mut session) = self.get_session(id).await? else { return Ok(()) };
        session.chat_id = Some(chat_id.to_owned());
        self.write_session(&session).await
    }

    async fn clear_chat_id(&self, id: &str) -> Result<(), StoreError> {
        let Some(mut session) = self.get_session(id).await? else { return Ok(()) };
        session.chat_id = None;
        self.write_session(&session).await
    }

    async fn touch(&self, id: &str, now: u64) -> Result<(), StoreError> {
        let Some(mut session) = self.get_session(id).await? else { return Ok(()) };
        session.last_active = now;
        self.write_session(&session).await
    }

    async fn delete_session(&self, id: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(session_key(id)).await.map_err(Self::map_err)
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
        let json = serde_json::to_string(&chat).map_err(|e| StoreError::Backend(e.to_string()))?;
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .set_ex(chat_key(chat_id), json, CHAT_TTL_SECS)
            .zadd(PENDING_DEADLINE_KEY, chat_id, accept_deadline as f64)
            .query_async::<()>(&mut conn)
            .await
            .map_err(Self::map_err)?;
        Ok(chat)
    }

    async fn get_chat(&self, chat_id: &str) -> Result<Option<Chat>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(chat_key(chat_id)).await.map_err(Self::map_err)?;
        raw.map(|j| serde_json::from_str(&j).map_err(|e| StoreError::Backend(e.to_string())))
            .transpose()
    }

    async fn accept_match(
        &self,
        chat_id: &str,
        session_id: &str,
    ) -> Result<AcceptOutcome, StoreError> {
        let mut conn = self.conn.clone();
        let code: i64 = self
            .accept_match_script
            .key(chat_key(chat_id))
            .key(PENDING_DEADLINE_KEY)
            .arg(chat_id)
            .arg(session_id)
            .invoke_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        Ok(match code {
            1 => AcceptOutcome::BothAccepted,
            0 => AcceptOutcome::Waiting,
            -1 => AcceptOutcome::NotParticipant,
            _ => AcceptOutcome::InvalidState,
        })
    }

    async fn delete_chat(&self, chat_id: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .del(chat_key(chat_id))
            .zrem(PENDING_DEADLINE_KEY, chat_id)
            .query_async::<()>(&mut conn)
            .await
            .map_err(Self::map_err)
    }

    async fn expired_pending_chats(&self, now: u64) -> Result<Vec<Chat>, StoreError> {
        let mut conn = self.conn.clone();
        let chat_ids: Vec<String> = conn
            .zrangebyscore(PENDING_DEADLINE_KEY, 0, now as f64)
            .await
            .map_err(Self::map_err)?;
        let mut chats = Vec::with_capacity(chat_ids.len());
        for id in chat_ids {
            if let Some(chat) = self.get_chat(&id).await? {
                chats.push(chat);
            }
        }
        Ok(chats)
    }

    async fn enqueue(&self, entry: QueueEntry) -> Result<(), StoreError> {
        let meta = serde_json::json!({
            "interests": entry.interests,
            "hash": entry.hash,
            "joined_at": entry.joined_at,
        });
        let meta_json = serde_json::to_string(&meta).map_err(|e| StoreError::Backend(e.to_string()))?;
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .zadd(QUEUE_SEQ_KEY, &entry.session_id, entry.joined_at as f64)
            .sadd(queue_hash_key(&entry.hash), &entry.session_id)
            .set_ex(queue_meta_key(&entry.session_id), meta_json, QUEUE_ENTRY_TTL_SECS);
        for tag in &entry.interests {
            pipe.sadd(queue_tag_key(tag), &entry.session_id);
        }
        pipe.query_async::<()>(&mut conn).await.map_err(Self::map_err)
    }

    async fn dequeue(&self, session_id: &str, interests: &[String]) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .zrem(QUEUE_SEQ_KEY, session_id)
            .del(queue_meta_key(session_id));
        for tag in interests {
            pipe.srem(queue_tag_key(tag), session_id);
        }
        // Hash-set membership is removed lazily: the caller doesn't always
        // know the hash here, and a stale member is filtered by the
        // queue-existence check at read time.
        pipe.query_async::<()>(&mut conn).await.map_err(Self::map_err)
    }

    async fn queue_oldest_first(&self) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        conn.zrange(QUEUE_SEQ_KEY, 0, -1).await.map_err(Self::map_err)
    }

    async fn queue_entry(&self, session_id: &str) -> Result<Option<QueueEntry>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(queue_meta_key(session_id)).await.map_err(Self::map_err)?;
        let Some(raw) = raw else { return Ok(None) };
        let value: serde_json::Value =
            serde_json::from_str(&raw).map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Some(QueueEntry {
            session_id: session_id.to_owned(),
            interests: serde_json::from_value(value["interests"].clone()).unwrap_or_default(),
            hash: value["hash"].as_str().unwrap_or_default().to_owned(),
            joined_at: value["joined_at"].as_u64().unwrap_or_default(),
        }))
    }

    async fn exact_hash_candidates(&self, hash: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        conn.smembers(queue_hash_key(hash)).await.map_err(Self::map_err)
    }

    async fn tag_candidates(&self, tag: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        conn.smembers(queue_tag_key(tag)).await.map_err(Self::map_err)
    }

    async fn incr_with_ttl(&self, key: &str, ttl_secs: u64) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        let value: i64 = conn.incr(key, 1).await.map_err(Self::map_err)?;
        if value == 1 {
            conn.expire::<_, ()>(key, ttl_secs as i64).await.map_err(Self::map_err)?;
        }
        Ok(value)
    }

    async fn set_ban(&self, fingerprint: &str, reason: &str, ttl_secs: u64) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(ban_key(fingerprint), reason, ttl_secs)
            .await
            .map_err(Self::map_err)
    }

    async fn get_ban(&self, fingerprint: &str) -> Result<Option<(u64, String)>, StoreError> {
        let mut conn = self.conn.clone();
        let key = ban_key(fingerprint);
        let reason: Option<String> = conn.get(&key).await.map_err(Self::map_err)?;
        let Some(reason) = reason else { return Ok(None) };
        let ttl: i64 = conn.ttl(&key).await.map_err(Self::map_err)?;
        Ok(Some((ttl.max(0) as u64, reason)))
    }
}

impl RedisStore {
    async fn write_session(&self, session: &Session) -> Result<(), StoreError> {
        let json = serde_json::to_string(session).map_err(|e| StoreError::Backend(e.to_string()))?;
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(session_key(&session.id), json, SESSION_TTL_SECS)
            .await
            .map_err(Self::map_err)
    }
}
