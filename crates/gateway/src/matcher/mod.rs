// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background pairing service (`spec.md` §4.C): a single-writer service
//! consuming match requests, running the tiered matching loop, and reaping
//! stale queue entries and expired pending chats.

mod tiers;

pub use tiers::TIMEOUT_WAIT_SECS;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::bus::{topics, Bus};
use crate::metrics;
use crate::store::{hash_interests, now_secs, QueueEntry, Store};

const TICK_INTERVAL: Duration = Duration::from_secs(2);
const CLEANUP_INTERVAL: Duration = Duration::from_secs(5);
const ACCEPT_DEADLINE_SECS: u64 = 15;

/// Payload published to `match.request`.
#[derive(Debug, Serialize, Deserialize)]
pub struct MatchRequest {
    pub session_id: String,
    pub interests: Vec<String>,
}

/// Payload published to `match.cancel`.
#[derive(Debug, Serialize, Deserialize)]
pub struct MatchCancel {
    pub session_id: String,
}

/// Payload published to `match.found.<session_id>`.
#[derive(Debug, Serialize, Deserialize)]
pub struct MatchFoundEvent {
    pub chat_id: String,
    pub shared_interests: Vec<String>,
    pub accept_deadline: u64,
}

/// Payload published to `match.notify.<session_id>`. Drives state changes
/// on the receiving gateway that weren't triggered by that session's own
/// client frame — the partner accepted/declined, or a timeout fired.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MatchNotifyEvent {
    /// The partner's `accept_match` completed the pairing; this session's
    /// chat is now active.
    Accepted { chat_id: String },
    /// The partner declined, or the cleanup loop reaped an expired pending
    /// chat; this session's status resets to idle.
    Declined { chat_id: String },
    /// This session waited the full 30s with no pairing found.
    QueueTimeout,
}

pub struct Matcher {
    store: Arc<dyn Store>,
    bus: Arc<dyn Bus>,
}

impl Matcher {
    pub fn new(store: Arc<dyn Store>, bus: Arc<dyn Bus>) -> Self {
        Self { store, bus }
    }

    /// Launch the request consumer, tick loop, and cleanup loop as
    /// independent background tasks, each stopping on `shutdown`.
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) {
        let matcher = self.clone();
        let token = shutdown.clone();
        tokio::spawn(async move { matcher.run_request_consumer(token).await });

        let matcher = self.clone();
        let token = shutdown.clone();
        tokio::spawn(async move { matcher.run_tick_loop(token).await });

        let matcher = self;
        tokio::spawn(async move { matcher.run_cleanup_loop(shutdown).await });
    }

    async fn run_request_consumer(&self, shutdown: CancellationToken) {
        let (mut requests, mut cancels) = match self.subscribe_requests().await {
            Ok(pair) => pair,
            Err(e) => {
                error!(err = %e, "matcher: failed to subscribe to request topics");
                return;
            }
        };

        loop {
            tokio::select! {
                msg = requests.recv() => {
                    let Some(payload) = msg else { break };
                    if let Err(e) = self.handle_request(&payload).await {
                        warn!(err = %e, "matcher: enqueue failed");
                    }
                }
                msg = cancels.recv() => {
                    let Some(payload) = msg else { break };
                    if let Err(e) = self.handle_cancel(&payload).await {
                        warn!(err = %e, "matcher: dequeue failed");
                    }
                }
                _ = shutdown.cancelled() => break,
            }
        }
        debug!("matcher: request consumer stopped");
    }

    async fn subscribe_requests(
        &self,
    ) -> anyhow::Result<(crate::bus::Subscription, crate::bus::Subscription)> {
        let requests = self.bus.subscribe(&topics::match_request()).await?;
        let cancels = self.bus.subscribe(&topics::match_cancel()).await?;
        Ok((requests, cancels))
    }

    async fn handle_request(&self, payload: &[u8]) -> anyhow::Result<()> {
        let req: MatchRequest = serde_json::from_slice(payload)?;
        let hash = hash_interests(&req.interests);
        self.store
            .enqueue(QueueEntry {
                session_id: req.session_id,
                interests: req.interests,
                hash,
                joined_at: now_secs(),
            })
            .await?;
        Ok(())
    }

    async fn handle_cancel(&self, payload: &[u8]) -> anyhow::Result<()> {
        let req: MatchCancel = serde_json::from_slice(payload)?;
        // The interest list isn't needed to find the session's metadata
        // key, only to clean up per-tag set membership; read it back first.
        let interests = self
            .store
            .queue_entry(&req.session_id)
            .await?
            .map(|e| e.interests)
            .unwrap_or_default();
        self.store.dequeue(&req.session_id, &interests).await?;
        Ok(())
    }

    async fn run_tick_loop(&self, shutdown: CancellationToken) {
        let mut tick = interval(TICK_INTERVAL);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(err = %e, "matcher: tick failed");
                    }
                }
                _ = shutdown.cancelled() => break,
            }
        }
        debug!("matcher: tick loop stopped");
    }

    async fn tick(&self) -> anyhow::Result<()> {
        let now = now_secs();
        for session_id in self.store.queue_oldest_first().await? {
            let Some(entry) = self.store.queue_entry(&session_id).await? else {
                continue; // reaped since the snapshot was taken
            };
            let wait = now.saturating_sub(entry.joined_at);

            let candidate = self.attempt_tiers(&session_id, &entry.interests, &entry.hash, wait).await?;
            match candidate {
                Some(found) => {
                    metrics::record_match(found.tier, wait as f64);
                    self.create_match(&session_id, &entry.interests, &found).await?
                }
                None if wait >= tiers::TIMEOUT_WAIT_SECS => self.timeout_session(&session_id, &entry.interests).await?,
                None => {}
            }
        }
        metrics::record_queue_depth(self.store.queue_oldest_first().await?.len() as f64);
        Ok(())
    }

    async fn attempt_tiers(
        &self,
        session_id: &str,
        interests: &[String],
        hash: &str,
        wait: u64,
    ) -> anyhow::Result<Option<tiers::Candidate>> {
        if let Some(c) = tiers::tier1_exact(self.store.as_ref(), session_id, interests, hash).await? {
            return Ok(Some(c));
        }
        if wait >= tiers::TIER_2_WAIT_SECS {
            if let Some(c) = tiers::tier2_best_overlap(self.store.as_ref(), session_id, interests).await? {
                return Ok(Some(c));
            }
        }
        if wait >= tiers::TIER_3_WAIT_SECS {
            if let Some(c) = tiers::tier3_single_overlap(self.store.as_ref(), session_id, interests).await? {
                return Ok(Some(c));
            }
        }
        if wait >= tiers::TIER_4_WAIT_SECS {
            if let Some(c) = tiers::tier4_random(self.store.as_ref(), session_id).await? {
                return Ok(Some(c));
            }
        }
        Ok(None)
    }

    async fn create_match(
        &self,
        session_id: &str,
        session_interests: &[String],
        found: &tiers::Candidate,
    ) -> anyhow::Result<()> {
        let candidate_interests = self
            .store
            .queue_entry(&found.session_id)
            .await?
            .map(|e| e.interests)
            .unwrap_or_default();

        self.store.dequeue(session_id, session_interests).await?;
        self.store.dequeue(&found.session_id, &candidate_interests).await?;

        let chat_id = Uuid::new_v4().to_string();
        let now = now_secs();
        let deadline = now + ACCEPT_DEADLINE_SECS;
        self.store
            .create_pending_chat(&chat_id, session_id, &found.session_id, now, deadline)
            .await?;

        let event = MatchFoundEvent {
            chat_id: chat_id.clone(),
            shared_interests: found.shared_interests.clone(),
            accept_deadline: ACCEPT_DEADLINE_SECS,
        };
        let payload = serde_json::to_vec(&event)?;
        self.bus.publish(&topics::match_found(session_id), payload.clone()).await?;
        self.bus.publish(&topics::match_found(&found.session_id), payload).await?;

        info!(chat_id = %chat_id, a = %session_id, b = %found.session_id, "matcher: paired");
        Ok(())
    }

    async fn timeout_session(&self, session_id: &str, interests: &[String]) -> anyhow::Result<()> {
        self.store.dequeue(session_id, interests).await?;
        let payload = serde_json::to_vec(&MatchNotifyEvent::QueueTimeout)?;
        self.bus.publish(&topics::match_notify(session_id), payload).await?;
        Ok(())
    }

    async fn run_cleanup_loop(&self, shutdown: CancellationToken) {
        let mut tick = interval(CLEANUP_INTERVAL);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(e) = self.cleanup().await {
                        error!(err = %e, "matcher: cleanup failed");
                    }
                }
                _ = shutdown.cancelled() => break,
            }
        }
        debug!("matcher: cleanup loop stopped");
    }

    async fn cleanup(&self) -> anyhow::Result<()> {
        let now = now_secs();

        for session_id in self.store.queue_oldest_first().await? {
            if self.store.get_session(&session_id).await?.is_none() {
                self.store.dequeue(&session_id, &[]).await?;
            }
        }

        for chat in self.store.expired_pending_chats(now).await? {
            let payload = serde_json::to_vec(&MatchNotifyEvent::Declined { chat_id: chat.id.clone() })?;
            self.bus.publish(&topics::match_notify(&chat.user_a), payload.clone()).await?;
            self.bus.publish(&topics::match_notify(&chat.user_b), payload).await?;
            self.store.delete_chat(&chat.id).await?;
            debug!(chat_id = %chat.id, "matcher: reaped expired pending chat");
        }

        Ok(())
    }
}
