// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tiered pairing strategies (`spec.md` §4.C), tried in order of increasing
//! relaxation as a requester's wait time grows.

use std::collections::HashMap;

use crate::error::StoreError;
use crate::store::Store;

/// A candidate pairing: the matched session id and the interests to report
/// as `shared_interests` in the resulting `match_found` frame.
pub struct Candidate {
    pub session_id: String,
    pub shared_interests: Vec<String>,
    pub tier: &'static str,
}

/// Wait time (seconds) after which each relaxed tier becomes eligible.
pub const TIER_2_WAIT_SECS: u64 = 10;
pub const TIER_3_WAIT_SECS: u64 = 20;
pub const TIER_4_WAIT_SECS: u64 = 25;
pub const TIMEOUT_WAIT_SECS: u64 = 30;

async fn still_queued(store: &dyn Store, session_id: &str) -> Result<bool, StoreError> {
    Ok(store.queue_entry(session_id).await?.is_some())
}

/// Tier 1 — exact interest set. Always attempted regardless of wait time.
pub async fn tier1_exact(
    store: &dyn Store,
    requester: &str,
    interests: &[String],
    hash: &str,
) -> Result<Option<Candidate>, StoreError> {
    for candidate in store.exact_hash_candidates(hash).await? {
        if candidate == requester {
            continue;
        }
        if still_queued(store, &candidate).await? {
            return Ok(Some(Candidate { session_id: candidate, shared_interests: sorted(interests), tier: "exact" }));
        }
    }
    Ok(None)
}

/// Tier 2 — best overlap by tag count, eligible once `wait >= 10s`.
pub async fn tier2_best_overlap(
    store: &dyn Store,
    requester: &str,
    interests: &[String],
) -> Result<Option<Candidate>, StoreError> {
    let mut scores: HashMap<String, Vec<String>> = HashMap::new();
    for tag in interests {
        for candidate in store.tag_candidates(tag).await? {
            if candidate == requester {
                continue;
            }
            scores.entry(candidate).or_default().push(tag.clone());
        }
    }
    let mut ranked: Vec<(String, Vec<String>)> = scores.into_iter().collect();
    ranked.sort_by(|a, b| b.1.len().cmp(&a.1.len()));

    for (candidate, overlap) in ranked {
        if still_queued(store, &candidate).await? {
            return Ok(Some(Candidate { session_id: candidate, shared_interests: sorted(&overlap), tier: "best_overlap" }));
        }
    }
    Ok(None)
}

/// Tier 3 — any candidate with overlap >= 1, eligible once `wait >= 20s`.
/// Structurally identical to tier 2; the relaxation is in the caller's gate
/// (tier 2 requires the *best* scorer, tier 3 accepts the first live one).
pub async fn tier3_single_overlap(
    store: &dyn Store,
    requester: &str,
    interests: &[String],
) -> Result<Option<Candidate>, StoreError> {
    for tag in interests {
        for candidate in store.tag_candidates(tag).await? {
            if candidate == requester {
                continue;
            }
            if still_queued(store, &candidate).await? {
                return Ok(Some(Candidate { session_id: candidate, shared_interests: vec![tag.clone()], tier: "single_overlap" }));
            }
        }
    }
    Ok(None)
}

/// Tier 4 — random (oldest-first walk of the global queue), eligible once
/// `wait >= 25s`.
pub async fn tier4_random(
    store: &dyn Store,
    requester: &str,
) -> Result<Option<Candidate>, StoreError> {
    for candidate in store.queue_oldest_first().await? {
        if candidate == requester {
            continue;
        }
        if still_queued(store, &candidate).await? {
            return Ok(Some(Candidate { session_id: candidate, shared_interests: Vec::new(), tier: "random" }));
        }
    }
    Ok(None)
}

fn sorted(interests: &[String]) -> Vec<String> {
    let mut v = interests.to_vec();
    v.sort_unstable();
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{hash_interests, MemoryStore, QueueEntry};

    async fn enqueue(store: &MemoryStore, id: &str, interests: &[&str], joined_at: u64) -> anyhow::Result<()> {
        let interests: Vec<String> = interests.iter().map(|s| s.to_string()).collect();
        let hash = hash_interests(&interests);
        store.enqueue(QueueEntry { session_id: id.into(), interests, hash, joined_at }).await?;
        Ok(())
    }

    #[tokio::test]
    async fn tier1_matches_exact_set_ignoring_order() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        enqueue(&store, "a", &["music", "gaming", "anime"], 0).await?;
        enqueue(&store, "b", &["anime", "music", "gaming"], 1).await?;

        let hash = hash_interests(&["music".into(), "gaming".into(), "anime".into()]);
        let found = tier1_exact(&store, "a", &["music".into(), "gaming".into(), "anime".into()], &hash).await?;
        assert_eq!(found.map(|c| c.session_id), Some("b".to_owned()));
        Ok(())
    }

    #[tokio::test]
    async fn tier2_prefers_higher_overlap_count() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        enqueue(&store, "requester", &["music", "gaming", "anime"], 0).await?;
        enqueue(&store, "low-overlap", &["music"], 1).await?;
        enqueue(&store, "high-overlap", &["music", "gaming"], 2).await?;

        let found = tier2_best_overlap(
            &store,
            "requester",
            &["music".into(), "gaming".into(), "anime".into()],
        )
        .await?
        .ok_or_else(|| anyhow::anyhow!("expected a candidate"))?;
        assert_eq!(found.session_id, "high-overlap");
        assert_eq!(found.shared_interests, vec!["gaming".to_owned(), "music".to_owned()]);
        Ok(())
    }

    #[tokio::test]
    async fn tier4_skips_requester_and_returns_first_other() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        enqueue(&store, "a", &[], 5).await?;
        enqueue(&store, "b", &[], 1).await?;

        let found = tier4_random(&store, "a")
            .await?
            .ok_or_else(|| anyhow::anyhow!("expected a candidate"))?;
        assert_eq!(found.session_id, "b");
        assert!(found.shared_interests.is_empty());
        Ok(())
    }
}
