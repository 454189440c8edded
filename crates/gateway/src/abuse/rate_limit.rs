// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rate limiting: atomic increment-and-first-write-TTL (`spec.md` §4.D).

use std::sync::Arc;

use crate::error::{AbuseError, StoreError};
use crate::store::Store;

const MESSAGE_LIMIT: i64 = 5;
const MESSAGE_WINDOW_SECS: u64 = 10;
const MATCH_REQUEST_LIMIT: i64 = 10;
const MATCH_REQUEST_WINDOW_SECS: u64 = 60;
const NEW_CONNECTION_LIMIT: i64 = 5;
const NEW_CONNECTION_WINDOW_SECS: u64 = 60;

pub struct RateLimiter {
    store: Arc<dyn Store>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    async fn check(&self, key: String, limit: i64, window_secs: u64) -> Result<(), AbuseError> {
        let count = self.store.incr_with_ttl(&key, window_secs).await.map_err(store_err)?;
        if count > limit {
            return Err(AbuseError::RateLimited { retry_after: window_secs });
        }
        Ok(())
    }

    /// 5 messages / 10 s / session.
    pub async fn check_message(&self, session_id: &str) -> Result<(), AbuseError> {
        self.check(format!("rl:msg:{session_id}"), MESSAGE_LIMIT, MESSAGE_WINDOW_SECS).await
    }

    /// 10 match requests / 60 s / fingerprint.
    pub async fn check_match_request(&self, fingerprint: &str) -> Result<(), AbuseError> {
        self.check(format!("rl:match:{fingerprint}"), MATCH_REQUEST_LIMIT, MATCH_REQUEST_WINDOW_SECS)
            .await
    }

    /// 5 new connections / 60 s / source address.
    pub async fn check_new_connection(&self, addr: &str) -> Result<(), AbuseError> {
        self.check(format!("rl:conn:{addr}"), NEW_CONNECTION_LIMIT, NEW_CONNECTION_WINDOW_SECS).await
    }
}

fn store_err(e: StoreError) -> AbuseError {
    AbuseError::Store(e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn sixth_message_within_window_is_rejected() -> anyhow::Result<()> {
        let limiter = RateLimiter::new(Arc::new(MemoryStore::new()));
        for _ in 0..5 {
            limiter.check_message("s1").await?;
        }
        assert!(matches!(
            limiter.check_message("s1").await,
            Err(AbuseError::RateLimited { retry_after: MESSAGE_WINDOW_SECS })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn distinct_sessions_have_independent_counters() -> anyhow::Result<()> {
        let limiter = RateLimiter::new(Arc::new(MemoryStore::new()));
        for _ in 0..5 {
            limiter.check_message("s1").await?;
        }
        limiter.check_message("s2").await
    }
}
