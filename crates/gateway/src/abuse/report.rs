// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable abuse-report repository (`spec.md` §3, §4.D) — the one entity
//! that survives past a session's ephemeral lifetime.

use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::protocol::ReportReason;
use crate::store::now_secs;

use super::context_buffer::BufferedMessage;

const RETENTION_DAYS: i64 = 30;
const RETENTION_SWEEP_INTERVAL: Duration = Duration::from_secs(86_400);

pub struct AbuseReport {
    pub id: String,
    pub reporter_fingerprint: Option<String>,
    pub reported_fingerprint: String,
    pub chat_id: String,
    pub reason: ReportReason,
    pub messages: Vec<BufferedMessage>,
    pub created_at: i64,
}

pub struct ReportRepo {
    pool: SqlitePool,
}

impl ReportRepo {
    pub async fn connect(db_url: &str) -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new().max_connections(5).connect(db_url).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn insert(
        &self,
        reporter_fingerprint: Option<&str>,
        reported_fingerprint: &str,
        chat_id: &str,
        reason: ReportReason,
        messages: &[BufferedMessage],
        created_at: i64,
    ) -> anyhow::Result<String> {
        let id = Uuid::new_v4().to_string();
        let reason_str = serde_json::to_value(reason)?;
        let reason_str = reason_str.as_str().unwrap_or("other");
        let messages_json = serde_json::to_string(messages)?;

        sqlx::query(
            "INSERT INTO abuse_reports \
             (id, reporter_fingerprint, reported_fingerprint, chat_id, reason, messages, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(reporter_fingerprint)
        .bind(reported_fingerprint)
        .bind(chat_id)
        .bind(reason_str)
        .bind(messages_json)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    /// Count of reports against `fingerprint` since `since_epoch_secs` —
    /// the durable cross-check used when the fast-path report counter may
    /// have missed increments (e.g. a store restart).
    pub async fn count_recent_reports(
        &self,
        fingerprint: &str,
        since_epoch_secs: i64,
    ) -> anyhow::Result<i64> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM abuse_reports WHERE reported_fingerprint = ? AND created_at >= ?",
        )
        .bind(fingerprint)
        .bind(since_epoch_secs)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    /// Delete reports older than the 30-day retention window.
    pub async fn apply_retention(&self, now_epoch_secs: i64) -> anyhow::Result<u64> {
        let cutoff = now_epoch_secs - RETENTION_DAYS * 86_400;
        let result = sqlx::query("DELETE FROM abuse_reports WHERE created_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// Daily retention sweep, same interval-loop shape as the matcher's cleanup
/// loop: run once at startup, then once every 24h until `shutdown` fires.
pub fn spawn_retention_sweep(reports: Arc<ReportRepo>, shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(RETENTION_SWEEP_INTERVAL);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    match reports.apply_retention(now_secs() as i64).await {
                        Ok(deleted) if deleted > 0 => {
                            tracing::info!(deleted, "abuse report retention sweep complete");
                        }
                        Ok(_) => {}
                        Err(e) => tracing::warn!(err = %e, "abuse report retention sweep failed"),
                    }
                }
                _ = shutdown.cancelled() => break,
            }
        }
    });
}
