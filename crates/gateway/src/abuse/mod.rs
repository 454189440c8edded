// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Abuse/ban layer (`spec.md` §4.D): rate limits, content filter, report
//! accounting, escalating bans, and the off-path moderation hand-off.

pub mod context_buffer;
pub mod escalation;
pub mod filter;
pub mod moderation;
pub mod rate_limit;
pub mod report;

use std::sync::Arc;

use context_buffer::ContextBufferRegistry;
use escalation::Escalation;
use filter::ContentFilter;
use rate_limit::RateLimiter;
use report::ReportRepo;

use crate::store::Store;

/// Bundles every abuse-layer collaborator behind one handle, so `GatewayState`
/// wires it up once at startup and hands the same `Arc` to every connection.
pub struct AbuseLayer {
    pub rate_limiter: RateLimiter,
    pub filter: ContentFilter,
    pub context_buffers: ContextBufferRegistry,
    pub reports: Arc<ReportRepo>,
    pub escalation: Escalation,
}

impl AbuseLayer {
    pub async fn new(store: Arc<dyn Store>, filter: ContentFilter, db_url: &str) -> anyhow::Result<Self> {
        let reports = Arc::new(ReportRepo::connect(db_url).await?);
        Ok(Self {
            rate_limiter: RateLimiter::new(store.clone()),
            filter,
            context_buffers: ContextBufferRegistry::new(),
            reports: reports.clone(),
            escalation: Escalation::new(store, reports),
        })
    }
}
