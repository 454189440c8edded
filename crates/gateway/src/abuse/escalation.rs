// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Auto-ban escalation (`spec.md` §4.D): a per-fingerprint report counter
//! drives bans; ban duration escalates by a separate offense counter.

use std::sync::Arc;

use tracing::warn;

use crate::store::Store;

use super::report::ReportRepo;

const REPORT_WINDOW_SECS: u64 = 86_400;
const OFFENSE_WINDOW_SECS: u64 = 86_400;
const REPORT_THRESHOLD: i64 = 3;
const AUTO_BAN_REASON: &str = "multiple_reports";

fn ban_duration_secs(offense_count: i64) -> u64 {
    match offense_count {
        1 => 900,
        2 => 3600,
        _ => 86_400,
    }
}

pub struct Escalation {
    store: Arc<dyn Store>,
    reports: Arc<ReportRepo>,
}

impl Escalation {
    pub fn new(store: Arc<dyn Store>, reports: Arc<ReportRepo>) -> Self {
        Self { store, reports }
    }

    /// Record a report against `fingerprint` and apply a ban if the report
    /// count reaches the threshold within the window. Fail-open on any
    /// store error: logged, no ban applied, no crash. Returns whether a ban
    /// was just applied.
    pub async fn record_report(&self, fingerprint: &str, now_epoch_secs: i64) -> bool {
        let count = match self.store.incr_with_ttl(&report_counter_key(fingerprint), REPORT_WINDOW_SECS).await {
            Ok(c) => c,
            Err(e) => {
                warn!(fingerprint, err = %e, "escalation: report counter increment failed, fail-open");
                return self.cross_check(fingerprint, now_epoch_secs).await;
            }
        };

        if count >= REPORT_THRESHOLD {
            self.ban_unless_already_active(fingerprint).await
        } else {
            false
        }
    }

    /// If the fast-path counter may have missed increments (e.g. a cache
    /// restart), fall back to counting durable reports directly.
    async fn cross_check(&self, fingerprint: &str, now_epoch_secs: i64) -> bool {
        let since = now_epoch_secs - REPORT_WINDOW_SECS as i64;
        match self.reports.count_recent_reports(fingerprint, since).await {
            Ok(count) if count >= REPORT_THRESHOLD => self.ban_unless_already_active(fingerprint).await,
            Ok(_) => false,
            Err(e) => {
                warn!(fingerprint, err = %e, "escalation: durable cross-check failed, fail-open");
                false
            }
        }
    }

    /// Escalation is keyed to distinct offense *episodes*, not to every
    /// report past the threshold (`spec.md` §4.D: the offense counter is
    /// separate from the report counter). A 4th or 5th report against the
    /// same fingerprint inside the still-open 24h report window must not
    /// re-bump the offense counter or rewrite an already-active ban, so
    /// this only escalates when no ban currently covers `fingerprint`.
    async fn ban_unless_already_active(&self, fingerprint: &str) -> bool {
        match self.store.get_ban(fingerprint).await {
            Ok(Some(_)) => false,
            Ok(None) => self.apply_ban(fingerprint).await,
            Err(e) => {
                warn!(fingerprint, err = %e, "escalation: ban lookup failed, fail-open");
                false
            }
        }
    }

    async fn apply_ban(&self, fingerprint: &str) -> bool {
        let offense_count = match self
            .store
            .incr_with_ttl(&offense_counter_key(fingerprint), OFFENSE_WINDOW_SECS)
            .await
        {
            Ok(c) => c,
            Err(e) => {
                warn!(fingerprint, err = %e, "escalation: offense counter increment failed, fail-open");
                return false;
            }
        };

        let duration = ban_duration_secs(offense_count);
        if let Err(e) = self.store.set_ban(fingerprint, AUTO_BAN_REASON, duration).await {
            warn!(fingerprint, err = %e, "escalation: failed to apply ban, fail-open");
            return false;
        }
        crate::metrics::record_ban();
        tracing::info!(fingerprint, duration, offense_count, "escalation: auto-ban applied");
        true
    }
}

fn report_counter_key(fingerprint: &str) -> String {
    format!("reports:{fingerprint}")
}

fn offense_counter_key(fingerprint: &str) -> String {
    format!("offenses:{fingerprint}")
}
