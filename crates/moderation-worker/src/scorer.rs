// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lightweight message scorer. The gateway's inline `ContentFilter` already
//! rejects the cheap stuff synchronously; this runs off the delivery path
//! and only needs to catch what slips past it — severe terms and the same
//! flooding heuristics applied to the rolling conversation rather than one
//! message at a time isn't attempted here (`spec.md` §1 scope).

use std::collections::HashSet;

use regex::Regex;

pub struct Scorer {
    severe_terms: HashSet<String>,
    slur_adjacent_re: Regex,
}

impl Scorer {
    pub fn new(severe_terms: HashSet<String>) -> anyhow::Result<Self> {
        Ok(Self {
            severe_terms,
            // Repeated punctuation commonly used to route around word filters.
            slur_adjacent_re: Regex::new(r"[^\w\s]{4,}")?,
        })
    }

    pub fn empty() -> Self {
        #[allow(clippy::expect_used)]
        Self::new(HashSet::new()).expect("built-in scorer pattern is valid regex")
    }

    pub async fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let raw = tokio::fs::read_to_string(path).await?;
        let terms = raw
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(|l| l.to_lowercase())
            .collect();
        Self::new(terms)
    }

    /// `Some(reason)` if the message should be retroactively blocked.
    pub fn score(&self, text: &str) -> Option<String> {
        let lower = text.to_lowercase();
        if self.severe_terms.iter().any(|term| lower.contains(term.as_str())) {
            return Some("severe_term".to_owned());
        }
        if self.slur_adjacent_re.is_match(text) {
            return Some("obfuscated_content".to_owned());
        }
        None
    }
}
