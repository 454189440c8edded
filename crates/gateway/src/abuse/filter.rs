// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process content filter: blocklist + a small regex set (`spec.md`
//! §4.D). The keyword list itself is a deployment concern, not specified
//! here; an empty blocklist is a valid (if permissive) default.

use std::collections::HashSet;
use std::path::Path;

use regex::Regex;

use crate::error::AbuseError;

pub struct ContentFilter {
    blocklist: HashSet<String>,
    url_re: Regex,
    phone_re: Regex,
    repeated_char_re: Regex,
    repeated_word_re: Regex,
}

impl ContentFilter {
    pub fn new(blocklist: HashSet<String>) -> anyhow::Result<Self> {
        Ok(Self {
            blocklist,
            url_re: Regex::new(r"(?i)\bhttps?://\S+|\bwww\.\S+")?,
            phone_re: Regex::new(r"\b(\+?\d[\d\-. ]{7,}\d)\b")?,
            repeated_char_re: Regex::new(r"(.)\1{6,}")?,
            repeated_word_re: Regex::new(r"\b(\w+)(\s+\1\b){4,}")?,
        })
    }

    pub fn empty() -> Self {
        // The fixed patterns above are hand-verified; constructing with an
        // empty blocklist cannot fail.
        #[allow(clippy::expect_used)]
        Self::new(HashSet::new()).expect("built-in filter patterns are valid regex")
    }

    /// Load a newline-delimited blocklist file. Blank lines and `#`-prefixed
    /// comments are ignored.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = tokio::fs::read_to_string(path).await?;
        let blocklist = raw
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(|l| l.to_lowercase())
            .collect();
        Self::new(blocklist)
    }

    /// Checked inline on every outbound chat message.
    pub fn check_message(&self, text: &str) -> Result<(), AbuseError> {
        let lower = text.to_lowercase();
        let blocked_by_term = self.blocklist.iter().any(|term| lower.contains(term.as_str()));
        if blocked_by_term
            || self.url_re.is_match(text)
            || self.phone_re.is_match(text)
            || self.repeated_char_re.is_match(text)
            || self.repeated_word_re.is_match(text)
        {
            return Err(AbuseError::ContentBlocked);
        }
        Ok(())
    }

    /// Silently drop blocked interest tags before enqueueing a match request.
    pub fn filter_tags(&self, tags: &[String]) -> Vec<String> {
        tags.iter()
            .filter(|tag| !self.blocklist.contains(&tag.to_lowercase()))
            .cloned()
            .collect()
    }
}
