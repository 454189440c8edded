// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-chat message-context ring buffer (`spec.md` §4.D). Used only to
//! attach context to abuse reports; destroyed when the chat ends.

use std::collections::VecDeque;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

const BUFFER_CAPACITY: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferedMessage {
    pub from: String,
    pub text: String,
    pub ts: u64,
}

/// Registry of per-chat ring buffers, keyed by chat id.
#[derive(Default)]
pub struct ContextBufferRegistry {
    buffers: DashMap<String, Mutex<VecDeque<BufferedMessage>>>,
}

impl ContextBufferRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, chat_id: &str, msg: BufferedMessage) {
        let buffer = self.buffers.entry(chat_id.to_owned()).or_default();
        let mut buffer = buffer.lock().await;
        if buffer.len() == BUFFER_CAPACITY {
            buffer.pop_front();
        }
        buffer.push_back(msg);
    }

    pub async fn snapshot(&self, chat_id: &str) -> Vec<BufferedMessage> {
        match self.buffers.get(chat_id) {
            Some(buffer) => buffer.lock().await.iter().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Destroy the buffer for a chat. Called on chat end or disconnect.
    pub fn clear(&self, chat_id: &str) {
        self.buffers.remove(chat_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn keeps_only_the_last_five_messages() {
        let registry = ContextBufferRegistry::new();
        for i in 0..8 {
            registry
                .push("c1", BufferedMessage { from: "a".into(), text: format!("msg-{i}"), ts: i })
                .await;
        }
        let snapshot = registry.snapshot("c1").await;
        let texts: Vec<&str> = snapshot.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["msg-3", "msg-4", "msg-5", "msg-6", "msg-7"]);
    }

    #[tokio::test]
    async fn clear_frees_the_buffer() {
        let registry = ContextBufferRegistry::new();
        registry.push("c1", BufferedMessage { from: "a".into(), text: "hi".into(), ts: 0 }).await;
        registry.clear("c1");
        assert!(registry.snapshot("c1").await.is_empty());
    }
}
