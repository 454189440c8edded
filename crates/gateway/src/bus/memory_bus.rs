// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process bus backend (`memory://`): a `broadcast` channel per topic,
//! for tests and single-node runs without a live NATS server.

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::error::BusError;

use super::{Bus, Subscription};

const CHANNEL_CAPACITY: usize = 256;

pub struct MemoryBus {
    topics: DashMap<String, broadcast::Sender<Vec<u8>>>,
    shutdown: CancellationToken,
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self { topics: DashMap::new(), shutdown: CancellationToken::new() }
    }
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender_for(&self, topic: &str) -> broadcast::Sender<Vec<u8>> {
        self.topics
            .entry(topic.to_owned())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

#[async_trait]
impl Bus for MemoryBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        // No subscribers is a normal, at-most-once no-op, not an error.
        let _ = self.sender_for(topic).send(payload);
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription, BusError> {
        let mut broadcast_rx = self.sender_for(topic).subscribe();
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let child = self.shutdown.child_token();
        let guard = child.clone().drop_guard();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    msg = broadcast_rx.recv() => {
                        match msg {
                            Ok(payload) => {
                                if tx.send(payload).await.is_err() {
                                    break;
                                }
                            }
                            Err(broadcast::error::RecvError::Lagged(_)) => continue,
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                    _ = child.cancelled() => break,
                }
            }
        });

        Ok(Subscription::new(rx, guard))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_payload() -> anyhow::Result<()> {
        let bus = MemoryBus::new();
        let mut sub = bus.subscribe("chat.c1").await?;
        bus.publish("chat.c1", b"hello".to_vec()).await?;
        assert_eq!(sub.recv().await, Some(b"hello".to_vec()));
        Ok(())
    }

    #[tokio::test]
    async fn two_subscribers_to_same_topic_both_receive() -> anyhow::Result<()> {
        let bus = MemoryBus::new();
        let mut sub_a = bus.subscribe("chat.c1").await?;
        let mut sub_b = bus.subscribe("chat.c1").await?;
        bus.publish("chat.c1", b"hi".to_vec()).await?;
        assert_eq!(sub_a.recv().await, Some(b"hi".to_vec()));
        assert_eq!(sub_b.recv().await, Some(b"hi".to_vec()));
        Ok(())
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_is_not_an_error() -> anyhow::Result<()> {
        let bus = MemoryBus::new();
        bus.publish("match.request", b"{}".to_vec()).await?;
        Ok(())
    }
}
