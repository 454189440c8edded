// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! NATS-backed bus (`nats://...`), the production backbone.

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::BusError;

use super::{Bus, Subscription};

const CHANNEL_CAPACITY: usize = 256;

pub struct NatsBus {
    client: async_nats::Client,
    shutdown: CancellationToken,
}

impl NatsBus {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let opts = async_nats::ConnectOptions::new().retry_on_initial_connect();
        let client = opts.connect(url).await?;
        Ok(Self { client, shutdown: CancellationToken::new() })
    }
}

#[async_trait]
impl Bus for NatsBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        self.client
            .publish(topic.to_owned(), payload.into())
            .await
            .map_err(|e| BusError::Backend(e.to_string()))
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription, BusError> {
        let mut nats_sub = self
            .client
            .subscribe(topic.to_owned())
            .await
            .map_err(|e| BusError::Backend(e.to_string()))?;
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let child = self.shutdown.child_token();
        let guard = child.clone().drop_guard();
        let topic = topic.to_owned();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    msg = nats_sub.next() => {
                        let Some(msg) = msg else { break };
                        if tx.send(msg.payload.to_vec()).await.is_err() {
                            break;
                        }
                    }
                    _ = child.cancelled() => break,
                }
            }
            debug!(topic = %topic, "nats subscription closed");
        });

        Ok(Subscription::new(rx, guard))
    }
}

impl Drop for NatsBus {
    fn drop(&mut self) {
        if !self.shutdown.is_cancelled() {
            warn!("NatsBus dropped without explicit shutdown; cancelling subscriptions");
            self.shutdown.cancel();
        }
    }
}
