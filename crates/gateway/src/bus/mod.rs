// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pub/sub bus adapter (`spec.md` §4.E): topic-addressed, at-most-once,
//! fan-in/1:1/2:2 subject shapes over a shared backbone.

mod memory_bus;
mod nats_bus;
pub mod subscription;
pub mod topics;

pub use memory_bus::MemoryBus;
pub use nats_bus::NatsBus;
pub use subscription::SubscriptionRegistry;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::BusError;

/// A live subscription to one topic. Dropping it unsubscribes.
pub struct Subscription {
    rx: mpsc::Receiver<Vec<u8>>,
    _guard: Option<tokio_util::sync::DropGuard>,
}

impl Subscription {
    fn new(rx: mpsc::Receiver<Vec<u8>>, guard: tokio_util::sync::DropGuard) -> Self {
        Self { rx, _guard: Some(guard) }
    }

    /// Await the next message, or `None` once the publisher side is gone.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }
}

/// Abstraction over the pub/sub backbone (NATS in production, an in-process
/// fan-out for tests and single-node runs).
#[async_trait]
pub trait Bus: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError>;
    async fn subscribe(&self, topic: &str) -> Result<Subscription, BusError>;
}
