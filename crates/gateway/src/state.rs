// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-lifetime state object (`spec.md` §9): every piece of shared
//! mutable state the gateway needs lives behind this one `Arc`, constructed
//! once at startup and torn down once at shutdown. Never exposed as a
//! package-scoped singleton.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::abuse::AbuseLayer;
use crate::bus::{Bus, SubscriptionRegistry};
use crate::config::GatewayConfig;
use crate::store::Store;
use crate::ws::registry::ConnectionRegistry;

pub struct GatewayState {
    pub config: GatewayConfig,
    pub store: Arc<dyn Store>,
    pub bus: Arc<dyn Bus>,
    pub abuse: AbuseLayer,
    pub connections: ConnectionRegistry,
    pub subscriptions: SubscriptionRegistry,
    pub started_at: Instant,
    pub shutdown: CancellationToken,
    /// Bounds concurrent per-frame processing across every connection
    /// (`spec.md` §4.A/§5 bounded worker pool); sized by
    /// `GatewayConfig::worker_pool_size`.
    pub worker_pool: Semaphore,
    draining: AtomicBool,
}

impl GatewayState {
    pub fn new(
        config: GatewayConfig,
        store: Arc<dyn Store>,
        bus: Arc<dyn Bus>,
        abuse: AbuseLayer,
    ) -> Arc<Self> {
        let worker_pool = Semaphore::new(config.worker_pool_size);
        Arc::new(Self {
            config,
            store,
            bus,
            abuse,
            connections: ConnectionRegistry::new(),
            subscriptions: SubscriptionRegistry::new(),
            started_at: Instant::now(),
            shutdown: CancellationToken::new(),
            worker_pool,
            draining: AtomicBool::new(false),
        })
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn begin_drain(&self) {
        self.draining.store(true, Ordering::SeqCst);
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    pub fn owner_id(&self) -> String {
        self.config.owner_id()
    }
}
