//! Shared application state for the gateway: one Store, one Hub, one Retry
//! Worker per process, wired at startup (spec §9 "Global state").
//!
//! Everything is `Arc`-friendly and cloneable, mirroring the teacher's
//! `AppState`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::ack::AckProcessor;
use crate::config::GatewayConfig;
use crate::delivery::DeliveryCoordinator;
use crate::hub::Hub;
use crate::lifecycle::ConnectionLifecycle;
use crate::obs::metrics::GatewayMetrics;
use crate::room_registry::RoomRegistry;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: GatewayConfig,
    store: Arc<Store>,
    hub: Arc<Hub>,
    room_registry: RoomRegistry,
    delivery: DeliveryCoordinator,
    ack: AckProcessor,
    lifecycle: ConnectionLifecycle,
    metrics: GatewayMetrics,
    draining: AtomicBool,
    started_at: std::time::Instant,
}

impl AppState {
    pub fn new(cfg: GatewayConfig, store: Arc<Store>) -> Self {
        let hub = Arc::new(Hub::new());
        let delivery = DeliveryCoordinator::new(store.clone(), hub.clone());
        let ack = AckProcessor::new(store.clone());
        let lifecycle = ConnectionLifecycle::new(store.clone(), hub.clone());

        Self {
            inner: Arc::new(AppStateInner {
                cfg,
                store,
                hub,
                room_registry: RoomRegistry::new(),
                delivery,
                ack,
                lifecycle,
                metrics: GatewayMetrics::default(),
                draining: AtomicBool::new(false),
                started_at: std::time::Instant::now(),
            }),
        }
    }

    pub fn cfg(&self) -> &GatewayConfig {
        &self.inner.cfg
    }

    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    pub fn store_arc(&self) -> Arc<Store> {
        self.inner.store.clone()
    }

    pub fn hub(&self) -> Arc<Hub> {
        self.inner.hub.clone()
    }

    pub fn room_registry(&self) -> &RoomRegistry {
        &self.inner.room_registry
    }

    pub fn delivery(&self) -> &DeliveryCoordinator {
        &self.inner.delivery
    }

    pub fn ack(&self) -> &AckProcessor {
        &self.inner.ack
    }

    pub fn lifecycle(&self) -> &ConnectionLifecycle {
        &self.inner.lifecycle
    }

    pub fn metrics(&self) -> &GatewayMetrics {
        &self.inner.metrics
    }

    pub fn uptime_secs(&self) -> u64 {
        self.inner.started_at.elapsed().as_secs()
    }

    pub fn set_draining(&self) {
        self.inner.draining.store(true, Ordering::Relaxed);
        self.inner.metrics.set_draining();
    }

    pub fn is_draining(&self) -> bool {
        self.inner.draining.load(Ordering::Relaxed)
    }
}
