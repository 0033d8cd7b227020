//! Shared test doubles for engine integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use order_engine::{
    ChangeFeed, EngineConfig, EngineError, EngineResult, FeedSink, InMemoryOrderStore, Order,
    OrderEngine, OrderFilter, OrderStatus, OrderStore, StatusUpdate, Subscription,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;

pub const TENANT: &str = "tenant-1";

/// Fixed reference instant: 2023-11-14 22:13:20 UTC
pub const NOW: i64 = 1_700_000_000_000;

/// In-memory store whose fetches can be held open by the test
pub struct GatedStore {
    pub memory: InMemoryOrderStore,
    gated: AtomicBool,
    gate: Semaphore,
    fetches: AtomicUsize,
}

impl GatedStore {
    pub fn new(memory: InMemoryOrderStore) -> Arc<Self> {
        Arc::new(Self {
            memory,
            gated: AtomicBool::new(false),
            gate: Semaphore::new(0),
            fetches: AtomicUsize::new(0),
        })
    }

    /// Subsequent fetches block until `open_gate`
    pub fn close_gate(&self) {
        self.gated.store(true, Ordering::SeqCst);
    }

    pub fn open_gate(&self) {
        self.gated.store(false, Ordering::SeqCst);
        self.gate.add_permits(1_000);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OrderStore for GatedStore {
    async fn fetch_orders(&self, tenant_id: &str, filter: OrderFilter) -> EngineResult<Vec<Order>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.gated.load(Ordering::SeqCst) {
            self.gate
                .acquire()
                .await
                .map_err(|_| EngineError::server("gate closed"))?
                .forget();
        }
        self.memory.fetch_orders(tenant_id, filter).await
    }

    async fn update_order_status(&self, order_id: &str, update: StatusUpdate) -> EngineResult<()> {
        self.memory.update_order_status(order_id, update).await
    }
}

#[async_trait]
impl ChangeFeed for GatedStore {
    async fn subscribe_to_changes(
        &self,
        tenant_id: &str,
        sink: FeedSink,
    ) -> EngineResult<Subscription> {
        self.memory.subscribe_to_changes(tenant_id, sink).await
    }
}

/// Pending order created `age_ms` before [`NOW`]
pub fn order(id: &str, subtotal: f64, tax: f64, service: f64, age_ms: i64) -> Order {
    Order::new(id, id, TENANT, subtotal, tax, service, NOW - age_ms)
}

pub fn order_in(id: &str, status: OrderStatus, subtotal: f64, age_ms: i64) -> Order {
    order(id, subtotal, 0.0, 0.0, age_ms).with_status(status, NOW - age_ms / 2)
}

pub async fn start_engine(config: EngineConfig, store: Arc<GatedStore>) -> OrderEngine {
    OrderEngine::start_with_clock(config, store.clone(), store, Arc::new(|| NOW)).await
}

pub async fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let reached = tokio::time::timeout(Duration::from_secs(2), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await;
    assert!(reached.is_ok(), "timed out waiting for {}", what);
}
