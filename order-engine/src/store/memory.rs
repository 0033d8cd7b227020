//! In-process order store with a built-in change feed
//!
//! Re-validates every status write against the state machine, stamps
//! `updated_at`, and broadcasts the changed record to the tenant's
//! subscribers. Connection loss can be injected with
//! [`InMemoryOrderStore::disconnect_feed`] / [`InMemoryOrderStore::reconnect_feed`].

use super::{ChangeFeed, FeedSignal, FeedSink, OrderStore, Subscription, sort_newest_first};
use crate::error::{EngineError, EngineResult};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use shared::order::{ChangeEvent, ChangeType, Order, OrderFilter, StatusUpdate};
use shared::util::now_millis;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

struct Subscriber {
    tenant_id: String,
    sink: FeedSink,
}

/// In-memory order store + change feed
#[derive(Clone)]
pub struct InMemoryOrderStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    orders: DashMap<String, Order>,
    subscribers: DashMap<u64, Subscriber>,
    next_subscriber: AtomicU64,
    connected: AtomicBool,
    fetch_count: AtomicUsize,
    update_count: AtomicUsize,
    fetch_delay: Mutex<Option<Duration>>,
    fetch_failure: Mutex<Option<EngineError>>,
}

impl Default for InMemoryOrderStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                connected: AtomicBool::new(true),
                ..Default::default()
            }),
        }
    }

    /// Seed records without emitting events
    pub fn with_orders(self, orders: impl IntoIterator<Item = Order>) -> Self {
        for order in orders {
            self.inner.orders.insert(order.id.clone(), order);
        }
        self
    }

    /// Create an order and notify subscribers
    pub fn insert_order(&self, order: Order) {
        self.inner.orders.insert(order.id.clone(), order.clone());
        self.publish(ChangeEvent::with_record(ChangeType::Insert, order));
    }

    /// Replace a record wholesale and notify subscribers
    pub fn put_order(&self, order: Order) {
        let change_type = if self.inner.orders.contains_key(&order.id) {
            ChangeType::Update
        } else {
            ChangeType::Insert
        };
        self.inner.orders.insert(order.id.clone(), order.clone());
        self.publish(ChangeEvent::with_record(change_type, order));
    }

    pub fn get_order(&self, order_id: &str) -> Option<Order> {
        self.inner.orders.get(order_id).map(|o| o.clone())
    }

    /// Deliver a raw event (duplicates and stale payloads included)
    pub fn publish(&self, event: ChangeEvent) {
        if !self.inner.connected.load(Ordering::SeqCst) {
            tracing::debug!(order_id = %event.order_id, "Feed disconnected, event dropped");
            return;
        }
        self.broadcast(|sub| {
            (sub.tenant_id == event.tenant_id).then(|| FeedSignal::Event(event.clone()))
        });
    }

    /// Simulate transport loss: subscribers see `Disconnected`, events are dropped
    pub fn disconnect_feed(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.inner.connected.store(false, Ordering::SeqCst);
        self.broadcast(|_| Some(FeedSignal::Disconnected(reason.clone())));
    }

    /// Simulate transport recovery
    pub fn reconnect_feed(&self) {
        self.broadcast(|_| Some(FeedSignal::Connecting));
        self.inner.connected.store(true, Ordering::SeqCst);
        self.broadcast(|_| Some(FeedSignal::Connected));
    }

    /// Delay every fetch (simulates a slow store)
    pub fn set_fetch_delay(&self, delay: Option<Duration>) {
        *self.inner.fetch_delay.lock() = delay;
    }

    /// Fail every fetch with `error` until cleared
    pub fn set_fetch_failure(&self, error: Option<EngineError>) {
        *self.inner.fetch_failure.lock() = error;
    }

    pub fn fetch_count(&self) -> usize {
        self.inner.fetch_count.load(Ordering::SeqCst)
    }

    pub fn update_count(&self) -> usize {
        self.inner.update_count.load(Ordering::SeqCst)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    fn broadcast(&self, signal_for: impl Fn(&Subscriber) -> Option<FeedSignal>) {
        let mut closed = Vec::new();
        for entry in self.inner.subscribers.iter() {
            if let Some(signal) = signal_for(entry.value())
                && entry.value().sink.send(signal).is_err()
            {
                closed.push(*entry.key());
            }
        }
        // 接收端已关闭的订阅者直接移除
        for id in closed {
            self.inner.subscribers.remove(&id);
        }
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn fetch_orders(&self, tenant_id: &str, filter: OrderFilter) -> EngineResult<Vec<Order>> {
        self.inner.fetch_count.fetch_add(1, Ordering::SeqCst);

        let delay = *self.inner.fetch_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failure = self.inner.fetch_failure.lock().clone();
        if let Some(error) = failure {
            return Err(error);
        }

        let mut orders: Vec<Order> = self
            .inner
            .orders
            .iter()
            .filter(|o| o.tenant_id == tenant_id && filter.matches(o.status))
            .map(|o| o.clone())
            .collect();
        sort_newest_first(&mut orders);
        Ok(orders)
    }

    async fn update_order_status(&self, order_id: &str, update: StatusUpdate) -> EngineResult<()> {
        self.inner.update_count.fetch_add(1, Ordering::SeqCst);

        let updated = {
            let mut entry = self
                .inner
                .orders
                .get_mut(order_id)
                .ok_or_else(|| EngineError::server(format!("Order not found: {}", order_id)))?;

            let current = entry.status;
            if let Some(expected) = update.expected_status
                && expected != current
            {
                return Err(EngineError::Conflict {
                    order_id: order_id.to_string(),
                    expected,
                    actual: Some(current),
                });
            }
            if !current.can_transition_to(update.status) {
                return Err(EngineError::server(format!(
                    "Store rejected transition {} -> {} for order {}",
                    current, update.status, order_id
                )));
            }

            entry.status = update.status;
            entry.completed_at = update.completed_at;
            entry.updated_at = now_millis();
            entry.clone()
        };

        self.publish(ChangeEvent::with_record(ChangeType::Update, updated));
        Ok(())
    }
}

#[async_trait]
impl ChangeFeed for InMemoryOrderStore {
    async fn subscribe_to_changes(
        &self,
        tenant_id: &str,
        sink: FeedSink,
    ) -> EngineResult<Subscription> {
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::SeqCst);

        let _ = sink.send(FeedSignal::Connecting);
        if self.inner.connected.load(Ordering::SeqCst) {
            let _ = sink.send(FeedSignal::Connected);
        }
        self.inner.subscribers.insert(
            id,
            Subscriber {
                tenant_id: tenant_id.to_string(),
                sink,
            },
        );
        tracing::debug!(subscriber = id, tenant_id = %tenant_id, "Feed subscriber registered");

        let inner = Arc::downgrade(&self.inner);
        Ok(Subscription::new(format!("memory-{}", id), move || {
            if let Some(inner) = inner.upgrade() {
                inner.subscribers.remove(&id);
            }
        }))
    }
}
