//! Order store boundary
//!
//! The engine reads, writes and subscribes through these traits only.
//! Adapters:
//! - [`InMemoryOrderStore`]: store + feed in one process (tests, demo)
//! - [`HttpOrderStore`]: JSON REST order store
//! - [`crate::feed::TcpChangeFeed`]: message-bus change feed

pub mod http;
pub mod memory;

pub use http::HttpOrderStore;
pub use memory::InMemoryOrderStore;

use crate::error::EngineResult;
use async_trait::async_trait;
use shared::order::{ChangeEvent, Order, OrderFilter, StatusUpdate};
use tokio::sync::mpsc;

/// Read/write access to the authoritative order set
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Full order records with nested line items, newest first
    async fn fetch_orders(&self, tenant_id: &str, filter: OrderFilter) -> EngineResult<Vec<Order>>;

    /// Atomic status write. `update.completed_at` lands in the same write.
    async fn update_order_status(&self, order_id: &str, update: StatusUpdate) -> EngineResult<()>;
}

/// Push-style change stream, scoped by tenant
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Start delivering signals for `tenant_id` into `sink`.
    ///
    /// The feed reports its own connection progress through the sink. The
    /// returned handle stops delivery when released.
    async fn subscribe_to_changes(&self, tenant_id: &str, sink: FeedSink)
    -> EngineResult<Subscription>;
}

/// Everything a change feed reports
#[derive(Debug, Clone, PartialEq)]
pub enum FeedSignal {
    Connecting,
    Connected,
    Disconnected(String),
    Event(ChangeEvent),
}

/// Receiving end is owned by the Change-Feed Listener
pub type FeedSink = mpsc::UnboundedSender<FeedSignal>;

/// Owned change-feed subscription
///
/// Released exactly once: by [`Subscription::unsubscribe`], or on drop.
pub struct Subscription {
    id: String,
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(id: impl Into<String>, release: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            id: id.into(),
            release: Some(Box::new(release)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Release the feed resources
    pub fn unsubscribe(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            tracing::debug!(subscription = %self.id, "Releasing change feed subscription");
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("held", &self.release.is_some())
            .finish()
    }
}

/// Newest first; ties broken by order number, descending
pub fn sort_newest_first(orders: &mut [Order]) {
    orders.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.order_number.cmp(&a.order_number))
    });
}
