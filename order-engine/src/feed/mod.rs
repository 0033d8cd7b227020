//! Change-Feed Listener
//!
//! Owns the feed subscription for one tenant, publishes the connection
//! state, and hands every change event to a callback without looking at
//! its content. Event payloads are triggers only; the reconciliation path
//! always re-fetches.

pub mod tcp;

pub use tcp::TcpChangeFeed;

use crate::error::EngineError;
use crate::store::{ChangeFeed, FeedSignal, Subscription};
use parking_lot::Mutex;
use serde::Serialize;
use shared::order::ChangeEvent;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Feed connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Initial, and while (re)establishing
    Connecting,
    /// Subscription acknowledged
    Connected,
    /// Lost or rejected
    Disconnected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Disconnected => write!(f, "disconnected"),
        }
    }
}

type EventHook = Box<dyn Fn(ChangeEvent) + Send + Sync>;
type ReconnectHook = Box<dyn Fn() + Send + Sync>;

/// Change-Feed Listener
pub struct ChangeFeedListener {
    tenant_id: String,
    state_tx: watch::Sender<ConnectionState>,
    last_error: Arc<Mutex<Option<EngineError>>>,
    subscription: Mutex<Option<Subscription>>,
    cancel: CancellationToken,
}

impl ChangeFeedListener {
    /// Subscribe to `tenant_id` and call `on_event` for every change
    pub async fn start<F>(feed: Arc<dyn ChangeFeed>, tenant_id: &str, on_event: F) -> Self
    where
        F: Fn(ChangeEvent) + Send + Sync + 'static,
    {
        Self::start_with_reconnect(feed, tenant_id, on_event, || {}).await
    }

    /// Like [`ChangeFeedListener::start`], also calling `on_reconnect` when
    /// the feed comes back after a disconnect (events may have been missed)
    pub async fn start_with_reconnect<F, R>(
        feed: Arc<dyn ChangeFeed>,
        tenant_id: &str,
        on_event: F,
        on_reconnect: R,
    ) -> Self
    where
        F: Fn(ChangeEvent) + Send + Sync + 'static,
        R: Fn() + Send + Sync + 'static,
    {
        let (state_tx, _) = watch::channel(ConnectionState::Connecting);
        let listener = Self {
            tenant_id: tenant_id.to_string(),
            state_tx,
            last_error: Arc::new(Mutex::new(None)),
            subscription: Mutex::new(None),
            cancel: CancellationToken::new(),
        };

        let (sink, signals) = mpsc::unbounded_channel();
        match feed.subscribe_to_changes(tenant_id, sink).await {
            Ok(subscription) => {
                tracing::info!(
                    tenant_id = %tenant_id,
                    subscription = %subscription.id(),
                    "Change feed subscribed"
                );
                *listener.subscription.lock() = Some(subscription);
                tokio::spawn(pump(
                    signals,
                    listener.state_tx.clone(),
                    listener.last_error.clone(),
                    listener.cancel.clone(),
                    Box::new(on_event),
                    Box::new(on_reconnect),
                ));
            }
            Err(e) => {
                tracing::error!(tenant_id = %tenant_id, error = %e, "Change feed subscribe failed");
                *listener.last_error.lock() = Some(e);
                listener.state_tx.send_replace(ConnectionState::Disconnected);
            }
        }

        listener
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Observe connection state changes
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Error behind the current `Disconnected` state, if any
    pub fn last_error(&self) -> Option<EngineError> {
        self.last_error.lock().clone()
    }

    /// Whether the subscription is still held
    pub fn is_subscribed(&self) -> bool {
        self.subscription.lock().is_some()
    }

    /// Release the subscription. Idempotent.
    pub fn stop(&self) {
        self.cancel.cancel();
        let subscription = self.subscription.lock().take();
        if let Some(subscription) = subscription {
            subscription.unsubscribe();
            self.state_tx.send_replace(ConnectionState::Disconnected);
            tracing::info!(tenant_id = %self.tenant_id, "Change feed unsubscribed");
        }
    }
}

impl Drop for ChangeFeedListener {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn pump(
    mut signals: mpsc::UnboundedReceiver<FeedSignal>,
    state_tx: watch::Sender<ConnectionState>,
    last_error: Arc<Mutex<Option<EngineError>>>,
    cancel: CancellationToken,
    on_event: EventHook,
    on_reconnect: ReconnectHook,
) {
    // 曾经断开过: 下一次 Connected 视为重连
    let mut lost = false;

    loop {
        let signal = tokio::select! {
            _ = cancel.cancelled() => break,
            signal = signals.recv() => signal,
        };

        match signal {
            Some(FeedSignal::Connecting) => {
                state_tx.send_replace(ConnectionState::Connecting);
            }
            Some(FeedSignal::Connected) => {
                *last_error.lock() = None;
                state_tx.send_replace(ConnectionState::Connected);
                if lost {
                    lost = false;
                    tracing::info!("Change feed reconnected");
                    on_reconnect();
                }
            }
            Some(FeedSignal::Disconnected(reason)) => {
                tracing::warn!(reason = %reason, "Change feed disconnected");
                *last_error.lock() = Some(EngineError::feed(reason));
                state_tx.send_replace(ConnectionState::Disconnected);
                lost = true;
            }
            Some(FeedSignal::Event(event)) => {
                tracing::debug!(
                    order_id = %event.order_id,
                    change_type = %event.change_type,
                    "Change event received"
                );
                on_event(event);
            }
            None => {
                // feed 侧已放弃 (不再重连)
                if !cancel.is_cancelled() {
                    *last_error.lock() = Some(EngineError::feed("Change feed closed"));
                    state_tx.send_replace(ConnectionState::Disconnected);
                }
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineResult;
    use crate::store::{FeedSink, InMemoryOrderStore};
    use async_trait::async_trait;
    use shared::order::Order;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    async fn wait_for_state(rx: &mut watch::Receiver<ConnectionState>, want: ConnectionState) {
        tokio::time::timeout(Duration::from_secs(1), rx.wait_for(|s| *s == want))
            .await
            .expect("state not reached")
            .unwrap();
    }

    async fn wait_until(cond: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while !cond() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("condition not reached");
    }

    #[tokio::test]
    async fn test_events_reach_callback_and_state_tracks_feed() {
        let store = InMemoryOrderStore::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();

        let listener = ChangeFeedListener::start(Arc::new(store.clone()), "t1", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .await;
        let mut state = listener.watch_state();
        wait_for_state(&mut state, ConnectionState::Connected).await;

        store.insert_order(Order::new("o1", "1", "t1", 5.0, 0.0, 0.0, 1));
        store.insert_order(Order::new("o1", "1", "t1", 5.0, 0.0, 0.0, 1));
        wait_until(|| seen.load(Ordering::SeqCst) == 2).await;

        store.disconnect_feed("network down");
        wait_for_state(&mut state, ConnectionState::Disconnected).await;
        assert!(listener.last_error().unwrap().is_transport());

        store.reconnect_feed();
        wait_for_state(&mut state, ConnectionState::Connected).await;
        assert!(listener.last_error().is_none());
    }

    #[tokio::test]
    async fn test_reconnect_hook_fires_only_after_loss() {
        let store = InMemoryOrderStore::new();
        let reconnects = Arc::new(AtomicUsize::new(0));
        let counter = reconnects.clone();

        let listener = ChangeFeedListener::start_with_reconnect(
            Arc::new(store.clone()),
            "t1",
            |_| {},
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        )
        .await;
        let mut state = listener.watch_state();
        wait_for_state(&mut state, ConnectionState::Connected).await;
        assert_eq!(reconnects.load(Ordering::SeqCst), 0);

        store.disconnect_feed("blip");
        store.reconnect_feed();
        wait_until(|| reconnects.load(Ordering::SeqCst) == 1).await;
    }

    #[tokio::test]
    async fn test_stop_releases_subscription_once() {
        let store = InMemoryOrderStore::new();
        let listener = ChangeFeedListener::start(Arc::new(store.clone()), "t1", |_| {}).await;
        assert_eq!(store.subscriber_count(), 1);
        assert!(listener.is_subscribed());

        listener.stop();
        listener.stop();
        assert_eq!(store.subscriber_count(), 0);
        assert!(!listener.is_subscribed());
        assert_eq!(listener.state(), ConnectionState::Disconnected);
    }

    struct BrokenFeed;

    #[async_trait]
    impl ChangeFeed for BrokenFeed {
        async fn subscribe_to_changes(
            &self,
            _tenant_id: &str,
            _sink: FeedSink,
        ) -> EngineResult<Subscription> {
            Err(EngineError::feed("realtime channel rejected"))
        }
    }

    #[tokio::test]
    async fn test_subscribe_failure_sets_disconnected() {
        let listener = ChangeFeedListener::start(Arc::new(BrokenFeed), "t1", |_| {}).await;
        assert_eq!(listener.state(), ConnectionState::Disconnected);
        assert!(listener.last_error().is_some());
        assert!(!listener.is_subscribed());
    }
}
