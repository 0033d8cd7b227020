//! Order engine facade
//!
//! Wires Change-Feed Listener → Reconciliation Controller and exposes
//! what a dashboard session observes and does:
//! - current order list and statistics ([`OrderEngine::snapshot`], [`OrderEngine::subscribe`])
//! - feed connection state ([`OrderEngine::connection_state`])
//! - manual refresh ([`OrderEngine::refresh`])
//! - validated status transitions ([`OrderEngine::request_transition`])
//!
//! The local view is never patched optimistically. A successful write
//! shows up after the store's change event and the re-fetch it triggers.

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult, ValidationError};
use crate::feed::{ChangeFeedListener, ConnectionState};
use crate::gateway::MutationGateway;
use crate::reconcile::{Clock, DashboardSnapshot, ReconciliationController, TriggerReason};
use crate::store::{ChangeFeed, OrderStore};
use shared::order::{ChangeEvent, OrderStatus};
use std::sync::Arc;
use tokio::sync::watch;

/// Check `current -> requested` against the state machine
pub fn check_transition(
    order_id: &str,
    current: OrderStatus,
    requested: OrderStatus,
) -> Result<(), ValidationError> {
    if current.is_terminal() {
        return Err(ValidationError::Terminal {
            order_id: order_id.to_string(),
            current,
        });
    }
    if !current.can_transition_to(requested) {
        return Err(ValidationError::TransitionNotAllowed {
            order_id: order_id.to_string(),
            current,
            requested,
        });
    }
    Ok(())
}

/// One dashboard session over one tenant's orders
pub struct OrderEngine {
    config: EngineConfig,
    controller: ReconciliationController,
    listener: ChangeFeedListener,
    gateway: MutationGateway,
}

impl OrderEngine {
    /// Subscribe to the feed, run the initial fetch, and return the engine.
    ///
    /// A failed initial fetch does not fail startup: the snapshot stays
    /// empty with `last_error` set.
    pub async fn start(
        config: EngineConfig,
        store: Arc<dyn OrderStore>,
        feed: Arc<dyn ChangeFeed>,
    ) -> Self {
        Self::start_with_clock(config, store, feed, Arc::new(shared::util::now_millis)).await
    }

    pub async fn start_with_clock(
        config: EngineConfig,
        store: Arc<dyn OrderStore>,
        feed: Arc<dyn ChangeFeed>,
        clock: Clock,
    ) -> Self {
        tracing::info!(
            tenant_id = %config.tenant_id,
            filter = config.filter.as_str(),
            conditional_updates = config.conditional_updates,
            "Starting order engine"
        );

        let controller =
            ReconciliationController::spawn_with_clock(store.clone(), &config, clock.clone());

        let on_event = {
            let controller = controller.clone();
            move |_event: ChangeEvent| {
                controller.trigger(TriggerReason::FeedEvent);
            }
        };
        let on_reconnect = {
            let controller = controller.clone();
            move || {
                controller.trigger(TriggerReason::Reconnected);
            }
        };
        let listener =
            ChangeFeedListener::start_with_reconnect(feed, &config.tenant_id, on_event, on_reconnect)
                .await;

        let seq = controller.trigger(TriggerReason::InitialMount);
        if let Err(e) = controller.wait_for(seq).await {
            tracing::warn!(tenant_id = %config.tenant_id, error = %e, "Initial order fetch failed");
        }

        let gateway = MutationGateway::new(store, &config, clock);

        Self {
            config,
            controller,
            listener,
            gateway,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn controller(&self) -> &ReconciliationController {
        &self.controller
    }

    /// Current order list, statistics and last fetch error
    pub fn snapshot(&self) -> DashboardSnapshot {
        self.controller.snapshot()
    }

    /// Observe every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<DashboardSnapshot> {
        self.controller.subscribe()
    }

    /// Observe the feed connection state
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.listener.watch_state()
    }

    /// Error behind a `disconnected` feed, kept until reconnection
    pub fn feed_error(&self) -> Option<EngineError> {
        self.listener.last_error()
    }

    /// Manual refresh. Returns the observing fetch's result.
    pub async fn refresh(&self) -> EngineResult<()> {
        self.controller.refresh().await
    }

    /// Validate against the local view, then write.
    ///
    /// Rejections (unknown order, terminal status, disallowed transition,
    /// record failing validation) happen before any I/O. Records that fail
    /// validation may still be cancelled.
    pub async fn request_transition(
        &self,
        order_id: &str,
        requested: OrderStatus,
    ) -> EngineResult<()> {
        let (current, violations) = self
            .controller
            .with_snapshot(|snapshot| {
                snapshot
                    .order(order_id)
                    .map(|order| (order.status, order.validate().err()))
            })
            .ok_or_else(|| ValidationError::UnknownOrder(order_id.to_string()))?;

        check_transition(order_id, current, requested)?;

        if let Some(violations) = violations
            && requested != OrderStatus::Cancelled
        {
            return Err(ValidationError::InvalidRecord {
                order_id: order_id.to_string(),
                violations,
            }
            .into());
        }

        tracing::info!(
            order_id = %order_id,
            from = %current,
            to = %requested,
            "Submitting status transition"
        );

        let expected = self.config.conditional_updates.then_some(current);
        self.gateway.submit(order_id, requested, expected).await
    }

    /// Move to the forward successor. Returns the requested status.
    pub async fn advance(&self, order_id: &str) -> EngineResult<OrderStatus> {
        let current = self
            .controller
            .status_of(order_id)
            .ok_or_else(|| ValidationError::UnknownOrder(order_id.to_string()))?;

        let next = current.next_allowed().ok_or_else(|| ValidationError::Terminal {
            order_id: order_id.to_string(),
            current,
        })?;

        self.request_transition(order_id, next).await?;
        Ok(next)
    }

    pub async fn cancel(&self, order_id: &str) -> EngineResult<()> {
        self.request_transition(order_id, OrderStatus::Cancelled)
            .await
    }

    /// Release the feed subscription and stop the controller. Idempotent.
    pub fn shutdown(&self) {
        if self.controller.is_shutdown() {
            return;
        }
        self.listener.stop();
        self.controller.shutdown();
        tracing::info!(tenant_id = %self.config.tenant_id, "Order engine stopped");
    }
}

impl Drop for OrderEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
