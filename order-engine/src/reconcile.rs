//! Reconciliation Controller
//!
//! The single authority for re-fetching the order set. Triggers that
//! arrive while a fetch is in flight collapse into one follow-up fetch
//! (trailing edge), so a burst never costs more than two round trips.
//!
//! ```text
//! Idle ──trigger──▶ Fetching ──done──▶ Idle
//!                     │  ▲
//!              trigger│  │done (re-enter immediately)
//!                     ▼  │
//!              FetchingWithPending
//! ```
//!
//! One worker task runs fetches strictly one after another, so observers
//! never see an older result after a newer one.

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::store::OrderStore;
use parking_lot::Mutex;
use serde::Serialize;
use shared::order::{Order, OrderFilter, OrderStatus};
use shared::stats::{BusinessCalendar, OrderStats, aggregate};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, watch};
use tokio_util::sync::{CancellationToken, DropGuard};

/// Source of "now" in Unix millis
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Why a re-fetch was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerReason {
    InitialMount,
    FeedEvent,
    ManualRefresh,
    /// Feed came back after a gap; events may have been missed
    Reconnected,
}

impl std::fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerReason::InitialMount => write!(f, "initial_mount"),
            TriggerReason::FeedEvent => write!(f, "feed_event"),
            TriggerReason::ManualRefresh => write!(f, "manual_refresh"),
            TriggerReason::Reconnected => write!(f, "reconnected"),
        }
    }
}

/// Controller phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerPhase {
    Idle,
    Fetching,
    /// A trigger arrived during the current fetch; one more follows it
    FetchingWithPending,
}

/// What the dashboard renders
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardSnapshot {
    /// Successful fetches applied so far (0 = nothing loaded yet)
    pub generation: u64,
    /// Sequence number of the fetch that produced `orders`
    pub fetch_seq: u64,
    /// Order list matching the configured filter, newest first
    pub orders: Vec<Order>,
    /// Orders not in a terminal status
    pub active_orders: Vec<Order>,
    /// Order IDs grouped by status, newest first within each group
    pub orders_by_status: HashMap<OrderStatus, Vec<String>>,
    pub stats: OrderStats,
    /// Set by a failed fetch, cleared by the next successful one
    pub last_error: Option<EngineError>,
    /// Instant of the last successful fetch (Unix millis)
    pub refreshed_at: Option<i64>,
}

impl DashboardSnapshot {
    pub fn order(&self, order_id: &str) -> Option<&Order> {
        self.orders.iter().find(|o| o.id == order_id)
    }

    pub fn status_of(&self, order_id: &str) -> Option<OrderStatus> {
        self.order(order_id).map(|o| o.status)
    }

    /// Orders currently in `status`
    pub fn with_status(&self, status: OrderStatus) -> impl Iterator<Item = &Order> {
        self.orders.iter().filter(move |o| o.status == status)
    }

    pub fn is_loaded(&self) -> bool {
        self.generation > 0
    }

    /// `orders` is the full tenant set; `filter` only narrows the lists shown
    fn apply(
        &mut self,
        seq: u64,
        mut orders: Vec<Order>,
        filter: OrderFilter,
        stats: OrderStats,
        now: i64,
    ) {
        orders.retain(|o| filter.matches(o.status));

        let mut by_status: HashMap<OrderStatus, Vec<String>> = HashMap::new();
        for order in &orders {
            by_status.entry(order.status).or_default().push(order.id.clone());
        }

        self.generation += 1;
        self.fetch_seq = seq;
        self.active_orders = orders.iter().filter(|o| o.is_active()).cloned().collect();
        self.orders_by_status = by_status;
        self.orders = orders;
        self.stats = stats;
        self.last_error = None;
        self.refreshed_at = Some(now);
    }
}

#[derive(Debug, Clone)]
struct FetchOutcome {
    seq: u64,
    result: EngineResult<()>,
}

struct State {
    phase: ControllerPhase,
    /// Sequence of the fetch in flight, or of the last one run
    current_seq: u64,
}

struct Inner {
    store: Arc<dyn OrderStore>,
    tenant_id: String,
    filter: OrderFilter,
    fetch_timeout: Duration,
    calendar: BusinessCalendar,
    clock: Clock,
    state: Mutex<State>,
    wake: Notify,
    snapshot_tx: watch::Sender<DashboardSnapshot>,
    outcome_tx: watch::Sender<FetchOutcome>,
    fetches_started: AtomicU64,
    triggers: AtomicU64,
    shutdown: CancellationToken,
}

/// Reconciliation Controller handle (cheap to clone)
///
/// The worker stops once the last handle is dropped.
#[derive(Clone)]
pub struct ReconciliationController {
    inner: Arc<Inner>,
    _stop_on_drop: Arc<DropGuard>,
}

impl ReconciliationController {
    /// Start the fetch worker. Nothing is fetched until the first trigger.
    pub fn spawn(store: Arc<dyn OrderStore>, config: &EngineConfig) -> Self {
        Self::spawn_with_clock(store, config, Arc::new(shared::util::now_millis))
    }

    pub fn spawn_with_clock(
        store: Arc<dyn OrderStore>,
        config: &EngineConfig,
        clock: Clock,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(DashboardSnapshot::default());
        let (outcome_tx, _) = watch::channel(FetchOutcome {
            seq: 0,
            result: Ok(()),
        });

        let inner = Arc::new(Inner {
            store,
            tenant_id: config.tenant_id.clone(),
            filter: config.filter,
            fetch_timeout: config.fetch_timeout,
            calendar: config.calendar,
            clock,
            state: Mutex::new(State {
                phase: ControllerPhase::Idle,
                current_seq: 0,
            }),
            wake: Notify::new(),
            snapshot_tx,
            outcome_tx,
            fetches_started: AtomicU64::new(0),
            triggers: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
        });

        tokio::spawn(run_worker(inner.clone()));
        Self {
            _stop_on_drop: Arc::new(inner.shutdown.clone().drop_guard()),
            inner,
        }
    }

    /// Request a re-fetch.
    ///
    /// Returns the sequence number of the fetch that will observe this
    /// trigger: a new fetch when idle, otherwise the single follow-up.
    pub fn trigger(&self, reason: TriggerReason) -> u64 {
        let mut state = self.inner.state.lock();
        if self.inner.shutdown.is_cancelled() {
            tracing::debug!(reason = %reason, "Trigger ignored after shutdown");
            return state.current_seq + 1;
        }

        let seq = match state.phase {
            ControllerPhase::Idle => {
                state.phase = ControllerPhase::Fetching;
                state.current_seq += 1;
                self.inner.wake.notify_one();
                state.current_seq
            }
            ControllerPhase::Fetching => {
                state.phase = ControllerPhase::FetchingWithPending;
                state.current_seq + 1
            }
            ControllerPhase::FetchingWithPending => state.current_seq + 1,
        };
        self.inner.triggers.fetch_add(1, Ordering::SeqCst);

        tracing::debug!(reason = %reason, seq, phase = ?state.phase, "Reconciliation triggered");
        seq
    }

    /// Wait until fetch `seq` (or a later one) has completed and return its result
    pub async fn wait_for(&self, seq: u64) -> EngineResult<()> {
        let mut rx = self.inner.outcome_tx.subscribe();
        let waited = async {
            rx.wait_for(|o| o.seq >= seq)
                .await
                .map(|outcome| outcome.result.clone())
        };

        tokio::select! {
            _ = self.inner.shutdown.cancelled() => Err(stopped()),
            result = waited => result.unwrap_or_else(|_| Err(stopped())),
        }
    }

    /// Manual refresh: trigger and wait for the observing fetch.
    /// Unlike feed triggers, the failure is returned to the caller.
    pub async fn refresh(&self) -> EngineResult<()> {
        let seq = self.trigger(TriggerReason::ManualRefresh);
        self.wait_for(seq).await
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        self.inner.snapshot_tx.borrow().clone()
    }

    /// Observe every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<DashboardSnapshot> {
        self.inner.snapshot_tx.subscribe()
    }

    /// Read the current snapshot in place
    pub fn with_snapshot<R>(&self, f: impl FnOnce(&DashboardSnapshot) -> R) -> R {
        f(&self.inner.snapshot_tx.borrow())
    }

    /// Current status of `order_id` in the local view
    pub fn status_of(&self, order_id: &str) -> Option<OrderStatus> {
        self.with_snapshot(|snapshot| snapshot.status_of(order_id))
    }

    pub fn phase(&self) -> ControllerPhase {
        self.inner.state.lock().phase
    }

    /// Fetches issued against the store so far
    pub fn fetch_count(&self) -> u64 {
        self.inner.fetches_started.load(Ordering::SeqCst)
    }

    /// Triggers accepted so far (coalesced ones included)
    pub fn trigger_count(&self) -> u64 {
        self.inner.triggers.load(Ordering::SeqCst)
    }

    /// Stop the worker. A fetch already in flight completes and is discarded.
    pub fn shutdown(&self) {
        if !self.inner.shutdown.is_cancelled() {
            tracing::info!(tenant_id = %self.inner.tenant_id, "Reconciliation controller shutting down");
            self.inner.shutdown.cancel();
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }
}

fn stopped() -> EngineError {
    EngineError::server("Reconciliation controller stopped")
}

async fn run_worker(inner: Arc<Inner>) {
    tracing::debug!(tenant_id = %inner.tenant_id, "Reconciliation worker started");

    'outer: loop {
        tokio::select! {
            _ = inner.shutdown.cancelled() => break,
            _ = inner.wake.notified() => {}
        }

        let mut seq = inner.state.lock().current_seq;
        loop {
            inner.fetch(seq).await;
            if inner.shutdown.is_cancelled() {
                break 'outer;
            }

            let next = {
                let mut state = inner.state.lock();
                match state.phase {
                    ControllerPhase::FetchingWithPending => {
                        state.phase = ControllerPhase::Fetching;
                        state.current_seq += 1;
                        Some(state.current_seq)
                    }
                    _ => {
                        state.phase = ControllerPhase::Idle;
                        None
                    }
                }
            };

            match next {
                Some(next_seq) => seq = next_seq,
                None => break,
            }
        }
    }

    inner.state.lock().phase = ControllerPhase::Idle;
    tracing::debug!(tenant_id = %inner.tenant_id, "Reconciliation worker stopped");
}

impl Inner {
    async fn fetch(&self, seq: u64) {
        self.fetches_started.fetch_add(1, Ordering::SeqCst);

        // 统计需要当天全部订单, 过滤只作用于展示列表
        let result = match tokio::time::timeout(
            self.fetch_timeout,
            self.store.fetch_orders(&self.tenant_id, OrderFilter::All),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(EngineError::timeout(format!(
                "Order fetch exceeded {}ms",
                self.fetch_timeout.as_millis()
            ))),
        };

        // 已关闭: 结果丢弃
        if self.shutdown.is_cancelled() {
            tracing::debug!(seq, "Discarding fetch result after shutdown");
            return;
        }

        let outcome = match result {
            Ok(orders) => {
                let now = (self.clock)();
                let stats = aggregate(&orders, now, self.calendar.day_fn());
                let filter = self.filter;
                tracing::info!(
                    seq,
                    orders = orders.len(),
                    active = stats.active_count,
                    revenue = stats.today_revenue,
                    "Order view reconciled"
                );
                self.snapshot_tx
                    .send_modify(|snapshot| snapshot.apply(seq, orders, filter, stats, now));
                Ok(())
            }
            Err(e) => {
                tracing::warn!(seq, error = %e, "Order fetch failed, keeping previous view");
                self.snapshot_tx
                    .send_modify(|snapshot| snapshot.last_error = Some(e.clone()));
                Err(e)
            }
        };

        self.outcome_tx.send_replace(FetchOutcome {
            seq,
            result: outcome,
        });
    }
}
