//! End-to-end behavior of one dashboard session against an in-memory store

mod common;

use common::*;
use order_engine::{
    ConnectionState, ControllerPhase, EngineConfig, EngineError, InMemoryOrderStore, OrderFilter,
    OrderStatus, OrderStore, StatusUpdate, TransportKind, ValidationError,
};
use shared::ErrorCode;
use std::time::Duration;

#[tokio::test]
async fn new_order_is_counted_as_pending() {
    let store = GatedStore::new(InMemoryOrderStore::new().with_orders([order("o1", 20.0, 4.0, 1.0, 60_000)]));
    let engine = start_engine(EngineConfig::new(TENANT), store).await;

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.generation, 1);
    assert_eq!(snapshot.orders[0].total_amount, 25.0);
    assert_eq!(snapshot.stats.stages.pending, 1);
    assert_eq!(snapshot.stats.active_count, 1);
    assert_eq!(snapshot.stats.today_revenue, 0.0);
}

#[tokio::test]
async fn skip_ahead_is_rejected_without_any_write() {
    let store = GatedStore::new(InMemoryOrderStore::new().with_orders([order("o1", 20.0, 4.0, 1.0, 60_000)]));
    let engine = start_engine(EngineConfig::new(TENANT), store.clone()).await;

    let err = engine
        .request_transition("o1", OrderStatus::Preparing)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        EngineError::Validation(ValidationError::TransitionNotAllowed {
            order_id: "o1".into(),
            current: OrderStatus::Pending,
            requested: OrderStatus::Preparing,
        })
    );
    assert_eq!(err.code(), ErrorCode::InvalidTransition);
    assert_eq!(store.memory.update_count(), 0);
}

#[tokio::test]
async fn revenue_counts_ready_and_delivered() {
    let store = GatedStore::new(InMemoryOrderStore::new().with_orders([
        order_in("delivered", OrderStatus::Delivered, 30.0, 30_000),
        order_in("ready", OrderStatus::Ready, 20.0, 20_000),
        order_in("cancelled", OrderStatus::Cancelled, 15.0, 10_000),
    ]));
    let engine = start_engine(EngineConfig::new(TENANT), store).await;

    let stats = engine.snapshot().stats;
    assert_eq!(stats.today_revenue, 50.0);
    assert_eq!(stats.active_count, 1);
    assert_eq!(stats.average_order_value, 25.0);
    assert_eq!(stats.stages.total() + stats.delivered_count + stats.cancelled_count, 3);
}

#[tokio::test]
async fn burst_of_events_during_fetch_costs_two_fetches() {
    let store = GatedStore::new(InMemoryOrderStore::new());
    let engine = start_engine(EngineConfig::new(TENANT), store.clone()).await;
    wait_until("feed connected", || {
        *engine.connection_state().borrow() == ConnectionState::Connected
    })
    .await;

    let baseline = store.fetches();
    let triggers = engine.controller().trigger_count();

    store.close_gate();
    store.memory.insert_order(order("o1", 10.0, 0.0, 0.0, 5_000));
    wait_until("fetch in flight", || store.fetches() == baseline + 1).await;

    for i in 2..=6 {
        store.memory.insert_order(order(&format!("o{}", i), 10.0, 0.0, 0.0, 5_000 - i));
    }
    wait_until("burst delivered", || {
        engine.controller().trigger_count() == triggers + 6
    })
    .await;
    assert_eq!(engine.controller().phase(), ControllerPhase::FetchingWithPending);

    store.open_gate();
    wait_until("controller idle", || {
        engine.controller().phase() == ControllerPhase::Idle
    })
    .await;

    assert_eq!(store.fetches(), baseline + 2);
    // 最终视图包含突发期间的全部变更
    assert_eq!(engine.snapshot().orders.len(), 6);
}

#[tokio::test]
async fn fetch_timeout_keeps_previous_view() {
    let store = GatedStore::new(InMemoryOrderStore::new().with_orders([
        order("o1", 20.0, 4.0, 1.0, 60_000),
        order_in("o2", OrderStatus::Delivered, 12.5, 30_000),
    ]));
    let config = EngineConfig::new(TENANT).with_fetch_timeout(Duration::from_millis(100));
    let engine = start_engine(config, store.clone()).await;
    let before = engine.snapshot();
    assert!(before.last_error.is_none());

    store.close_gate();
    let err = engine.refresh().await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Transport {
            kind: TransportKind::Timeout,
            ..
        }
    ));

    let after = engine.snapshot();
    assert_eq!(after.orders, before.orders);
    assert_eq!(after.stats, before.stats);
    assert_eq!(after.generation, before.generation);
    assert_eq!(after.last_error, Some(err));

    store.open_gate();
    engine.refresh().await.unwrap();
    assert!(engine.snapshot().last_error.is_none());
}

#[tokio::test]
async fn failed_initial_fetch_still_starts_engine() {
    let memory = InMemoryOrderStore::new().with_orders([order("o1", 10.0, 0.0, 0.0, 1_000)]);
    memory.set_fetch_failure(Some(EngineError::network("store unreachable")));
    let store = GatedStore::new(memory);

    let engine = start_engine(EngineConfig::new(TENANT), store.clone()).await;
    let snapshot = engine.snapshot();
    assert!(!snapshot.is_loaded());
    assert!(snapshot.orders.is_empty());
    assert!(snapshot.last_error.is_some());

    store.memory.set_fetch_failure(None);
    engine.refresh().await.unwrap();
    assert_eq!(engine.snapshot().orders.len(), 1);
}

#[tokio::test]
async fn advance_closes_loop_through_change_feed() {
    let store = GatedStore::new(InMemoryOrderStore::new().with_orders([order("o1", 20.0, 4.0, 1.0, 60_000)]));
    let engine = start_engine(EngineConfig::new(TENANT), store.clone()).await;

    let next = engine.advance("o1").await.unwrap();
    assert_eq!(next, OrderStatus::Confirmed);
    assert_eq!(store.memory.update_count(), 1);

    wait_until("view converged", || {
        engine.snapshot().status_of("o1") == Some(OrderStatus::Confirmed)
    })
    .await;
    assert_eq!(engine.snapshot().stats.stages.confirmed, 1);
}

#[tokio::test]
async fn delivery_records_completion_in_same_write() {
    let store = GatedStore::new(
        InMemoryOrderStore::new().with_orders([order_in("o1", OrderStatus::Ready, 18.0, 60_000)]),
    );
    let engine = start_engine(EngineConfig::new(TENANT), store.clone()).await;

    engine.advance("o1").await.unwrap();

    let stored = store.memory.get_order("o1").unwrap();
    assert_eq!(stored.status, OrderStatus::Delivered);
    assert_eq!(stored.completed_at, Some(NOW));
    assert!(stored.validate().is_ok());

    wait_until("delivered visible", || {
        engine.snapshot().stats.delivered_count == 1
    })
    .await;
}

#[tokio::test]
async fn terminal_and_unknown_orders_are_rejected_locally() {
    let store = GatedStore::new(InMemoryOrderStore::new().with_orders([
        order_in("done", OrderStatus::Delivered, 10.0, 1_000),
        order_in("void", OrderStatus::Cancelled, 10.0, 1_000),
    ]));
    let engine = start_engine(EngineConfig::new(TENANT), store.clone()).await;

    let err = engine.cancel("done").await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::Terminal { .. })
    ));
    assert_eq!(err.code(), ErrorCode::OrderAlreadyTerminal);

    assert!(engine.advance("void").await.unwrap_err().is_validation());

    let err = engine.advance("missing").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::OrderNotFound);
    assert_eq!(store.memory.update_count(), 0);
}

#[tokio::test]
async fn invalid_record_is_flagged_and_only_cancellable() {
    let mut broken = order("broken", 20.0, 4.0, 1.0, 1_000);
    broken.total_amount = 99.0;
    let store = GatedStore::new(InMemoryOrderStore::new().with_orders([
        broken,
        order("fine", 10.0, 0.0, 0.0, 2_000),
    ]));
    let engine = start_engine(EngineConfig::new(TENANT), store.clone()).await;

    let stats = engine.snapshot().stats;
    assert_eq!(stats.invalid_order_ids, vec!["broken".to_string()]);
    assert_eq!(stats.today_order_count, 1);

    let err = engine.advance("broken").await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::InvalidRecord { .. })
    ));
    assert_eq!(err.code(), ErrorCode::TotalMismatch);

    engine.cancel("broken").await.unwrap();
    assert_eq!(
        store.memory.get_order("broken").unwrap().status,
        OrderStatus::Cancelled
    );
}

#[tokio::test]
async fn conditional_update_detects_stale_view() {
    let store = GatedStore::new(InMemoryOrderStore::new().with_orders([order("o1", 10.0, 0.0, 0.0, 1_000)]));
    let config = EngineConfig::new(TENANT).with_conditional_updates(true);
    let engine = start_engine(config, store.clone()).await;

    // 另一会话在本会话断线期间推进了订单
    store.memory.disconnect_feed("wifi dropped");
    store
        .memory
        .update_order_status("o1", StatusUpdate::new(OrderStatus::Confirmed, NOW))
        .await
        .unwrap();
    assert_eq!(engine.snapshot().status_of("o1"), Some(OrderStatus::Pending));

    let err = engine.cancel("o1").await.unwrap_err();
    assert_eq!(
        err,
        EngineError::Conflict {
            order_id: "o1".into(),
            expected: OrderStatus::Pending,
            actual: Some(OrderStatus::Confirmed),
        }
    );
    assert_eq!(err.code(), ErrorCode::StatusConflict);
    assert_eq!(
        store.memory.get_order("o1").unwrap().status,
        OrderStatus::Confirmed
    );
}

#[tokio::test]
async fn last_write_wins_without_conditional_updates() {
    let store = GatedStore::new(InMemoryOrderStore::new().with_orders([order("o1", 10.0, 0.0, 0.0, 1_000)]));
    let engine = start_engine(EngineConfig::new(TENANT), store.clone()).await;

    store.memory.disconnect_feed("wifi dropped");
    store
        .memory
        .update_order_status("o1", StatusUpdate::new(OrderStatus::Confirmed, NOW))
        .await
        .unwrap();

    // 本地视图仍为 pending, 取消请求直接覆盖
    engine.cancel("o1").await.unwrap();
    assert_eq!(
        store.memory.get_order("o1").unwrap().status,
        OrderStatus::Cancelled
    );
}

#[tokio::test]
async fn reconnect_refetches_missed_changes() {
    let store = GatedStore::new(InMemoryOrderStore::new().with_orders([order("o1", 10.0, 0.0, 0.0, 1_000)]));
    let engine = start_engine(EngineConfig::new(TENANT), store.clone()).await;
    let mut state = engine.connection_state();
    wait_until("connected", || *state.borrow() == ConnectionState::Connected).await;

    store.memory.disconnect_feed("socket reset");
    state
        .wait_for(|s| *s == ConnectionState::Disconnected)
        .await
        .unwrap();
    assert!(engine.feed_error().is_some());

    store.memory.insert_order(order("missed", 5.0, 0.0, 0.0, 500));
    assert!(engine.snapshot().order("missed").is_none());

    store.memory.reconnect_feed();
    wait_until("missed order fetched", || {
        engine.snapshot().order("missed").is_some()
    })
    .await;
    assert!(engine.feed_error().is_none());
    assert_eq!(*engine.connection_state().borrow(), ConnectionState::Connected);
}

#[tokio::test]
async fn duplicate_events_do_not_corrupt_view() {
    let store = GatedStore::new(InMemoryOrderStore::new().with_orders([order("o1", 10.0, 0.0, 0.0, 1_000)]));
    let engine = start_engine(EngineConfig::new(TENANT), store.clone()).await;

    let event = shared::order::ChangeEvent::with_record(
        shared::order::ChangeType::Update,
        order("o1", 10.0, 0.0, 0.0, 1_000).with_status(OrderStatus::Ready, NOW),
    );
    for _ in 0..3 {
        store.memory.publish(event.clone());
    }

    wait_until("refetches settle", || {
        engine.controller().phase() == ControllerPhase::Idle && engine.snapshot().generation > 1
    })
    .await;

    // 事件载荷只是触发信号, 视图以存储为准
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.orders.len(), 1);
    assert_eq!(snapshot.status_of("o1"), Some(OrderStatus::Pending));
    assert_eq!(snapshot.stats.today_order_count, 1);
}

#[tokio::test]
async fn view_is_scoped_to_tenant_and_filter() {
    let mut foreign = order("foreign", 10.0, 0.0, 0.0, 1_000);
    foreign.tenant_id = "tenant-2".into();
    let store = GatedStore::new(InMemoryOrderStore::new().with_orders([
        foreign,
        order("open", 10.0, 0.0, 0.0, 2_000),
        order_in("done", OrderStatus::Delivered, 10.0, 3_000),
    ]));
    let config = EngineConfig::new(TENANT).with_filter(OrderFilter::Active);
    let engine = start_engine(config, store).await;

    let snapshot = engine.snapshot();
    let ids: Vec<_> = snapshot.orders.iter().map(|o| o.id.as_str()).collect();
    assert_eq!(ids, vec!["open"]);
    assert_eq!(snapshot.active_orders.len(), 1);
}

#[tokio::test]
async fn active_filter_does_not_narrow_statistics() {
    let store = GatedStore::new(InMemoryOrderStore::new().with_orders([
        order_in("delivered", OrderStatus::Delivered, 30.0, 30_000),
        order_in("ready", OrderStatus::Ready, 20.0, 20_000),
    ]));
    let config = EngineConfig::new(TENANT).with_filter(OrderFilter::Active);
    let engine = start_engine(config, store.clone()).await;

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.orders.len(), 1);
    assert_eq!(snapshot.stats.today_order_count, 2);
    assert_eq!(snapshot.stats.delivered_count, 1);
    assert_eq!(snapshot.stats.today_revenue, 50.0);

    assert_eq!(engine.advance("ready").await.unwrap(), OrderStatus::Delivered);
    wait_until("delivery reflected", || {
        engine.snapshot().stats.delivered_count == 2
    })
    .await;

    let snapshot = engine.snapshot();
    assert!(snapshot.orders.is_empty());
    assert_eq!(snapshot.stats.today_revenue, 50.0);
    assert_eq!(snapshot.stats.average_order_value, 25.0);
    assert_eq!(snapshot.stats.active_count, 0);
}

#[tokio::test]
async fn shutdown_releases_subscription_exactly_once() {
    let store = GatedStore::new(InMemoryOrderStore::new());
    let engine = start_engine(EngineConfig::new(TENANT), store.clone()).await;
    assert_eq!(store.memory.subscriber_count(), 1);

    engine.shutdown();
    engine.shutdown();
    assert_eq!(store.memory.subscriber_count(), 0);
    assert_eq!(*engine.connection_state().borrow(), ConnectionState::Disconnected);
    assert!(engine.refresh().await.is_err());

    drop(engine);
    assert_eq!(store.memory.subscriber_count(), 0);
}

#[tokio::test]
async fn dropping_engine_releases_subscription() {
    let store = GatedStore::new(InMemoryOrderStore::new());
    {
        let _engine = start_engine(EngineConfig::new(TENANT), store.clone()).await;
        assert_eq!(store.memory.subscriber_count(), 1);
    }
    assert_eq!(store.memory.subscriber_count(), 0);
}
