//! Dashboard simulation
//!
//! Runs one engine session against the in-memory store while a simulated
//! kitchen creates and advances orders, printing each reconciled snapshot.
//!
//! With `ENGINE_STORE_URL` and `ENGINE_FEED_ADDR` set, connects to a real
//! order store and message bus instead and just prints snapshots.
//!
//! ```text
//! RUST_LOG=info cargo run -p order-engine --example dashboard_sim
//! ```

use order_engine::logger::init_logger;
use order_engine::{
    ChangeFeed, DashboardSnapshot, EngineConfig, HttpOrderStore, InMemoryOrderStore, Order,
    OrderEngine, OrderStatus, OrderStore, TcpChangeFeed,
};
use shared::order::OrderLineItem;
use shared::util::now_millis;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_logger("info", false)?;

    let config = EngineConfig::from_env();

    if config.store_url.is_some() && config.feed_addr.is_some() {
        let store: Arc<dyn OrderStore> = Arc::new(HttpOrderStore::from_config(&config)?);
        let feed: Arc<dyn ChangeFeed> = Arc::new(TcpChangeFeed::from_config(&config)?);
        let engine = OrderEngine::start(config, store, feed).await;
        watch_snapshots(&engine, Duration::from_secs(60)).await;
        engine.shutdown();
        return Ok(());
    }

    let store = InMemoryOrderStore::new();
    let engine = OrderEngine::start(config.clone(), Arc::new(store.clone()), Arc::new(store.clone())).await;
    let tenant = config.tenant_id.clone();

    let kitchen = tokio::spawn(simulate_kitchen(store.clone(), tenant));
    watch_snapshots(&engine, Duration::from_secs(3)).await;

    // 前台推进所有未完成订单一步
    for order in engine.snapshot().active_orders {
        match engine.advance(&order.id).await {
            Ok(next) => println!("advanced #{} -> {}", order.order_number, next),
            Err(e) => println!("advance #{} failed: {}", order.order_number, e),
        }
    }

    kitchen.await?;
    watch_snapshots(&engine, Duration::from_millis(500)).await;
    print_snapshot(&engine.snapshot());

    engine.shutdown();
    Ok(())
}

async fn simulate_kitchen(store: InMemoryOrderStore, tenant: String) {
    let menu = [("Margherita", 9.5), ("Carbonara", 12.0), ("Tiramisu", 6.0)];

    for n in 1..=6 {
        let id = format!("sim-{}", n);
        let (name, price) = menu[n % menu.len()];
        let quantity = 1 + (n % 2) as i32;
        let item = OrderLineItem::new(format!("{}-1", id), id.clone(), name, quantity, price);
        let subtotal = item.total_price;
        let tax = (subtotal * 10.0).round() / 100.0;

        let order = Order::new(&id, n.to_string(), &tenant, subtotal, tax, 1.0, now_millis())
            .with_items(vec![item]);
        store.insert_order(order);
        tokio::time::sleep(Duration::from_millis(150)).await;
    }

    // 厨房推进前两单到 ready
    for id in ["sim-1", "sim-2"] {
        for status in [OrderStatus::Confirmed, OrderStatus::Preparing, OrderStatus::Ready] {
            if let Some(order) = store.get_order(id) {
                store.put_order(order.with_status(status, now_millis()));
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

async fn watch_snapshots(engine: &OrderEngine, window: Duration) {
    let mut rx = engine.subscribe();
    let deadline = tokio::time::Instant::now() + window;

    while let Ok(Ok(())) = tokio::time::timeout_at(deadline, rx.changed()).await {
        let snapshot = rx.borrow_and_update().clone();
        print_snapshot(&snapshot);
    }
}

fn print_snapshot(snapshot: &DashboardSnapshot) {
    let stats = &snapshot.stats;
    println!(
        "gen {:>3} | orders {:>2} | active {:>2} (pending {} confirmed {} preparing {} ready {}) | revenue {:>7.2} | avg {:>6.2}{}",
        snapshot.generation,
        stats.today_order_count,
        stats.active_count,
        stats.stages.pending,
        stats.stages.confirmed,
        stats.stages.preparing,
        stats.stages.ready,
        stats.today_revenue,
        stats.average_order_value,
        snapshot
            .last_error
            .as_ref()
            .map(|e| format!(" | error: {}", e))
            .unwrap_or_default(),
    );
}
