//! Statistics Aggregator
//!
//! Reduces the live order set into the dashboard summary. Pure and
//! deterministic: the reference instant and the tenant day function are
//! inputs, never read from the environment.
//!
//! Policy:
//! - "today" = orders whose `created_at` falls on the same business day as `now`
//! - active = status not terminal
//! - revenue = sum of `total_amount` over `ready` + `delivered`
//! - average order value = revenue / fulfilled-for-revenue count, 0 when empty
//! - records failing `Order::validate` are excluded and reported by ID

pub mod calendar;

pub use calendar::{BusinessCalendar, parse_cutoff, parse_timezone};

use crate::order::money::{to_decimal, to_f64};
use crate::order::{Order, OrderStatus};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Queue depth per non-terminal stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCounts {
    pub pending: u32,
    pub confirmed: u32,
    pub preparing: u32,
    pub ready: u32,
}

impl StageCounts {
    pub fn total(&self) -> u32 {
        self.pending + self.confirmed + self.preparing + self.ready
    }

    pub fn get(&self, status: OrderStatus) -> u32 {
        match status {
            OrderStatus::Pending => self.pending,
            OrderStatus::Confirmed => self.confirmed,
            OrderStatus::Preparing => self.preparing,
            OrderStatus::Ready => self.ready,
            OrderStatus::Delivered | OrderStatus::Cancelled => 0,
        }
    }

    fn bump(&mut self, status: OrderStatus) {
        match status {
            OrderStatus::Pending => self.pending += 1,
            OrderStatus::Confirmed => self.confirmed += 1,
            OrderStatus::Preparing => self.preparing += 1,
            OrderStatus::Ready => self.ready += 1,
            OrderStatus::Delivered | OrderStatus::Cancelled => {}
        }
    }
}

/// Dashboard summary statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderStats {
    /// Business day the figures cover
    pub day: Option<NaiveDate>,
    pub today_order_count: u32,
    pub today_revenue: f64,
    pub active_count: u32,
    pub stages: StageCounts,
    pub delivered_count: u32,
    pub cancelled_count: u32,
    /// Orders counted toward revenue (`ready` + `delivered`)
    pub fulfilled_count: u32,
    pub average_order_value: f64,
    /// Records excluded because they broke an invariant
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invalid_order_ids: Vec<String>,
}

impl OrderStats {
    /// All-zero stats for an empty day
    pub fn empty(day: NaiveDate) -> Self {
        Self {
            day: Some(day),
            ..Default::default()
        }
    }
}

/// Reduce `orders` into today's statistics
pub fn aggregate<F>(orders: &[Order], now_millis: i64, day_fn: F) -> OrderStats
where
    F: Fn(i64) -> NaiveDate,
{
    let today = day_fn(now_millis);
    let mut stats = OrderStats::empty(today);
    let mut revenue = Decimal::ZERO;

    for order in orders.iter().filter(|o| day_fn(o.created_at) == today) {
        if let Err(violations) = order.validate() {
            tracing::warn!(
                order_id = %order.id,
                violations = ?violations,
                "Excluding invalid order from statistics"
            );
            stats.invalid_order_ids.push(order.id.clone());
            continue;
        }

        stats.today_order_count += 1;

        if order.status.is_active() {
            stats.active_count += 1;
            stats.stages.bump(order.status);
        }

        match order.status {
            OrderStatus::Delivered => stats.delivered_count += 1,
            OrderStatus::Cancelled => stats.cancelled_count += 1,
            _ => {}
        }

        if order.status.is_fulfilled_for_revenue() {
            stats.fulfilled_count += 1;
            revenue += to_decimal(order.total_amount);
        }
    }

    stats.today_revenue = to_f64(revenue);
    stats.average_order_value = if stats.fulfilled_count == 0 {
        0.0
    } else {
        to_f64(revenue / Decimal::from(stats.fulfilled_count))
    };

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, TimeZone, Utc};

    const DAY_MS: i64 = 24 * 60 * 60 * 1000;

    fn noon() -> i64 {
        Utc.with_ymd_and_hms(2024, 5, 20, 12, 0, 0)
            .unwrap()
            .timestamp_millis()
    }

    fn order(id: &str, status: OrderStatus, total: f64, created_at: i64) -> Order {
        Order::new(id, id, "tenant-1", total, 0.0, 0.0, created_at).with_status(status, created_at)
    }

    fn utc_day(millis: i64) -> NaiveDate {
        BusinessCalendar::default().day_of(millis)
    }

    #[test]
    fn test_empty_input_is_all_zero() {
        let stats = aggregate(&[], noon(), utc_day);
        assert_eq!(stats.today_order_count, 0);
        assert_eq!(stats.today_revenue, 0.0);
        assert_eq!(stats.active_count, 0);
        assert_eq!(stats.stages, StageCounts::default());
        assert_eq!(stats.average_order_value, 0.0);
        assert!(!stats.average_order_value.is_nan());
    }

    #[test]
    fn test_revenue_counts_ready_and_delivered() {
        let now = noon();
        let orders = vec![
            order("a", OrderStatus::Delivered, 30.0, now - 1000),
            order("b", OrderStatus::Ready, 20.0, now - 2000),
            order("c", OrderStatus::Cancelled, 15.0, now - 3000),
        ];
        let stats = aggregate(&orders, now, utc_day);
        assert_eq!(stats.today_revenue, 50.0);
        assert_eq!(stats.active_count, 1);
        assert_eq!(stats.stages.ready, 1);
        assert_eq!(stats.fulfilled_count, 2);
        assert_eq!(stats.average_order_value, 25.0);
        assert_eq!(stats.today_order_count, 3);
    }

    #[test]
    fn test_new_order_counted_as_pending() {
        let now = noon();
        let order = Order::new("n", "N-1", "tenant-1", 20.0, 4.0, 1.0, now);
        assert_eq!(order.total_amount, 25.0);
        let stats = aggregate(&[order], now, utc_day);
        assert_eq!(stats.stages.pending, 1);
        assert_eq!(stats.today_revenue, 0.0);
    }

    #[test]
    fn test_counts_close_over_today() {
        let now = noon();
        let mut orders: Vec<Order> = OrderStatus::ALL
            .iter()
            .enumerate()
            .map(|(i, s)| order(&format!("o{}", i), *s, 10.0, now - i as i64))
            .collect();
        orders.push(order("yesterday", OrderStatus::Pending, 10.0, now - DAY_MS));

        let stats = aggregate(&orders, now, utc_day);
        assert_eq!(
            stats.stages.total() + stats.delivered_count + stats.cancelled_count,
            stats.today_order_count
        );
        assert_eq!(stats.today_order_count, 6);
    }

    #[test]
    fn test_invalid_records_are_flagged_not_summed() {
        let now = noon();
        let mut broken = order("bad", OrderStatus::Delivered, 40.0, now);
        broken.total_amount = 999.0;
        let orders = vec![broken, order("good", OrderStatus::Delivered, 10.0, now)];

        let stats = aggregate(&orders, now, utc_day);
        assert_eq!(stats.today_revenue, 10.0);
        assert_eq!(stats.invalid_order_ids, vec!["bad".to_string()]);
        assert_eq!(stats.today_order_count, 1);
    }

    #[test]
    fn test_partition_uses_day_fn_not_process_zone() {
        // 23:30 UTC on the 20th is already the 21st in Tokyo
        let late = Utc.with_ymd_and_hms(2024, 5, 20, 23, 30, 0).unwrap().timestamp_millis();
        let early_next = late + 60 * 60 * 1000;
        let tokyo = BusinessCalendar::new(chrono_tz::Asia::Tokyo);
        let orders = vec![order("x", OrderStatus::Delivered, 12.0, late)];

        let stats = aggregate(&orders, early_next, tokyo.day_fn());
        assert_eq!(stats.today_order_count, 1);

        let stats = aggregate(&orders, early_next, utc_day);
        assert_eq!(stats.today_order_count, 0);
    }

    #[test]
    fn test_average_rounds_to_cents() {
        let now = noon();
        let orders = vec![
            order("a", OrderStatus::Delivered, 10.0, now),
            order("b", OrderStatus::Delivered, 10.0, now),
            order("c", OrderStatus::Ready, 10.01, now),
        ];
        let calendar = BusinessCalendar::default().with_cutoff(NaiveTime::MIN);
        let stats = aggregate(&orders, now, calendar.day_fn());
        assert_eq!(stats.today_revenue, 30.01);
        assert_eq!(stats.average_order_value, 10.0);
    }
}
