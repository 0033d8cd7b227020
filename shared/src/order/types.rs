//! Shared types for order records

use serde::{Deserialize, Serialize};

// ============================================================================
// Order Type
// ============================================================================

/// 订单渠道类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    /// 堂食
    #[default]
    DineIn,
    /// 打包自取
    Takeout,
    /// 外送
    Delivery,
    /// 其他渠道 (未识别的类型也落在这里)
    #[serde(other)]
    Other,
}

// ============================================================================
// Line Item Types
// ============================================================================

/// Per-item fulfillment progress, independent of the order status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    #[default]
    Pending,
    Preparing,
    Ready,
    Served,
    Cancelled,
}

/// Order line item
///
/// `name` / `description` are a point-in-time copy of the catalog entry,
/// so historical orders stay stable when the catalog changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderLineItem {
    /// Line item ID
    pub id: String,
    /// Owning order ID
    pub order_id: String,
    /// Catalog item the snapshot was taken from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog_item_id: Option<String>,
    /// Item name snapshot
    pub name: String,
    /// Item description snapshot
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Quantity (positive)
    pub quantity: i32,
    /// Unit price
    pub unit_price: f64,
    /// quantity × unit_price
    pub total_price: f64,
    /// Item fulfillment status
    #[serde(default)]
    pub status: ItemStatus,
    /// Item note
    #[serde(skip_serializing_if = "Option::is_none")]
    pub special_instructions: Option<String>,
    /// Selected modifiers (opaque)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modifiers: Option<serde_json::Value>,
}

impl OrderLineItem {
    /// Create a line item with its total computed from quantity and unit price
    pub fn new(
        id: impl Into<String>,
        order_id: impl Into<String>,
        name: impl Into<String>,
        quantity: i32,
        unit_price: f64,
    ) -> Self {
        let total_price = super::money::line_total(quantity, unit_price);
        Self {
            id: id.into(),
            order_id: order_id.into(),
            catalog_item_id: None,
            name: name.into(),
            description: None,
            quantity,
            unit_price,
            total_price,
            status: ItemStatus::Pending,
            special_instructions: None,
            modifiers: None,
        }
    }
}

/// Customer identity snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CustomerInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

// ============================================================================
// Store Boundary Types
// ============================================================================

/// Read filter for the order store
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderFilter {
    /// Only orders whose status is not terminal
    Active,
    /// Every order
    #[default]
    All,
}

impl OrderFilter {
    pub fn matches(&self, status: super::OrderStatus) -> bool {
        match self {
            OrderFilter::Active => status.is_active(),
            OrderFilter::All => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderFilter::Active => "active",
            OrderFilter::All => "all",
        }
    }
}

/// Status write sent to the order store
///
/// `completed_at` travels in the same write as a transition into
/// `delivered`. `expected_status`, when present, makes the write
/// conditional on the record's current status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusUpdate {
    pub status: super::OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_status: Option<super::OrderStatus>,
}

impl StatusUpdate {
    /// Build the write for `status`, stamping the completion instant when needed
    pub fn new(status: super::OrderStatus, now_millis: i64) -> Self {
        Self {
            status,
            completed_at: status.records_completion().then_some(now_millis),
            expected_status: None,
        }
    }

    /// Make the write conditional on the current status
    pub fn expecting(mut self, expected: super::OrderStatus) -> Self {
        self.expected_status = Some(expected);
        self
    }
}
