//! Order record - the authoritative row held by the order store
//!
//! The engine never mutates a record locally. Records are replaced wholesale
//! by each re-fetch, and `validate` checks the invariants a record must hold
//! before it is allowed into aggregation.

use super::money::{line_total, money_eq, order_total};
use super::status::OrderStatus;
use super::types::{CustomerInfo, OrderLineItem, OrderType};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Order record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    /// Opaque order ID (assigned by the store)
    pub id: String,
    /// Human-readable number, unique per tenant
    pub order_number: String,
    /// Owning tenant
    pub tenant_id: String,
    /// Channel
    #[serde(default)]
    pub order_type: OrderType,
    /// Lifecycle status
    pub status: OrderStatus,
    /// Sum of line totals
    pub subtotal: f64,
    /// Tax amount
    #[serde(default)]
    pub tax_amount: f64,
    /// Service charge
    #[serde(default)]
    pub service_charge: f64,
    /// subtotal + tax_amount + service_charge
    pub total_amount: f64,
    /// Customer identity snapshot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer: Option<CustomerInfo>,
    /// Table reference (dine-in)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_id: Option<String>,
    /// Free-text instructions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub special_instructions: Option<String>,
    /// Estimated ready instant (Unix millis)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_ready_at: Option<i64>,
    /// Creation instant (Unix millis)
    pub created_at: i64,
    /// Last update instant (Unix millis)
    pub updated_at: i64,
    /// Set iff status is `delivered`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
    /// Line items, owned exclusively by this order
    #[serde(default)]
    pub items: Vec<OrderLineItem>,
}

/// A broken record invariant
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RecordViolation {
    #[error("total {total} != subtotal {subtotal} + tax {tax} + service {service}")]
    TotalMismatch {
        total: f64,
        subtotal: f64,
        tax: f64,
        service: f64,
    },

    #[error("{field} must be a finite non-negative amount, got {value}")]
    InvalidAmount { field: &'static str, value: f64 },

    #[error("line item {item_id}: quantity must be positive, got {quantity}")]
    NonPositiveQuantity { item_id: String, quantity: i32 },

    #[error("line item {item_id}: total {total} != {quantity} x {unit_price}")]
    LineTotalMismatch {
        item_id: String,
        quantity: i32,
        unit_price: f64,
        total: f64,
    },

    #[error("line item {item_id} belongs to order {owner}")]
    ForeignLineItem { item_id: String, owner: String },

    #[error("completion instant must be set iff status is delivered (status {status})")]
    CompletionMismatch { status: OrderStatus },
}

impl Order {
    /// Create a pending order with totals derived from its parts
    pub fn new(
        id: impl Into<String>,
        order_number: impl Into<String>,
        tenant_id: impl Into<String>,
        subtotal: f64,
        tax_amount: f64,
        service_charge: f64,
        created_at: i64,
    ) -> Self {
        Self {
            id: id.into(),
            order_number: order_number.into(),
            tenant_id: tenant_id.into(),
            order_type: OrderType::DineIn,
            status: OrderStatus::Pending,
            subtotal,
            tax_amount,
            service_charge,
            total_amount: order_total(subtotal, tax_amount, service_charge),
            customer: None,
            table_id: None,
            special_instructions: None,
            estimated_ready_at: None,
            created_at,
            updated_at: created_at,
            completed_at: None,
            items: Vec::new(),
        }
    }

    /// Attach line items
    pub fn with_items(mut self, items: Vec<OrderLineItem>) -> Self {
        self.items = items;
        self
    }

    /// Set the status and keep `completed_at` consistent with it
    pub fn with_status(mut self, status: OrderStatus, at: i64) -> Self {
        self.status = status;
        self.updated_at = at;
        self.completed_at = status.records_completion().then_some(at);
        self
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Total item count across lines
    pub fn item_count(&self) -> i32 {
        self.items.iter().map(|i| i.quantity).sum()
    }

    /// Check every record invariant, returning all violations found
    pub fn validate(&self) -> Result<(), Vec<RecordViolation>> {
        let mut violations = Vec::new();

        for (field, value) in [
            ("subtotal", self.subtotal),
            ("tax_amount", self.tax_amount),
            ("service_charge", self.service_charge),
            ("total_amount", self.total_amount),
        ] {
            if !value.is_finite() || value < 0.0 {
                violations.push(RecordViolation::InvalidAmount { field, value });
            }
        }

        if violations.is_empty()
            && !money_eq(
                self.total_amount,
                order_total(self.subtotal, self.tax_amount, self.service_charge),
            )
        {
            violations.push(RecordViolation::TotalMismatch {
                total: self.total_amount,
                subtotal: self.subtotal,
                tax: self.tax_amount,
                service: self.service_charge,
            });
        }

        for item in &self.items {
            if item.order_id != self.id {
                violations.push(RecordViolation::ForeignLineItem {
                    item_id: item.id.clone(),
                    owner: item.order_id.clone(),
                });
            }
            if item.quantity <= 0 {
                violations.push(RecordViolation::NonPositiveQuantity {
                    item_id: item.id.clone(),
                    quantity: item.quantity,
                });
                continue;
            }
            if !item.unit_price.is_finite()
                || !money_eq(item.total_price, line_total(item.quantity, item.unit_price))
            {
                violations.push(RecordViolation::LineTotalMismatch {
                    item_id: item.id.clone(),
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                    total: item.total_price,
                });
            }
        }

        if self.status.records_completion() != self.completed_at.is_some() {
            violations.push(RecordViolation::CompletionMismatch {
                status: self.status,
            });
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}
