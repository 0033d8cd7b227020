//! Change-feed events emitted by the order store
//!
//! An event is a trigger, not a source of truth: the record it carries may
//! be stale, duplicated or out of order, so consumers re-fetch instead of
//! patching local state from it.

use super::record::Order;
use crate::message::SyncPayload;
use serde::{Deserialize, Serialize};

/// Resource name used for order changes on the message bus
pub const ORDER_RESOURCE: &str = "order";

/// Kind of change on the order collection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Insert,
    Update,
}

impl ChangeType {
    /// Map a message bus action (`created`, `updated`, ...) to a change type
    pub fn from_action(action: &str) -> Option<Self> {
        match action {
            "created" | "insert" => Some(ChangeType::Insert),
            "updated" | "update" => Some(ChangeType::Update),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeType::Insert => write!(f, "insert"),
            ChangeType::Update => write!(f, "update"),
        }
    }
}

/// One change notification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangeEvent {
    pub change_type: ChangeType,
    pub tenant_id: String,
    /// Changed order ID
    pub order_id: String,
    /// Changed record, when the feed carries it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<Order>,
    /// Local receive instant (Unix millis)
    pub received_at: i64,
}

impl ChangeEvent {
    /// Event carrying the full record
    pub fn with_record(change_type: ChangeType, record: Order) -> Self {
        Self {
            change_type,
            tenant_id: record.tenant_id.clone(),
            order_id: record.id.clone(),
            record: Some(record),
            received_at: crate::util::now_millis(),
        }
    }

    /// Build from a message bus sync payload
    ///
    /// Returns `None` for other resources, unknown actions, or orders of a
    /// different tenant. The payload's data is kept only if it decodes as a
    /// full record.
    pub fn from_sync(payload: &SyncPayload, tenant_id: &str) -> Option<Self> {
        if payload.resource != ORDER_RESOURCE {
            return None;
        }
        let change_type = ChangeType::from_action(&payload.action)?;
        let record = payload
            .data
            .as_ref()
            .and_then(|data| serde_json::from_value::<Order>(data.clone()).ok());

        if let Some(record) = &record
            && record.tenant_id != tenant_id
        {
            return None;
        }

        Some(Self {
            change_type,
            tenant_id: tenant_id.to_string(),
            order_id: payload.id.clone(),
            record,
            received_at: crate::util::now_millis(),
        })
    }
}
