//! Order records and lifecycle
//!
//! - Status: the fixed operational state machine and its transition rules
//! - Records: the order entity with its owned line items
//! - Events: change-feed notifications emitted by the order store
//! - Money: decimal-precise helpers for monetary invariants

pub mod event;
pub mod money;
pub mod record;
pub mod status;
pub mod types;

// Re-exports
pub use event::{ChangeEvent, ChangeType};
pub use record::{Order, RecordViolation};
pub use status::{OrderStatus, is_transition_allowed, next_allowed_status};
pub use types::*;
