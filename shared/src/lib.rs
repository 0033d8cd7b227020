//! Shared types for the order lifecycle engine
//!
//! Domain types used by the engine runtime and by any adapter talking to
//! the order store: order records and their state machine, the statistics
//! aggregator, change-feed events, message bus wire types and error codes.
//! Nothing in this crate performs I/O.

pub mod error;
pub mod message;
pub mod order;
pub mod stats;
pub mod util;

// Re-exports
pub use serde::{Deserialize, Serialize};

pub use error::ErrorCode;
pub use message::{BusMessage, EventType};
pub use order::{
    ChangeEvent, ChangeType, Order, OrderLineItem, OrderStatus, OrderType, is_transition_allowed,
    next_allowed_status,
};
pub use stats::{BusinessCalendar, OrderStats, StageCounts, aggregate};
