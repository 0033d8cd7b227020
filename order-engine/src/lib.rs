//! Order lifecycle engine for the restaurant dashboard
//!
//! Keeps one session's view of a tenant's orders in step with the order
//! store: the change feed signals that something changed, the
//! reconciliation controller re-fetches (coalescing bursts), statistics
//! are recomputed, and status transitions are validated locally before
//! they are written.

pub mod config;
pub mod engine;
pub mod error;
pub mod feed;
pub mod gateway;
pub mod logger;
pub mod reconcile;
pub mod store;

pub use config::{EngineConfig, FeedConfig};
pub use engine::{OrderEngine, check_transition};
pub use error::{EngineError, EngineResult, TransportKind, ValidationError};
pub use feed::{ChangeFeedListener, ConnectionState, TcpChangeFeed};
pub use gateway::MutationGateway;
pub use reconcile::{
    Clock, ControllerPhase, DashboardSnapshot, ReconciliationController, TriggerReason,
};
pub use store::{
    ChangeFeed, FeedSignal, FeedSink, HttpOrderStore, InMemoryOrderStore, OrderStore,
    Subscription,
};

// Re-export shared types for convenience
pub use shared::order::{ChangeEvent, ChangeType, Order, OrderFilter, OrderStatus, StatusUpdate};
pub use shared::stats::{BusinessCalendar, OrderStats, StageCounts};
