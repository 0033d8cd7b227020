//! Engine error types
//!
//! - `Validation`: rejected locally before any I/O
//! - `Transport`: fetch, mutation or subscribe call failed
//! - `Conflict`: a conditional write found a different current status
//! - `Config`: the session is missing settings it needs

use shared::ErrorCode;
use shared::order::{OrderStatus, RecordViolation};
use thiserror::Error;

/// Transport failure kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Connection refused / reset / DNS
    Network,
    /// Bounded timeout elapsed
    Timeout,
    /// Store answered with a server-side error
    Server,
    /// Response body could not be decoded
    Decode,
    /// Change feed subscription failed or dropped
    Feed,
}

/// Why a requested transition was rejected locally
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("Order not found in current view: {0}")]
    UnknownOrder(String),

    #[error("Order {order_id} is {current}, no further transition allowed")]
    Terminal {
        order_id: String,
        current: OrderStatus,
    },

    #[error("Order {order_id}: transition {current} -> {requested} not allowed")]
    TransitionNotAllowed {
        order_id: String,
        current: OrderStatus,
        requested: OrderStatus,
    },

    #[error("Order {order_id} failed record validation: {violations:?}")]
    InvalidRecord {
        order_id: String,
        violations: Vec<RecordViolation>,
    },
}

/// Engine error type
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    /// Rejected before any network call
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Network / timeout / server error
    #[error("Transport error ({kind:?}): {message}")]
    Transport { kind: TransportKind, message: String },

    /// Store's current status no longer matches the expectation
    #[error("Conflict on order {order_id}: expected {expected}, found {actual:?}")]
    Conflict {
        order_id: String,
        expected: OrderStatus,
        actual: Option<OrderStatus>,
    },

    /// Missing or malformed setting
    #[error("Configuration error: {0}")]
    Config(String),
}

impl EngineError {
    pub fn transport(kind: TransportKind, message: impl Into<String>) -> Self {
        EngineError::Transport {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::transport(TransportKind::Network, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::transport(TransportKind::Timeout, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::transport(TransportKind::Server, message)
    }

    pub fn feed(message: impl Into<String>) -> Self {
        Self::transport(TransportKind::Feed, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        EngineError::Config(message.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, EngineError::Validation(_))
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, EngineError::Transport { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, EngineError::Conflict { .. })
    }

    /// Map to the shared error code
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::Validation(ValidationError::UnknownOrder(_)) => ErrorCode::OrderNotFound,
            EngineError::Validation(ValidationError::Terminal { .. }) => {
                ErrorCode::OrderAlreadyTerminal
            }
            EngineError::Validation(ValidationError::TransitionNotAllowed { .. }) => {
                ErrorCode::InvalidTransition
            }
            EngineError::Validation(ValidationError::InvalidRecord { violations, .. }) => {
                if violations
                    .iter()
                    .any(|v| matches!(v, RecordViolation::TotalMismatch { .. }))
                {
                    ErrorCode::TotalMismatch
                } else {
                    ErrorCode::ValidationFailed
                }
            }
            EngineError::Transport { kind, .. } => match kind {
                TransportKind::Network => ErrorCode::NetworkError,
                TransportKind::Timeout => ErrorCode::Timeout,
                TransportKind::Server | TransportKind::Decode => ErrorCode::StoreUnavailable,
                TransportKind::Feed => ErrorCode::FeedDisconnected,
            },
            EngineError::Conflict { .. } => ErrorCode::StatusConflict,
            EngineError::Config(_) => ErrorCode::ConfigError,
        }
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(e: reqwest::Error) -> Self {
        let kind = if e.is_timeout() {
            TransportKind::Timeout
        } else if e.is_decode() {
            TransportKind::Decode
        } else if e.is_status() {
            TransportKind::Server
        } else {
            TransportKind::Network
        };
        EngineError::transport(kind, e.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::transport(TransportKind::Decode, e.to_string())
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
