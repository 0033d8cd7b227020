//! Order status state machine
//!
//! ```text
//! pending ──▶ confirmed ──▶ preparing ──▶ ready ──▶ delivered
//!    │            │             │           │
//!    └────────────┴─────────────┴───────────┴──────▶ cancelled
//! ```
//!
//! The forward path is strictly linear (no skip-ahead). `cancelled` is
//! reachable from every non-terminal state. Nothing leaves a terminal state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Order status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Preparing,
    Ready,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// All statuses in lifecycle order
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Preparing,
        OrderStatus::Ready,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    /// Single forward-path successor, `None` for terminal states
    pub const fn next_allowed(self) -> Option<OrderStatus> {
        match self {
            OrderStatus::Pending => Some(OrderStatus::Confirmed),
            OrderStatus::Confirmed => Some(OrderStatus::Preparing),
            OrderStatus::Preparing => Some(OrderStatus::Ready),
            OrderStatus::Ready => Some(OrderStatus::Delivered),
            OrderStatus::Delivered | OrderStatus::Cancelled => None,
        }
    }

    /// Whether `requested` may follow `self`
    pub const fn can_transition_to(self, requested: OrderStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if matches!(requested, OrderStatus::Cancelled) {
            return true;
        }
        match self.next_allowed() {
            Some(next) => next as u8 == requested as u8,
            None => false,
        }
    }

    /// No transition is permitted out of a terminal state
    pub const fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Still in the kitchen / front-of-house queue
    pub const fn is_active(self) -> bool {
        !self.is_terminal()
    }

    /// Statuses whose totals count toward realized revenue.
    ///
    /// `ready` is included: revenue is recognized at kitchen completion.
    pub const fn is_fulfilled_for_revenue(self) -> bool {
        matches!(self, OrderStatus::Ready | OrderStatus::Delivered)
    }

    /// Entering this status records the completion instant
    pub const fn records_completion(self) -> bool {
        matches!(self, OrderStatus::Delivered)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Ready => "ready",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown order status: {}", s))
    }
}

/// Forward-path successor of `current`
pub fn next_allowed_status(current: OrderStatus) -> Option<OrderStatus> {
    current.next_allowed()
}

/// True iff `requested` is the forward successor, or `requested` is
/// `cancelled` and `current` is non-terminal
pub fn is_transition_allowed(current: OrderStatus, requested: OrderStatus) -> bool {
    current.can_transition_to(requested)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_allowed_is_none_only_for_terminal() {
        for status in OrderStatus::ALL {
            let next = next_allowed_status(status);
            assert_eq!(next.is_none(), status.is_terminal(), "status {}", status);
            if let Some(next) = next {
                assert_ne!(next, status, "self-loop on {}", status);
            }
        }
    }

    #[test]
    fn test_forward_path() {
        let mut status = OrderStatus::Pending;
        let mut path = vec![status];
        while let Some(next) = status.next_allowed() {
            path.push(next);
            status = next;
        }
        assert_eq!(
            path,
            vec![
                OrderStatus::Pending,
                OrderStatus::Confirmed,
                OrderStatus::Preparing,
                OrderStatus::Ready,
                OrderStatus::Delivered,
            ]
        );
    }

    #[test]
    fn test_cancel_available_from_every_active_status() {
        for status in OrderStatus::ALL.into_iter().filter(|s| s.is_active()) {
            assert!(is_transition_allowed(status, OrderStatus::Cancelled));
        }
    }

    #[test]
    fn test_terminal_states_are_closed() {
        for from in [OrderStatus::Delivered, OrderStatus::Cancelled] {
            for to in OrderStatus::ALL {
                assert!(!is_transition_allowed(from, to), "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_skip_ahead_rejected() {
        assert!(!is_transition_allowed(OrderStatus::Pending, OrderStatus::Preparing));
        assert!(!is_transition_allowed(OrderStatus::Confirmed, OrderStatus::Delivered));
        assert!(!is_transition_allowed(OrderStatus::Ready, OrderStatus::Ready));
        assert!(!is_transition_allowed(OrderStatus::Preparing, OrderStatus::Pending));
    }

    #[test]
    fn test_revenue_policy_counts_ready() {
        assert!(OrderStatus::Ready.is_fulfilled_for_revenue());
        assert!(OrderStatus::Delivered.is_fulfilled_for_revenue());
        assert!(!OrderStatus::Cancelled.is_fulfilled_for_revenue());
        assert!(!OrderStatus::Preparing.is_fulfilled_for_revenue());
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&OrderStatus::Preparing).unwrap();
        assert_eq!(json, "\"preparing\"");
        let parsed: OrderStatus = serde_json::from_str("\"cancelled\"").unwrap();
        assert_eq!(parsed, OrderStatus::Cancelled);
        assert_eq!("ready".parse::<OrderStatus>(), Ok(OrderStatus::Ready));
        assert!("voided".parse::<OrderStatus>().is_err());
    }
}
