//! Unified error codes
//!
//! Error codes are organized by category:
//! - 0xxx: General errors
//! - 4xxx: Order errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// All error codes are represented as u16 values for efficient serialization
/// and cross-language compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Unknown error
    Unknown = 1,
    /// Validation failed
    ValidationFailed = 2,

    // ==================== 4xxx: Order ====================
    /// Order not found
    OrderNotFound = 4001,
    /// Requested status does not follow the current one
    InvalidTransition = 4010,
    /// Order is delivered or cancelled
    OrderAlreadyTerminal = 4011,
    /// total != subtotal + tax + service charge
    TotalMismatch = 4012,
    /// Store rejected a conditional write
    StatusConflict = 4013,

    // ==================== 9xxx: System ====================
    /// Configuration error
    ConfigError = 9005,
    /// Network error
    NetworkError = 9101,
    /// Request timed out
    Timeout = 9102,
    /// Change feed connection lost
    FeedDisconnected = 9103,
    /// Store returned a server error or an undecodable response
    StoreUnavailable = 9104,
}

impl ErrorCode {
    /// Get the numeric code value
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Check if this is a success code
    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }

    /// Get the developer-facing English message for this error code
    pub const fn message(&self) -> &'static str {
        match self {
            ErrorCode::Success => "Operation completed successfully",
            ErrorCode::Unknown => "An unknown error occurred",
            ErrorCode::ValidationFailed => "Validation failed",

            ErrorCode::OrderNotFound => "Order not found",
            ErrorCode::InvalidTransition => "Status transition is not allowed",
            ErrorCode::OrderAlreadyTerminal => "Order is already delivered or cancelled",
            ErrorCode::TotalMismatch => "Order total does not match its parts",
            ErrorCode::StatusConflict => "Order status changed concurrently",

            ErrorCode::ConfigError => "Configuration error",
            ErrorCode::NetworkError => "Network error",
            ErrorCode::Timeout => "Request timed out",
            ErrorCode::FeedDisconnected => "Live updates disconnected",
            ErrorCode::StoreUnavailable => "Order store unavailable",
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error when converting from an invalid u16 to ErrorCode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ErrorCode::Success),
            1 => Ok(ErrorCode::Unknown),
            2 => Ok(ErrorCode::ValidationFailed),

            4001 => Ok(ErrorCode::OrderNotFound),
            4010 => Ok(ErrorCode::InvalidTransition),
            4011 => Ok(ErrorCode::OrderAlreadyTerminal),
            4012 => Ok(ErrorCode::TotalMismatch),
            4013 => Ok(ErrorCode::StatusConflict),

            9005 => Ok(ErrorCode::ConfigError),
            9101 => Ok(ErrorCode::NetworkError),
            9102 => Ok(ErrorCode::Timeout),
            9103 => Ok(ErrorCode::FeedDisconnected),
            9104 => Ok(ErrorCode::StoreUnavailable),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
