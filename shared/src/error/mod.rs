//! Error codes shared by the engine and its adapters
//!
//! # Error Code Ranges
//!
//! - 0xxx: General errors
//! - 4xxx: Order errors
//! - 9xxx: System errors

mod codes;

pub use codes::{ErrorCode, InvalidErrorCode};
