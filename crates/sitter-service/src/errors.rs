//! Sitter error types.
//!
//! State-machine failures are returned as typed results and never cross a
//! group boundary as panics. Each variant maps to a stable error code and a
//! user-facing message; internal details are logged, not shown.

use common::types::UserId;
use thiserror::Error;

/// Error returned by occupancy operations.
///
/// Error codes:
/// - `Conflict`: 1
/// - `NotHolder`: 2
/// - `StoreUnavailable`: 3
/// - `Config`, `Internal`: 4
#[derive(Debug, Error)]
pub enum SitterError {
    /// The group is already held (by anyone, including the caller).
    #[error("Group already held by user {holder}")]
    Conflict { holder: UserId },

    /// The caller does not hold the group.
    #[error("Caller is not the current holder")]
    NotHolder,

    /// The snapshot could not be persisted; the mutation was not applied.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SitterError {
    /// Returns the stable error code for this error.
    pub fn error_code(&self) -> i32 {
        match self {
            SitterError::Conflict { .. } => 1,
            SitterError::NotHolder => 2,
            SitterError::StoreUnavailable(_) => 3,
            SitterError::Config(_) | SitterError::Internal(_) => 4,
        }
    }

    /// Returns a client-safe message (no internal details).
    pub fn client_message(&self) -> String {
        match self {
            SitterError::Conflict { holder } => {
                format!("🔴 Already ON by <@{holder}>. Use `/status` or ask a lead to `/clear_on`.")
            }
            SitterError::NotHolder => "ℹ️ You are not currently ON.".to_string(),
            SitterError::StoreUnavailable(_) => {
                "⚠️ Could not save the change, please try again.".to_string()
            }
            SitterError::Config(_) | SitterError::Internal(_) => {
                "An internal error occurred".to_string()
            }
        }
    }
}

/// Errors from the snapshot store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Persisted snapshot exists but cannot be parsed.
    #[error("Corrupt snapshot: {0}")]
    Corrupt(String),

    /// Snapshot could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The store rejected the operation (used by non-file stores).
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for SitterError {
    fn from(err: StoreError) -> Self {
        SitterError::StoreUnavailable(err.to_string())
    }
}

/// Errors from the delivery collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// The target no longer exists or cannot be written to. Terminates the
    /// broadcast task for the group.
    #[error("Target unreachable: {0}")]
    Unreachable(String),

    /// A single delivery attempt failed (network, rate limit, timeout).
    #[error("Delivery failed: {0}")]
    Failed(String),
}
