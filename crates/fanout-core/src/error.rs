//! Error types for fan-out coordination and dispatch

use thiserror::Error;

use crate::types::OperationId;

/// Result type alias using the fan-out Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for fan-out coordination
#[derive(Error, Debug)]
pub enum Error {
    // Contract violations
    #[error("Fan-out {operation_id} over-reported: all {expected} slots already claimed")]
    OverReported {
        operation_id: OperationId,
        expected: usize,
    },

    #[error("Slot {index} out of range for fan-out {operation_id} ({expected} slots)")]
    SlotOutOfRange {
        operation_id: OperationId,
        index: usize,
        expected: usize,
    },

    #[error("Slot {index} already reported for fan-out {operation_id}")]
    DuplicateReport {
        operation_id: OperationId,
        index: usize,
    },

    // Dispatch errors
    #[error("Too many fan-outs in flight (limit {limit})")]
    TooManyInFlight { limit: usize },

    #[error("Dispatch runtime unavailable: {message}")]
    RuntimeUnavailable { message: String },

    // Timeout errors
    #[error("Operation timeout: {operation} after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    // Configuration errors
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Returns true if this error means the reporter broke the fan-out contract
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Error::OverReported { .. } | Error::SlotOutOfRange { .. } | Error::DuplicateReport { .. }
        )
    }

    /// Returns true if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::TooManyInFlight { .. } | Error::Timeout { .. })
    }

    /// Returns a retry delay hint in milliseconds, if applicable
    pub fn retry_delay_hint_ms(&self) -> Option<u64> {
        match self {
            Error::TooManyInFlight { .. } => Some(50),
            Error::Timeout { .. } => Some(1000),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
