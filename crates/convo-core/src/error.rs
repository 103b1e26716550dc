//! Error types for the conversation history engine
//!
//! This module defines all error types returned by the public surface.
//! We use `thiserror` for ergonomic error definitions with automatic Display/Error implementations.

use thiserror::Error;

use crate::message::MessageError;

/// Result type alias for history operations
pub type Result<T> = std::result::Result<T, HistoryError>;

/// Main error type for history operations
///
/// Every variant is returned synchronously to the caller; nothing is retried
/// internally. Batch operations are all-or-nothing, so any of these aborts
/// the whole batch with no partial mutation.
#[derive(Error, Debug)]
pub enum HistoryError {
    /// Malformed input, e.g. a record with an empty identifier
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A record with the same identifier is already stored
    #[error("message with ID {0} already exists")]
    Duplicate(String),

    /// The write would exceed the memory budget even after compaction
    #[error("adding would exceed memory limit: current={current}, incoming={incoming}, limit={limit}")]
    ResourceExhausted {
        /// Bytes currently accounted to live messages
        current: u64,
        /// Estimated size of the rejected write
        incoming: u64,
        /// Configured memory budget in bytes
        limit: u64,
    },

    /// Unknown identifier, or the index pointed at an evicted slot
    #[error("message not found: {0}")]
    NotFound(String),

    /// Range read with bounds outside the live message range
    #[error("invalid range [{start}, {end}) for history of size {size}")]
    OutOfRange {
        /// Requested start offset
        start: usize,
        /// Requested end offset (exclusive)
        end: usize,
        /// Number of live messages at the time of the call
        size: usize,
    },

    /// The record's own validation rejected it
    #[error("invalid message: {0}")]
    Validation(#[from] MessageError),

    /// The record could not be canonically serialized for size estimation
    #[error("failed to encode message: {0}")]
    Encoding(#[from] serde_json::Error),
}
