//! # Error Handling
//!
//! Error types for the call record engine.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                     │
//! │  │                                                                      │
//! │  ├── Core Errors                                                       │
//! │  │   ├── NotInitialized        - Engine not initialized                │
//! │  │   └── AlreadyInitialized    - Engine already initialized            │
//! │  │                                                                      │
//! │  ├── Storage Errors                                                    │
//! │  │   ├── StorageCorrupted      - Unreadable column value               │
//! │  │   └── DatabaseError         - SQLite failure                        │
//! │  │                                                                      │
//! │  ├── Call Record Errors                                                │
//! │  │   ├── CallStatusMismatch    - Status variant vs. call type          │
//! │  │   ├── ThreadNotFound        - Thread row does not exist             │
//! │  │   ├── ThreadHasCallRecords  - Thread still referenced               │
//! │  │   └── InteractionNotFound   - Interaction row does not exist        │
//! │  │                                                                      │
//! │  └── Internal Errors                                                   │
//! │      ├── Internal              - Should not happen                     │
//! │      ├── SerializationError    - Encoding failed                       │
//! │      └── DeserializationError  - Decoding failed                       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## What is NOT an error
//!
//! Disallowed status transitions, tombstoned calls, missing records and
//! sync messages describing impossible combinations all arrive during
//! normal operation when events are replayed or reordered. Those paths
//! return `Ok` and log; they never produce an `Error`.

use thiserror::Error;

use crate::calls::{CallStatus, CallType};

/// Result type alias for call record operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the call record engine
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Core Lifecycle Errors (100-199)
    // ========================================================================

    /// Engine has not been initialized
    #[error("Call record engine has not been initialized. Call CallRecordEngine::initialize() first.")]
    NotInitialized,

    /// Engine has already been initialized
    #[error("Call record engine has already been initialized.")]
    AlreadyInitialized,

    // ========================================================================
    // Storage Errors (400-499)
    // ========================================================================

    /// A stored value could not be decoded
    #[error("Data corruption detected: {0}")]
    StorageCorrupted(String),

    /// Database error
    #[error("Database error: {0}")]
    DatabaseError(String),

    // ========================================================================
    // Call Record Errors (800-899)
    // ========================================================================

    /// A call status variant does not match the call's class
    #[error("Call status {status:?} is not valid for call type {call_type:?}")]
    CallStatusMismatch {
        /// The call type of the record
        call_type: CallType,
        /// The offending status
        status: CallStatus,
    },

    /// The referenced thread does not exist
    #[error("Thread not found: {0}")]
    ThreadNotFound(i64),

    /// The thread is still referenced by call records or tombstones
    #[error("Thread {0} still has call records; merge or delete them first")]
    ThreadHasCallRecords(i64),

    /// The referenced interaction does not exist
    #[error("Interaction not found: {0}")]
    InteractionNotFound(i64),

    // ========================================================================
    // Internal Errors (900-999)
    // ========================================================================

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

impl Error {
    /// Get the numeric error code
    ///
    /// Error codes are organized by category:
    /// - 100-199: Core lifecycle
    /// - 400-499: Storage
    /// - 800-899: Call records
    /// - 900-999: Internal
    pub fn code(&self) -> i32 {
        match self {
            // Core (100-199)
            Error::NotInitialized => 100,
            Error::AlreadyInitialized => 101,

            // Storage (400-499)
            Error::StorageCorrupted(_) => 404,
            Error::DatabaseError(_) => 405,

            // Call records (800-899)
            Error::CallStatusMismatch { .. } => 800,
            Error::ThreadNotFound(_) => 801,
            Error::ThreadHasCallRecords(_) => 802,
            Error::InteractionNotFound(_) => 803,

            // Internal (900-999)
            Error::Internal(_) => 900,
            Error::SerializationError(_) => 902,
            Error::DeserializationError(_) => 903,
        }
    }

    /// Check if this error indicates a caller bug rather than a storage
    /// failure. These should never show up in correct production flows.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Error::CallStatusMismatch { .. }
                | Error::ThreadHasCallRecords(_)
                | Error::Internal(_)
        )
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================
