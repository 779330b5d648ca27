//! Error types for the price oracle.
//!
//! Every rejected operation surfaces one of these kinds unchanged to the
//! caller. None of them are retried by the oracle itself.

use thiserror::Error;

/// Result type alias for oracle operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the price oracle
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // ═══════════════════════════════════════════════════════════════════
    // Registry Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Weight outside the accepted basis-point range
    #[error("Invalid weight {weight}: must be within [{min}, {max}] basis points")]
    InvalidWeight {
        /// Rejected weight
        weight: u64,
        /// Smallest accepted weight
        min: u64,
        /// Largest accepted weight
        max: u64,
    },

    /// Registry already holds the maximum number of sources
    #[error("Too many sources registered: limit is {max}")]
    TooManyRegistered {
        /// Registry capacity
        max: usize,
    },

    /// Operation would leave fewer active sources than the floor
    #[error("Insufficient active sources: {active} active, at least {min} required")]
    InsufficientActiveSources {
        /// Active sources before the operation
        active: usize,
        /// Required floor
        min: usize,
    },

    /// Unknown source identifier
    #[error("Source not found: {0}")]
    NotFound(String),

    /// Source identifier is already registered
    #[error("Source already registered: {0}")]
    SourceAlreadyExists(String),

    // ═══════════════════════════════════════════════════════════════════
    // Aggregation Errors
    // ═══════════════════════════════════════════════════════════════════

    /// No active source produced a fresh sample this round
    #[error("No fresh sources: {excluded} of {active} active sources were excluded")]
    NoFreshSources {
        /// Active sources queried
        active: usize,
        /// Sources excluded (stale, failed or invalid)
        excluded: usize,
    },

    /// Fetching a sample from a source failed
    #[error("Fetch from {source_id} failed: {reason}")]
    FetchFailed {
        /// Source queried
        source_id: String,
        /// Failure description
        reason: String,
    },

    /// Fetching a sample from a source exceeded its timeout
    #[error("Fetch from {source_id} timed out after {timeout_ms}ms")]
    FetchTimeout {
        /// Source queried
        source_id: String,
        /// Timeout applied
        timeout_ms: u64,
    },

    /// Sample violated the collaborator contract
    #[error("Invalid sample from {source_id}: {reason}")]
    InvalidSample {
        /// Source queried
        source_id: String,
        /// Violation description
        reason: String,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Deviation Errors
    // ═══════════════════════════════════════════════════════════════════

    /// No aggregate price has been published yet
    #[error("No aggregate price has been published")]
    NoAggregatePrice,

    // ═══════════════════════════════════════════════════════════════════
    // Authorization Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Caller lacks the required role
    #[error("Not authorized: {0}")]
    Unauthorized(String),

    // ═══════════════════════════════════════════════════════════════════
    // Validation Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Invalid input parameter
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter {
        /// Parameter name
        name: String,
        /// Reason for invalidity
        reason: String,
    },

    /// Overflow in calculation
    #[error("Arithmetic overflow in {operation}")]
    Overflow {
        /// Operation that overflowed
        operation: String,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Infrastructure Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Configuration is invalid or unreadable
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization failed
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Lock acquisition failed
    #[error("Failed to acquire lock")]
    Lock,

    /// Internal error (should not happen in production)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns true if waiting or retrying later may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::NoFreshSources { .. }
                | Error::FetchFailed { .. }
                | Error::FetchTimeout { .. }
                | Error::NoAggregatePrice
                | Error::Lock
        )
    }

    /// Returns true if this is a critical error requiring immediate attention
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Error::Internal(_) | Error::Overflow { .. } | Error::Storage(_)
        )
    }

    /// Returns the error code for external systems
    pub fn code(&self) -> u32 {
        match self {
            // Registry errors: 1xxx
            Error::InvalidWeight { .. } => 1001,
            Error::TooManyRegistered { .. } => 1002,
            Error::InsufficientActiveSources { .. } => 1003,
            Error::NotFound(_) => 1004,
            Error::SourceAlreadyExists(_) => 1005,

            // Aggregation errors: 2xxx
            Error::NoFreshSources { .. } => 2001,
            Error::FetchFailed { .. } => 2002,
            Error::FetchTimeout { .. } => 2003,
            Error::InvalidSample { .. } => 2004,

            // Deviation errors: 3xxx
            Error::NoAggregatePrice => 3001,

            // Authorization errors: 4xxx
            Error::Unauthorized(_) => 4001,

            // Validation errors: 5xxx
            Error::InvalidParameter { .. } => 5001,
            Error::Overflow { .. } => 5002,

            // Infrastructure errors: 9xxx
            Error::Config(_) => 9001,
            Error::Serialization(_) => 9002,
            Error::Deserialization(_) => 9003,
            Error::Storage(_) => 9004,
            Error::Lock => 9005,
            Error::Internal(_) => 9006,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        if e.is_data() || e.is_syntax() || e.is_eof() {
            Error::Deserialization(e.to_string())
        } else {
            Error::Serialization(e.to_string())
        }
    }
}
