//! Error types for STRATA operations

use thiserror::Error;

/// Cache-contract violations.
///
/// These are programming errors, not recoverable conditions: an ordinary
/// cache miss is `Ok(None)`, never an error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache is immutable: cannot {operation}")]
    ImmutableCache { operation: String },

    #[error("Cache lock poisoned")]
    LockPoisoned,
}

/// Load-time data-source failures.
///
/// Surfaced by the result loader as a single wrapped error identifying the
/// targets in progress; retry policy belongs to the caller driving the loop.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoadError {
    #[error("Row source failure while {context}: {reason}")]
    RowSource {
        context: String,
        reason: String,
        /// Whether the classifier judged the underlying fault retryable.
        transient: bool,
    },

    #[error("Column {column} out of range for row of width {width}")]
    ColumnOutOfRange { column: usize, width: usize },

    #[error("Type mismatch in column {column}: expected {expected}, got {got}")]
    TypeMismatch {
        column: usize,
        expected: String,
        got: String,
    },

    #[error("Invalid loader construction: {reason}")]
    InvalidLoader { reason: String },

    #[error("Replay exhausted at row {row}")]
    ReplayExhausted { row: usize },

    /// A cache fault observed while registering resolved members.
    #[error("Cache failure during load: {0}")]
    Cache(#[from] CacheError),
}

/// Master error type for all STRATA errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StrataError {
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Load error: {0}")]
    Load(#[from] LoadError),
}

/// Result type alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Result type alias for load operations.
pub type LoadResult<T> = Result<T, LoadError>;

/// Result type alias for STRATA operations.
pub type StrataResult<T> = Result<T, StrataError>;

// =============================================================================
// TESTS
// =============================================================================
