//! Error types reported by host engines.

use thiserror::Error;

/// Result type for host operations.
pub type HostResult<T> = Result<T, HostError>;

/// Errors a host engine reports through its error events.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HostError {
    /// A constraint was violated (e.g. creating a store twice).
    #[error("constraint error: {0}")]
    Constraint(String),

    /// Data supplied to the request was unusable (bad key, missing key).
    #[error("data error: {0}")]
    Data(String),

    /// The named store or database does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A write was issued in a read-only transaction.
    #[error("read-only transaction: {0}")]
    ReadOnly(String),

    /// The object is in the wrong state for the request (e.g. closed).
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The transaction no longer accepts requests.
    #[error("transaction inactive: {0}")]
    Inactive(String),

    /// The requested version is lower than the stored one.
    #[error("version error: requested {requested}, current {current}")]
    Version {
        /// Version that was asked for.
        requested: u32,
        /// Version already on disk.
        current: u32,
    },

    /// The transaction was aborted.
    #[error("transaction aborted: {0}")]
    Aborted(String),

    /// Exception raised by a browser engine, passed through by name.
    #[error("{name}: {message}")]
    Dom {
        /// Exception name, e.g. `QuotaExceededError`.
        name: String,
        /// Exception message.
        message: String,
    },
}

impl HostError {
    /// Creates a data error.
    pub fn data(message: impl Into<String>) -> Self {
        Self::Data(message.into())
    }

    /// Creates a not found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Creates an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    /// Creates an inactive transaction error.
    pub fn inactive(message: impl Into<String>) -> Self {
        Self::Inactive(message.into())
    }

    /// Creates an aborted error.
    pub fn aborted(message: impl Into<String>) -> Self {
        Self::Aborted(message.into())
    }
}

impl From<idbkv_codec::CodecError> for HostError {
    fn from(err: idbkv_codec::CodecError) -> Self {
        HostError::Data(err.to_string())
    }
}
