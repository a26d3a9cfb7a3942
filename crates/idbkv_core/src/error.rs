//! Error types for the idbkv handle.

use idbkv_codec::Key;
use idbkv_host::HostError;
use std::fmt;
use thiserror::Error;

/// Result type for handle operations.
pub type KvResult<T> = Result<T, KvError>;

/// The operation an [`KvError::OperationFailed`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Write of one record.
    Put,
    /// Read of one record.
    Get,
    /// Removal of a key or range.
    Delete,
    /// Cursor walk over a store.
    Enumerate,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Put => "put",
            Operation::Get => "get",
            Operation::Delete => "delete",
            Operation::Enumerate => "enumerate",
        })
    }
}

/// Tag of a [`KvError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No live connection.
    NotInitialized,
    /// No store selected.
    StoreNotSelected,
    /// Store name absent from the schema.
    StoreNotFound,
    /// The host failed to open or upgrade the database.
    OpenFailed,
    /// Another session blocks the upgrade.
    OpenBlocked,
    /// A request or its transaction failed.
    OperationFailed,
}

/// Errors surfaced by [`crate::Database`] and [`crate::Store`].
#[derive(Debug, Error)]
pub enum KvError {
    /// Operation attempted with no live connection.
    #[error("database {database} is not initialized; open it before any operation")]
    NotInitialized {
        /// Database name.
        database: String,
    },

    /// Operation attempted with no store selected.
    #[error("no store selected in database {database}; call use_store() first")]
    StoreNotSelected {
        /// Database name.
        database: String,
    },

    /// Store name absent from the connection's schema.
    #[error("store {store} does not exist in database {database}")]
    StoreNotFound {
        /// Database name.
        database: String,
        /// Requested store.
        store: String,
    },

    /// The host reported an error opening or upgrading the database.
    #[error("error opening database {database}: {reason}")]
    OpenFailed {
        /// Database name.
        database: String,
        /// What went wrong.
        reason: String,
        /// Host error, when the host reported one.
        #[source]
        source: Option<HostError>,
    },

    /// Another live session keeps the upgrade from starting.
    #[error("database {database} is blocked; close other sessions accessing it and retry")]
    OpenBlocked {
        /// Database name.
        database: String,
    },

    /// A request or its enclosing transaction failed.
    #[error("{operation} failed in store '{store}'{}: {reason}", key_suffix(.key))]
    OperationFailed {
        /// Which operation failed.
        operation: Operation,
        /// Store the operation targeted.
        store: String,
        /// Key involved, when known.
        key: Option<Key>,
        /// What went wrong.
        reason: String,
    },
}

fn key_suffix(key: &Option<Key>) -> String {
    key.as_ref().map(|k| format!(" for key {k}")).unwrap_or_default()
}

impl KvError {
    /// Creates a not initialized error.
    pub fn not_initialized(database: impl Into<String>) -> Self {
        Self::NotInitialized {
            database: database.into(),
        }
    }

    /// Creates a store not selected error.
    pub fn store_not_selected(database: impl Into<String>) -> Self {
        Self::StoreNotSelected {
            database: database.into(),
        }
    }

    /// Creates a store not found error.
    pub fn store_not_found(database: impl Into<String>, store: impl Into<String>) -> Self {
        Self::StoreNotFound {
            database: database.into(),
            store: store.into(),
        }
    }

    /// Creates an open failed error from a host error.
    pub fn open_failed(database: impl Into<String>, source: HostError) -> Self {
        Self::OpenFailed {
            database: database.into(),
            reason: source.to_string(),
            source: Some(source),
        }
    }

    /// Creates an open failed error without a host error.
    pub fn open_failed_with(database: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::OpenFailed {
            database: database.into(),
            reason: reason.into(),
            source: None,
        }
    }

    /// Creates an open blocked error.
    pub fn open_blocked(database: impl Into<String>) -> Self {
        Self::OpenBlocked {
            database: database.into(),
        }
    }

    /// The tag of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotInitialized { .. } => ErrorKind::NotInitialized,
            Self::StoreNotSelected { .. } => ErrorKind::StoreNotSelected,
            Self::StoreNotFound { .. } => ErrorKind::StoreNotFound,
            Self::OpenFailed { .. } => ErrorKind::OpenFailed,
            Self::OpenBlocked { .. } => ErrorKind::OpenBlocked,
            Self::OperationFailed { .. } => ErrorKind::OperationFailed,
        }
    }

    /// Whether the error is a programming or configuration mistake (wrong
    /// call order, unknown store) rather than an environment condition.
    #[must_use]
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NotInitialized | ErrorKind::StoreNotSelected | ErrorKind::StoreNotFound
        )
    }

    /// The key carried by an operation failure.
    #[must_use]
    pub fn key(&self) -> Option<&Key> {
        match self {
            Self::OperationFailed { key, .. } => key.as_ref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_failed_message_includes_key_when_known() {
        let err = KvError::OperationFailed {
            operation: Operation::Put,
            store: "items".into(),
            key: Some(Key::from("a")),
            reason: "data error".into(),
        };
        assert_eq!(
            err.to_string(),
            "put failed in store 'items' for key \"a\": data error"
        );

        let err = KvError::OperationFailed {
            operation: Operation::Enumerate,
            store: "items".into(),
            key: None,
            reason: "boom".into(),
        };
        assert_eq!(err.to_string(), "enumerate failed in store 'items': boom");
    }

    #[test]
    fn kinds_and_usage_classification() {
        assert!(KvError::not_initialized("db").is_usage_error());
        assert!(KvError::store_not_selected("db").is_usage_error());
        assert!(KvError::store_not_found("db", "x").is_usage_error());
        assert!(!KvError::open_blocked("db").is_usage_error());
        assert_eq!(
            KvError::open_failed("db", HostError::data("bad")).kind(),
            ErrorKind::OpenFailed
        );
    }

    #[test]
    fn open_failed_keeps_host_source() {
        use std::error::Error as _;
        let err = KvError::open_failed("db", HostError::invalid_state("gone"));
        assert!(err.source().is_some());
        assert!(err.to_string().contains("database db"));
        assert!(KvError::open_failed_with("db", "why").source().is_none());
    }
}
