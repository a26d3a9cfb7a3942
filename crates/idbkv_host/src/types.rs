//! Plain types shared by the host contract.

use std::fmt;

/// Intent of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionMode {
    /// Reads only.
    ReadOnly,
    /// Reads and writes.
    ReadWrite,
}

impl fmt::Display for TransactionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransactionMode::ReadOnly => "readonly",
            TransactionMode::ReadWrite => "readwrite",
        })
    }
}

/// Order in which a cursor walks a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CursorDirection {
    /// Ascending key order.
    #[default]
    Next,
    /// Descending key order.
    Prev,
}

/// How a store derives the keys of its records.
///
/// With a `key_path` the key lives inside the value ("in-line" keys);
/// without one the caller passes it next to the value. `auto_increment`
/// gives the store a key generator that fills in missing keys.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyOptions {
    /// Dotted path of the key inside each value.
    pub key_path: Option<String>,
    /// Whether the store generates integer keys.
    pub auto_increment: bool,
}

impl KeyOptions {
    /// Out-of-line keys, no generator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the in-line key path.
    #[must_use]
    pub fn key_path(mut self, path: impl Into<String>) -> Self {
        self.key_path = Some(path.into());
        self
    }

    /// Enables or disables the key generator.
    #[must_use]
    pub const fn auto_increment(mut self, value: bool) -> Self {
        self.auto_increment = value;
        self
    }
}

/// Versions involved in an upgrade or version-change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionChange {
    /// Version currently on disk (0 for a database that does not exist yet).
    pub old_version: u32,
    /// Version being requested.
    pub new_version: u32,
}
