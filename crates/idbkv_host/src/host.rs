//! The host contract.
//!
//! A host is an asynchronous, transactional object store outside the
//! handle's control. It reports every outcome through events; each event is
//! delivered by invoking a callback handed over with the request. A callback
//! fires at most once, except a cursor's success callback which fires once
//! per step.
//!
//! # Invariants
//!
//! - Request callbacks of a transaction fire before its completion or error
//!   callback.
//! - A transaction fires exactly one of `on_complete` or `on_error`.
//! - An open request fires `on_upgrade` (when the version grows) before
//!   `on_success`; `on_blocked` may fire first and the request stays pending.
//! - Hosts never call back while holding internal borrows, so callbacks may
//!   re-enter the host.

use crate::error::{HostError, HostResult};
use crate::types::{CursorDirection, KeyOptions, TransactionMode, VersionChange};
use idbkv_codec::{Key, KeyRange, Query, Value};

/// A single-shot event callback.
pub type Callback<T> = Box<dyn FnOnce(T)>;

/// Upgrade callback: edits the schema while the version changes.
pub type UpgradeCallback = Box<dyn FnOnce(&mut dyn SchemaEditor, VersionChange) -> HostResult<()>>;

/// Version-change notification sent to live connections.
pub type VersionChangeHandler = Box<dyn FnMut(VersionChange)>;

/// Cursor step callback. `None` means the cursor is exhausted.
pub type CursorStep = Box<dyn FnMut(Option<&mut dyn HostCursor>)>;

/// Events of an open request.
pub struct OpenCallbacks<C> {
    /// Fired when the requested version exceeds the stored one.
    pub on_upgrade: UpgradeCallback,
    /// Fired with the new connection.
    pub on_success: Callback<C>,
    /// Fired when the open or its upgrade fails.
    pub on_error: Callback<HostError>,
    /// Fired when other connections keep the upgrade from starting.
    pub on_blocked: Callback<VersionChange>,
}

/// Events of a single request.
pub struct RequestCallbacks<T> {
    /// Fired with the request's result.
    pub on_success: Callback<T>,
    /// Fired when the request fails.
    pub on_error: Callback<HostError>,
}

impl<T> RequestCallbacks<T> {
    /// Bundles a success and an error callback.
    pub fn new(
        on_success: impl FnOnce(T) + 'static,
        on_error: impl FnOnce(HostError) + 'static,
    ) -> Self {
        Self {
            on_success: Box::new(on_success),
            on_error: Box::new(on_error),
        }
    }
}

/// Events of a cursor request.
pub struct CursorCallbacks {
    /// Fired once per position, then once with `None` at the end.
    pub on_success: CursorStep,
    /// Fired when the cursor fails.
    pub on_error: Callback<HostError>,
}

impl CursorCallbacks {
    /// Bundles a step and an error callback.
    pub fn new(
        on_success: impl FnMut(Option<&mut dyn HostCursor>) + 'static,
        on_error: impl FnOnce(HostError) + 'static,
    ) -> Self {
        Self {
            on_success: Box::new(on_success),
            on_error: Box::new(on_error),
        }
    }
}

/// Events of a transaction, independent of its requests.
pub struct TransactionCallbacks {
    /// Fired once every request succeeded and the changes are visible.
    pub on_complete: Callback<()>,
    /// Fired when the transaction fails or aborts.
    pub on_error: Callback<HostError>,
}

impl TransactionCallbacks {
    /// Bundles a completion and an error callback.
    pub fn new(
        on_complete: impl FnOnce(()) + 'static,
        on_error: impl FnOnce(HostError) + 'static,
    ) -> Self {
        Self {
            on_complete: Box::new(on_complete),
            on_error: Box::new(on_error),
        }
    }
}

/// Entry point of a host: opens versioned databases by name.
pub trait HostFactory {
    /// Live connection type.
    type Connection: HostConnection;

    /// Requests a connection to `name` at `version`.
    ///
    /// Outcomes arrive through `callbacks`.
    fn open(&self, name: &str, version: u32, callbacks: OpenCallbacks<Self::Connection>);
}

/// A live connection to one database.
pub trait HostConnection {
    /// Transaction type.
    type Transaction: HostTransaction;

    /// Database name.
    fn name(&self) -> String;

    /// Version the connection was opened at.
    fn version(&self) -> u32;

    /// Names of the stores in the database.
    fn store_names(&self) -> Vec<String>;

    /// Starts a transaction over one store.
    ///
    /// # Errors
    ///
    /// Fails synchronously if the store does not exist or the connection is
    /// closed.
    fn transaction(
        &self,
        store: &str,
        mode: TransactionMode,
        callbacks: TransactionCallbacks,
    ) -> HostResult<Self::Transaction>;

    /// Installs the handler called when another session asks for a newer
    /// version.
    fn on_version_change(&self, handler: VersionChangeHandler);

    /// Closes the connection. Fire-and-forget.
    fn close(&self);
}

/// A transaction in progress.
pub trait HostTransaction {
    /// Object store type.
    type Store: HostObjectStore;

    /// Returns the store the transaction is scoped to.
    ///
    /// # Errors
    ///
    /// Fails if `name` is outside the transaction's scope.
    fn object_store(&self, name: &str) -> HostResult<Self::Store>;

    /// Signals that no more requests follow.
    ///
    /// A cursor opened in the transaction cannot move past its current
    /// record afterwards. Cursor transactions are left to finish on their
    /// own when dropped.
    fn commit(&self);
}

/// Request surface of a store inside a transaction.
pub trait HostObjectStore {
    /// Writes `value`, replacing any record at the same key. Yields the
    /// effective key.
    fn put(&self, value: Value, key: Option<Key>, callbacks: RequestCallbacks<Key>);

    /// Reads the first record matching `query`.
    fn get(&self, query: Query, callbacks: RequestCallbacks<Option<Value>>);

    /// Removes every record matching `query`.
    fn delete(&self, query: Query, callbacks: RequestCallbacks<()>);

    /// Walks the records in `range` in `direction` order.
    fn open_cursor(
        &self,
        range: Option<KeyRange>,
        direction: CursorDirection,
        callbacks: CursorCallbacks,
    );
}

/// A cursor positioned on one record.
pub trait HostCursor {
    /// Key and value at the current position.
    ///
    /// # Errors
    ///
    /// Fails if the host cannot represent the record.
    fn entry(&self) -> HostResult<(Key, Value)>;

    /// Asks for the next position. Without this call the cursor stops.
    ///
    /// # Errors
    ///
    /// Fails once the transaction no longer accepts requests, which is the
    /// case after an explicit [`HostTransaction::commit`].
    fn advance(&mut self) -> HostResult<()>;
}

/// Schema access during an upgrade.
pub trait SchemaEditor {
    /// Names of the existing stores.
    fn store_names(&self) -> Vec<String>;

    /// Whether a store exists.
    fn contains_store(&self, name: &str) -> bool {
        self.store_names().iter().any(|n| n == name)
    }

    /// Creates a store.
    ///
    /// # Errors
    ///
    /// Fails if the store exists or the options are invalid.
    fn create_store(&mut self, name: &str, options: &KeyOptions) -> HostResult<()>;
}
