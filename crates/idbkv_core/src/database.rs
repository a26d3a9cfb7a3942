//! The database handle.

use crate::config::{Config, VersionChangePolicy};
use crate::descriptor::{DatabaseDescriptor, StoreDescriptor};
use crate::error::{KvError, KvResult};
use crate::settle;
use crate::state::{ConnectionSlot, ConnectionState, OpenAttempt};
use crate::store::Store;
use idbkv_codec::{Key, Query};
use idbkv_host::{
    CursorDirection, HostConnection, HostError, HostFactory, OpenCallbacks, SchemaEditor,
    VersionChange,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::{debug, info, warn};

/// How an open request ended.
enum OpenOutcome<C> {
    Connected(C),
    Failed(HostError),
    Blocked,
}

/// A handle on one versioned database.
///
/// The handle owns at most one live connection. [`Database::open`] creates
/// the declared stores on first open or version increase and is a no-op
/// while the connection is live. Operations run against the store picked
/// with [`Database::use_store`], or against a [`Store`] obtained from
/// [`Database::store`].
///
/// Dropping the handle closes its connection.
///
/// # Example
///
/// ```rust
/// use idbkv_core::{Database, DatabaseDescriptor, MemoryHost};
///
/// # tokio_test_block_on(async {
/// let mut db = Database::new(MemoryHost::new(), DatabaseDescriptor::default());
/// db.open().await?;
/// db.use_store("store")?;
///
/// db.set("greeting", &"hello").await?;
/// let greeting: Option<String> = db.get("greeting").await?;
/// assert_eq!(greeting.as_deref(), Some("hello"));
/// # Ok::<(), idbkv_core::KvError>(())
/// # }).unwrap();
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
/// # }
/// ```
pub struct Database<H: HostFactory> {
    host: H,
    descriptor: DatabaseDescriptor,
    config: Config,
    slot: Rc<ConnectionSlot<H::Connection>>,
    selected: Option<String>,
}

impl<H: HostFactory> fmt::Debug for Database<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("descriptor", &self.descriptor)
            .field("state", &self.slot.state())
            .field("selected", &self.selected)
            .finish()
    }
}

impl<H: HostFactory> Database<H>
where
    H::Connection: 'static,
{
    /// Creates a closed handle with the default configuration.
    pub fn new(host: H, descriptor: DatabaseDescriptor) -> Self {
        Self::with_config(host, descriptor, Config::default())
    }

    /// Creates a closed handle.
    pub fn with_config(host: H, descriptor: DatabaseDescriptor, config: Config) -> Self {
        let slot = Rc::new(ConnectionSlot::new(descriptor.name.clone()));
        Self {
            host,
            descriptor,
            config,
            slot,
            selected: None,
        }
    }

    /// Database name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Requested schema version.
    #[must_use]
    pub fn version(&self) -> u32 {
        self.descriptor.version
    }

    /// The descriptor the handle was built with.
    #[must_use]
    pub fn descriptor(&self) -> &DatabaseDescriptor {
        &self.descriptor
    }

    /// The handle's configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.slot.state()
    }

    /// Whether a connection is live.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.slot.connection().is_some()
    }

    /// The store picked by [`Database::use_store`], if any.
    #[must_use]
    pub fn selected_store(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Names of the stores in the open database.
    ///
    /// # Errors
    ///
    /// [`KvError::NotInitialized`] without a live connection.
    pub fn store_names(&self) -> KvResult<Vec<String>> {
        Ok(self.connection()?.store_names())
    }

    fn connection(&self) -> KvResult<Rc<H::Connection>> {
        self.slot
            .connection()
            .ok_or_else(|| KvError::not_initialized(self.name()))
    }

    /// Opens the connection, creating missing stores if the version grew.
    ///
    /// Resolves immediately if the connection is already live.
    ///
    /// # Errors
    ///
    /// - [`KvError::OpenFailed`] if the version is 0 or the host fails to
    ///   open or upgrade the database
    /// - [`KvError::OpenBlocked`] if another session keeps the upgrade from
    ///   starting; close it and call `open` again
    pub async fn open(&mut self) -> KvResult<()> {
        if self.is_open() {
            debug!(database = self.name(), "already open");
            return Ok(());
        }
        let name = self.descriptor.name.clone();
        let version = self.descriptor.version;
        if version == 0 {
            return Err(KvError::open_failed_with(name, "version must be at least 1"));
        }

        debug!(database = %name, version, "opening");
        let _attempt = OpenAttempt::start(Rc::clone(&self.slot));

        let (settle, pending) = settle::channel::<OpenOutcome<H::Connection>>();
        let callbacks = OpenCallbacks {
            on_upgrade: {
                let settle = settle.clone();
                let slot = Rc::downgrade(&self.slot);
                let stores = self.descriptor.stores.clone();
                let name = name.clone();
                Box::new(move |schema: &mut dyn SchemaEditor, change: VersionChange| {
                    // A parked open resumed after the call settled or was
                    // abandoned still upgrades the schema, but no longer
                    // owns the slot.
                    if !settle.is_settled() && !settle.is_canceled() {
                        if let Some(slot) = slot.upgrade() {
                            slot.set_state(ConnectionState::Upgrading);
                        }
                    }
                    debug!(
                        database = %name,
                        old_version = change.old_version,
                        new_version = change.new_version,
                        "upgrading"
                    );
                    create_missing_stores(&name, schema, &stores)
                })
            },
            on_success: {
                let settle = settle.clone();
                let name = name.clone();
                Box::new(move |connection: H::Connection| {
                    if let Err(OpenOutcome::Connected(stray)) =
                        settle.settle(OpenOutcome::Connected(connection))
                    {
                        warn!(
                            database = %name,
                            "closing connection that opened after the call ended"
                        );
                        stray.close();
                    }
                })
            },
            on_error: {
                let settle = settle.clone();
                Box::new(move |e| {
                    let _ = settle.settle(OpenOutcome::Failed(e));
                })
            },
            on_blocked: {
                let name = name.clone();
                Box::new(move |change: VersionChange| {
                    warn!(
                        database = %name,
                        old_version = change.old_version,
                        new_version = change.new_version,
                        "open blocked by another connection"
                    );
                    let _ = settle.settle(OpenOutcome::Blocked);
                })
            },
        };
        self.host.open(&name, version, callbacks);

        let outcome = pending.wait().await;
        match outcome {
            Ok(OpenOutcome::Connected(connection)) => {
                let connection = Rc::new(connection);
                self.watch_version_change(&connection);
                self.slot.install(connection);
                debug!(database = %name, version, "open");
                Ok(())
            }
            Ok(OpenOutcome::Failed(e)) => Err(KvError::open_failed(name, e)),
            Ok(OpenOutcome::Blocked) => Err(KvError::open_blocked(name)),
            Err(settle::Dropped) => Err(KvError::open_failed_with(
                name,
                "open request dropped by the host",
            )),
        }
    }

    fn watch_version_change(&self, connection: &H::Connection) {
        let policy = self.config.version_change;
        let slot: Weak<ConnectionSlot<H::Connection>> = Rc::downgrade(&self.slot);
        let name = self.descriptor.name.clone();
        connection.on_version_change(Box::new(move |change: VersionChange| {
            match policy {
                VersionChangePolicy::Keep => {
                    debug!(
                        database = %name,
                        new_version = change.new_version,
                        "version change requested; keeping connection"
                    );
                }
                VersionChangePolicy::Close => {
                    let Some(connection) = slot.upgrade().and_then(|slot| slot.take()) else {
                        return;
                    };
                    info!(
                        database = %name,
                        new_version = change.new_version,
                        "closing connection for version change"
                    );
                    connection.close();
                }
            }
        }));
    }

    /// Closes the connection. A no-op when already closed.
    pub fn close(&mut self) {
        if let Some(connection) = self.slot.take() {
            debug!(database = self.name(), "closing");
            connection.close();
        }
    }

    /// Selects the store used by the handle's own operations.
    ///
    /// Takes `&mut self`, so the selection cannot change while operations
    /// borrowed from the handle are in flight.
    ///
    /// # Errors
    ///
    /// [`KvError::NotInitialized`] without a live connection and
    /// [`KvError::StoreNotFound`] if the database has no such store.
    pub fn use_store(&mut self, name: &str) -> KvResult<&mut Self> {
        self.check_store(name)?;
        self.selected = Some(name.to_string());
        Ok(self)
    }

    /// Returns an accessor bound to `name`, independent of the selection.
    ///
    /// # Errors
    ///
    /// As [`Database::use_store`].
    pub fn store(&self, name: &str) -> KvResult<Store<H::Connection>> {
        self.check_store(name)?;
        Ok(Store::new(
            Rc::clone(&self.slot),
            name.to_string(),
            self.config.clone(),
        ))
    }

    fn check_store(&self, name: &str) -> KvResult<()> {
        let connection = self.connection()?;
        if connection.store_names().iter().any(|n| n == name) {
            Ok(())
        } else {
            Err(KvError::store_not_found(self.name(), name))
        }
    }

    /// The selected store, after the connection check.
    fn selected(&self) -> KvResult<Store<H::Connection>> {
        self.connection()?;
        let name = self
            .selected
            .clone()
            .ok_or_else(|| KvError::store_not_selected(self.name()))?;
        Ok(Store::new(Rc::clone(&self.slot), name, self.config.clone()))
    }

    /// [`Store::put`] on the selected store.
    ///
    /// # Errors
    ///
    /// [`KvError::StoreNotSelected`] before [`Database::use_store`], else as
    /// [`Store::put`].
    pub async fn put<T: Serialize + ?Sized>(&self, value: &T, key: Option<Key>) -> KvResult<Key> {
        self.selected()?.put(value, key).await
    }

    /// [`Store::set`] on the selected store.
    ///
    /// # Errors
    ///
    /// As [`Database::put`].
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: impl Into<Key>,
        value: &T,
    ) -> KvResult<Key> {
        self.selected()?.set(key, value).await
    }

    /// [`Store::get`] on the selected store.
    ///
    /// # Errors
    ///
    /// As [`Database::put`].
    pub async fn get<T: DeserializeOwned>(&self, query: impl Into<Query>) -> KvResult<Option<T>> {
        self.selected()?.get(query).await
    }

    /// [`Store::delete`] on the selected store.
    ///
    /// # Errors
    ///
    /// As [`Database::put`].
    pub async fn delete(&self, query: impl Into<Query>) -> KvResult<()> {
        self.selected()?.delete(query).await
    }

    /// [`Store::enumerate`] on the selected store.
    ///
    /// # Errors
    ///
    /// As [`Database::put`].
    pub async fn enumerate<T: DeserializeOwned>(
        &self,
        limit: usize,
        direction: CursorDirection,
    ) -> KvResult<Vec<(Key, T)>> {
        self.selected()?.enumerate(limit, direction).await
    }

    /// [`Store::entries`] on the selected store.
    ///
    /// # Errors
    ///
    /// As [`Database::put`].
    pub async fn entries<T: DeserializeOwned>(&self) -> KvResult<Vec<(Key, T)>> {
        self.selected()?.entries().await
    }
}

impl<H: HostFactory> Drop for Database<H> {
    fn drop(&mut self) {
        if let Some(connection) = self.slot.take() {
            connection.close();
        }
    }
}

fn create_missing_stores(
    database: &str,
    schema: &mut dyn SchemaEditor,
    stores: &[StoreDescriptor],
) -> Result<(), HostError> {
    for store in stores {
        if schema.contains_store(&store.name) {
            continue;
        }
        schema.create_store(&store.name, &store.key_options)?;
        info!(database, store = %store.name, "created store");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use idbkv_host::MemoryHost;
    use idbkv_testkit::DeferredHost;
    use std::future::Future;
    use std::pin::pin;
    use std::sync::Arc;
    use std::task::{Context, Poll, Wake, Waker};

    struct NoopWaker;

    impl Wake for NoopWaker {
        fn wake(self: Arc<Self>) {}
    }

    #[test]
    fn open_passes_through_opening_and_upgrading() {
        let host = DeferredHost::new(MemoryHost::new());
        let mut db = Database::new(host.clone(), DatabaseDescriptor::default());
        let slot = Rc::clone(&db.slot);
        let waker = Waker::from(Arc::new(NoopWaker));
        let mut cx = Context::from_waker(&waker);

        let mut open = pin!(db.open());
        assert!(open.as_mut().poll(&mut cx).is_pending());
        assert_eq!(slot.state(), ConnectionState::Opening);

        host.release();
        assert_eq!(slot.state(), ConnectionState::Upgrading);

        assert!(matches!(open.as_mut().poll(&mut cx), Poll::Ready(Ok(()))));
        assert_eq!(slot.state(), ConnectionState::Open);
    }

    #[test]
    fn reopen_at_same_version_skips_upgrading() {
        let memory = MemoryHost::new();
        let mut first = Database::new(memory.clone(), DatabaseDescriptor::default());
        let waker = Waker::from(Arc::new(NoopWaker));
        let mut cx = Context::from_waker(&waker);
        assert!(matches!(
            pin!(first.open()).as_mut().poll(&mut cx),
            Poll::Ready(Ok(()))
        ));
        first.close();

        let host = DeferredHost::new(memory);
        let mut db = Database::new(host.clone(), DatabaseDescriptor::default());
        let slot = Rc::clone(&db.slot);
        let mut open = pin!(db.open());
        assert!(open.as_mut().poll(&mut cx).is_pending());
        host.release();
        assert_eq!(slot.state(), ConnectionState::Opening);
        assert!(matches!(open.as_mut().poll(&mut cx), Poll::Ready(Ok(()))));
        assert_eq!(slot.state(), ConnectionState::Open);
    }

    #[test]
    fn dropped_open_resets_state_and_ignores_late_upgrade() {
        let host = DeferredHost::new(MemoryHost::new());
        let mut db = Database::new(host.clone(), DatabaseDescriptor::default());
        let slot = Rc::clone(&db.slot);
        let waker = Waker::from(Arc::new(NoopWaker));
        let mut cx = Context::from_waker(&waker);

        {
            let mut open = pin!(db.open());
            assert!(open.as_mut().poll(&mut cx).is_pending());
            assert_eq!(slot.state(), ConnectionState::Opening);
        }
        assert_eq!(slot.state(), ConnectionState::Closed);

        host.release();
        assert_eq!(slot.state(), ConnectionState::Closed);
        assert!(slot.connection().is_none());
        assert_eq!(host.memory().connection_count("db"), 0);
    }
}
