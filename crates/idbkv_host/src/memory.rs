//! In-memory host engine.

use crate::error::{HostError, HostResult};
use crate::host::{
    Callback, CursorCallbacks, HostConnection, HostCursor, HostFactory, HostObjectStore,
    HostTransaction, OpenCallbacks, RequestCallbacks, SchemaEditor, TransactionCallbacks,
    UpgradeCallback, VersionChangeHandler,
};
use crate::types::{CursorDirection, KeyOptions, TransactionMode, VersionChange};
use idbkv_codec::{Key, KeyRange, Query, Value};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use tracing::{debug, trace};

/// A failure the engine injects into the next matching event.
///
/// Each injected fault fires once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The next open request fails before anything happens.
    Open,
    /// The next upgrade aborts.
    Upgrade,
    /// The next put request fails.
    Put,
    /// The next get request fails.
    Get,
    /// The next delete request fails.
    Delete,
    /// The next cursor fails once it has delivered `after` entries.
    Cursor {
        /// Entries delivered before the failure.
        after: usize,
    },
    /// The next transaction whose requests all succeed aborts at commit.
    Commit,
}

/// Counters kept by the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostStats {
    /// Open requests received.
    pub open_requests: usize,
    /// Upgrades run to completion or failure.
    pub upgrades: usize,
    /// Transactions started.
    pub transactions: usize,
}

/// An in-process host engine.
///
/// `MemoryHost` honours the whole host contract: versioned databases with
/// an upgrade phase, blocking between connections, store-scoped
/// transactions whose requests run at commit, key generators, in-line keys
/// and cursors. Clones share one engine, so handles built over clones
/// behave like sessions in different tabs of one browser profile.
///
/// The engine is single-threaded. Each transaction works on a copy of its
/// store and writes it back on completion, which keeps aborts trivial.
///
/// # Example
///
/// ```rust
/// use idbkv_host::{MemoryHost, HostFactory, OpenCallbacks};
///
/// let host = MemoryHost::new();
/// host.open("db", 1, OpenCallbacks {
///     on_upgrade: Box::new(|schema, _| schema.create_store("items", &Default::default())),
///     on_success: Box::new(|_conn| {}),
///     on_error: Box::new(|e| panic!("{e}")),
///     on_blocked: Box::new(|_| {}),
/// });
/// assert_eq!(host.version_of("db"), Some(1));
/// assert_eq!(host.store_names("db"), vec!["items".to_string()]);
/// ```
#[derive(Clone, Default)]
pub struct MemoryHost {
    engine: Rc<RefCell<Engine>>,
}

#[derive(Default)]
struct Engine {
    databases: HashMap<String, DatabaseState>,
    next_connection: u64,
    faults: Vec<Fault>,
    stats: HostStats,
}

impl Engine {
    fn database(&mut self, name: &str) -> &mut DatabaseState {
        self.databases.entry(name.to_string()).or_default()
    }

    fn take_fault(&mut self, wanted: impl Fn(&Fault) -> bool) -> Option<Fault> {
        let index = self.faults.iter().position(wanted)?;
        Some(self.faults.remove(index))
    }
}

#[derive(Default)]
struct DatabaseState {
    version: u32,
    stores: BTreeMap<String, StoreState>,
    connections: Vec<LiveConnection>,
    parked: Vec<PendingOpen>,
}

struct LiveConnection {
    id: u64,
    on_version_change: Option<VersionChangeHandler>,
}

struct PendingOpen {
    version: u32,
    on_upgrade: UpgradeCallback,
    on_success: Callback<MemoryConnection>,
    on_error: Callback<HostError>,
    on_blocked: Option<Callback<VersionChange>>,
}

#[derive(Debug, Clone)]
struct StoreState {
    options: KeyOptions,
    records: BTreeMap<Key, Value>,
    next_key: i64,
}

impl StoreState {
    fn new(options: KeyOptions) -> Self {
        Self {
            options,
            records: BTreeMap::new(),
            next_key: 1,
        }
    }

    fn generate_key(&mut self) -> HostResult<Key> {
        if self.next_key == i64::MAX {
            return Err(HostError::Constraint("key generator exhausted".into()));
        }
        let key = self.next_key;
        self.next_key += 1;
        Ok(Key::Integer(key))
    }

    fn put(&mut self, mut value: Value, key: Option<Key>) -> HostResult<Key> {
        let key_path = self.options.key_path.clone();
        let key = match (key_path, key) {
            (Some(_), Some(_)) => {
                return Err(HostError::data(
                    "store uses in-line keys; an explicit key is not allowed",
                ))
            }
            (Some(path), None) => match value.get_path(&path) {
                Some(inline) => Key::try_from(inline)?,
                None if self.options.auto_increment => {
                    let key = self.generate_key()?;
                    value.set_path(&path, Value::from(key.clone()))?;
                    key
                }
                None => {
                    return Err(HostError::data(format!(
                        "value has no key at path '{path}'"
                    )))
                }
            },
            (None, Some(key)) => key,
            (None, None) if self.options.auto_increment => self.generate_key()?,
            (None, None) => {
                return Err(HostError::data(
                    "no key provided and the store has no key generator",
                ))
            }
        };

        if self.options.auto_increment {
            if let Key::Integer(n) = key {
                if n >= self.next_key {
                    self.next_key = n.saturating_add(1);
                }
            }
        }
        self.records.insert(key.clone(), value);
        Ok(key)
    }

    fn get(&self, query: &Query) -> Option<Value> {
        match query {
            Query::Key(key) => self.records.get(key).cloned(),
            Query::Range(range) => self
                .records
                .range(range.bounds())
                .next()
                .map(|(_, v)| v.clone()),
        }
    }

    fn delete(&mut self, query: &Query) {
        match query {
            Query::Key(key) => {
                self.records.remove(key);
            }
            Query::Range(range) => self.records.retain(|k, _| !range.contains(k)),
        }
    }

    fn scan(&self, range: Option<&KeyRange>, direction: CursorDirection) -> Vec<(Key, Value)> {
        let mut entries: Vec<(Key, Value)> = match range {
            Some(range) => self
                .records
                .range(range.bounds())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            None => self
                .records
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        };
        if direction == CursorDirection::Prev {
            entries.reverse();
        }
        entries
    }
}

impl MemoryHost {
    /// Creates an engine with no databases.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms a fault for the next matching event.
    pub fn inject(&self, fault: Fault) {
        self.engine.borrow_mut().faults.push(fault);
    }

    /// Engine counters.
    #[must_use]
    pub fn stats(&self) -> HostStats {
        self.engine.borrow().stats
    }

    /// Stored version of a database, if it was ever opened.
    #[must_use]
    pub fn version_of(&self, database: &str) -> Option<u32> {
        self.engine
            .borrow()
            .databases
            .get(database)
            .map(|db| db.version)
            .filter(|v| *v > 0)
    }

    /// Number of live connections to a database.
    #[must_use]
    pub fn connection_count(&self, database: &str) -> usize {
        self.engine
            .borrow()
            .databases
            .get(database)
            .map_or(0, |db| db.connections.len())
    }

    /// Store names of a database, in key order.
    #[must_use]
    pub fn store_names(&self, database: &str) -> Vec<String> {
        self.engine
            .borrow()
            .databases
            .get(database)
            .map(|db| db.stores.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of records in a store.
    #[must_use]
    pub fn record_count(&self, database: &str, store: &str) -> Option<usize> {
        self.engine
            .borrow()
            .databases
            .get(database)
            .and_then(|db| db.stores.get(store))
            .map(|s| s.records.len())
    }

    fn process_open(&self, name: &str, mut pending: PendingOpen) {
        let current = self.engine.borrow_mut().database(name).version;

        if pending.version == 0 {
            (pending.on_error)(HostError::data("version must be a positive integer"));
            return;
        }
        if pending.version < current {
            (pending.on_error)(HostError::Version {
                requested: pending.version,
                current,
            });
            return;
        }
        if pending.version == current {
            self.connect(name, pending.version, pending.on_success);
            return;
        }

        let change = VersionChange {
            old_version: current,
            new_version: pending.version,
        };
        if self.connection_count(name) > 0 {
            self.notify_version_change(name, change);
        }
        if self.connection_count(name) > 0 {
            debug!(database = name, ?change, "open blocked by live connections");
            if let Some(on_blocked) = pending.on_blocked.take() {
                on_blocked(change);
            }
            if self.connection_count(name) > 0 {
                self.engine.borrow_mut().database(name).parked.push(pending);
                return;
            }
        }
        self.upgrade(name, pending, change);
    }

    fn upgrade(&self, name: &str, pending: PendingOpen, change: VersionChange) {
        let (fault, existing) = {
            let mut engine = self.engine.borrow_mut();
            engine.stats.upgrades += 1;
            let fault = engine.take_fault(|f| matches!(f, Fault::Upgrade));
            let existing = engine.database(name).stores.keys().cloned().collect();
            (fault, existing)
        };
        if fault.is_some() {
            (pending.on_error)(HostError::aborted("injected upgrade failure"));
            return;
        }

        let mut schema = MemorySchema {
            existing,
            created: Vec::new(),
        };
        if let Err(e) = (pending.on_upgrade)(&mut schema, change) {
            debug!(database = name, error = %e, "upgrade aborted");
            (pending.on_error)(HostError::aborted(format!("upgrade failed: {e}")));
            return;
        }

        {
            let mut engine = self.engine.borrow_mut();
            let db = engine.database(name);
            for (store, options) in schema.created {
                db.stores
                    .entry(store)
                    .or_insert_with(|| StoreState::new(options));
            }
            db.version = change.new_version;
        }
        trace!(database = name, version = change.new_version, "upgrade committed");
        self.connect(name, change.new_version, pending.on_success);
    }

    fn connect(&self, name: &str, version: u32, on_success: Callback<MemoryConnection>) {
        let id = {
            let mut engine = self.engine.borrow_mut();
            engine.next_connection += 1;
            let id = engine.next_connection;
            engine.database(name).connections.push(LiveConnection {
                id,
                on_version_change: None,
            });
            id
        };
        on_success(MemoryConnection {
            engine: Rc::clone(&self.engine),
            name: name.to_string(),
            version,
            id,
            closed: Cell::new(false),
        });
    }

    fn notify_version_change(&self, name: &str, change: VersionChange) {
        let ids: Vec<u64> = self
            .engine
            .borrow_mut()
            .database(name)
            .connections
            .iter()
            .map(|c| c.id)
            .collect();

        for id in ids {
            let handler = self
                .engine
                .borrow_mut()
                .database(name)
                .connections
                .iter_mut()
                .find(|c| c.id == id)
                .and_then(|c| c.on_version_change.take());
            let Some(mut handler) = handler else {
                continue;
            };
            handler(change);
            let mut engine = self.engine.borrow_mut();
            if let Some(conn) = engine
                .database(name)
                .connections
                .iter_mut()
                .find(|c| c.id == id)
            {
                if conn.on_version_change.is_none() {
                    conn.on_version_change = Some(handler);
                }
            }
        }
    }

    fn close_connection(&self, name: &str, id: u64) {
        let resumed = {
            let mut engine = self.engine.borrow_mut();
            let db = engine.database(name);
            db.connections.retain(|c| c.id != id);
            if db.connections.is_empty() {
                std::mem::take(&mut db.parked)
            } else {
                Vec::new()
            }
        };
        for pending in resumed {
            trace!(database = name, version = pending.version, "resuming parked open");
            self.process_open(name, pending);
        }
    }
}

impl HostFactory for MemoryHost {
    type Connection = MemoryConnection;

    fn open(&self, name: &str, version: u32, callbacks: OpenCallbacks<MemoryConnection>) {
        let fault = {
            let mut engine = self.engine.borrow_mut();
            engine.stats.open_requests += 1;
            engine.take_fault(|f| matches!(f, Fault::Open))
        };
        if fault.is_some() {
            (callbacks.on_error)(HostError::invalid_state("injected open failure"));
            return;
        }

        self.process_open(
            name,
            PendingOpen {
                version,
                on_upgrade: callbacks.on_upgrade,
                on_success: callbacks.on_success,
                on_error: callbacks.on_error,
                on_blocked: Some(callbacks.on_blocked),
            },
        );
    }
}

struct MemorySchema {
    existing: Vec<String>,
    created: Vec<(String, KeyOptions)>,
}

impl SchemaEditor for MemorySchema {
    fn store_names(&self) -> Vec<String> {
        self.existing
            .iter()
            .cloned()
            .chain(self.created.iter().map(|(name, _)| name.clone()))
            .collect()
    }

    fn create_store(&mut self, name: &str, options: &KeyOptions) -> HostResult<()> {
        if self.contains_store(name) {
            return Err(HostError::Constraint(format!("store '{name}' already exists")));
        }
        if options.auto_increment && options.key_path.as_deref() == Some("") {
            return Err(HostError::data(
                "a key generator cannot be combined with an empty key path",
            ));
        }
        self.created.push((name.to_string(), options.clone()));
        Ok(())
    }
}

/// A connection to a [`MemoryHost`] database.
///
/// Dropping the connection closes it.
pub struct MemoryConnection {
    engine: Rc<RefCell<Engine>>,
    name: String,
    version: u32,
    id: u64,
    closed: Cell<bool>,
}

impl MemoryConnection {
    /// Whether [`HostConnection::close`] was called.
    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }

    fn host(&self) -> MemoryHost {
        MemoryHost {
            engine: Rc::clone(&self.engine),
        }
    }
}

impl HostConnection for MemoryConnection {
    type Transaction = MemoryTransaction;

    fn name(&self) -> String {
        self.name.clone()
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn store_names(&self) -> Vec<String> {
        self.host().store_names(&self.name)
    }

    fn transaction(
        &self,
        store: &str,
        mode: TransactionMode,
        callbacks: TransactionCallbacks,
    ) -> HostResult<MemoryTransaction> {
        if self.closed.get() {
            return Err(HostError::invalid_state("connection is closed"));
        }
        let mut engine = self.engine.borrow_mut();
        if !engine.database(&self.name).stores.contains_key(store) {
            return Err(HostError::not_found(format!("store '{store}'")));
        }
        engine.stats.transactions += 1;
        Ok(MemoryTransaction {
            state: Rc::new(TxState {
                engine: Rc::clone(&self.engine),
                database: self.name.clone(),
                store: store.to_string(),
                mode,
                callbacks: RefCell::new(Some(callbacks)),
                requests: RefCell::new(Vec::new()),
                committing: Cell::new(false),
                finished: Cell::new(false),
            }),
        })
    }

    fn on_version_change(&self, handler: VersionChangeHandler) {
        let mut engine = self.engine.borrow_mut();
        if let Some(conn) = engine
            .database(&self.name)
            .connections
            .iter_mut()
            .find(|c| c.id == self.id)
        {
            conn.on_version_change = Some(handler);
        }
    }

    fn close(&self) {
        if !self.closed.replace(true) {
            self.host().close_connection(&self.name, self.id);
        }
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.close();
    }
}

enum Request {
    Put {
        value: Value,
        key: Option<Key>,
        callbacks: RequestCallbacks<Key>,
    },
    Get {
        query: Query,
        callbacks: RequestCallbacks<Option<Value>>,
    },
    Delete {
        query: Query,
        callbacks: RequestCallbacks<()>,
    },
    Cursor {
        range: Option<KeyRange>,
        direction: CursorDirection,
        callbacks: CursorCallbacks,
    },
}

impl Request {
    fn fail(self, error: HostError) {
        match self {
            Request::Put { callbacks, .. } => (callbacks.on_error)(error),
            Request::Get { callbacks, .. } => (callbacks.on_error)(error),
            Request::Delete { callbacks, .. } => (callbacks.on_error)(error),
            Request::Cursor { callbacks, .. } => (callbacks.on_error)(error),
        }
    }
}

struct TxState {
    engine: Rc<RefCell<Engine>>,
    database: String,
    store: String,
    mode: TransactionMode,
    callbacks: RefCell<Option<TransactionCallbacks>>,
    requests: RefCell<Vec<Request>>,
    committing: Cell<bool>,
    finished: Cell<bool>,
}

impl TxState {
    fn enqueue(&self, request: Request) {
        if self.finished.get() {
            request.fail(HostError::invalid_state("transaction has finished"));
        } else {
            self.requests.borrow_mut().push(request);
        }
    }

    fn fault(&self, wanted: impl Fn(&Fault) -> bool) -> Option<Fault> {
        self.engine.borrow_mut().take_fault(wanted)
    }

    fn writable(&self) -> HostResult<()> {
        match self.mode {
            TransactionMode::ReadWrite => Ok(()),
            TransactionMode::ReadOnly => Err(HostError::ReadOnly(format!(
                "store '{}' was opened read-only",
                self.store
            ))),
        }
    }

    fn run(&self) {
        if self.finished.replace(true) {
            return;
        }
        let requests = std::mem::take(&mut *self.requests.borrow_mut());
        let callbacks = self.callbacks.borrow_mut().take();
        let working = self
            .engine
            .borrow()
            .databases
            .get(&self.database)
            .and_then(|db| db.stores.get(&self.store))
            .cloned();
        let Some(mut working) = working else {
            let error = HostError::not_found(format!("store '{}'", self.store));
            for request in requests {
                request.fail(error.clone());
            }
            if let Some(callbacks) = callbacks {
                (callbacks.on_error)(error);
            }
            return;
        };

        let mut failure: Option<HostError> = None;
        for request in requests {
            if failure.is_some() {
                request.fail(HostError::aborted("transaction was aborted"));
                continue;
            }
            if let Err(e) = self.execute(&mut working, request) {
                failure = Some(e);
            }
        }
        if failure.is_none() && self.fault(|f| matches!(f, Fault::Commit)).is_some() {
            failure = Some(HostError::aborted("injected commit failure"));
        }

        match failure {
            Some(error) => {
                debug!(
                    database = %self.database,
                    store = %self.store,
                    %error,
                    "transaction aborted"
                );
                if let Some(callbacks) = callbacks {
                    (callbacks.on_error)(error);
                }
            }
            None => {
                if self.mode == TransactionMode::ReadWrite {
                    let mut engine = self.engine.borrow_mut();
                    engine
                        .database(&self.database)
                        .stores
                        .insert(self.store.clone(), working);
                }
                trace!(
                    database = %self.database,
                    store = %self.store,
                    mode = %self.mode,
                    "transaction complete"
                );
                if let Some(callbacks) = callbacks {
                    (callbacks.on_complete)(());
                }
            }
        }
    }

    fn execute(&self, working: &mut StoreState, request: Request) -> HostResult<()> {
        match request {
            Request::Put {
                value,
                key,
                callbacks,
            } => {
                let result = self.writable().and_then(|()| {
                    match self.fault(|f| matches!(f, Fault::Put)) {
                        Some(_) => Err(HostError::aborted("injected put failure")),
                        None => working.put(value, key),
                    }
                });
                match result {
                    Ok(key) => {
                        (callbacks.on_success)(key);
                        Ok(())
                    }
                    Err(e) => {
                        (callbacks.on_error)(e.clone());
                        Err(e)
                    }
                }
            }
            Request::Get { query, callbacks } => {
                if self.fault(|f| matches!(f, Fault::Get)).is_some() {
                    let e = HostError::aborted("injected get failure");
                    (callbacks.on_error)(e.clone());
                    return Err(e);
                }
                (callbacks.on_success)(working.get(&query));
                Ok(())
            }
            Request::Delete { query, callbacks } => {
                let result = self.writable().and_then(|()| {
                    match self.fault(|f| matches!(f, Fault::Delete)) {
                        Some(_) => Err(HostError::aborted("injected delete failure")),
                        None => Ok(()),
                    }
                });
                match result {
                    Ok(()) => {
                        working.delete(&query);
                        (callbacks.on_success)(());
                        Ok(())
                    }
                    Err(e) => {
                        (callbacks.on_error)(e.clone());
                        Err(e)
                    }
                }
            }
            Request::Cursor {
                range,
                direction,
                callbacks,
            } => self.run_cursor(working, range.as_ref(), direction, callbacks),
        }
    }

    fn run_cursor(
        &self,
        working: &StoreState,
        range: Option<&KeyRange>,
        direction: CursorDirection,
        mut callbacks: CursorCallbacks,
    ) -> HostResult<()> {
        let fail_after = match self.fault(|f| matches!(f, Fault::Cursor { .. })) {
            Some(Fault::Cursor { after }) => Some(after),
            _ => None,
        };
        let entries = working.scan(range, direction);
        let total = entries.len();

        for (delivered, (key, value)) in entries.into_iter().enumerate() {
            if fail_after == Some(delivered) {
                let e = HostError::aborted(format!(
                    "injected cursor failure after {delivered} entries"
                ));
                (callbacks.on_error)(e.clone());
                return Err(e);
            }
            let mut cursor = MemoryCursor {
                key,
                value,
                committing: self.committing.get(),
                advanced: false,
            };
            let step: &mut dyn HostCursor = &mut cursor;
            (callbacks.on_success)(Some(step));
            if !cursor.advanced {
                return Ok(());
            }
        }
        if fail_after == Some(total) {
            let e = HostError::aborted(format!("injected cursor failure after {total} entries"));
            (callbacks.on_error)(e.clone());
            return Err(e);
        }
        (callbacks.on_success)(None);
        Ok(())
    }
}

/// A transaction on a [`MemoryHost`] store.
///
/// Requests run when [`HostTransaction::commit`] is called or the
/// transaction is dropped, whichever comes first. After an explicit commit
/// cursors deliver their current record and refuse to advance.
pub struct MemoryTransaction {
    state: Rc<TxState>,
}

impl HostTransaction for MemoryTransaction {
    type Store = MemoryObjectStore;

    fn object_store(&self, name: &str) -> HostResult<MemoryObjectStore> {
        if name != self.state.store {
            return Err(HostError::not_found(format!(
                "store '{name}' is not in the transaction's scope"
            )));
        }
        Ok(MemoryObjectStore {
            state: Rc::clone(&self.state),
        })
    }

    fn commit(&self) {
        self.state.committing.set(true);
        self.state.run();
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        self.state.run();
    }
}

/// Request surface of a [`MemoryTransaction`].
pub struct MemoryObjectStore {
    state: Rc<TxState>,
}

impl HostObjectStore for MemoryObjectStore {
    fn put(&self, value: Value, key: Option<Key>, callbacks: RequestCallbacks<Key>) {
        self.state.enqueue(Request::Put {
            value,
            key,
            callbacks,
        });
    }

    fn get(&self, query: Query, callbacks: RequestCallbacks<Option<Value>>) {
        self.state.enqueue(Request::Get { query, callbacks });
    }

    fn delete(&self, query: Query, callbacks: RequestCallbacks<()>) {
        self.state.enqueue(Request::Delete { query, callbacks });
    }

    fn open_cursor(
        &self,
        range: Option<KeyRange>,
        direction: CursorDirection,
        callbacks: CursorCallbacks,
    ) {
        self.state.enqueue(Request::Cursor {
            range,
            direction,
            callbacks,
        });
    }
}

struct MemoryCursor {
    key: Key,
    value: Value,
    committing: bool,
    advanced: bool,
}

impl HostCursor for MemoryCursor {
    fn entry(&self) -> HostResult<(Key, Value)> {
        Ok((self.key.clone(), self.value.clone()))
    }

    fn advance(&mut self) -> HostResult<()> {
        if self.committing {
            return Err(HostError::inactive("transaction is committing"));
        }
        self.advanced = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Slot<T> = Rc<RefCell<Option<T>>>;

    fn slot<T>() -> Slot<T> {
        Rc::new(RefCell::new(None))
    }

    fn quiet() -> TransactionCallbacks {
        TransactionCallbacks::new(|()| {}, |_| {})
    }

    fn open(
        host: &MemoryHost,
        name: &str,
        version: u32,
        stores: &[(&str, KeyOptions)],
    ) -> Slot<HostResult<MemoryConnection>> {
        let result = slot();
        let stores: Vec<(String, KeyOptions)> = stores
            .iter()
            .map(|(n, o)| ((*n).to_string(), o.clone()))
            .collect();
        let on_success = Rc::clone(&result);
        let on_error = Rc::clone(&result);
        host.open(
            name,
            version,
            OpenCallbacks {
                on_upgrade: Box::new(move |schema, _| {
                    for (store, options) in &stores {
                        if !schema.contains_store(store) {
                            schema.create_store(store, options)?;
                        }
                    }
                    Ok(())
                }),
                on_success: Box::new(move |conn| *on_success.borrow_mut() = Some(Ok(conn))),
                on_error: Box::new(move |e| *on_error.borrow_mut() = Some(Err(e))),
                on_blocked: Box::new(|_| {}),
            },
        );
        result
    }

    fn connected(
        host: &MemoryHost,
        name: &str,
        stores: &[(&str, KeyOptions)],
    ) -> MemoryConnection {
        open(host, name, 1, stores).borrow_mut().take().unwrap().unwrap()
    }

    fn put(
        conn: &MemoryConnection,
        store: &str,
        value: Value,
        key: Option<Key>,
    ) -> HostResult<Key> {
        let result = slot();
        let (ok, err) = (Rc::clone(&result), Rc::clone(&result));
        let txn = conn
            .transaction(store, TransactionMode::ReadWrite, quiet())
            .unwrap();
        txn.object_store(store).unwrap().put(
            value,
            key,
            RequestCallbacks::new(
                move |k| *ok.borrow_mut() = Some(Ok(k)),
                move |e| *err.borrow_mut() = Some(Err(e)),
            ),
        );
        txn.commit();
        let out = result.borrow_mut().take().unwrap();
        out
    }

    fn get(conn: &MemoryConnection, store: &str, query: impl Into<Query>) -> Option<Value> {
        let result = slot();
        let ok = Rc::clone(&result);
        let txn = conn
            .transaction(store, TransactionMode::ReadOnly, quiet())
            .unwrap();
        txn.object_store(store).unwrap().get(
            query.into(),
            RequestCallbacks::new(move |v| *ok.borrow_mut() = Some(v), |e| panic!("{e}")),
        );
        txn.commit();
        let out = result.borrow_mut().take().unwrap();
        out
    }

    fn scan(
        conn: &MemoryConnection,
        store: &str,
        direction: CursorDirection,
        stop_after: usize,
    ) -> Vec<Key> {
        let seen: Rc<RefCell<Vec<Key>>> = Rc::default();
        let sink = Rc::clone(&seen);
        let txn = conn
            .transaction(store, TransactionMode::ReadOnly, quiet())
            .unwrap();
        txn.object_store(store).unwrap().open_cursor(
            None,
            direction,
            CursorCallbacks::new(
                move |cursor| {
                    if let Some(cursor) = cursor {
                        let (key, _) = cursor.entry().unwrap();
                        sink.borrow_mut().push(key);
                        if sink.borrow().len() < stop_after {
                            cursor.advance().unwrap();
                        }
                    }
                },
                |e| panic!("{e}"),
            ),
        );
        drop(txn);
        let out = seen.borrow().clone();
        out
    }

    #[test]
    fn first_open_runs_upgrade_and_creates_stores() {
        let host = MemoryHost::new();
        let conn = connected(&host, "db", &[("items", KeyOptions::new())]);
        assert_eq!(conn.version(), 1);
        assert_eq!(conn.store_names(), vec!["items".to_string()]);
        assert_eq!(host.stats().upgrades, 1);
        assert_eq!(host.connection_count("db"), 1);
    }

    #[test]
    fn same_version_open_skips_upgrade() {
        let host = MemoryHost::new();
        let first = connected(&host, "db", &[("items", KeyOptions::new())]);
        first.close();
        let _second = connected(&host, "db", &[("items", KeyOptions::new())]);
        assert_eq!(host.stats().upgrades, 1);
        assert_eq!(host.stats().open_requests, 2);
    }

    #[test]
    fn lower_version_is_rejected() {
        let host = MemoryHost::new();
        drop(open(&host, "db", 3, &[]));
        let result = open(&host, "db", 2, &[]);
        assert!(matches!(
            result.borrow_mut().take().unwrap(),
            Err(HostError::Version { requested: 2, current: 3 })
        ));
    }

    #[test]
    fn upgrade_error_leaves_schema_untouched() {
        let host = MemoryHost::new();
        let result = slot::<HostError>();
        let sink = Rc::clone(&result);
        host.open(
            "db",
            1,
            OpenCallbacks {
                on_upgrade: Box::new(|schema, _| {
                    schema.create_store("a", &KeyOptions::new())?;
                    schema.create_store("a", &KeyOptions::new())
                }),
                on_success: Box::new(|_| panic!("open must fail")),
                on_error: Box::new(move |e| *sink.borrow_mut() = Some(e)),
                on_blocked: Box::new(|_| {}),
            },
        );
        assert!(matches!(result.borrow().as_ref(), Some(HostError::Aborted(_))));
        assert!(host.store_names("db").is_empty());
        assert_eq!(host.version_of("db"), None);
    }

    #[test]
    fn out_of_line_put_get_delete() {
        let host = MemoryHost::new();
        let conn = connected(&host, "db", &[("items", KeyOptions::new())]);
        let key = put(&conn, "items", Value::from("one"), Some(Key::from("a"))).unwrap();
        assert_eq!(key, Key::from("a"));
        put(&conn, "items", Value::from("two"), Some(Key::from("a"))).unwrap();
        assert_eq!(get(&conn, "items", "a"), Some(Value::from("two")));

        let txn = conn
            .transaction("items", TransactionMode::ReadWrite, quiet())
            .unwrap();
        txn.object_store("items")
            .unwrap()
            .delete(Query::from("a"), RequestCallbacks::new(|()| {}, |e| panic!("{e}")));
        drop(txn);
        assert_eq!(get(&conn, "items", "a"), None);
    }

    #[test]
    fn missing_key_without_generator_is_data_error() {
        let host = MemoryHost::new();
        let conn = connected(&host, "db", &[("items", KeyOptions::new())]);
        assert!(matches!(put(&conn, "items", Value::Null, None), Err(HostError::Data(_))));
        assert_eq!(host.record_count("db", "items"), Some(0));
    }

    #[test]
    fn generator_skips_past_explicit_integer_keys() {
        let host = MemoryHost::new();
        let conn = connected(&host, "db", &[("log", KeyOptions::new().auto_increment(true))]);
        assert_eq!(put(&conn, "log", Value::Null, None).unwrap(), Key::Integer(1));
        let explicit = put(&conn, "log", Value::Null, Some(Key::Integer(10)));
        assert_eq!(explicit.unwrap(), Key::Integer(10));
        assert_eq!(put(&conn, "log", Value::Null, None).unwrap(), Key::Integer(11));
    }

    #[test]
    fn inline_key_path_with_generator_injects_key() {
        let host = MemoryHost::new();
        let options = KeyOptions::new().key_path("id").auto_increment(true);
        let conn = connected(&host, "db", &[("users", options)]);
        let key = put(&conn, "users", Value::object([("name", Value::from("ann"))]), None).unwrap();
        assert_eq!(key, Key::Integer(1));
        let stored = get(&conn, "users", 1).unwrap();
        assert_eq!(stored.get("id"), Some(&Value::Integer(1)));

        let explicit = put(
            &conn,
            "users",
            Value::object([("id", Value::from("x"))]),
            Some(Key::from("x")),
        );
        assert!(matches!(explicit, Err(HostError::Data(_))));
    }

    #[test]
    fn readonly_transaction_rejects_writes() {
        let host = MemoryHost::new();
        let conn = connected(&host, "db", &[("items", KeyOptions::new())]);
        let error = slot();
        let sink = Rc::clone(&error);
        let txn = conn
            .transaction("items", TransactionMode::ReadOnly, quiet())
            .unwrap();
        txn.object_store("items").unwrap().put(
            Value::Null,
            Some(Key::from(1)),
            RequestCallbacks::new(
                |_| panic!("write must fail"),
                move |e| *sink.borrow_mut() = Some(e),
            ),
        );
        txn.commit();
        assert!(matches!(error.borrow().as_ref(), Some(HostError::ReadOnly(_))));
    }

    #[test]
    fn cursor_walks_both_directions_and_stops_on_demand() {
        let host = MemoryHost::new();
        let conn = connected(&host, "db", &[("items", KeyOptions::new())]);
        for k in [3, 1, 2] {
            put(&conn, "items", Value::Integer(k), Some(Key::Integer(k))).unwrap();
        }
        let keys = |ns: &[i64]| ns.iter().copied().map(Key::from).collect::<Vec<_>>();
        assert_eq!(scan(&conn, "items", CursorDirection::Next, 10), keys(&[1, 2, 3]));
        assert_eq!(scan(&conn, "items", CursorDirection::Prev, 10), keys(&[3, 2, 1]));
        assert_eq!(scan(&conn, "items", CursorDirection::Next, 2), keys(&[1, 2]));
    }

    #[test]
    fn failed_request_aborts_the_transaction() {
        let host = MemoryHost::new();
        let conn = connected(&host, "db", &[("items", KeyOptions::new())]);
        host.inject(Fault::Put);
        let outcome = slot();
        let (done, failed) = (Rc::clone(&outcome), Rc::clone(&outcome));
        let txn = conn
            .transaction(
                "items",
                TransactionMode::ReadWrite,
                TransactionCallbacks::new(
                    move |()| *done.borrow_mut() = Some(Ok(())),
                    move |e| *failed.borrow_mut() = Some(Err(e)),
                ),
            )
            .unwrap();
        let store = txn.object_store("items").unwrap();
        store.put(Value::Null, Some(Key::from("a")), RequestCallbacks::new(|_| {}, |_| {}));
        store.put(
            Value::Null,
            Some(Key::from("b")),
            RequestCallbacks::new(|_| panic!("aborted"), |_| {}),
        );
        txn.commit();
        assert!(matches!(outcome.borrow().as_ref(), Some(Err(HostError::Aborted(_)))));
        assert_eq!(host.record_count("db", "items"), Some(0));
    }

    #[test]
    fn commit_fault_discards_successful_writes() {
        let host = MemoryHost::new();
        let conn = connected(&host, "db", &[("items", KeyOptions::new())]);
        host.inject(Fault::Commit);
        assert!(put(&conn, "items", Value::Null, Some(Key::from("a"))).is_ok());
        assert_eq!(host.record_count("db", "items"), Some(0));
    }

    #[test]
    fn upgrade_is_blocked_until_old_connection_closes() {
        let host = MemoryHost::new();
        let old = connected(&host, "db", &[("items", KeyOptions::new())]);
        let notified = Rc::new(Cell::new(0));
        let counter = Rc::clone(&notified);
        old.on_version_change(Box::new(move |_| counter.set(counter.get() + 1)));

        let blocked = Rc::new(Cell::new(false));
        let flag = Rc::clone(&blocked);
        let opened = slot();
        let sink = Rc::clone(&opened);
        host.open(
            "db",
            2,
            OpenCallbacks {
                on_upgrade: Box::new(|schema, change| {
                    assert_eq!(change, VersionChange { old_version: 1, new_version: 2 });
                    schema.create_store("more", &KeyOptions::new())
                }),
                on_success: Box::new(move |conn| *sink.borrow_mut() = Some(conn)),
                on_error: Box::new(|e| panic!("{e}")),
                on_blocked: Box::new(move |_| flag.set(true)),
            },
        );
        assert_eq!(notified.get(), 1);
        assert!(blocked.get());
        assert!(opened.borrow().is_none());

        old.close();
        let new = opened.borrow_mut().take().unwrap();
        assert_eq!(new.version(), 2);
        assert_eq!(host.store_names("db"), vec!["items".to_string(), "more".to_string()]);
    }

    #[test]
    fn version_change_handler_can_close_and_unblock() {
        let host = MemoryHost::new();
        let old = Rc::new(connected(&host, "db", &[]));
        let weak = Rc::downgrade(&old);
        old.on_version_change(Box::new(move |_| {
            if let Some(conn) = weak.upgrade() {
                conn.close();
            }
        }));
        let result = open(&host, "db", 2, &[]);
        assert!(matches!(result.borrow().as_ref(), Some(Ok(_))));
        assert!(old.is_closed());
    }

    #[test]
    fn cursor_cannot_advance_after_explicit_commit() {
        let host = MemoryHost::new();
        let conn = connected(&host, "db", &[("items", KeyOptions::new())]);
        for k in 1..=3 {
            put(&conn, "items", Value::Integer(k), Some(Key::Integer(k))).unwrap();
        }

        let steps: Rc<RefCell<Vec<HostResult<()>>>> = Rc::default();
        let completed = Rc::new(Cell::new(false));
        let (sink, done) = (Rc::clone(&steps), Rc::clone(&completed));
        let txn = conn
            .transaction(
                "items",
                TransactionMode::ReadOnly,
                TransactionCallbacks::new(move |()| done.set(true), |e| panic!("{e}")),
            )
            .unwrap();
        txn.object_store("items").unwrap().open_cursor(
            None,
            CursorDirection::Next,
            CursorCallbacks::new(
                move |cursor| {
                    if let Some(cursor) = cursor {
                        sink.borrow_mut().push(cursor.advance());
                    }
                },
                |e| panic!("{e}"),
            ),
        );
        txn.commit();

        let steps = steps.borrow();
        assert_eq!(steps.len(), 1);
        assert!(matches!(steps[0], Err(HostError::Inactive(_))));
        assert!(completed.get());
    }

    #[test]
    fn transaction_on_closed_connection_fails() {
        let host = MemoryHost::new();
        let conn = connected(&host, "db", &[("items", KeyOptions::new())]);
        conn.close();
        let result = conn.transaction("items", TransactionMode::ReadOnly, quiet());
        assert!(matches!(result, Err(HostError::InvalidState(_))));
        assert_eq!(host.connection_count("db"), 0);
    }

    proptest::proptest! {
        #[test]
        fn cursor_walks_keys_in_order(keys in proptest::collection::vec(-50i64..50, 0..40)) {
            let host = MemoryHost::new();
            let conn = connected(&host, "db", &[("items", KeyOptions::new())]);
            for key in &keys {
                put(&conn, "items", Value::Integer(*key), Some(Key::Integer(*key))).unwrap();
            }

            let mut expected: Vec<Key> = keys.iter().copied().map(Key::Integer).collect();
            expected.sort();
            expected.dedup();
            let forward = scan(&conn, "items", CursorDirection::Next, usize::MAX);
            proptest::prop_assert_eq!(forward, expected.clone());

            expected.reverse();
            let backward = scan(&conn, "items", CursorDirection::Prev, usize::MAX);
            proptest::prop_assert_eq!(backward, expected);
        }
    }
}
