//! IndexedDB host.
//!
//! Every handler attached to an IndexedDB request is a wasm-bindgen
//! closure. The closures of one transaction (or one open request) live in a
//! shared [`Listeners`] set that is released once the transaction or open
//! settles.

use crate::convert::{js_to_key, js_to_value, key_to_js, range_to_js, value_to_js};
use crate::error::{dom_error, reported_error, WebError, WebResult};
use crate::utils::release;
use idbkv_codec::{Key, KeyRange, Query, Value};
use idbkv_host::{
    Callback, CursorCallbacks, CursorDirection, HostConnection, HostCursor, HostError,
    HostFactory, HostObjectStore, HostResult, HostTransaction, KeyOptions, OpenCallbacks,
    RequestCallbacks, SchemaEditor, TransactionCallbacks, TransactionMode, VersionChange,
    VersionChangeHandler,
};
use js_sys::Function;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{
    Event, IdbCursorDirection, IdbCursorWithValue, IdbDatabase, IdbFactory, IdbObjectStore,
    IdbObjectStoreParameters, IdbRequest, IdbTransaction, IdbTransactionMode,
    IdbVersionChangeEvent, WorkerGlobalScope,
};

type Listener = Closure<dyn FnMut(Event)>;

/// Closures kept alive until the request or transaction they serve settles.
#[derive(Clone, Default)]
struct Listeners(Rc<RefCell<Vec<Listener>>>);

impl Listeners {
    fn add(&self, handler: impl FnMut(Event) + 'static) -> Function {
        let closure = Closure::<dyn FnMut(Event)>::new(handler);
        let function = closure.as_ref().unchecked_ref::<Function>().clone();
        self.0.borrow_mut().push(closure);
        function
    }

    fn release(&self) {
        let listeners = std::mem::take(&mut *self.0.borrow_mut());
        release(listeners);
    }
}

fn version_change(event: &Event, requested: u32) -> VersionChange {
    let event: &IdbVersionChangeEvent = event.unchecked_ref();
    VersionChange {
        old_version: event.old_version() as u32,
        new_version: event.new_version().map_or(requested, |v| v as u32),
    }
}

/// The browser's IndexedDB.
#[derive(Clone)]
pub struct IdbHost {
    factory: IdbFactory,
}

impl IdbHost {
    /// Uses the IndexedDB factory of the current window or worker.
    ///
    /// # Errors
    ///
    /// Fails outside a browser or where IndexedDB is disabled.
    pub fn new() -> WebResult<Self> {
        let factory = if let Some(window) = web_sys::window() {
            window.indexed_db()?
        } else {
            js_sys::global()
                .dyn_into::<WorkerGlobalScope>()
                .map_err(|_| WebError::NotSupported("no window or worker scope".into()))?
                .indexed_db()?
        };
        factory
            .map(|factory| Self { factory })
            .ok_or_else(|| WebError::NotSupported("IndexedDB not available".into()))
    }

    /// Checks if IndexedDB is available.
    pub fn is_available() -> bool {
        Self::new().is_ok()
    }
}

impl HostFactory for IdbHost {
    type Connection = IdbConnection;

    fn open(&self, name: &str, version: u32, callbacks: OpenCallbacks<IdbConnection>) {
        let request = match self.factory.open_with_u32(name, version) {
            Ok(request) => request,
            Err(e) => return (callbacks.on_error)(dom_error(e)),
        };
        let OpenCallbacks {
            on_upgrade,
            on_success,
            on_error,
            on_blocked,
        } = callbacks;
        let listeners = Listeners::default();
        let upgrade_error: Rc<RefCell<Option<HostError>>> = Rc::default();

        let on_upgrade_needed = {
            let request = request.clone();
            let upgrade_error = Rc::clone(&upgrade_error);
            let mut on_upgrade = Some(on_upgrade);
            listeners.add(move |event| {
                let Some(upgrade) = on_upgrade.take() else {
                    return;
                };
                let result = request
                    .result()
                    .map_err(dom_error)
                    .and_then(|db| {
                        let mut schema = IdbSchema {
                            db: db.unchecked_into(),
                        };
                        upgrade(&mut schema, version_change(&event, version))
                    });
                if let Err(e) = result {
                    *upgrade_error.borrow_mut() = Some(e);
                    if let Some(transaction) = request.transaction() {
                        let _ = transaction.abort();
                    }
                }
            })
        };

        let on_success_handler = {
            let request = request.clone();
            let settled = listeners.clone();
            let mut on_success = Some(on_success);
            listeners.add(move |_| {
                let connected = request
                    .result()
                    .map(|db| IdbConnection::new(db.unchecked_into()));
                if let (Ok(connection), Some(on_success)) = (connected, on_success.take()) {
                    on_success(connection);
                }
                settled.release();
            })
        };

        let on_error_handler = {
            let request = request.clone();
            let settled = listeners.clone();
            let mut on_error = Some(on_error);
            listeners.add(move |event: Event| {
                event.prevent_default();
                let error = upgrade_error
                    .borrow_mut()
                    .take()
                    .unwrap_or_else(|| reported_error(request.error(), "open failed"));
                if let Some(on_error) = on_error.take() {
                    on_error(error);
                }
                settled.release();
            })
        };

        let on_blocked_handler = {
            let mut on_blocked = Some(on_blocked);
            listeners.add(move |event| {
                if let Some(on_blocked) = on_blocked.take() {
                    on_blocked(version_change(&event, version));
                }
            })
        };

        request.set_onupgradeneeded(Some(&on_upgrade_needed));
        request.set_onsuccess(Some(&on_success_handler));
        request.set_onerror(Some(&on_error_handler));
        request.set_onblocked(Some(&on_blocked_handler));
    }
}

struct IdbSchema {
    db: IdbDatabase,
}

impl SchemaEditor for IdbSchema {
    fn store_names(&self) -> Vec<String> {
        store_names(&self.db)
    }

    fn create_store(&mut self, name: &str, options: &KeyOptions) -> HostResult<()> {
        let params = IdbObjectStoreParameters::new();
        params.set_auto_increment(options.auto_increment);
        if let Some(path) = &options.key_path {
            params.set_key_path(&JsValue::from_str(path));
        }
        self.db
            .create_object_store_with_optional_parameters(name, &params)
            .map(|_| ())
            .map_err(dom_error)
    }
}

fn store_names(db: &IdbDatabase) -> Vec<String> {
    let list = db.object_store_names();
    (0..list.length()).filter_map(|i| list.get(i)).collect()
}

/// A live IndexedDB connection.
///
/// Dropping the connection closes it.
pub struct IdbConnection {
    db: IdbDatabase,
    on_version_change: RefCell<Option<Listener>>,
    closed: Cell<bool>,
}

impl IdbConnection {
    fn new(db: IdbDatabase) -> Self {
        Self {
            db,
            on_version_change: RefCell::new(None),
            closed: Cell::new(false),
        }
    }
}

impl HostConnection for IdbConnection {
    type Transaction = IdbTx;

    fn name(&self) -> String {
        self.db.name()
    }

    fn version(&self) -> u32 {
        self.db.version() as u32
    }

    fn store_names(&self) -> Vec<String> {
        store_names(&self.db)
    }

    fn transaction(
        &self,
        store: &str,
        mode: TransactionMode,
        callbacks: TransactionCallbacks,
    ) -> HostResult<IdbTx> {
        let mode = match mode {
            TransactionMode::ReadOnly => IdbTransactionMode::Readonly,
            TransactionMode::ReadWrite => IdbTransactionMode::Readwrite,
        };
        let transaction = self
            .db
            .transaction_with_str_and_mode(store, mode)
            .map_err(dom_error)?;

        let listeners = Listeners::default();
        let callbacks = Rc::new(RefCell::new(Some(callbacks)));
        let on_complete = {
            let callbacks = Rc::clone(&callbacks);
            let settled = listeners.clone();
            listeners.add(move |_| {
                let taken = callbacks.borrow_mut().take();
                if let Some(callbacks) = taken {
                    (callbacks.on_complete)(());
                }
                settled.release();
            })
        };
        let on_abort = {
            let transaction = transaction.clone();
            let settled = listeners.clone();
            listeners.add(move |_| {
                let taken = callbacks.borrow_mut().take();
                if let Some(callbacks) = taken {
                    (callbacks.on_error)(reported_error(
                        Ok(transaction.error()),
                        "transaction aborted",
                    ));
                }
                settled.release();
            })
        };
        transaction.set_oncomplete(Some(&on_complete));
        transaction.set_onabort(Some(&on_abort));

        Ok(IdbTx {
            transaction,
            listeners,
        })
    }

    fn on_version_change(&self, mut handler: VersionChangeHandler) {
        let closure = Closure::<dyn FnMut(Event)>::new(move |event: Event| {
            let event: &IdbVersionChangeEvent = event.unchecked_ref();
            handler(VersionChange {
                old_version: event.old_version() as u32,
                new_version: event.new_version().map_or(0, |v| v as u32),
            });
        });
        self.db
            .set_onversionchange(Some(closure.as_ref().unchecked_ref()));
        if let Some(previous) = self.on_version_change.borrow_mut().replace(closure) {
            release(previous);
        }
    }

    fn close(&self) {
        if !self.closed.replace(true) {
            self.db.set_onversionchange(None);
            self.db.close();
        }
    }
}

impl Drop for IdbConnection {
    fn drop(&mut self) {
        self.close();
        if let Some(listener) = self.on_version_change.get_mut().take() {
            release(listener);
        }
    }
}

/// A transaction on an [`IdbConnection`].
pub struct IdbTx {
    transaction: IdbTransaction,
    listeners: Listeners,
}

impl HostTransaction for IdbTx {
    type Store = IdbStore;

    fn object_store(&self, name: &str) -> HostResult<IdbStore> {
        let store = self.transaction.object_store(name).map_err(dom_error)?;
        Ok(IdbStore {
            store,
            listeners: self.listeners.clone(),
        })
    }

    fn commit(&self) {
        // Browsers without commit() auto-commit once no request is pending.
        let _ = self.transaction.commit();
    }
}

/// Request surface of an [`IdbTx`].
pub struct IdbStore {
    store: IdbObjectStore,
    listeners: Listeners,
}

impl IdbStore {
    fn watch<T: 'static>(
        &self,
        request: Result<IdbRequest, JsValue>,
        callbacks: RequestCallbacks<T>,
        parse: impl Fn(JsValue) -> HostResult<T> + 'static,
    ) {
        let request = match request {
            Ok(request) => request,
            Err(e) => return (callbacks.on_error)(dom_error(e)),
        };
        let slot = Rc::new(RefCell::new(Some(callbacks)));

        let on_success = {
            let request = request.clone();
            let slot = Rc::clone(&slot);
            self.listeners.add(move |_| {
                let Some(callbacks) = slot.borrow_mut().take() else {
                    return;
                };
                match request.result().map_err(dom_error).and_then(&parse) {
                    Ok(value) => (callbacks.on_success)(value),
                    Err(e) => (callbacks.on_error)(e),
                }
            })
        };
        let on_error = {
            let request = request.clone();
            self.listeners.add(move |_| {
                let Some(callbacks) = slot.borrow_mut().take() else {
                    return;
                };
                (callbacks.on_error)(reported_error(request.error(), "request failed"));
            })
        };
        request.set_onsuccess(Some(&on_success));
        request.set_onerror(Some(&on_error));
    }
}

fn query_to_js(query: &Query) -> HostResult<JsValue> {
    match query {
        Query::Key(key) => key_to_js(key),
        Query::Range(range) => range_to_js(range),
    }
}

fn fail<T>(callbacks: RequestCallbacks<T>, error: HostError) {
    (callbacks.on_error)(error);
}

impl HostObjectStore for IdbStore {
    fn put(&self, value: Value, key: Option<Key>, callbacks: RequestCallbacks<Key>) {
        let js_value = match value_to_js(&value) {
            Ok(js) => js,
            Err(e) => return fail(callbacks, e),
        };
        let request = match key.as_ref().map(key_to_js).transpose() {
            Ok(Some(js_key)) => self.store.put_with_key(&js_value, &js_key),
            Ok(None) => self.store.put(&js_value),
            Err(e) => return fail(callbacks, e),
        };
        self.watch(request, callbacks, |result| js_to_key(&result));
    }

    fn get(&self, query: Query, callbacks: RequestCallbacks<Option<Value>>) {
        let request = match query_to_js(&query) {
            Ok(js_query) => self.store.get(&js_query),
            Err(e) => return fail(callbacks, e),
        };
        self.watch(request, callbacks, |result| {
            if result.is_undefined() {
                Ok(None)
            } else {
                js_to_value(result).map(Some)
            }
        });
    }

    fn delete(&self, query: Query, callbacks: RequestCallbacks<()>) {
        let request = match query_to_js(&query) {
            Ok(js_query) => self.store.delete(&js_query),
            Err(e) => return fail(callbacks, e),
        };
        self.watch(request, callbacks, |_| Ok(()));
    }

    fn open_cursor(
        &self,
        range: Option<KeyRange>,
        direction: CursorDirection,
        callbacks: CursorCallbacks,
    ) {
        let direction = match direction {
            CursorDirection::Next => IdbCursorDirection::Next,
            CursorDirection::Prev => IdbCursorDirection::Prev,
        };
        let CursorCallbacks {
            on_success: mut step,
            on_error,
        } = callbacks;
        let on_error: Rc<RefCell<Option<Callback<HostError>>>> =
            Rc::new(RefCell::new(Some(on_error)));
        let fail_cursor = {
            let on_error = Rc::clone(&on_error);
            move |error: HostError| {
                let taken = on_error.borrow_mut().take();
                if let Some(on_error) = taken {
                    on_error(error);
                }
            }
        };

        let range = match range.as_ref().map(range_to_js).transpose() {
            Ok(range) => range.unwrap_or(JsValue::UNDEFINED),
            Err(e) => return fail_cursor(e),
        };
        let request = match self
            .store
            .open_cursor_with_range_and_direction(&range, direction)
        {
            Ok(request) => request,
            Err(e) => return fail_cursor(dom_error(e)),
        };

        let on_success = {
            let request = request.clone();
            let fail_cursor = fail_cursor.clone();
            self.listeners.add(move |_| {
                let result = match request.result() {
                    Ok(result) => result,
                    Err(e) => return fail_cursor(dom_error(e)),
                };
                if result.is_null() || result.is_undefined() {
                    step(None);
                    return;
                }
                let mut cursor = IdbCursorHandle {
                    cursor: result.unchecked_into(),
                };
                step(Some(&mut cursor));
            })
        };
        let on_error = {
            let request = request.clone();
            self.listeners.add(move |_| {
                fail_cursor(reported_error(request.error(), "cursor failed"));
            })
        };
        request.set_onsuccess(Some(&on_success));
        request.set_onerror(Some(&on_error));
    }
}

struct IdbCursorHandle {
    cursor: IdbCursorWithValue,
}

impl HostCursor for IdbCursorHandle {
    fn entry(&self) -> HostResult<(Key, Value)> {
        let key = self.cursor.key().map_err(dom_error)?;
        let value = self.cursor.value().map_err(dom_error)?;
        Ok((js_to_key(&key)?, js_to_value(value)?))
    }

    fn advance(&mut self) -> HostResult<()> {
        self.cursor.continue_().map_err(dom_error)
    }
}

impl std::fmt::Debug for IdbHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdbHost").finish_non_exhaustive()
    }
}
