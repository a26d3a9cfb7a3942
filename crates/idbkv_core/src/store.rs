//! The bound store accessor and its operations.

use crate::config::{Config, PutAck};
use crate::error::{KvError, KvResult, Operation};
use crate::settle;
use crate::state::ConnectionSlot;
use idbkv_codec::{from_value, to_value, Key, Query, Value};
use idbkv_host::{
    CursorCallbacks, CursorDirection, HostConnection, HostCursor, HostError, HostObjectStore,
    HostTransaction, RequestCallbacks, TransactionCallbacks, TransactionMode,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use tracing::debug;

/// Context attached to an operation failure.
#[derive(Clone)]
struct Failure {
    operation: Operation,
    store: String,
    key: Option<Key>,
}

impl Failure {
    fn error(&self, reason: impl fmt::Display) -> KvError {
        self.error_for(self.key.clone(), reason)
    }

    fn error_for(&self, key: Option<Key>, reason: impl fmt::Display) -> KvError {
        KvError::OperationFailed {
            operation: self.operation,
            store: self.store.clone(),
            key,
            reason: reason.to_string(),
        }
    }

    fn dropped(&self) -> KvError {
        self.error("request dropped by the host")
    }
}

/// Operations bound to one store of an open database.
///
/// Obtained from [`crate::Database::store`]. A `Store` owns its store name,
/// so no later selection on the handle affects it. It shares the handle's
/// connection: once the handle is closed or dropped, every operation fails
/// with [`KvError::NotInitialized`].
///
/// Each operation runs in a fresh transaction scoped to this store.
pub struct Store<C: HostConnection> {
    slot: Rc<ConnectionSlot<C>>,
    name: String,
    config: Config,
}

impl<C: HostConnection> Clone for Store<C> {
    fn clone(&self) -> Self {
        Self {
            slot: Rc::clone(&self.slot),
            name: self.name.clone(),
            config: self.config.clone(),
        }
    }
}

impl<C: HostConnection> fmt::Debug for Store<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("database", &self.slot.database())
            .field("name", &self.name)
            .field("state", &self.slot.state())
            .finish()
    }
}

impl<C: HostConnection> Store<C> {
    pub(crate) fn new(slot: Rc<ConnectionSlot<C>>, name: String, config: Config) -> Self {
        Self { slot, name, config }
    }

    /// Store name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the database the store belongs to.
    #[must_use]
    pub fn database(&self) -> &str {
        self.slot.database()
    }

    fn connection(&self) -> KvResult<Rc<C>> {
        self.slot
            .connection()
            .ok_or_else(|| KvError::not_initialized(self.slot.database()))
    }

    fn failure(&self, operation: Operation, key: Option<Key>) -> Failure {
        Failure {
            operation,
            store: self.name.clone(),
            key,
        }
    }

    /// Writes `value`, replacing any record at the same key.
    ///
    /// Resolves with the effective key: `key` itself, the in-line key found
    /// in the value, or the key assigned by the store's generator.
    ///
    /// # Errors
    ///
    /// [`KvError::NotInitialized`] without a live connection, and
    /// [`KvError::OperationFailed`] if the value cannot be encoded or the
    /// host rejects the write or aborts its transaction.
    pub async fn put<T: Serialize + ?Sized>(&self, value: &T, key: Option<Key>) -> KvResult<Key> {
        let connection = self.connection()?;
        let failure = self.failure(Operation::Put, key.clone());
        debug!(database = self.database(), store = %self.name, key = ?key, "put");

        let value = to_value(value).map_err(|e| failure.error(e))?;
        let (settle, pending) = settle::channel::<KvResult<Key>>();
        let written: Rc<RefCell<Option<Key>>> = Rc::new(RefCell::new(None));
        let ack = self.config.put_ack;

        let tx_callbacks = {
            let (on_complete, on_error) = (settle.clone(), settle.clone());
            let (written_ok, written_err) = (Rc::clone(&written), Rc::clone(&written));
            let (failure_ok, failure_err) = (failure.clone(), failure.clone());
            TransactionCallbacks::new(
                move |()| {
                    let key = written_ok.borrow_mut().take();
                    let outcome = key.ok_or_else(|| {
                        failure_ok.error("transaction completed without a key")
                    });
                    let _ = on_complete.settle(outcome);
                },
                move |e| {
                    let key = written_err.borrow().clone().or_else(|| failure_err.key.clone());
                    let _ = on_error.settle(Err(failure_err.error_for(key, e)));
                },
            )
        };
        let transaction = connection
            .transaction(&self.name, TransactionMode::ReadWrite, tx_callbacks)
            .map_err(|e| failure.error(e))?;
        let store = transaction
            .object_store(&self.name)
            .map_err(|e| failure.error(e))?;

        let request = {
            let (on_success, on_error) = (settle.clone(), settle);
            let request_failure = failure.clone();
            RequestCallbacks::new(
                move |key: Key| {
                    *written.borrow_mut() = Some(key.clone());
                    if ack == PutAck::Request {
                        let _ = on_success.settle(Ok(key));
                    }
                },
                move |e| {
                    let _ = on_error.settle(Err(request_failure.error(e)));
                },
            )
        };
        store.put(value, key, request);
        transaction.commit();
        drop(transaction);

        pending.wait().await.unwrap_or_else(|_| Err(failure.dropped()))
    }

    /// Writes `value` under `key`. Same as [`Store::put`] with an explicit key.
    ///
    /// # Errors
    ///
    /// As [`Store::put`].
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: impl Into<Key>,
        value: &T,
    ) -> KvResult<Key> {
        self.put(value, Some(key.into())).await
    }

    /// Reads the record at a key, or the first record in a key range.
    ///
    /// A missing record resolves to `None`.
    ///
    /// # Errors
    ///
    /// [`KvError::NotInitialized`] without a live connection, and
    /// [`KvError::OperationFailed`] if the host read fails or the stored
    /// value does not decode as `T`.
    pub async fn get<T: DeserializeOwned>(&self, query: impl Into<Query>) -> KvResult<Option<T>> {
        let connection = self.connection()?;
        let query = query.into();
        let failure = self.failure(Operation::Get, query.as_key().cloned());
        debug!(database = self.database(), store = %self.name, query = %query, "get");

        let (settle, pending) = settle::channel::<KvResult<Option<Value>>>();
        let transaction = connection
            .transaction(
                &self.name,
                TransactionMode::ReadOnly,
                TransactionCallbacks::new(|()| {}, settle_error(&settle, &failure)),
            )
            .map_err(|e| failure.error(e))?;
        let store = transaction
            .object_store(&self.name)
            .map_err(|e| failure.error(e))?;

        let on_success = settle.clone();
        store.get(
            query,
            RequestCallbacks::new(
                move |value| {
                    let _ = on_success.settle(Ok(value));
                },
                settle_error(&settle, &failure),
            ),
        );
        transaction.commit();
        drop(transaction);

        let value = pending
            .wait()
            .await
            .unwrap_or_else(|_| Err(failure.dropped()))?;
        value
            .map(|v| from_value(v).map_err(|e| failure.error(e)))
            .transpose()
    }

    /// Removes the record at a key, or every record in a key range.
    ///
    /// Resolves once the transaction has completed. Removing a missing key
    /// is not an error.
    ///
    /// # Errors
    ///
    /// [`KvError::NotInitialized`] without a live connection, and
    /// [`KvError::OperationFailed`] if the request or its transaction fails.
    pub async fn delete(&self, query: impl Into<Query>) -> KvResult<()> {
        let connection = self.connection()?;
        let query = query.into();
        let failure = self.failure(Operation::Delete, query.as_key().cloned());
        debug!(database = self.database(), store = %self.name, query = %query, "delete");

        let (settle, pending) = settle::channel::<KvResult<()>>();
        let on_complete = settle.clone();
        let transaction = connection
            .transaction(
                &self.name,
                TransactionMode::ReadWrite,
                TransactionCallbacks::new(
                    move |()| {
                        let _ = on_complete.settle(Ok(()));
                    },
                    settle_error(&settle, &failure),
                ),
            )
            .map_err(|e| failure.error(e))?;
        let store = transaction
            .object_store(&self.name)
            .map_err(|e| failure.error(e))?;

        store.delete(
            query,
            RequestCallbacks::new(|()| {}, settle_error(&settle, &failure)),
        );
        transaction.commit();
        drop(transaction);

        pending.wait().await.unwrap_or_else(|_| Err(failure.dropped()))
    }

    /// Collects at most `limit` records in cursor order.
    ///
    /// The cursor stops on the `limit`-th record without advancing. If the
    /// cursor fails part way, the records collected so far are discarded and
    /// the call fails: a resolved list is always complete up to `limit`.
    ///
    /// # Errors
    ///
    /// [`KvError::NotInitialized`] without a live connection, and
    /// [`KvError::OperationFailed`] if the cursor or its transaction fails
    /// or a value does not decode as `T`.
    pub async fn enumerate<T: DeserializeOwned>(
        &self,
        limit: usize,
        direction: CursorDirection,
    ) -> KvResult<Vec<(Key, T)>> {
        let connection = self.connection()?;
        let failure = self.failure(Operation::Enumerate, None);
        debug!(
            database = self.database(),
            store = %self.name,
            limit,
            ?direction,
            "enumerate"
        );
        if limit == 0 {
            return Ok(Vec::new());
        }

        let (settle, pending) = settle::channel::<KvResult<()>>();
        let collected: Rc<RefCell<Vec<(Key, Value)>>> = Rc::new(RefCell::new(Vec::new()));
        let on_complete = {
            let settle = settle.clone();
            let failure = failure.clone();
            move |()| {
                let _ = settle.settle(Err(failure.error("cursor stopped before the walk ended")));
            }
        };
        let transaction = connection
            .transaction(
                &self.name,
                TransactionMode::ReadOnly,
                TransactionCallbacks::new(on_complete, settle_error(&settle, &failure)),
            )
            .map_err(|e| failure.error(e))?;
        let store = transaction
            .object_store(&self.name)
            .map_err(|e| failure.error(e))?;

        let step = {
            let settle = settle.clone();
            let failure = failure.clone();
            let collected = Rc::clone(&collected);
            move |cursor: Option<&mut dyn HostCursor>| {
                let Some(cursor) = cursor else {
                    let _ = settle.settle(Ok(()));
                    return;
                };
                match cursor.entry() {
                    Ok(entry) => {
                        let full = {
                            let mut collected = collected.borrow_mut();
                            collected.push(entry);
                            collected.len() >= limit
                        };
                        if full {
                            let _ = settle.settle(Ok(()));
                        } else if let Err(e) = cursor.advance() {
                            let _ = settle.settle(Err(failure.error(e)));
                        }
                    }
                    Err(e) => {
                        let _ = settle.settle(Err(failure.error(e)));
                    }
                }
            }
        };
        store.open_cursor(
            None,
            direction,
            CursorCallbacks::new(step, settle_error(&settle, &failure)),
        );
        // Auto-commit: an explicit commit would stop the cursor after one record.
        drop(transaction);

        pending
            .wait()
            .await
            .unwrap_or_else(|_| Err(failure.dropped()))?;

        let entries = collected.take();
        entries
            .into_iter()
            .map(|(key, value)| match from_value(value) {
                Ok(value) => Ok((key, value)),
                Err(e) => Err(failure.error_for(Some(key), e)),
            })
            .collect()
    }

    /// Up to the configured default limit of records, in ascending key order.
    ///
    /// # Errors
    ///
    /// As [`Store::enumerate`].
    pub async fn entries<T: DeserializeOwned>(&self) -> KvResult<Vec<(Key, T)>> {
        self.enumerate(self.config.default_limit, CursorDirection::Next)
            .await
    }
}

/// An error callback that settles the call with an operation failure.
fn settle_error<T: 'static>(
    settle: &settle::Settle<KvResult<T>>,
    failure: &Failure,
) -> impl FnOnce(HostError) + 'static {
    let settle = settle.clone();
    let failure = failure.clone();
    move |e| {
        let _ = settle.settle(Err(failure.error(e)));
    }
}
