//! # idbkv core
//!
//! A typed, `async` key-value handle over a versioned, transactional host
//! store such as the browser's IndexedDB.
//!
//! This crate provides:
//! - [`Database`], the handle owning one connection: open with schema
//!   upgrade, close, store selection
//! - [`Store`], an accessor bound to one store
//! - put, set, get, delete and bounded cursor enumeration, each in its own
//!   single-store transaction
//! - [`KvError`], one error type tagged by [`ErrorKind`]
//!
//! Hosts report outcomes through callbacks (see [`idbkv_host`]). Every
//! operation turns the callbacks of its request and transaction into one
//! settle point: the first relevant event decides the result and later
//! events are ignored. Put and get resolve on the request's own success,
//! delete on transaction completion.
//!
//! Handles are single-threaded. Futures returned by the handle are `!Send`
//! and belong on a local executor.
//!
//! ```rust
//! use idbkv_core::{CursorDirection, Database, DatabaseDescriptor, KeyOptions, MemoryHost};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, PartialEq, Serialize, Deserialize)]
//! struct Note {
//!     title: String,
//! }
//!
//! # let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! # rt.block_on(async {
//! let descriptor =
//!     DatabaseDescriptor::single_store("notes", "items", KeyOptions::new().auto_increment(true));
//! let mut db = Database::new(MemoryHost::new(), descriptor);
//! db.open().await?;
//!
//! let items = db.store("items")?;
//! let key = items.put(&Note { title: "first".into() }, None).await?;
//! let notes: Vec<(_, Note)> = items.enumerate(10, CursorDirection::Next).await?;
//! assert_eq!(notes.len(), 1);
//! assert_eq!(notes[0].0, key);
//! # Ok::<(), idbkv_core::KvError>(())
//! # }).unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod database;
mod descriptor;
mod error;
mod settle;
mod state;
mod store;

pub use config::{Config, PutAck, VersionChangePolicy};
pub use database::Database;
pub use descriptor::{DatabaseDescriptor, StoreDescriptor};
pub use error::{ErrorKind, KvError, KvResult, Operation};
pub use state::ConnectionState;
pub use store::Store;

pub use idbkv_codec::{Key, KeyRange, Query, Value};
pub use idbkv_host::{CursorDirection, HostFactory, KeyOptions, MemoryHost};
