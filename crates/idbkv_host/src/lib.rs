//! # idbkv host
//!
//! The contract between the idbkv handle and the storage engine it wraps,
//! and [`MemoryHost`], a complete in-process engine that honours it.
//!
//! A host is an asynchronous, versioned, transactional object store. It
//! reports outcomes through events rather than return values: every
//! request carries callbacks and the host invokes them when the request
//! or its transaction settles. The idbkv handle turns those events into
//! `async` results; hosts never see futures.
//!
//! ## Design Principles
//!
//! - Hosts store structured [`idbkv_codec::Value`]s under ordered
//!   [`idbkv_codec::Key`]s and know nothing about caller types
//! - Schema changes happen only during an upgrade
//! - Transactions are scoped to the stores named when they start
//! - Handles are single-threaded (`Rc`-based), like the engines they model
//!
//! ## Available Hosts
//!
//! - [`MemoryHost`] - in-process engine for tests and ephemeral data
//! - `idbkv_web` (separate crate) - the browser's IndexedDB

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod host;
mod memory;
mod types;

pub use error::{HostError, HostResult};
pub use host::{
    Callback, CursorCallbacks, CursorStep, HostConnection, HostCursor, HostFactory,
    HostObjectStore, HostTransaction, OpenCallbacks, RequestCallbacks, SchemaEditor,
    TransactionCallbacks, UpgradeCallback, VersionChangeHandler,
};
pub use memory::{
    Fault, HostStats, MemoryConnection, MemoryHost, MemoryObjectStore, MemoryTransaction,
};
pub use types::{CursorDirection, KeyOptions, TransactionMode, VersionChange};
