//! # idbkv web
//!
//! The browser's IndexedDB as an idbkv host.
//!
//! [`IdbHost`] implements the host contract over `web-sys`: open requests
//! with `upgradeneeded` and `blocked` events, single-store transactions,
//! requests and cursors. Records are stored as structured-clone objects,
//! so data written here is readable by plain JavaScript code using the same
//! database.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use idbkv_web::{IdbHost, WebDatabase};
//! use idbkv_core::DatabaseDescriptor;
//!
//! let mut db = WebDatabase::new(IdbHost::new()?, DatabaseDescriptor::default());
//! db.open().await?;
//! db.use_store("store")?.set("greeting", &"hello").await?;
//! ```
//!
//! The handle is single-threaded, like the page or worker it runs in.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod convert;
mod error;
mod host;
mod utils;

pub use error::{WebError, WebResult};
pub use host::{IdbConnection, IdbHost, IdbStore, IdbTx};

use wasm_bindgen::prelude::*;

/// A database handle over IndexedDB.
pub type WebDatabase = idbkv_core::Database<IdbHost>;

/// Initialize the WASM module.
///
/// This sets up panic hooks for better error messages in the browser console.
#[wasm_bindgen(start)]
pub fn init() {
    utils::set_panic_hook();
}
