//! # idbkv testkit
//!
//! Test utilities for idbkv.
//!
//! This crate provides:
//! - Fixtures: descriptors, opened handles over [`idbkv_host::MemoryHost`],
//!   and a tracing subscriber for test output
//! - [`DeferredHost`], which holds open requests until released
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use idbkv_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn roundtrip() {
//!     let db = TestDatabase::open(items_descriptor()).await;
//!     db.set("a", &sample_record(1)).await.unwrap();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod hosts;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::hosts::*;
}

pub use fixtures::*;
pub use generators::*;
pub use hosts::*;
