//! Test fixtures and database helpers.
//!
//! Handles here are opened over a fresh [`MemoryHost`] unless a host is
//! passed in, and panic on setup failures.

use idbkv_core::{Config, Database, DatabaseDescriptor, KeyOptions, StoreDescriptor};
use idbkv_host::MemoryHost;
use serde::{Deserialize, Serialize};
use std::sync::Once;

/// Name of the store most fixtures declare.
pub const ITEMS: &str = "items";

/// A structured record used as the stored type in tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Free text.
    pub title: String,
    /// A counter.
    pub count: i64,
    /// Labels.
    pub tags: Vec<String>,
    /// A flag.
    pub done: bool,
}

/// A record whose fields derive from `n`.
pub fn sample_record(n: i64) -> Record {
    Record {
        title: format!("record {n}"),
        count: n,
        tags: vec![format!("tag{}", n % 3)],
        done: n % 2 == 0,
    }
}

/// `db` at version 1 with one out-of-line store, [`ITEMS`].
pub fn items_descriptor() -> DatabaseDescriptor {
    DatabaseDescriptor::single_store("db", ITEMS, KeyOptions::new())
}

/// `db` at version 1 with [`ITEMS`] plus an auto-increment store `counters`
/// and an in-line store `people` keyed by `id`.
pub fn mixed_descriptor() -> DatabaseDescriptor {
    items_descriptor()
        .store(StoreDescriptor::with_options(
            "counters",
            KeyOptions::new().auto_increment(true),
        ))
        .store(StoreDescriptor::with_options(
            "people",
            KeyOptions::new().key_path("id"),
        ))
}

/// An opened handle together with the host it runs on.
pub struct TestDatabase {
    /// The handle.
    pub db: Database<MemoryHost>,
    /// The host; clones share its engine.
    pub host: MemoryHost,
}

impl TestDatabase {
    /// Opens `descriptor` on a fresh host and selects its first store.
    pub async fn open(descriptor: DatabaseDescriptor) -> Self {
        Self::open_on(MemoryHost::new(), descriptor, Config::default()).await
    }

    /// Opens `descriptor` on `host` and selects its first store.
    pub async fn open_on(host: MemoryHost, descriptor: DatabaseDescriptor, config: Config) -> Self {
        let first = descriptor.stores.first().map(|s| s.name.clone());
        let mut db = Database::with_config(host.clone(), descriptor, config);
        db.open().await.expect("Failed to open test database");
        if let Some(store) = first {
            db.use_store(&store).expect("Failed to select first store");
        }
        Self { db, host }
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database<MemoryHost>;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

impl std::ops::DerefMut for TestDatabase {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.db
    }
}

/// Installs a `tracing` subscriber honouring `RUST_LOG`, once per process.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_descriptor_declares_three_stores() {
        let d = mixed_descriptor();
        let names: Vec<_> = d.stores.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec![ITEMS, "counters", "people"]);
    }

    #[test]
    fn sample_records_differ() {
        assert_ne!(sample_record(1), sample_record(2));
        assert_eq!(sample_record(4).tags, vec!["tag1".to_string()]);
    }
}
