//! Database and store descriptors.

use idbkv_host::KeyOptions;

/// A collection that must exist in the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreDescriptor {
    /// Store name.
    pub name: String,
    /// Key configuration used when the store is created.
    pub key_options: KeyOptions,
}

impl StoreDescriptor {
    /// A store with out-of-line keys and no generator.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_options(name, KeyOptions::default())
    }

    /// A store with the given key configuration.
    pub fn with_options(name: impl Into<String>, key_options: KeyOptions) -> Self {
        Self {
            name: name.into(),
            key_options,
        }
    }
}

/// Which database to open, at which version, with which stores.
///
/// Stores are created during the upgrade that runs when `version` exceeds
/// the version already on disk. Stores that exist are left alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseDescriptor {
    /// Database name.
    pub name: String,
    /// Requested schema version. Must be at least 1.
    pub version: u32,
    /// Stores to create if missing, in creation order.
    pub stores: Vec<StoreDescriptor>,
}

impl Default for DatabaseDescriptor {
    fn default() -> Self {
        Self::new("db", 1).store(StoreDescriptor::new("store"))
    }
}

impl DatabaseDescriptor {
    /// A descriptor with no stores.
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version,
            stores: Vec::new(),
        }
    }

    /// The common one-store case at version 1.
    pub fn single_store(
        name: impl Into<String>,
        store: impl Into<String>,
        key_options: KeyOptions,
    ) -> Self {
        Self::new(name, 1).store(StoreDescriptor::with_options(store, key_options))
    }

    /// Appends a store.
    #[must_use]
    pub fn store(mut self, store: StoreDescriptor) -> Self {
        self.stores.push(store);
        self
    }

    /// Sets the version.
    #[must_use]
    pub const fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Looks up a declared store.
    #[must_use]
    pub fn find_store(&self, name: &str) -> Option<&StoreDescriptor> {
        self.stores.iter().find(|s| s.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_descriptor() {
        let d = DatabaseDescriptor::default();
        assert_eq!(d.name, "db");
        assert_eq!(d.version, 1);
        assert_eq!(d.stores, vec![StoreDescriptor::new("store")]);
    }

    #[test]
    fn single_store_keeps_options() {
        let options = KeyOptions::new().key_path("id").auto_increment(true);
        let d = DatabaseDescriptor::single_store("notes", "items", options.clone());
        assert_eq!(d.version, 1);
        assert_eq!(d.find_store("items").map(|s| &s.key_options), Some(&options));
        assert!(d.find_store("other").is_none());
    }
}
