//! In-memory collaborators for tests and single-process embedders.

mod rate_limit;
mod store;
mod transport;

pub use rate_limit::MemoryRateLimiter;
pub use store::MemoryStore;
pub use transport::MemoryTransport;

use crate::backend::store::{Collection, Database};
use dashmap::DashMap;
use std::sync::Arc;

///
/// MemoryDatabase
///
/// Named [`MemoryStore`]s created on first use.
///

#[derive(Debug)]
pub struct MemoryDatabase {
    stores: DashMap<String, Arc<MemoryStore>>,
    atomic_remove_at: bool,
}

impl MemoryDatabase {
    #[must_use]
    pub fn new() -> Self {
        Self {
            stores: DashMap::new(),
            atomic_remove_at: true,
        }
    }

    /// New collections advertise no atomic element removal.
    #[must_use]
    pub const fn without_atomic_remove_at(mut self) -> Self {
        self.atomic_remove_at = false;
        self
    }

    #[must_use]
    pub fn store(&self, name: &str) -> Option<Arc<MemoryStore>> {
        self.stores.get(name).map(|s| Arc::clone(s.value()))
    }
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl Database for MemoryDatabase {
    fn collection(&self, name: &str) -> Collection {
        let store = self
            .stores
            .entry(name.to_string())
            .or_insert_with(|| {
                let store = MemoryStore::new(name);
                Arc::new(if self.atomic_remove_at {
                    store
                } else {
                    store.without_atomic_remove_at()
                })
            })
            .clone();

        Collection::new(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{FindOptions, Selector, Store};
    use collkit_schema::value::Document;

    #[test]
    fn collections_are_shared_by_name() {
        let db = MemoryDatabase::new();
        let a = db.collection("things");
        let b = db.collection("things");

        a.insert(Document::new()).expect("insert should succeed");
        let found = b
            .find(Selector::all(), FindOptions::default())
            .count()
            .expect("count should succeed");
        assert_eq!(found, 1);
        assert_eq!(db.store("things").map(|s| s.len()), Some(1));
    }

    #[test]
    fn capability_flag_reaches_new_collections() {
        let db = MemoryDatabase::new().without_atomic_remove_at();
        assert!(!db.collection("x").capabilities().atomic_remove_at);
        assert!(MemoryDatabase::new().collection("x").store().capabilities().atomic_remove_at);
    }
}
