/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Process-wide plugin registry (`spec.md` §4.3, component C3): two
//! independently guarded maps, `store_type -> DomainPlugin` and
//! `table_name -> TableSchema`. Registration happens once at process start;
//! lookups happen on every request, hence the readers-writer lock.

#[macro_use]
extern crate log;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use engram_traits::{DomainPlugin, TableSchema};

/// The registry itself. Most processes want a single instance behind
/// `Registry::global()`; tests that need isolation construct their own with
/// `Registry::new()`.
pub struct Registry {
    plugins: RwLock<HashMap<&'static str, Arc<dyn DomainPlugin>>>,
    schemas: RwLock<HashMap<String, TableSchema>>,
    generic: RwLock<Option<Arc<dyn DomainPlugin>>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            plugins: RwLock::new(HashMap::new()),
            schemas: RwLock::new(HashMap::new()),
            generic: RwLock::new(None),
        }
    }

    /// Register a plugin and its declared table schemas.
    ///
    /// Panics on a duplicate `store_type` -- per `spec.md` §4.3 this is a
    /// programmer error caught at process start, not a runtime condition
    /// callers are expected to handle. Column names are validated against
    /// `engram_traits::ident` by `TableSchema::new` at construction time;
    /// `TableSchema` values reaching this registry are assumed already
    /// valid, so we only guard against clashing table names here.
    pub fn register(&self, plugin: Arc<dyn DomainPlugin>) {
        let store_type = plugin.store_type();
        debug!("registering plugin for store_type `{store_type}`");
        {
            let mut plugins = self.plugins.write();
            if plugins.contains_key(store_type) {
                panic!("engram-registry: duplicate store_type registration: {store_type}");
            }
            plugins.insert(store_type, plugin.clone());
        }
        let mut schemas = self.schemas.write();
        for schema in plugin.table_schemas() {
            if let Some(existing) = schemas.get(&schema.name) {
                if existing != &schema {
                    panic!(
                        "engram-registry: table `{}` registered with conflicting schemas",
                        schema.name
                    );
                }
                continue;
            }
            schemas.insert(schema.name.clone(), schema);
        }
    }

    /// Install the fallback plugin returned by `get` on a `store_type` miss.
    pub fn set_generic(&self, plugin: Arc<dyn DomainPlugin>) {
        *self.generic.write() = Some(plugin);
    }

    /// Resolve `store_type -> DomainPlugin`. On a miss, returns the
    /// generic fallback (if one was installed via `set_generic`) paired
    /// with `found = false`, so callers can still log/record that the
    /// lookup missed.
    pub fn get(&self, store_type: &str) -> (Option<Arc<dyn DomainPlugin>>, bool) {
        if let Some(plugin) = self.plugins.read().get(store_type) {
            return (Some(plugin.clone()), true);
        }
        (self.generic.read().clone(), false)
    }

    pub fn get_table_schema(&self, table_name: &str) -> Option<TableSchema> {
        self.schemas.read().get(table_name).cloned()
    }

    pub fn all_schemas(&self) -> Vec<TableSchema> {
        self.schemas.read().values().cloned().collect()
    }

    pub fn all_plugins(&self) -> Vec<Arc<dyn DomainPlugin>> {
        self.plugins.read().values().cloned().collect()
    }

    /// Clears all registrations. Exists for tests only: production
    /// processes register plugins once at start-up and never call this.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn reset(&self) {
        self.plugins.write().clear();
        self.schemas.write().clear();
        *self.generic.write() = None;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use engram_traits::{ChangeLogEntry, PendingEntry, ValidationError};
    use rusqlite::Connection;

    struct Dummy(&'static str, &'static str);
    impl DomainPlugin for Dummy {
        fn store_type(&self) -> &'static str {
            self.0
        }
        fn table_schemas(&self) -> Vec<TableSchema> {
            vec![TableSchema::new(self.1, vec!["id".into()], false).unwrap()]
        }
        fn validate_push(
            &self,
            entries: Vec<PendingEntry>,
        ) -> Result<Vec<PendingEntry>, Vec<ValidationError>> {
            Ok(entries)
        }
        fn on_replay(&self, _conn: &Connection, _entries: &[ChangeLogEntry]) {}
    }

    #[test]
    fn test_register_and_get() {
        let _ = env_logger::try_init();
        let reg = Registry::new();
        reg.register(Arc::new(Dummy("recall", "lore_entries")));
        let (plugin, found) = reg.get("recall");
        assert!(found);
        assert_eq!(plugin.unwrap().store_type(), "recall");
        assert!(reg.get_table_schema("lore_entries").is_some());
    }

    #[test]
    fn test_get_falls_back_to_generic() {
        let reg = Registry::new();
        reg.set_generic(Arc::new(Dummy("generic", "unused")));
        let (plugin, found) = reg.get("something-unregistered");
        assert!(!found);
        assert_eq!(plugin.unwrap().store_type(), "generic");
    }

    #[test]
    fn test_get_miss_without_generic() {
        let reg = Registry::new();
        let (plugin, found) = reg.get("nothing");
        assert!(!found);
        assert!(plugin.is_none());
    }

    #[test]
    #[should_panic(expected = "duplicate store_type")]
    fn test_register_duplicate_panics() {
        let reg = Registry::new();
        reg.register(Arc::new(Dummy("recall", "lore_entries")));
        reg.register(Arc::new(Dummy("recall", "other_table")));
    }
}
