/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! `Store`: one store's SQLite connection, guarded by a single `Mutex` so
//! every suspension point funnels through SQLite's own write
//! serialization (`spec.md` §5) -- the same single-writer discipline
//! `sql_support::UncheckedTransaction` assumes.

use std::path::Path;

use parking_lot::{Mutex, MutexGuard};
use rusqlite::{Connection, OpenFlags};

use engram_registry::Registry;
use sql_support::open_database::{open_database, open_database_with_flags, DatabaseLocation};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::schema::EngineSchema;

pub struct Store {
    conn: Mutex<Connection>,
    pub config: EngineConfig,
}

impl Store {
    pub fn open(path: impl AsRef<Path>, registry: &Registry, config: EngineConfig) -> Result<Self> {
        let plugin_schema_sql = registry
            .all_plugins()
            .iter()
            .flat_map(|p| p.schema_sql().to_vec())
            .collect();
        debug!("opening store at {}", path.as_ref().display());
        let conn = open_database(
            path.as_ref().to_path_buf(),
            &EngineSchema {
                plugin_schema_sql,
                busy_timeout_ms: config.busy_timeout_ms,
            },
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            config,
        })
    }

    pub fn open_in_memory(registry: &Registry, config: EngineConfig) -> Result<Self> {
        let plugin_schema_sql = registry
            .all_plugins()
            .iter()
            .flat_map(|p| p.schema_sql().to_vec())
            .collect();
        let conn = open_database_with_flags(
            DatabaseLocation::Memory,
            OpenFlags::default(),
            &EngineSchema {
                plugin_schema_sql,
                busy_timeout_ms: config.busy_timeout_ms,
            },
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            config,
        })
    }

    /// Exclusive access to the raw connection. `engram-engine` uses this to
    /// open one `UncheckedTransaction` spanning the changelog append, the
    /// domain mutation, and the plugin's `on_replay` hook -- all the same
    /// atomic unit per `spec.md` §4.6 step 7.
    pub fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_open_in_memory_bootstraps_schema() {
        let registry = Registry::new();
        let store = Store::open_in_memory(&registry, EngineConfig::default()).unwrap();
        let conn = store.lock();
        let version = crate::meta::schema_version(&*conn).unwrap();
        assert_eq!(version, engram_traits::CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn test_open_on_disk_bootstraps_schema_and_persists_across_handles() {
        let _ = env_logger::try_init();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engram.sqlite");
        let registry = Registry::new();

        {
            let store = Store::open(&path, &registry, EngineConfig::default()).unwrap();
            let conn = store.lock();
            crate::meta::set(&*conn, "probe", "1").unwrap();
        }

        let store = Store::open(&path, &registry, EngineConfig::default()).unwrap();
        let conn = store.lock();
        let version = crate::meta::schema_version(&*conn).unwrap();
        assert_eq!(version, engram_traits::CURRENT_SCHEMA_VERSION);
        assert_eq!(crate::meta::get(&*conn, "probe").unwrap(), Some("1".to_string()));
    }

    #[test]
    fn test_configured_busy_timeout_is_applied_to_the_connection() {
        let registry = Registry::new();
        let config = EngineConfig {
            busy_timeout_ms: 12_345,
            ..EngineConfig::default()
        };
        let store = Store::open_in_memory(&registry, config).unwrap();
        let conn = store.lock();
        let busy_timeout: i64 = conn.query_row("PRAGMA busy_timeout", [], |r| r.get(0)).unwrap();
        assert_eq!(busy_timeout, 12_345);
    }
}
