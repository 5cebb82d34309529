/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Bootstrap schema, `spec.md` §6: `change_log`, `push_idempotency`,
//! `sync_meta`, plus whatever `CREATE TABLE` statements the registered
//! plugins contribute for their own domain tables. Implements
//! `sql_support::open_database::ConnectionInitializer` so opening a store
//! goes through the same prepare/init/upgrade machinery every other
//! component in this workspace uses.

use rusqlite::{Connection, Transaction};
use sql_support::open_database::{ConnectionInitializer, Error as OpenDbError};
use sql_support::ConnExt;

use engram_traits::CURRENT_SCHEMA_VERSION;

const CREATE_CHANGE_LOG_SQL: &str = "
    CREATE TABLE IF NOT EXISTS change_log (
        sequence    INTEGER PRIMARY KEY AUTOINCREMENT,
        table_name  TEXT NOT NULL,
        entity_id   TEXT NOT NULL,
        operation   TEXT NOT NULL CHECK (operation IN ('upsert', 'delete')),
        payload     TEXT NULL,
        source_id   TEXT NOT NULL,
        created_at  TEXT NOT NULL,
        received_at TEXT NOT NULL
    )
";

const CREATE_CHANGE_LOG_SEQ_INDEX_SQL: &str = "
    CREATE INDEX IF NOT EXISTS idx_change_log_sequence ON change_log (sequence)
";

const CREATE_CHANGE_LOG_ENTITY_INDEX_SQL: &str = "
    CREATE INDEX IF NOT EXISTS idx_change_log_table_entity ON change_log (table_name, entity_id)
";

const CREATE_PUSH_IDEMPOTENCY_SQL: &str = "
    CREATE TABLE IF NOT EXISTS push_idempotency (
        push_id    TEXT PRIMARY KEY,
        store_id   TEXT NOT NULL,
        response   TEXT NOT NULL,
        created_at TEXT NOT NULL,
        expires_at TEXT NOT NULL
    )
";

const CREATE_PUSH_IDEMPOTENCY_EXPIRES_INDEX_SQL: &str = "
    CREATE INDEX IF NOT EXISTS idx_push_idempotency_expires ON push_idempotency (expires_at)
";

const CREATE_SYNC_META_SQL: &str = "
    CREATE TABLE IF NOT EXISTS sync_meta (
        key   TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
";

/// Drives `open_database`/`open_database_with_flags` for one store's
/// connection. `plugin_schema_sql` is gathered from
/// `engram_registry::Registry::all_plugins()` before opening, so the
/// domain tables a transport wires up are created alongside the core ones.
pub struct EngineSchema {
    pub plugin_schema_sql: Vec<&'static str>,
    /// `PRAGMA busy_timeout`, threaded in from `EngineConfig::busy_timeout_ms`
    /// so the tunable `spec.md` §6 calls for actually takes effect.
    pub busy_timeout_ms: u32,
}

impl ConnectionInitializer for EngineSchema {
    const NAME: &'static str = "engram";
    const END_VERSION: u32 = 1;

    fn prepare(&self, conn: &Connection, _db_empty: bool) -> sql_support::open_database::Result<()> {
        // WAL + foreign keys + busy timeout, per spec.md §6. These pragmas
        // can't run inside the schema transaction.
        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .map_err(OpenDbError::SqlError)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(OpenDbError::SqlError)?;
        conn.set_pragma("busy_timeout", self.busy_timeout_ms)
            .map_err(OpenDbError::SqlError)?;
        Ok(())
    }

    fn init(&self, db: &Transaction<'_>) -> sql_support::open_database::Result<()> {
        db.execute_batch(CREATE_CHANGE_LOG_SQL)
            .map_err(OpenDbError::SqlError)?;
        db.execute_batch(CREATE_CHANGE_LOG_SEQ_INDEX_SQL)
            .map_err(OpenDbError::SqlError)?;
        db.execute_batch(CREATE_CHANGE_LOG_ENTITY_INDEX_SQL)
            .map_err(OpenDbError::SqlError)?;
        db.execute_batch(CREATE_PUSH_IDEMPOTENCY_SQL)
            .map_err(OpenDbError::SqlError)?;
        db.execute_batch(CREATE_PUSH_IDEMPOTENCY_EXPIRES_INDEX_SQL)
            .map_err(OpenDbError::SqlError)?;
        db.execute_batch(CREATE_SYNC_META_SQL)
            .map_err(OpenDbError::SqlError)?;
        for sql in &self.plugin_schema_sql {
            db.execute_batch(sql).map_err(OpenDbError::SqlError)?;
        }
        db.execute(
            "INSERT INTO sync_meta (key, value) VALUES
                ('schema_version', ?1),
                ('last_compaction_seq', '0'),
                ('last_compaction_at', '')",
            [CURRENT_SCHEMA_VERSION.to_string()],
        )
        .map_err(OpenDbError::SqlError)?;
        Ok(())
    }

    fn upgrade_from(
        &self,
        _db: &Transaction<'_>,
        version: u32,
    ) -> sql_support::open_database::Result<()> {
        Err(OpenDbError::IncompatibleVersion(version))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use sql_support::open_database::test_utils::open_memory_database;
    use sql_support::ConnExt;

    #[test]
    fn test_bootstrap_schema() {
        let conn = open_memory_database(&EngineSchema {
            plugin_schema_sql: vec![],
            busy_timeout_ms: 5_000,
        })
        .unwrap();
        let version: String = conn
            .query_one("SELECT value FROM sync_meta WHERE key = 'schema_version'")
            .unwrap();
        assert_eq!(version.parse::<i64>().unwrap(), CURRENT_SCHEMA_VERSION);
        conn.execute_batch("SELECT sequence FROM change_log LIMIT 0").unwrap();
        conn.execute_batch("SELECT push_id FROM push_idempotency LIMIT 0").unwrap();
    }

    #[test]
    fn test_plugin_schema_sql_is_applied() {
        let conn = open_memory_database(&EngineSchema {
            plugin_schema_sql: vec!["CREATE TABLE goals (id TEXT PRIMARY KEY)"],
            busy_timeout_ms: 5_000,
        })
        .unwrap();
        conn.execute_batch("SELECT id FROM goals LIMIT 0").unwrap();
    }
}
