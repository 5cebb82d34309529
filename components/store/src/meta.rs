/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! `sync_meta` key/value access (`spec.md` §3): the schema-version gate
//! and compaction bookkeeping both live here.

use rusqlite::{params, OptionalExtension};
use sql_support::ConnExt;

use crate::error::Result;

pub const SCHEMA_VERSION_KEY: &str = "schema_version";
pub const LAST_COMPACTION_SEQ_KEY: &str = "last_compaction_seq";
pub const LAST_COMPACTION_AT_KEY: &str = "last_compaction_at";

pub fn get<C: ConnExt>(conn: &C, key: &str) -> Result<Option<String>> {
    Ok(conn
        .conn()
        .query_row(
            "SELECT value FROM sync_meta WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?)
}

pub fn set<C: ConnExt>(conn: &C, key: &str, value: &str) -> Result<()> {
    conn.conn().execute(
        "INSERT INTO sync_meta (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

/// `sync_meta.schema_version` as an integer, defaulting to
/// `engram_traits::CURRENT_SCHEMA_VERSION` if the row is somehow absent
/// (it's seeded at bootstrap, so this should only happen against a
/// hand-built test database).
pub fn schema_version<C: ConnExt>(conn: &C) -> Result<i64> {
    Ok(get(conn, SCHEMA_VERSION_KEY)?
        .and_then(|v| v.parse().ok())
        .unwrap_or(engram_traits::CURRENT_SCHEMA_VERSION))
}

#[cfg(test)]
mod test {
    use super::*;
    use rusqlite::Connection;

    fn conn() -> Connection {
        let c = Connection::open_in_memory().unwrap();
        c.execute_batch("CREATE TABLE sync_meta (key TEXT PRIMARY KEY, value TEXT NOT NULL)")
            .unwrap();
        c
    }

    #[test]
    fn test_get_missing_is_none() {
        let c = conn();
        assert_eq!(get(&c, "nope").unwrap(), None);
    }

    #[test]
    fn test_set_then_get_then_upsert() {
        let c = conn();
        set(&c, "k", "1").unwrap();
        assert_eq!(get(&c, "k").unwrap(), Some("1".to_string()));
        set(&c, "k", "2").unwrap();
        assert_eq!(get(&c, "k").unwrap(), Some("2".to_string()));
    }

    #[test]
    fn test_schema_version_default_when_absent() {
        let c = conn();
        assert_eq!(
            schema_version(&c).unwrap(),
            engram_traits::CURRENT_SCHEMA_VERSION
        );
    }
}
