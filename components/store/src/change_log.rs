/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! The append-only change log (`spec.md` §4.1, component C1).

use rusqlite::{params, Connection, Row};
use sql_support::ConnExt;

use engram_traits::{ChangeLogEntry, Operation};

use crate::error::Result;

/// Everything the push pipeline has decided about one entry before it is
/// appended: the client's `table_name`/`entity_id`/`operation`/`payload`,
/// plus the fields the server stamps (`spec.md` §4.6 step 7). `sequence` is
/// assigned by SQLite's `AUTOINCREMENT`, hence its absence here.
#[derive(Debug, Clone)]
pub struct NewChangeLogEntry {
    pub table_name: String,
    pub entity_id: String,
    pub operation: Operation,
    pub payload: Option<serde_json::Value>,
    pub source_id: String,
    pub created_at: String,
    pub received_at: String,
}

pub(crate) fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<ChangeLogEntry> {
    let operation: String = row.get("operation")?;
    let payload: Option<String> = row.get("payload")?;
    Ok(ChangeLogEntry {
        sequence: row.get("sequence")?,
        table_name: row.get("table_name")?,
        entity_id: row.get("entity_id")?,
        operation: operation.parse().map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                "invalid operation".into(),
            )
        })?,
        payload: payload
            .map(|p| serde_json::from_str(&p))
            .transpose()
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    0,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?,
        source_id: row.get("source_id")?,
        created_at: row.get("created_at")?,
        received_at: row.get("received_at")?,
    })
}

/// Append one entry within an already-open transaction context, returning
/// its assigned `sequence`.
pub fn append_tx<C: ConnExt>(conn: &C, entry: &NewChangeLogEntry) -> Result<i64> {
    let payload_text = entry
        .payload
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    conn.conn().execute(
        "INSERT INTO change_log
            (table_name, entity_id, operation, payload, source_id, created_at, received_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            entry.table_name,
            entry.entity_id,
            entry.operation.as_str(),
            payload_text,
            entry.source_id,
            entry.created_at,
            entry.received_at,
        ],
    )?;
    Ok(conn.conn().last_insert_rowid())
}

/// Append a single entry, wrapping its own transaction so the caller gets
/// an atomic single-row append for free.
pub fn append(conn: &Connection, entry: &NewChangeLogEntry) -> Result<i64> {
    let tx = conn.unchecked_transaction()?;
    let seq = append_tx(&tx, entry)?;
    tx.commit()?;
    Ok(seq)
}

/// Append a batch within an already-open transaction, returning the
/// highest sequence assigned. Callers that want the "all land or none do"
/// guarantee without already being inside a transaction should use
/// [`append_batch`] instead.
pub fn append_batch_tx<C: ConnExt>(conn: &C, entries: &[NewChangeLogEntry]) -> Result<i64> {
    let mut highest = latest_sequence(conn.conn())?;
    for entry in entries {
        highest = append_tx(conn, entry)?;
    }
    Ok(highest)
}

/// Append a batch atomically: either every entry lands with a contiguous
/// sequence, or none do.
pub fn append_batch(conn: &Connection, entries: &[NewChangeLogEntry]) -> Result<i64> {
    let tx = conn.unchecked_transaction()?;
    let highest = append_batch_tx(&tx, entries)?;
    tx.commit()?;
    Ok(highest)
}

/// Like [`append_batch_tx`], but returns the assigned sequence for every
/// entry in order -- the push pipeline needs these to hand the plugin's
/// `on_replay` hook a fully-formed `ChangeLogEntry` per committed entry,
/// not just the batch's highest sequence.
pub fn append_batch_with_sequences_tx<C: ConnExt>(
    conn: &C,
    entries: &[NewChangeLogEntry],
) -> Result<Vec<i64>> {
    let mut sequences = Vec::with_capacity(entries.len());
    for entry in entries {
        sequences.push(append_tx(conn, entry)?);
    }
    Ok(sequences)
}

/// Entries with `sequence > after_seq`, ascending, capped at `limit`.
pub fn read_after(conn: &Connection, after_seq: i64, limit: i64) -> Result<Vec<ChangeLogEntry>> {
    let mut stmt = conn.prepare(
        "SELECT sequence, table_name, entity_id, operation, payload, source_id, created_at, received_at
         FROM change_log
         WHERE sequence > ?1
         ORDER BY sequence ASC
         LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![after_seq, limit], row_to_entry)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Highest assigned sequence, or zero when the log is empty. Never fails
/// on an empty log.
pub fn latest_sequence(conn: &Connection) -> Result<i64> {
    Ok(conn.query_one::<i64>("SELECT COALESCE(MAX(sequence), 0) FROM change_log")?)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::schema::EngineSchema;
    use sql_support::open_database::test_utils::open_memory_database;

    fn db() -> Connection {
        open_memory_database(&EngineSchema {
            plugin_schema_sql: vec![],
            busy_timeout_ms: 5_000,
        })
        .unwrap()
    }

    fn entry(table: &str, id: &str, op: Operation) -> NewChangeLogEntry {
        NewChangeLogEntry {
            table_name: table.to_string(),
            entity_id: id.to_string(),
            operation: op,
            payload: match op {
                Operation::Upsert => Some(serde_json::json!({"id": id})),
                Operation::Delete => None,
            },
            source_id: "s1".to_string(),
            created_at: "2026-01-01T00:00:00.000000000Z".to_string(),
            received_at: "2026-01-01T00:00:00.000000000Z".to_string(),
        }
    }

    #[test]
    fn test_empty_log_latest_sequence_is_zero() {
        let conn = db();
        assert_eq!(latest_sequence(&conn).unwrap(), 0);
    }

    #[test]
    fn test_append_assigns_monotone_sequences() {
        let conn = db();
        let s1 = append(&conn, &entry("lore_entries", "e1", Operation::Upsert)).unwrap();
        let s2 = append(&conn, &entry("lore_entries", "e2", Operation::Upsert)).unwrap();
        assert!(s1 < s2);
        assert_eq!(latest_sequence(&conn).unwrap(), s2);
    }

    #[test]
    fn test_append_batch_is_atomic_and_contiguous() {
        let conn = db();
        let entries = vec![
            entry("lore_entries", "e1", Operation::Upsert),
            entry("lore_entries", "e2", Operation::Upsert),
            entry("lore_entries", "e3", Operation::Delete),
        ];
        let highest = append_batch(&conn, &entries).unwrap();
        let all = read_after(&conn, 0, 10).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all.last().unwrap().sequence, highest);
        for w in all.windows(2) {
            assert_eq!(w[1].sequence, w[0].sequence + 1);
        }
    }

    #[test]
    fn test_delete_entry_payload_is_null_not_empty() {
        let conn = db();
        append(&conn, &entry("lore_entries", "e1", Operation::Delete)).unwrap();
        let all = read_after(&conn, 0, 10).unwrap();
        assert_eq!(all[0].payload, None);
    }

    #[test]
    fn test_read_after_respects_cursor_and_limit() {
        let conn = db();
        for i in 0..5 {
            append(
                &conn,
                &entry("lore_entries", &format!("e{i}"), Operation::Upsert),
            )
            .unwrap();
        }
        let page = read_after(&conn, 0, 2).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].sequence, 1);
        assert_eq!(page[1].sequence, 2);
        let page2 = read_after(&conn, page[1].sequence, 2).unwrap();
        assert_eq!(page2[0].sequence, 3);
    }
}
