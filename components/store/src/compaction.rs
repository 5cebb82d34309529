/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Change-log compaction (`spec.md` §4.1): for each `(table_name,
//! entity_id)` group older than a cutoff, keep only the maximum-sequence
//! row; `delete` tombstones are never removed. Removed rows are journaled
//! to an audit sink before deletion, then deleted in batches sized to the
//! backing engine's parameter limit.

use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{params, Connection};
use sql_support::ConnExt;

use engram_traits::ChangeLogEntry;

use crate::change_log::{latest_sequence, row_to_entry};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::meta;

/// Where compaction journals the entries it's about to remove. `spec.md`
/// names the file format (`YYYY-MM-DD.jsonl`) but not how it's supplied --
/// tests substitute an in-memory sink instead of touching the filesystem.
pub trait AuditSink {
    fn write_removed(&mut self, date: &str, removed: &[ChangeLogEntry]) -> Result<()>;
}

/// Appends one JSON line per removed entry to `<dir>/<date>.jsonl`.
pub struct FileAuditSink {
    pub dir: PathBuf,
}

impl AuditSink for FileAuditSink {
    fn write_removed(&mut self, date: &str, removed: &[ChangeLogEntry]) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("{date}.jsonl"));
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        for entry in removed {
            let line = serde_json::to_string(entry)?;
            writeln!(file, "{line}")?;
        }
        Ok(())
    }
}

/// Captures removed entries in memory, for tests.
#[derive(Default)]
pub struct InMemoryAuditSink {
    pub written: Vec<(String, Vec<ChangeLogEntry>)>,
}

impl AuditSink for InMemoryAuditSink {
    fn write_removed(&mut self, date: &str, removed: &[ChangeLogEntry]) -> Result<()> {
        self.written.push((date.to_string(), removed.to_vec()));
        Ok(())
    }
}

const SELECT_COMPACTABLE_SQL: &str = "
    SELECT sequence, table_name, entity_id, operation, payload, source_id, created_at, received_at
    FROM change_log AS c
    WHERE c.operation = 'upsert'
      AND c.received_at < ?1
      AND c.sequence < (
          SELECT MAX(c2.sequence) FROM change_log AS c2
          WHERE c2.table_name = c.table_name AND c2.entity_id = c.entity_id
      )
";

/// Runs one compaction pass. `cutoff` and `today` are both caller-supplied
/// (RFC3339 cutoff timestamp, `YYYY-MM-DD` audit file date) so this stays a
/// pure function of its inputs rather than reaching for the wall clock --
/// the collaborator that owns scheduling provides both.
pub fn compact_once(
    conn: &Connection,
    cutoff: &str,
    today: &str,
    audit: &mut dyn AuditSink,
) -> Result<usize> {
    let to_remove: Vec<ChangeLogEntry> = {
        let mut stmt = conn.prepare(SELECT_COMPACTABLE_SQL)?;
        let rows = stmt.query_map(params![cutoff], row_to_entry)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        out
    };
    if to_remove.is_empty() {
        return Ok(0);
    }
    debug!(
        "compaction: removing {} superseded entries older than {}",
        to_remove.len(),
        cutoff
    );

    audit.write_removed(today, &to_remove)?;

    let tx = conn.unchecked_transaction()?;
    let sequences: Vec<i64> = to_remove.iter().map(|e| e.sequence).collect();
    sql_support::each_chunk(&sequences, |chunk, _offset| {
        let vars = sql_support::repeat_sql_vars(chunk.len());
        let sql = format!("DELETE FROM change_log WHERE sequence IN {vars}");
        tx.execute(&sql, chunk).map(|_| ())
    })?;

    let watermark = sequences.iter().copied().max().unwrap_or(0);
    meta::set(&tx, meta::LAST_COMPACTION_SEQ_KEY, &watermark.to_string())?;
    meta::set(&tx, meta::LAST_COMPACTION_AT_KEY, today)?;
    tx.commit()?;

    // Compaction never touches `LatestSequence`'s result: it only removes
    // superseded upserts, whose sequences are strictly less than the
    // group's retained maximum.
    debug_assert!(latest_sequence(conn).unwrap_or(0) >= watermark);

    Ok(to_remove.len())
}

/// `compact_once` against `now`, with the cutoff derived from
/// `EngineConfig::compaction_cutoff_secs` -- the cadence worker's usual
/// entry point, so the configured retention window actually governs what
/// gets compacted instead of requiring every caller to do this arithmetic
/// itself.
pub fn compact_due(
    conn: &Connection,
    config: &EngineConfig,
    now: DateTime<Utc>,
    audit: &mut dyn AuditSink,
) -> Result<usize> {
    let cutoff = (now - Duration::seconds(config.compaction_cutoff_secs)).to_rfc3339_opts(SecondsFormat::Nanos, true);
    let today = now.format("%Y-%m-%d").to_string();
    compact_once(conn, &cutoff, &today, audit)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::change_log::{append, NewChangeLogEntry};
    use crate::schema::EngineSchema;
    use engram_traits::Operation;
    use sql_support::open_database::test_utils::open_memory_database;

    fn db() -> Connection {
        open_memory_database(&EngineSchema {
            plugin_schema_sql: vec![],
            busy_timeout_ms: 5_000,
        })
        .unwrap()
    }

    fn upsert(conn: &Connection, id: &str, received_at: &str) -> i64 {
        append(
            conn,
            &NewChangeLogEntry {
                table_name: "lore_entries".to_string(),
                entity_id: id.to_string(),
                operation: Operation::Upsert,
                payload: Some(serde_json::json!({"id": id})),
                source_id: "s1".to_string(),
                created_at: received_at.to_string(),
                received_at: received_at.to_string(),
            },
        )
        .unwrap()
    }

    fn delete(conn: &Connection, id: &str, received_at: &str) -> i64 {
        append(
            conn,
            &NewChangeLogEntry {
                table_name: "lore_entries".to_string(),
                entity_id: id.to_string(),
                operation: Operation::Delete,
                payload: None,
                source_id: "s1".to_string(),
                created_at: received_at.to_string(),
                received_at: received_at.to_string(),
            },
        )
        .unwrap()
    }

    #[test]
    fn test_compaction_keeps_only_latest_upsert() {
        let conn = db();
        upsert(&conn, "e1", "2020-01-01");
        upsert(&conn, "e1", "2020-01-02");
        let latest = upsert(&conn, "e1", "2020-01-03");
        let mut sink = InMemoryAuditSink::default();
        let removed = compact_once(&conn, "2099-01-01", "2026-01-01", &mut sink).unwrap();
        assert_eq!(removed, 2);
        let remaining = crate::change_log::read_after(&conn, 0, 10).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].sequence, latest);
        assert_eq!(sink.written.len(), 1);
        assert_eq!(sink.written[0].1.len(), 2);
    }

    #[test]
    fn test_compaction_never_removes_delete_tombstones() {
        let conn = db();
        upsert(&conn, "e1", "2020-01-01");
        delete(&conn, "e1", "2020-01-02");
        let mut sink = InMemoryAuditSink::default();
        let removed = compact_once(&conn, "2099-01-01", "2026-01-01", &mut sink).unwrap();
        assert_eq!(removed, 1);
        let remaining = crate::change_log::read_after(&conn, 0, 10).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].operation, Operation::Delete);
    }

    #[test]
    fn test_compaction_updates_meta() {
        let conn = db();
        upsert(&conn, "e1", "2020-01-01");
        let latest = upsert(&conn, "e1", "2020-01-02");
        let mut sink = InMemoryAuditSink::default();
        compact_once(&conn, "2099-01-01", "2026-03-04", &mut sink).unwrap();
        assert_eq!(
            meta::get(&conn, meta::LAST_COMPACTION_SEQ_KEY).unwrap(),
            Some((latest - 1).to_string())
        );
        assert_eq!(
            meta::get(&conn, meta::LAST_COMPACTION_AT_KEY).unwrap(),
            Some("2026-03-04".to_string())
        );
    }

    #[test]
    fn test_compaction_no_candidates_is_noop() {
        let conn = db();
        upsert(&conn, "e1", "2020-01-01");
        let mut sink = InMemoryAuditSink::default();
        let removed = compact_once(&conn, "2099-01-01", "2026-01-01", &mut sink).unwrap();
        assert_eq!(removed, 0);
        assert!(sink.written.is_empty());
    }

    #[test]
    fn test_compact_due_honors_configured_cutoff() {
        let now: DateTime<Utc> = "2026-01-10T00:00:00Z".parse().unwrap();
        let config = EngineConfig {
            compaction_cutoff_secs: 24 * 60 * 60,
            ..EngineConfig::default()
        };
        // cutoff = now - 24h = 2026-01-09T00:00:00Z.

        let conn = db();
        upsert(&conn, "e1", "2026-01-09T00:00:01Z"); // superseded row, 1s inside the cutoff window
        upsert(&conn, "e1", "2026-01-09T12:00:00Z");
        let mut sink = InMemoryAuditSink::default();
        let removed = compact_due(&conn, &config, now, &mut sink).unwrap();
        assert_eq!(removed, 0, "the superseded row is still within the cutoff window");

        let conn = db();
        upsert(&conn, "e2", "2020-01-01T00:00:00Z"); // superseded row, well older than the cutoff
        upsert(&conn, "e2", "2026-01-08T00:00:00Z");
        let mut sink = InMemoryAuditSink::default();
        let removed = compact_due(&conn, &config, now, &mut sink).unwrap();
        assert_eq!(removed, 1, "the superseded row, being older than the cutoff, is compacted");
    }
}
