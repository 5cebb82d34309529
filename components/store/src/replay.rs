/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! The replay executor (`spec.md` §4.5, component C5): transactional
//! generic upsert/delete against domain tables, driven by a registered
//! `TableSchema`, plus the legacy hard-coded `lore_entries` path for
//! deployments that use `engram-store` without the `lore_entries`
//! `TableSchema` being registered.

use rusqlite::types::Value as SqlValue;
use rusqlite::ToSql;
use sql_support::ConnExt;

use engram_traits::TableSchema;

use crate::error::{Error, ErrorKind, Result};

/// Resolution of `table` against the registry, per the dispatch rule in
/// `spec.md` §4.5.
pub enum Dispatch {
    Generic(TableSchema),
    LegacyLoreEntries,
    Unsupported,
}

pub fn dispatch(schema: Option<TableSchema>, table: &str) -> Dispatch {
    match schema {
        Some(schema) => Dispatch::Generic(schema),
        None if table == "lore_entries" => Dispatch::LegacyLoreEntries,
        None => Dispatch::Unsupported,
    }
}

fn json_to_sql(value: Option<&serde_json::Value>) -> SqlValue {
    match value {
        None | Some(serde_json::Value::Null) => SqlValue::Null,
        Some(serde_json::Value::String(s)) => SqlValue::Text(s.clone()),
        Some(serde_json::Value::Bool(b)) => SqlValue::Integer(if *b { 1 } else { 0 }),
        Some(serde_json::Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                SqlValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                SqlValue::Real(f)
            } else {
                SqlValue::Null
            }
        }
        Some(v @ (serde_json::Value::Object(_) | serde_json::Value::Array(_))) => {
            SqlValue::Text(serde_json::to_string(v).unwrap_or_default())
        }
    }
}

/// Generic upsert: `INSERT ... ON CONFLICT(id) DO UPDATE SET col = excluded.col ...`.
/// The `ON CONFLICT` form is mandatory (`spec.md` §4.5) -- delete-then-insert
/// would cascade-delete FK children that reference `id`. `updated_at` is
/// always overwritten with `now`; `created_at`, if the schema declares the
/// column, falls back to `now` only when the payload doesn't supply it --
/// a client that never sends `created_at` (e.g. the minimal `lore_entries`
/// upsert in `spec.md` §8 scenario 1) must not bind `NULL` into a column a
/// plugin declared `NOT NULL`.
pub fn upsert_row_tx<C: ConnExt>(
    conn: &C,
    schema: &TableSchema,
    entity_id: &str,
    payload: &serde_json::Value,
    now: &str,
) -> Result<()> {
    let map = payload.as_object().ok_or_else(|| {
        Error::from(ErrorKind::InvalidPayload {
            table: schema.name.clone(),
            entity_id: entity_id.to_string(),
        })
    })?;

    if let Some(serde_json::Value::String(payload_id)) = map.get("id") {
        if payload_id != entity_id {
            return Err(ErrorKind::EntityIdMismatch {
                table: schema.name.clone(),
                entity_id: entity_id.to_string(),
                payload_id: payload_id.clone(),
            }
            .into());
        }
    }

    let mut values: Vec<SqlValue> = Vec::with_capacity(schema.columns.len());
    for col in &schema.columns {
        if col == "id" {
            values.push(SqlValue::Text(entity_id.to_string()));
        } else if col == "updated_at" {
            values.push(SqlValue::Text(now.to_string()));
        } else if col == "created_at" && !map.contains_key("created_at") {
            values.push(SqlValue::Text(now.to_string()));
        } else {
            values.push(json_to_sql(map.get(col)));
        }
    }

    let placeholders = (1..=schema.columns.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let updates = schema
        .columns
        .iter()
        .filter(|c| c.as_str() != "id")
        .map(|c| format!("{c} = excluded.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    let cols = schema.columns.join(", ");
    let sql = format!(
        "INSERT INTO {table} ({cols}) VALUES ({placeholders}) ON CONFLICT(id) DO UPDATE SET {updates}",
        table = schema.name,
    );
    let params: Vec<&dyn ToSql> = values.iter().map(|v| v as &dyn ToSql).collect();
    error_support::breadcrumb!("replay: upsert {}.{}", schema.name, entity_id);
    conn.conn().execute(&sql, params.as_slice())?;
    Ok(())
}

/// Generic delete: soft-delete sets `deleted_at`/`updated_at`, guarded by
/// `deleted_at IS NULL` so repeated calls are idempotent; hard-delete is a
/// plain `DELETE` (idempotent because absence is not an error).
pub fn delete_row_tx<C: ConnExt>(
    conn: &C,
    schema: &TableSchema,
    entity_id: &str,
    now: &str,
) -> Result<()> {
    if schema.soft_delete {
        conn.conn().execute(
            &format!(
                "UPDATE {table} SET deleted_at = ?1, updated_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
                table = schema.name,
            ),
            rusqlite::params![now, entity_id],
        )?;
    } else {
        conn.conn().execute(
            &format!("DELETE FROM {table} WHERE id = ?1", table = schema.name),
            rusqlite::params![entity_id],
        )?;
    }
    Ok(())
}

/// Columns of the hard-coded `lore_entries` fallback table, used only when
/// no `TableSchema` has been registered for it (i.e. `engram-plugin-recall`
/// isn't wired into the process). Mirrors the columns
/// `engram-plugin-recall`'s `schema_sql` creates.
const LEGACY_LORE_ENTRIES_COLUMNS: &[&str] = &[
    "id",
    "content",
    "category",
    "source_id",
    "confidence",
    "created_at",
    "updated_at",
    "embedding_status",
];

pub fn upsert_lore_entries_legacy_tx<C: ConnExt>(
    conn: &C,
    entity_id: &str,
    payload: &serde_json::Value,
    now: &str,
) -> Result<()> {
    let schema = TableSchema {
        name: "lore_entries".to_string(),
        columns: LEGACY_LORE_ENTRIES_COLUMNS.iter().map(|s| s.to_string()).collect(),
        soft_delete: false,
    };
    upsert_row_tx(conn, &schema, entity_id, payload, now)
}

pub fn delete_lore_entries_legacy_tx<C: ConnExt>(conn: &C, entity_id: &str) -> Result<()> {
    conn.conn()
        .execute("DELETE FROM lore_entries WHERE id = ?1", rusqlite::params![entity_id])?;
    Ok(())
}

/// Marks a `lore_entries` row `pending` for embedding generation, but only
/// if it has neither an embedding nor a pending job already -- the
/// embedding generator itself is an external collaborator (`spec.md` §1);
/// this just flips a status flag it later picks up.
pub fn queue_embedding_tx<C: ConnExt>(conn: &C, entity_id: &str) -> Result<()> {
    conn.conn().execute(
        "UPDATE lore_entries
         SET embedding_status = 'pending'
         WHERE id = ?1 AND embedding IS NULL AND (embedding_status IS NULL OR embedding_status != 'pending')",
        rusqlite::params![entity_id],
    )?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use rusqlite::Connection;

    fn conn_with_table(soft_delete: bool) -> (Connection, TableSchema) {
        let conn = Connection::open_in_memory().unwrap();
        if soft_delete {
            conn.execute_batch(
                "CREATE TABLE widgets (id TEXT PRIMARY KEY, name TEXT, updated_at TEXT, deleted_at TEXT)",
            )
            .unwrap();
            (
                conn,
                TableSchema::new(
                    "widgets",
                    vec!["id".into(), "name".into(), "updated_at".into()],
                    true,
                )
                .unwrap(),
            )
        } else {
            conn.execute_batch("CREATE TABLE widgets (id TEXT PRIMARY KEY, name TEXT, updated_at TEXT)")
                .unwrap();
            (
                conn,
                TableSchema::new(
                    "widgets",
                    vec!["id".into(), "name".into(), "updated_at".into()],
                    false,
                )
                .unwrap(),
            )
        }
    }

    #[test]
    fn test_upsert_then_update() {
        let (conn, schema) = conn_with_table(false);
        upsert_row_tx(&conn, &schema, "w1", &serde_json::json!({"id": "w1", "name": "a"}), "t1").unwrap();
        upsert_row_tx(&conn, &schema, "w1", &serde_json::json!({"id": "w1", "name": "b"}), "t2").unwrap();
        let (name, updated): (String, String) = conn
            .query_row("SELECT name, updated_at FROM widgets WHERE id = 'w1'", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .unwrap();
        assert_eq!(name, "b");
        assert_eq!(updated, "t2");
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM widgets", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_upsert_rejects_id_mismatch() {
        let (conn, schema) = conn_with_table(false);
        let err = upsert_row_tx(&conn, &schema, "w1", &serde_json::json!({"id": "other"}), "t1")
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::EntityIdMismatch { .. }));
    }

    #[test]
    fn test_hard_delete_is_idempotent() {
        let (conn, schema) = conn_with_table(false);
        upsert_row_tx(&conn, &schema, "w1", &serde_json::json!({"id": "w1"}), "t1").unwrap();
        delete_row_tx(&conn, &schema, "w1", "t2").unwrap();
        delete_row_tx(&conn, &schema, "w1", "t2").unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM widgets", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_soft_delete_is_idempotent() {
        let (conn, schema) = conn_with_table(true);
        upsert_row_tx(&conn, &schema, "w1", &serde_json::json!({"id": "w1"}), "t1").unwrap();
        delete_row_tx(&conn, &schema, "w1", "t2").unwrap();
        delete_row_tx(&conn, &schema, "w1", "t3").unwrap();
        let deleted_at: String = conn
            .query_row("SELECT deleted_at FROM widgets WHERE id = 'w1'", [], |r| r.get(0))
            .unwrap();
        // Second delete is a no-op thanks to `deleted_at IS NULL`.
        assert_eq!(deleted_at, "t2");
    }

    #[test]
    fn test_missing_map_entries_bind_null() {
        let (conn, schema) = conn_with_table(false);
        upsert_row_tx(&conn, &schema, "w1", &serde_json::json!({"id": "w1"}), "t1").unwrap();
        let name: Option<String> = conn
            .query_row("SELECT name FROM widgets WHERE id = 'w1'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(name, None);
    }

    #[test]
    fn test_created_at_is_stamped_when_payload_omits_it_and_column_is_not_null() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE lore_entries (id TEXT PRIMARY KEY, content TEXT, created_at TEXT NOT NULL, updated_at TEXT)",
        )
        .unwrap();
        let schema = TableSchema::new(
            "lore_entries",
            vec!["id".into(), "content".into(), "created_at".into(), "updated_at".into()],
            false,
        )
        .unwrap();

        // spec.md §8 scenario 1's payload omits `created_at` entirely; this
        // must not bind NULL into the NOT NULL column.
        upsert_row_tx(&conn, &schema, "e1", &serde_json::json!({"id": "e1", "content": "c"}), "t1").unwrap();
        let created: String = conn
            .query_row("SELECT created_at FROM lore_entries WHERE id = 'e1'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(created, "t1");
    }

    #[test]
    fn test_created_at_from_payload_is_preserved_over_the_stamped_default() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE lore_entries (id TEXT PRIMARY KEY, created_at TEXT NOT NULL, updated_at TEXT)",
        )
        .unwrap();
        let schema =
            TableSchema::new("lore_entries", vec!["id".into(), "created_at".into(), "updated_at".into()], false)
                .unwrap();

        upsert_row_tx(
            &conn,
            &schema,
            "e1",
            &serde_json::json!({"id": "e1", "created_at": "client-supplied"}),
            "t1",
        )
        .unwrap();
        let created: String = conn
            .query_row("SELECT created_at FROM lore_entries WHERE id = 'e1'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(created, "client-supplied");
    }
}
