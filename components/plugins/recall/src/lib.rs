/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! The `Recall` domain plugin (`spec.md` §4.4): a single-table, semantic-
//! memory store. Validates the `lore_entries` payload shape and, after a
//! successful replay, schedules the (externally owned) embedding job --
//! a failure there must never invalidate a push that has already
//! replicated.

use rusqlite::Connection;
use serde::Deserialize;

use engram_traits::{ChangeLogEntry, DomainPlugin, Operation, PendingEntry, TableSchema, ValidationError};

/// The fixed category enum `spec.md` §4.4 requires. `SCREAMING_SNAKE_CASE`
/// on the wire, matching how the teacher types bounded-domain string
/// columns (e.g. `logins::SyncStatus`) as enums rather than raw strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoreCategory {
    TestingStrategy,
    ArchitectureDecision,
    CodingConvention,
    BugPattern,
    PerformanceInsight,
    SecurityConstraint,
    DomainKnowledge,
    ToolingPreference,
}

/// Columns the generic replay path binds for `lore_entries`. Mirrors
/// `engram_store::replay::LEGACY_LORE_ENTRIES_COLUMNS` so registering this
/// schema doesn't change which columns the generic upsert writes --
/// `embedding` is deliberately excluded: it's owned by the external
/// embedding generator, never by client payloads.
const LORE_ENTRIES_COLUMNS: &[&str] = &[
    "id",
    "content",
    "category",
    "source_id",
    "confidence",
    "created_at",
    "updated_at",
    "embedding_status",
];

const CREATE_LORE_ENTRIES_SQL: &str = "
    CREATE TABLE IF NOT EXISTS lore_entries (
        id               TEXT PRIMARY KEY,
        content           TEXT NOT NULL,
        category          TEXT NOT NULL,
        source_id         TEXT NOT NULL,
        confidence        REAL NOT NULL,
        created_at        TEXT NOT NULL,
        updated_at        TEXT NOT NULL,
        embedding_status  TEXT NULL,
        embedding         BLOB NULL
    )
";

const CREATE_LORE_ENTRIES_CATEGORY_INDEX_SQL: &str = "
    CREATE INDEX IF NOT EXISTS idx_lore_entries_category ON lore_entries (category)
";

#[derive(Debug, Default)]
pub struct RecallPlugin;

impl RecallPlugin {
    pub fn new() -> Self {
        Self
    }
}

/// The shape a `lore_entries` upsert payload must decode into, minus the
/// double-encoding check (done before this runs -- see
/// [`reject_double_encoded`]).
#[derive(Debug, Deserialize)]
struct LoreEntryPayload {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    category: Option<serde_json::Value>,
    #[serde(default)]
    source_id: Option<String>,
    #[serde(default)]
    confidence: Option<serde_json::Value>,
}

fn non_empty(s: &Option<String>) -> bool {
    s.as_deref().map(|s| !s.is_empty()).unwrap_or(false)
}

/// `spec.md` §4.4: "detects and rejects double-encoded JSON (payload
/// begins with `"` and, when string-decoded, parses as an object)". In a
/// strongly-typed host the wire payload is already parsed once, so a
/// double-encoded payload surfaces as a JSON *string* whose contents
/// themselves parse as a JSON object.
fn is_double_encoded(payload: &serde_json::Value) -> bool {
    match payload {
        serde_json::Value::String(s) => matches!(
            serde_json::from_str::<serde_json::Value>(s),
            Ok(serde_json::Value::Object(_))
        ),
        _ => false,
    }
}

fn validate_upsert(idx: usize, entry: &PendingEntry) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let Some(payload) = entry.payload.as_ref() else {
        errors.push(
            ValidationError::new(idx, &entry.table_name, &entry.entity_id, "upsert requires a payload")
                .with_field("payload"),
        );
        return errors;
    };

    if is_double_encoded(payload) {
        errors.push(
            ValidationError::new(
                idx,
                &entry.table_name,
                &entry.entity_id,
                "payload is double-encoded JSON (a JSON string containing an object)",
            )
            .with_field("payload"),
        );
        return errors;
    }

    let parsed: LoreEntryPayload = match serde_json::from_value(payload.clone()) {
        Ok(p) => p,
        Err(_) => {
            errors.push(
                ValidationError::new(idx, &entry.table_name, &entry.entity_id, "payload is not a JSON object")
                    .with_field("payload"),
            );
            return errors;
        }
    };

    if !non_empty(&parsed.id) {
        errors.push(
            ValidationError::new(idx, &entry.table_name, &entry.entity_id, "id must be non-empty")
                .with_field("id"),
        );
    }
    if !non_empty(&parsed.content) {
        errors.push(
            ValidationError::new(idx, &entry.table_name, &entry.entity_id, "content must be non-empty")
                .with_field("content"),
        );
    }
    if !non_empty(&parsed.source_id) {
        errors.push(
            ValidationError::new(idx, &entry.table_name, &entry.entity_id, "source_id must be non-empty")
                .with_field("source_id"),
        );
    }

    match &parsed.category {
        Some(serde_json::Value::String(_)) => {
            if serde_json::from_value::<LoreCategory>(parsed.category.clone().unwrap()).is_err() {
                errors.push(
                    ValidationError::new(
                        idx,
                        &entry.table_name,
                        &entry.entity_id,
                        "category is not one of the recognized lore categories",
                    )
                    .with_field("category"),
                );
            }
        }
        _ => errors.push(
            ValidationError::new(idx, &entry.table_name, &entry.entity_id, "category must be a string")
                .with_field("category"),
        ),
    }

    match parsed.confidence.as_ref().and_then(|v| v.as_f64()) {
        Some(c) if (0.0..=1.0).contains(&c) => {}
        Some(_) => errors.push(
            ValidationError::new(idx, &entry.table_name, &entry.entity_id, "confidence must be within [0, 1]")
                .with_field("confidence"),
        ),
        None => errors.push(
            ValidationError::new(idx, &entry.table_name, &entry.entity_id, "confidence must be a number")
                .with_field("confidence"),
        ),
    }

    errors
}

impl DomainPlugin for RecallPlugin {
    fn store_type(&self) -> &'static str {
        "recall"
    }

    fn table_schemas(&self) -> Vec<TableSchema> {
        vec![TableSchema::new(
            "lore_entries",
            LORE_ENTRIES_COLUMNS.iter().map(|s| s.to_string()).collect(),
            false,
        )
        .expect("engram-plugin-recall: lore_entries schema is statically valid")]
    }

    fn schema_sql(&self) -> &'static [&'static str] {
        &[CREATE_LORE_ENTRIES_SQL, CREATE_LORE_ENTRIES_CATEGORY_INDEX_SQL]
    }

    fn validate_push(
        &self,
        entries: Vec<PendingEntry>,
    ) -> Result<Vec<PendingEntry>, Vec<ValidationError>> {
        let mut errors = Vec::new();
        for (idx, entry) in entries.iter().enumerate() {
            if entry.table_name != "lore_entries" {
                errors.push(ValidationError::new(
                    idx,
                    &entry.table_name,
                    &entry.entity_id,
                    format!("recall stores only replicate `lore_entries`, got `{}`", entry.table_name),
                ));
                continue;
            }
            if entry.operation == Operation::Upsert {
                errors.extend(validate_upsert(idx, entry));
            }
        }
        if errors.is_empty() {
            Ok(entries)
        } else {
            Err(errors)
        }
    }

    /// Per-entry, best-effort: each entry's row has already been replayed
    /// by the engine's generic replay path by the time this runs (this
    /// hook only schedules the downstream embedding job). Iterates without
    /// an enclosing transaction -- `spec.md` §9 Design Notes documents this
    /// as acceptable because replay, and therefore this hook, is
    /// idempotent; a mid-batch failure here leaves earlier entries queued
    /// and simply skips the rest, to be picked up on the next push or
    /// compaction-adjacent sweep.
    fn on_replay(&self, conn: &Connection, entries: &[ChangeLogEntry]) {
        for entry in entries {
            if entry.table_name != "lore_entries" || entry.operation != Operation::Upsert {
                continue;
            }
            if let Err(e) = engram_store::replay::queue_embedding_tx(conn, &entry.entity_id) {
                error_support::report_error!(
                    "engram-plugin-recall",
                    "queue_embedding failed for lore_entries/{}: {e}",
                    entry.entity_id
                );
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn upsert(id: &str, payload: serde_json::Value) -> PendingEntry {
        PendingEntry {
            table_name: "lore_entries".to_string(),
            entity_id: id.to_string(),
            operation: Operation::Upsert,
            payload: Some(payload),
            created_at: None,
        }
    }

    fn valid_payload() -> serde_json::Value {
        serde_json::json!({
            "id": "e1",
            "content": "c",
            "category": "TESTING_STRATEGY",
            "confidence": 0.5,
            "source_id": "s1",
        })
    }

    #[test]
    fn test_accepts_valid_entry() {
        let plugin = RecallPlugin::new();
        let out = plugin.validate_push(vec![upsert("e1", valid_payload())]).unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_rejects_unknown_table() {
        let plugin = RecallPlugin::new();
        let mut entry = upsert("e1", valid_payload());
        entry.table_name = "other_table".to_string();
        let errs = plugin.validate_push(vec![entry]).unwrap_err();
        assert_eq!(errs.len(), 1);
        assert!(errs[0].message.contains("lore_entries"));
    }

    #[test]
    fn test_rejects_missing_content() {
        let plugin = RecallPlugin::new();
        let mut payload = valid_payload();
        payload.as_object_mut().unwrap().remove("content");
        let errs = plugin.validate_push(vec![upsert("e1", payload)]).unwrap_err();
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].field.as_deref(), Some("content"));
    }

    #[test]
    fn test_rejects_out_of_range_confidence() {
        let plugin = RecallPlugin::new();
        let mut payload = valid_payload();
        payload["confidence"] = serde_json::json!(1.5);
        let errs = plugin.validate_push(vec![upsert("e1", payload)]).unwrap_err();
        assert_eq!(errs[0].field.as_deref(), Some("confidence"));
    }

    #[test]
    fn test_rejects_unknown_category() {
        let plugin = RecallPlugin::new();
        let mut payload = valid_payload();
        payload["category"] = serde_json::json!("NOT_A_CATEGORY");
        let errs = plugin.validate_push(vec![upsert("e1", payload)]).unwrap_err();
        assert_eq!(errs[0].field.as_deref(), Some("category"));
    }

    #[test]
    fn test_rejects_double_encoded_json() {
        let plugin = RecallPlugin::new();
        let inner = valid_payload().to_string();
        let entry = upsert("e1", serde_json::Value::String(inner));
        let errs = plugin.validate_push(vec![entry]).unwrap_err();
        assert_eq!(errs.len(), 1);
        assert!(errs[0].message.contains("double-encoded"));
    }

    #[test]
    fn test_collects_all_errors_across_batch() {
        let plugin = RecallPlugin::new();
        let mut bad1 = valid_payload();
        bad1.as_object_mut().unwrap().remove("content");
        let mut bad2 = valid_payload();
        bad2["confidence"] = serde_json::json!(2.0);
        let errs = plugin
            .validate_push(vec![upsert("e1", bad1), upsert("e2", bad2)])
            .unwrap_err();
        assert_eq!(errs.len(), 2);
    }

    #[test]
    fn test_declares_lore_entries_schema() {
        let plugin = RecallPlugin::new();
        let schemas = plugin.table_schemas();
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0].name, "lore_entries");
        assert_eq!(schemas[0].columns[0], "id");
    }
}
