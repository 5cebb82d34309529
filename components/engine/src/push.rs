/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! The push pipeline (`spec.md` §4.6, component C6): shape validation,
//! idempotency replay, the schema-version gate, plugin validation, and the
//! transactional stage-and-commit, in that order.

use chrono::{Duration, SecondsFormat, Utc};
use interrupt_support::Interruptee;
use rusqlite::Connection;
use sql_support::ConnExt;

use engram_registry::Registry;
use engram_store::{change_log, idempotency, meta, replay, EngineConfig, Store};
use engram_traits::{ChangeLogEntry, Operation, PushRequest, PushResponse, ValidationError};

use crate::error::{EngineError, Result};

/// What a successful (or idempotently replayed) push produced. `transports`
/// use `idempotent_replay` to decide whether to set `X-Idempotent-Replay`,
/// and `response_bytes` to write the body without re-serializing `response`.
#[derive(Debug, Clone)]
pub struct PushResult {
    pub response: PushResponse,
    pub response_bytes: Vec<u8>,
    pub idempotent_replay: bool,
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// `spec.md` §4.6 step 1: shape validation, before anything touches the
/// store.
fn validate_shape(request: &PushRequest, max_push_entries: usize) -> Result<()> {
    if request.push_id.is_empty() {
        return Err(EngineError::BadRequest("push_id must not be empty".to_string()));
    }
    if request.source_id.is_empty() {
        return Err(EngineError::BadRequest("source_id must not be empty".to_string()));
    }
    if request.schema_version < 1 {
        return Err(EngineError::BadRequest("schema_version must be >= 1".to_string()));
    }
    if request.entries.is_empty() {
        return Err(EngineError::BadRequest("entries must not be empty".to_string()));
    }
    if request.entries.len() > max_push_entries {
        return Err(EngineError::BadRequest(format!(
            "entries exceeds the maximum batch size of {max_push_entries}"
        )));
    }
    Ok(())
}

/// Internal error type for the storage-touching stage of the pipeline
/// (steps 3-8): everything from here on can fail either because the
/// backing store misbehaved (unexpected, logged and reported) or because
/// the request itself was legitimately rejected (schema mismatch, failed
/// validation -- expected outcomes, not logged as errors). `GetErrorHandling`
/// below is the one seam in this crate with differentiated
/// logging/reporting policy, per `SPEC_FULL.md` §1.
#[derive(Debug, thiserror::Error)]
enum PushStageError {
    #[error("storage failure: {0}")]
    Storage(#[from] engram_store::Error),
    #[error("could not serialize the cached push response: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("client schema version {client_version} is ahead of server schema version {server_version}")]
    SchemaMismatch { client_version: i64, server_version: i64 },
    #[error("{} entries failed validation", .0.len())]
    ValidationFailed(Vec<ValidationError>),
}

impl error_support::GetErrorHandling for PushStageError {
    type ExternalError = EngineError;

    fn get_error_handling(&self) -> error_support::ErrorHandling<EngineError> {
        match self {
            PushStageError::Storage(e) => error_support::ErrorHandling::unexpected(
                EngineError::Storage(e.to_string()),
                Some("engram-engine"),
            ),
            PushStageError::Serialize(e) => error_support::ErrorHandling::unexpected(
                EngineError::Storage(e.to_string()),
                Some("engram-engine"),
            ),
            PushStageError::SchemaMismatch {
                client_version,
                server_version,
            } => error_support::ErrorHandling::passthrough(EngineError::SchemaMismatch {
                client_version: *client_version,
                server_version: *server_version,
            }),
            PushStageError::ValidationFailed(errors) => {
                error_support::ErrorHandling::passthrough(EngineError::ValidationFailed(errors.clone()))
            }
        }
    }
}

fn missing_payload(table: &str, entity_id: &str) -> engram_store::Error {
    engram_store::ErrorKind::MissingPayload {
        table: table.to_string(),
        entity_id: entity_id.to_string(),
    }
    .into()
}

fn check_interrupted(interruptee: &dyn Interruptee) -> std::result::Result<(), PushStageError> {
    interruptee
        .err_if_interrupted()
        .map_err(|e| PushStageError::Storage(e.into()))
}

#[error_support::handle_error(EngineError)]
fn push_inner(
    conn: &Connection,
    registry: &Registry,
    store_id: &str,
    store_type: &str,
    request: PushRequest,
    config: &EngineConfig,
    interruptee: &dyn Interruptee,
) -> std::result::Result<PushResult, PushStageError> {
    let now = now_rfc3339();

    check_interrupted(interruptee)?;

    // Step 3: idempotency replay.
    let (cached, hit) = idempotency::check(conn, &request.push_id, &now)?;
    if hit {
        let response_bytes = cached.expect("hit implies a cached response");
        let response: PushResponse = serde_json::from_slice(&response_bytes)?;
        return Ok(PushResult {
            response,
            response_bytes,
            idempotent_replay: true,
        });
    }

    // Step 4: schema-version gate.
    let server_version = meta::schema_version(conn)?;
    if request.schema_version > server_version {
        return Err(PushStageError::SchemaMismatch {
            client_version: request.schema_version,
            server_version,
        });
    }

    // Step 5: resolve plugin (falls back to the registered generic plugin).
    let (plugin, _found) = registry.get(store_type);
    let plugin = plugin.expect(
        "no DomainPlugin registered for this store_type and no generic fallback installed via Registry::set_generic",
    );

    // Step 6: validate (and, for FK-linked plugins, reorder).
    let validated = plugin
        .validate_push(request.entries)
        .map_err(PushStageError::ValidationFailed)?;

    check_interrupted(interruptee)?;

    // Step 7: stage & commit.
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| PushStageError::Storage(e.into()))?;

    let new_entries: Vec<change_log::NewChangeLogEntry> = validated
        .into_iter()
        .map(|entry| change_log::NewChangeLogEntry {
            table_name: entry.table_name,
            entity_id: entry.entity_id,
            operation: entry.operation,
            payload: entry.payload,
            source_id: request.source_id.clone(),
            created_at: entry.created_at.unwrap_or_else(|| now.clone()),
            received_at: now.clone(),
        })
        .collect();

    let sequences = change_log::append_batch_with_sequences_tx(&tx, &new_entries)?;

    for entry in &new_entries {
        check_interrupted(interruptee)?;
        let schema = registry.get_table_schema(&entry.table_name);
        match replay::dispatch(schema, &entry.table_name) {
            replay::Dispatch::Generic(schema) => match entry.operation {
                Operation::Upsert => {
                    let payload = entry
                        .payload
                        .as_ref()
                        .ok_or_else(|| missing_payload(&entry.table_name, &entry.entity_id))?;
                    replay::upsert_row_tx(&tx, &schema, &entry.entity_id, payload, &entry.received_at)?;
                }
                Operation::Delete => {
                    replay::delete_row_tx(&tx, &schema, &entry.entity_id, &entry.received_at)?;
                }
            },
            replay::Dispatch::LegacyLoreEntries => match entry.operation {
                Operation::Upsert => {
                    let payload = entry
                        .payload
                        .as_ref()
                        .ok_or_else(|| missing_payload(&entry.table_name, &entry.entity_id))?;
                    replay::upsert_lore_entries_legacy_tx(&tx, &entry.entity_id, payload, &entry.received_at)?;
                }
                Operation::Delete => {
                    replay::delete_lore_entries_legacy_tx(&tx, &entry.entity_id)?;
                }
            },
            // Not a table any plugin or the legacy path recognizes: the
            // entry still lands in the change log (a generic pass-through
            // store may replicate entries it never mirrors into a domain
            // table), it's just not replayed further. `spec.md` §4.6 step 7
            // only calls `UpsertRowTx`/`DeleteRowTx` for "entr[ies] that
            // belong to a recognized table".
            replay::Dispatch::Unsupported => {}
        }
    }

    let committed: Vec<ChangeLogEntry> = new_entries
        .into_iter()
        .zip(sequences.iter())
        .map(|(entry, &sequence)| ChangeLogEntry {
            sequence,
            table_name: entry.table_name,
            entity_id: entry.entity_id,
            operation: entry.operation,
            payload: entry.payload,
            source_id: entry.source_id,
            created_at: entry.created_at,
            received_at: entry.received_at,
        })
        .collect();

    // Best-effort: `DomainPlugin::on_replay`'s own errors must never
    // invalidate an already-committed push (`spec.md` §7).
    plugin.on_replay(&tx, &committed);

    let remote_sequence = sequences
        .last()
        .copied()
        .unwrap_or_else(|| change_log::latest_sequence(&tx).unwrap_or(0));
    let response = PushResponse {
        accepted: committed.len(),
        remote_sequence,
    };
    let response_bytes = serde_json::to_vec(&response)?;

    // Step 8: cache & respond.
    let expires_at = (Utc::now() + Duration::seconds(config.idempotency_ttl_secs))
        .to_rfc3339_opts(SecondsFormat::Nanos, true);
    idempotency::record(&tx, &request.push_id, store_id, &response_bytes, &now, &expires_at)?;

    tx.commit().map_err(|e| PushStageError::Storage(e.into()))?;

    Ok(PushResult {
        response,
        response_bytes,
        idempotent_replay: false,
    })
}

/// Runs the full push pipeline against an already-resolved `Store`.
/// `store_type` is the collaborator-owned metadata (`meta.yaml`'s `type`
/// field) identifying which `DomainPlugin` governs this store. `interruptee`
/// is checked at every suspension point (`SPEC_FULL.md` §9); pass
/// `&interrupt_support::NeverInterrupts` for a call site with no
/// cancellation source.
pub fn push(
    store: &Store,
    registry: &Registry,
    store_id: &str,
    store_type: &str,
    request: PushRequest,
    interruptee: &dyn Interruptee,
) -> Result<PushResult> {
    validate_shape(&request, store.config.max_push_entries)?;
    let conn = store.lock();
    push_inner(
        &conn,
        registry,
        store_id,
        store_type,
        request,
        &store.config,
        interruptee,
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use engram_plugin_generic::GenericPlugin;
    use engram_traits::PendingEntry;
    use interrupt_support::NeverInterrupts;
    use std::sync::Arc;

    fn store_and_registry() -> (Store, Registry) {
        let registry = Registry::new();
        registry.set_generic(Arc::new(GenericPlugin::new()));
        let store = Store::open_in_memory(&registry, EngineConfig::default()).unwrap();
        (store, registry)
    }

    fn request(push_id: &str, entries: Vec<PendingEntry>) -> PushRequest {
        PushRequest {
            push_id: push_id.to_string(),
            source_id: "client-1".to_string(),
            schema_version: 1,
            entries,
        }
    }

    fn upsert(table: &str, id: &str) -> PendingEntry {
        PendingEntry {
            table_name: table.to_string(),
            entity_id: id.to_string(),
            operation: Operation::Upsert,
            payload: Some(serde_json::json!({"id": id})),
            created_at: None,
        }
    }

    #[test]
    fn test_rejects_empty_push_id() {
        let (store, registry) = store_and_registry();
        let req = request("", vec![upsert("widgets", "w1")]);
        let err = push(&store, &registry, "default", "generic", req, &NeverInterrupts).unwrap_err();
        assert!(matches!(err, EngineError::BadRequest(_)));
    }

    #[test]
    fn test_rejects_too_many_entries() {
        let (store, registry) = store_and_registry();
        let entries: Vec<_> = (0..2).map(|i| upsert("widgets", &format!("w{i}"))).collect();
        let mut req = request("p1", entries);
        req.schema_version = 1;
        let mut small_store = store;
        small_store.config.max_push_entries = 1;
        let err = push(&small_store, &registry, "default", "generic", req, &NeverInterrupts).unwrap_err();
        assert!(matches!(err, EngineError::BadRequest(_)));
    }

    #[test]
    fn test_new_push_assigns_sequence_one() {
        let (store, registry) = store_and_registry();
        let req = request("p1", vec![upsert("widgets", "w1")]);
        let result = push(&store, &registry, "default", "generic", req, &NeverInterrupts).unwrap();
        assert_eq!(result.response.accepted, 1);
        assert_eq!(result.response.remote_sequence, 1);
        assert!(!result.idempotent_replay);
    }

    #[test]
    fn test_idempotent_replay_is_byte_identical_and_doesnt_advance_sequence() {
        let (store, registry) = store_and_registry();
        let req = request("p1", vec![upsert("widgets", "w1")]);
        let first = push(&store, &registry, "default", "generic", req.clone(), &NeverInterrupts).unwrap();
        let second = push(&store, &registry, "default", "generic", req, &NeverInterrupts).unwrap();
        assert!(second.idempotent_replay);
        assert_eq!(first.response_bytes, second.response_bytes);
        let conn = store.lock();
        assert_eq!(change_log::latest_sequence(&conn).unwrap(), 1);
    }

    #[test]
    fn test_schema_mismatch_when_client_ahead() {
        let (store, registry) = store_and_registry();
        let mut req = request("p1", vec![upsert("widgets", "w1")]);
        req.schema_version = engram_traits::CURRENT_SCHEMA_VERSION + 1;
        let err = push(&store, &registry, "default", "generic", req, &NeverInterrupts).unwrap_err();
        match err {
            EngineError::SchemaMismatch {
                client_version,
                server_version,
            } => {
                assert_eq!(client_version, engram_traits::CURRENT_SCHEMA_VERSION + 1);
                assert_eq!(server_version, engram_traits::CURRENT_SCHEMA_VERSION);
            }
            other => panic!("expected SchemaMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_validation_failure_commits_nothing() {
        let registry = Registry::new();
        registry.register(Arc::new(engram_plugin_recall::RecallPlugin::new()));
        let store = Store::open_in_memory(&registry, EngineConfig::default()).unwrap();
        let mut entry = upsert("lore_entries", "e1");
        entry.payload = Some(serde_json::json!({"id": "e1"})); // missing content/category/...
        let req = request("p1", vec![entry]);
        let err = push(&store, &registry, "default", "recall", req, &NeverInterrupts).unwrap_err();
        assert!(matches!(err, EngineError::ValidationFailed(_)));
        let conn = store.lock();
        assert_eq!(change_log::latest_sequence(&conn).unwrap(), 0);
    }

    #[test]
    fn test_unrecognized_table_is_journaled_without_replay_error() {
        let (store, registry) = store_and_registry();
        let req = request("p1", vec![upsert("anything_goes", "x1")]);
        let result = push(&store, &registry, "default", "generic", req, &NeverInterrupts).unwrap();
        assert_eq!(result.response.accepted, 1);
    }
}
