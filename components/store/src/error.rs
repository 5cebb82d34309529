/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Internal error type for `engram-store`. `engram-engine` maps these into
//! the public `spec.md` §7 taxonomy at its own boundary; nothing here is
//! transport-shaped.

#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    #[error("sql error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("error opening database: {0}")]
    OpenDatabase(#[from] sql_support::open_database::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Interrupted(#[from] interrupt_support::Interrupted),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no TableSchema or legacy path registered for table `{0}`")]
    UnsupportedTable(String),

    #[error("upsert payload missing for table `{table}` entity `{entity_id}`")]
    MissingPayload { table: String, entity_id: String },

    #[error("upsert payload for table `{table}` entity `{entity_id}` is not a JSON object")]
    InvalidPayload { table: String, entity_id: String },

    #[error(
        "entity id mismatch on table `{table}`: payload `id` is `{payload_id}`, entity_id is `{entity_id}`"
    )]
    EntityIdMismatch {
        table: String,
        entity_id: String,
        payload_id: String,
    },
}

error_support::define_error! {
    ErrorKind {
        (Sql, rusqlite::Error),
        (OpenDatabase, sql_support::open_database::Error),
        (Json, serde_json::Error),
        (Interrupted, interrupt_support::Interrupted),
        (Io, std::io::Error),
    }
}
