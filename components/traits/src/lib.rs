/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Shared vocabulary for the Engram sync engine: change-log entries, table
//! schemas, the `DomainPlugin` trait, and the wire DTOs. No crate in this
//! workspace depends on an HTTP framework; this crate is the contract a
//! transport crate would serialize against.

pub mod dto;
pub mod ident;
pub mod plugin;
pub mod types;

pub use dto::{
    DeltaQuery, DeltaResponse, ProblemDetails, PushRequest, PushResponse, ValidationErrorResponse,
};
pub use plugin::DomainPlugin;
pub use types::{ChangeLogEntry, Operation, PendingEntry, TableSchema, ValidationError};

/// Store-schema compatibility: `spec.md` §3/§6 seeds `sync_meta.schema_version`
/// with this value for every newly bootstrapped store.
pub const CURRENT_SCHEMA_VERSION: i64 = 2;

/// Defaults from `spec.md` §4.6/§6, collected here so `engram-store` and
/// `engram-engine` agree on them without the transport layer having to pass
/// them down.
pub const DEFAULT_MAX_PUSH_ENTRIES: usize = 1000;
pub const DEFAULT_DELTA_LIMIT: i64 = 100;
pub const MAX_DELTA_LIMIT: i64 = 1000;
pub const DEFAULT_IDEMPOTENCY_TTL_SECS: i64 = 24 * 60 * 60;
