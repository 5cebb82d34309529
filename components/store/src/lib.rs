/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! SQLite-backed storage for one Engram store: the change log (C1), the
//! idempotency cache (C2), the replay executor (C5), sync-meta, and
//! compaction. `engram-engine` composes these into the push/delta
//! pipelines (C6); this crate only knows about one store's database file.

#[macro_use]
extern crate log;

pub mod change_log;
pub mod compaction;
pub mod config;
pub mod error;
pub mod idempotency;
pub mod meta;
pub mod replay;
pub mod schema;
mod store;

pub use change_log::NewChangeLogEntry;
pub use compaction::{AuditSink, FileAuditSink, InMemoryAuditSink};
pub use config::EngineConfig;
pub use error::{Error, ErrorKind, Result};
pub use store::Store;
