/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! The `DomainPlugin` trait (C4): the capability set a `store_type`
//! registers against the plugin registry (C3) -- validation, FK-safe
//! reordering, declared table schemas, and a best-effort post-replay hook.

use rusqlite::Connection;

use crate::types::{ChangeLogEntry, PendingEntry, TableSchema, ValidationError};

/// Per-store-type strategy object. Implementors are process-wide singletons
/// registered once at start-up (see `engram-registry`); `validate_push` and
/// `on_replay` are the only methods called per-request.
pub trait DomainPlugin: Send + Sync {
    /// The `store_type` this plugin answers for, e.g. `"recall"` or `"tract"`.
    fn store_type(&self) -> &'static str;

    /// Table schemas this plugin declares for the generic replay path.
    /// The generic plugin declares none (pass-through stores have no
    /// domain tables of their own).
    fn table_schemas(&self) -> Vec<TableSchema> {
        Vec::new()
    }

    /// Raw `CREATE TABLE`/`CREATE INDEX` statements run once when the
    /// store's schema is bootstrapped. `TableSchema` only carries a column
    /// list, which is enough to drive the generic upsert/delete, but not
    /// enough to express foreign keys or indexes -- those are the plugin's
    /// own SQL, run in declaration order so parent tables exist before
    /// children reference them.
    fn schema_sql(&self) -> &'static [&'static str] {
        &[]
    }

    /// Validate (and, for plugins like Tract, reorder) a pushed batch.
    /// Must collect *all* failures rather than stopping at the first one
    /// (`spec.md` §4.6 step 6): on any failure the whole batch is rejected,
    /// so partial error lists would be misleading.
    fn validate_push(
        &self,
        entries: Vec<PendingEntry>,
    ) -> Result<Vec<PendingEntry>, Vec<ValidationError>>;

    /// Best-effort hook run against the already-committed entries. Errors
    /// are the plugin's own concern to log (via `error_support::breadcrumb!`
    /// or `report_error!`) -- they must never propagate and invalidate a
    /// push that has already replicated successfully.
    fn on_replay(&self, _conn: &Connection, _entries: &[ChangeLogEntry]) {}
}
