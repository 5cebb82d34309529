/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! The generic pass-through plugin (`spec.md` §4.4): the fallback installed
//! via `Registry::set_generic` for any `store_type` that hasn't registered
//! its own `DomainPlugin`. Declares no table schemas of its own -- a
//! pass-through store's tables, if any, are registered directly against
//! the generic replay path by whatever embeds this workspace.

use rusqlite::Connection;

use engram_traits::{ChangeLogEntry, DomainPlugin, PendingEntry, TableSchema, ValidationError};

/// Echoes the input batch unchanged. "Unchanged" includes the distinction
/// between an absent `entries` field and an empty one upstream of this
/// plugin: `validate_push` neither adds nor drops entries, so that
/// distinction (if the caller cares about it) survives untouched.
#[derive(Debug, Default)]
pub struct GenericPlugin;

impl GenericPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl DomainPlugin for GenericPlugin {
    fn store_type(&self) -> &'static str {
        "generic"
    }

    fn table_schemas(&self) -> Vec<TableSchema> {
        Vec::new()
    }

    fn validate_push(
        &self,
        entries: Vec<PendingEntry>,
    ) -> Result<Vec<PendingEntry>, Vec<ValidationError>> {
        Ok(entries)
    }

    fn on_replay(&self, _conn: &Connection, _entries: &[ChangeLogEntry]) {}
}
