/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! The vocabulary shared by the change log, the registry and the replay
//! executor: what a change-log entry is, what a plugin declares about one
//! of its tables, and the operation enum that ties them together.

use serde::{Deserialize, Serialize};

/// `upsert` or `delete`, per the wire protocol and the change-log schema's
/// `CHECK (operation IN ('upsert', 'delete'))` constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Upsert,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Upsert => "upsert",
            Operation::Delete => "delete",
        }
    }
}

impl std::str::FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upsert" => Ok(Operation::Upsert),
            "delete" => Ok(Operation::Delete),
            other => Err(format!("unknown operation: {other}")),
        }
    }
}

/// One entry as submitted by a client, before the server has stamped
/// `source_id`/`received_at` or assigned a `sequence`. This is what
/// `DomainPlugin::validate_push` receives and returns (possibly reordered).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingEntry {
    pub table_name: String,
    pub entity_id: String,
    pub operation: Operation,
    /// Absent for `delete`; required for `upsert`. `serde(default)` plus
    /// `skip_serializing_if` keeps `None` distinguishable from a present-but-
    /// empty object on the wire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    /// Client-asserted wall clock; stamped server-side with `now()` if absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// The unit of replication once committed: a `PendingEntry` plus the fields
/// only the server can assign.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangeLogEntry {
    pub sequence: i64,
    pub table_name: String,
    pub entity_id: String,
    pub operation: Operation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    pub source_id: String,
    pub created_at: String,
    pub received_at: String,
}

/// A column layout declared by a plugin at registration, consumed by the
/// generic replay path (`engram-store::replay`) to build parameterized
/// `INSERT ... ON CONFLICT` statements without ever interpolating a column
/// name that wasn't validated up front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    /// Ordered; first entry must be `"id"`.
    pub columns: Vec<String>,
    pub soft_delete: bool,
}

impl TableSchema {
    /// Validates the `name`/`columns` invariants from `spec.md` §3. Plugins
    /// call this at construction time so a bad schema is a registration-time
    /// panic (a programmer error), never a runtime surprise.
    pub fn new(
        name: impl Into<String>,
        columns: Vec<String>,
        soft_delete: bool,
    ) -> Result<Self, String> {
        let name = name.into();
        if !crate::ident::is_valid_table_name(&name) {
            return Err(format!("invalid table name: {name}"));
        }
        if columns.first().map(String::as_str) != Some("id") {
            return Err(format!("{name}: first column must be `id`"));
        }
        for col in &columns {
            if !crate::ident::is_valid_column_name(col) {
                return Err(format!("{name}: invalid column name: {col}"));
            }
        }
        Ok(Self {
            name,
            columns,
            soft_delete,
        })
    }
}

/// One validation complaint, surfaced in a 422 response. `field` is omitted
/// when the failure isn't attributable to a single field (e.g. unknown
/// table).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationError {
    /// Position of the offending entry within the submitted batch (not a
    /// change-log sequence -- none has been assigned yet).
    pub sequence: usize,
    pub table_name: String,
    pub entity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}

impl ValidationError {
    pub fn new(
        sequence: usize,
        table_name: impl Into<String>,
        entity_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            sequence,
            table_name: table_name.into(),
            entity_id: entity_id.into(),
            field: None,
            message: message.into(),
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_table_schema_requires_id_first() {
        assert!(TableSchema::new("goals", vec!["name".into(), "id".into()], false).is_err());
        assert!(TableSchema::new("goals", vec!["id".into(), "name".into()], false).is_ok());
    }

    #[test]
    fn test_table_schema_rejects_bad_identifiers() {
        assert!(TableSchema::new("Goals", vec!["id".into()], false).is_err());
        assert!(TableSchema::new("goals", vec!["id".into(), "Bad-Col".into()], false).is_err());
    }

    #[test]
    fn test_operation_roundtrip() {
        assert_eq!("upsert".parse::<Operation>().unwrap(), Operation::Upsert);
        assert_eq!("delete".parse::<Operation>().unwrap(), Operation::Delete);
        assert!("frob".parse::<Operation>().is_err());
    }
}
