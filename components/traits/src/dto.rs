/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Wire DTOs (`spec.md` §6). These carry `#[derive(Serialize, Deserialize)]`
//! only -- no HTTP-framework annotations -- so a transport crate can
//! `serde_json::to_vec`/`from_slice` them directly without this crate (or
//! any crate in the workspace) depending on an HTTP framework.

use serde::{Deserialize, Serialize};

use crate::types::{ChangeLogEntry, PendingEntry, ValidationError};

#[derive(Debug, Clone, Deserialize)]
pub struct PushRequest {
    pub push_id: String,
    pub source_id: String,
    pub schema_version: i64,
    pub entries: Vec<PendingEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PushResponse {
    pub accepted: usize,
    pub remote_sequence: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationErrorResponse {
    pub accepted: usize,
    pub errors: Vec<ValidationError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeltaQuery {
    pub after: i64,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaResponse {
    /// Never `null` on the wire, even when empty -- `spec.md` §4.6 step 6.
    pub entries: Vec<ChangeLogEntry>,
    pub last_sequence: i64,
    pub latest_sequence: i64,
    pub has_more: bool,
}

/// `application/problem+json` document for the schema-mismatch case
/// (`spec.md` §6/§7); other error statuses return simpler bodies
/// (`ValidationErrorResponse` for 422) or are left to the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub problem_type: String,
    pub title: String,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_version: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_version: Option<i64>,
}

impl ProblemDetails {
    pub fn schema_mismatch(client_version: i64, server_version: i64) -> Self {
        Self {
            problem_type: "https://engram.dev/errors/schema-mismatch".to_string(),
            title: "client schema version is ahead of server".to_string(),
            status: 409,
            client_version: Some(client_version),
            server_version: Some(server_version),
        }
    }
}
