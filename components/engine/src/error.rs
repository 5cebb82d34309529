/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! The public error taxonomy (`spec.md` §7): a single enum a transport
//! layer matches on to choose an HTTP status, via `status_hint()`, rather
//! than re-deriving the mapping itself. `engram-store`'s internal
//! `ErrorKind` is converted at this boundary through `GetErrorHandling`
//! (the one seam that needs differentiated logging: an unexpected storage
//! failure is reported, a plain SQL constraint violation during replay is
//! just logged).

use engram_traits::ValidationError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Malformed push/delta request: missing `push_id`, non-positive
    /// `schema_version`, an out-of-range `limit`, etc. HTTP 400.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing or invalid bearer token. The engine never produces this
    /// itself (authentication is an external collaborator's contract, per
    /// `spec.md` §6) -- it's part of this enum so a transport can reuse
    /// one taxonomy/status mapping for every error it surfaces, engine or
    /// not.
    #[error("unauthorized")]
    Unauthorized,

    /// Unknown store ID. Like `Unauthorized`, constructed by the
    /// collaborator that resolves store IDs to database handles, not by
    /// this crate.
    #[error("store not found: {0}")]
    StoreNotFound(String),

    /// `spec.md` §4.6 step 4: the client is ahead of the server.
    #[error("client schema version {client_version} is ahead of server schema version {server_version}")]
    SchemaMismatch { client_version: i64, server_version: i64 },

    /// One or more entries failed `DomainPlugin::validate_push`. Carries
    /// every failure in the batch -- `spec.md` §4.6 step 6 is explicit
    /// that validation must not fail fast. HTTP 422.
    #[error("{} entries failed validation", .0.len())]
    ValidationFailed(Vec<ValidationError>),

    /// The backing store returned an error while staging or committing a
    /// push, or while reading a delta. HTTP 500; the surrounding
    /// transaction (if any) has already rolled back by the time this is
    /// returned. Carries a rendered message rather than the source error
    /// itself: the internal error is logged/reported at the
    /// `GetErrorHandling` seam that produces this variant, so nothing is
    /// lost by not keeping the original type around.
    #[error("storage failure: {0}")]
    Storage(String),

    /// Feature not yet wired up. Never surfaced over the wire -- if a
    /// transport sees this, it's a bug.
    #[error("not implemented: {0}")]
    NotImplemented(String),
}

impl EngineError {
    /// The HTTP status `spec.md` §6/§7 assigns this error kind.
    pub fn status_hint(&self) -> u16 {
        match self {
            EngineError::BadRequest(_) => 400,
            EngineError::Unauthorized => 401,
            EngineError::StoreNotFound(_) => 404,
            EngineError::SchemaMismatch { .. } => 409,
            EngineError::ValidationFailed(_) => 422,
            EngineError::Storage(_) => 500,
            EngineError::NotImplemented(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
