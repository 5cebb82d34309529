/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! The delta pipeline (`spec.md` §4.6, component C6): everything a client
//! needs to catch up past `after`, one page at a time.

use interrupt_support::Interruptee;

use engram_store::{change_log, Store};
use engram_traits::DeltaResponse;

use crate::error::{EngineError, Result};

fn storage_err(e: engram_store::Error) -> EngineError {
    EngineError::Storage(e.to_string())
}

fn interrupted_err(e: interrupt_support::Interrupted) -> EngineError {
    storage_err(e.into())
}

/// `spec.md` §4.6: `after` must be `>= 0`; `limit`, if given, must be
/// `1..=max_delta_limit`.
fn validate_query(after: i64, limit: Option<i64>, max_delta_limit: i64) -> Result<()> {
    if after < 0 {
        return Err(EngineError::BadRequest("after must be >= 0".to_string()));
    }
    if let Some(limit) = limit {
        if limit < 1 || limit > max_delta_limit {
            return Err(EngineError::BadRequest(format!(
                "limit must be between 1 and {max_delta_limit}"
            )));
        }
    }
    Ok(())
}

/// Reads the page of entries strictly after `after`, capped at `limit`
/// (or the store's configured default). `has_more` is true iff the change
/// log holds a higher sequence than the last entry returned -- not simply
/// "the page was full", since the log could advance between the read and
/// the `latest_sequence` check without affecting correctness (a
/// subsequent delta call would just pick up the rest).
pub fn delta(
    store: &Store,
    after: i64,
    limit: Option<i64>,
    interruptee: &dyn Interruptee,
) -> Result<DeltaResponse> {
    validate_query(after, limit, store.config.max_delta_limit)?;
    let limit = limit.unwrap_or(store.config.default_delta_limit);

    let conn = store.lock();
    interruptee.err_if_interrupted().map_err(interrupted_err)?;
    let entries = change_log::read_after(&conn, after, limit).map_err(storage_err)?;
    interruptee.err_if_interrupted().map_err(interrupted_err)?;
    let latest_sequence = change_log::latest_sequence(&conn).map_err(storage_err)?;
    let last_sequence = entries.last().map(|e| e.sequence).unwrap_or(after);
    let has_more = latest_sequence > last_sequence;

    Ok(DeltaResponse {
        entries,
        last_sequence,
        latest_sequence,
        has_more,
    })
}
