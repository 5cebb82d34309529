/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! The store-ID grammar (`spec.md` §6), lifted out of the external
//! multi-store manager's contract because it's a pure, cheap, precisely
//! specified validation with no filesystem dependency (`SPEC_FULL.md` §7).
//! This module does not create directories, write `meta.yaml`, or manage
//! store lifecycles -- that remains the collaborator's job.

use regex::Regex;

use crate::error::EngineError;

lazy_static::lazy_static! {
    static ref SEGMENT_RE: Regex = Regex::new(r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?$").unwrap();
}

/// `default` is reserved: auto-created on first access, never deletable.
/// Enforcing *that* lifecycle rule is the collaborator's job; this module
/// only exposes the identifier so callers don't have to duplicate the
/// literal.
pub const DEFAULT_STORE_ID: &str = "default";

const MAX_LEN: usize = 128;
const MAX_SEGMENTS: usize = 4;

pub fn is_default(store_id: &str) -> bool {
    store_id == DEFAULT_STORE_ID
}

/// Validates the grammar: up to four `/`-separated segments, each
/// `[a-z0-9]([a-z0-9-]*[a-z0-9])?`, total length `<= 128`.
pub fn validate(store_id: &str) -> Result<(), EngineError> {
    if store_id.is_empty() {
        return Err(EngineError::BadRequest("store id must not be empty".to_string()));
    }
    if store_id.len() > MAX_LEN {
        return Err(EngineError::BadRequest(format!(
            "store id exceeds {MAX_LEN} characters"
        )));
    }
    let segments: Vec<&str> = store_id.split('/').collect();
    if segments.len() > MAX_SEGMENTS {
        return Err(EngineError::BadRequest(format!(
            "store id has more than {MAX_SEGMENTS} segments"
        )));
    }
    for segment in &segments {
        if !SEGMENT_RE.is_match(segment) {
            return Err(EngineError::BadRequest(format!(
                "invalid store id segment: `{segment}`"
            )));
        }
    }
    Ok(())
}
