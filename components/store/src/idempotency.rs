/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! The idempotency cache (`spec.md` §4.2, component C2): at-most-once
//! semantics across client retries of the same `push_id`.

use rusqlite::{params, OptionalExtension};

use crate::error::Result;

/// `Check` returns `hit = false` both for an unknown `push_id` and for one
/// whose record has expired -- callers can't tell the two apart, and
/// shouldn't need to.
pub fn check(conn: &rusqlite::Connection, push_id: &str, now: &str) -> Result<(Option<Vec<u8>>, bool)> {
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT response, expires_at FROM push_idempotency WHERE push_id = ?1",
            params![push_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    match row {
        Some((response, expires_at)) if expires_at.as_str() > now => {
            Ok((Some(response.into_bytes()), true))
        }
        _ => Ok((None, false)),
    }
}

/// Upsert by `push_id` (replace-by-key, `spec.md` §4.2): a client that
/// legitimately retries with the same `push_id` and the same entries
/// overwrites its own prior record harmlessly; a client that reuses a
/// `push_id` for different entries (a contract violation) gets the latest
/// response win, per the spec's documented open question.
pub fn record(
    conn: &rusqlite::Connection,
    push_id: &str,
    store_id: &str,
    response: &[u8],
    now: &str,
    expires_at: &str,
) -> Result<()> {
    let response_text = String::from_utf8_lossy(response).into_owned();
    conn.execute(
        "INSERT INTO push_idempotency (push_id, store_id, response, created_at, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(push_id) DO UPDATE SET
            store_id = excluded.store_id,
            response = excluded.response,
            created_at = excluded.created_at,
            expires_at = excluded.expires_at",
        params![push_id, store_id, response_text, now, expires_at],
    )?;
    Ok(())
}

/// Deletes expired records, returning how many were removed. Runs on an
/// internal cadence (`spec.md` §5); a single `DELETE WHERE expires_at < ?`
/// that doesn't block readers.
pub fn sweep_expired(conn: &rusqlite::Connection, now: &str) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM push_idempotency WHERE expires_at < ?1",
        params![now],
    )?)
}
