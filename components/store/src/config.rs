/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Tunables `spec.md` leaves as defaults. No file-based config format is
//! prescribed, so this is a plain struct the embedding process constructs
//! however it likes (env vars, a config file, hard-coded) -- matching how
//! `sql_support::open_database` takes its tuning as plain arguments rather
//! than reaching into the environment itself.

use engram_traits::{
    DEFAULT_DELTA_LIMIT, DEFAULT_IDEMPOTENCY_TTL_SECS, DEFAULT_MAX_PUSH_ENTRIES, MAX_DELTA_LIMIT,
};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// TTL for idempotency records, `spec.md` §3 (default 24h).
    pub idempotency_ttl_secs: i64,
    /// `spec.md` §4.6 step 1 (default 1000).
    pub max_push_entries: usize,
    /// `spec.md` §4.6 delta pipeline defaults/cap (100 / 1000).
    pub default_delta_limit: i64,
    pub max_delta_limit: i64,
    /// Compaction only considers `(table_name, entity_id)` groups whose
    /// superseded rows are older than this many seconds.
    pub compaction_cutoff_secs: i64,
    /// `PRAGMA busy_timeout`, `spec.md` §6 ("set a non-zero busy timeout").
    pub busy_timeout_ms: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            idempotency_ttl_secs: DEFAULT_IDEMPOTENCY_TTL_SECS,
            max_push_entries: DEFAULT_MAX_PUSH_ENTRIES,
            default_delta_limit: DEFAULT_DELTA_LIMIT,
            max_delta_limit: MAX_DELTA_LIMIT,
            compaction_cutoff_secs: 30 * 24 * 60 * 60,
            busy_timeout_ms: 5_000,
        }
    }
}
