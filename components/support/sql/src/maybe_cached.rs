/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use rusqlite::{CachedStatement, Connection, Result as SqlResult, Statement};
use std::ops::{Deref, DerefMut};

/// A statement that may or may not be backed by the connection's prepared
/// statement cache, depending on a runtime flag. Lets call sites that
/// sometimes run a query once and sometimes run it in a hot loop share the
/// same code path without duplicating the `prepare` vs `prepare_cached` choice.
pub enum MaybeCached<'conn> {
    Uncached(Statement<'conn>),
    Cached(CachedStatement<'conn>),
}

impl<'conn> MaybeCached<'conn> {
    pub fn prepare(conn: &'conn Connection, sql: &str, cache: bool) -> SqlResult<Self> {
        Ok(if cache {
            MaybeCached::Cached(conn.prepare_cached(sql)?)
        } else {
            MaybeCached::Uncached(conn.prepare(sql)?)
        })
    }
}

impl<'conn> Deref for MaybeCached<'conn> {
    type Target = Statement<'conn>;
    fn deref(&self) -> &Statement<'conn> {
        match self {
            MaybeCached::Uncached(s) => s,
            MaybeCached::Cached(s) => s,
        }
    }
}

impl<'conn> DerefMut for MaybeCached<'conn> {
    fn deref_mut(&mut self) -> &mut Statement<'conn> {
        match self {
            MaybeCached::Uncached(s) => s,
            MaybeCached::Cached(s) => s,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_maybe_cached_both_work() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t(a)").unwrap();
        conn.execute("INSERT INTO t(a) VALUES (1)", []).unwrap();
        for cache in [false, true] {
            let mut stmt = MaybeCached::prepare(&conn, "SELECT a FROM t", cache).unwrap();
            let got: i64 = stmt.query_row([], |r| r.get(0)).unwrap();
            assert_eq!(got, 1);
        }
    }
}
