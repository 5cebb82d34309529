/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use std::fmt::Write;

/// Build a `(?,?,?)`-shaped parameter placeholder list for `count` items,
/// for use in `IN (...)` clauses built up dynamically (the count of items
/// isn't known until runtime, so this can't be a `const` string like most
/// of our other SQL).
pub fn repeat_sql_vars(count: usize) -> String {
    let mut s = String::with_capacity(count * 2 + 2);
    s.push('(');
    for i in 0..count {
        if i != 0 {
            s.push(',');
        }
        s.push('?');
    }
    s.push(')');
    s
}

/// Like `repeat_sql_vars`, but writes into an existing buffer instead of
/// allocating a fresh `String` (handy when building a larger query piecemeal).
pub fn write_repeat_sql_vars(out: &mut String, count: usize) {
    let _ = write!(out, "(");
    for i in 0..count {
        if i != 0 {
            let _ = write!(out, ",");
        }
        let _ = write!(out, "?");
    }
    let _ = write!(out, ")");
}
