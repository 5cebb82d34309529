/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Identifier validation shared by the change log, the plugin registry and
//! the replay executor. Table and column names ultimately end up spliced
//! into SQL statements (the replay executor can't bind a table or column
//! name as a parameter), so every identifier that reaches that point must
//! be checked against these patterns first.

use regex::Regex;

lazy_static::lazy_static! {
    static ref TABLE_NAME_RE: Regex = Regex::new(r"^[a-z][a-z0-9_]*$").unwrap();
    static ref COLUMN_NAME_RE: Regex = Regex::new(r"^[a-z_][a-z0-9_]*$").unwrap();
}

/// `table_name` must match `^[a-z][a-z0-9_]*$` per the change-log entry and
/// table-schema invariants.
pub fn is_valid_table_name(name: &str) -> bool {
    TABLE_NAME_RE.is_match(name)
}

/// Column identifiers are a touch more permissive (may start with `_`),
/// matching `^[a-z_][a-z0-9_]*$`.
pub fn is_valid_column_name(name: &str) -> bool {
    COLUMN_NAME_RE.is_match(name)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_table_name() {
        assert!(is_valid_table_name("lore_entries"));
        assert!(is_valid_table_name("goals"));
        assert!(!is_valid_table_name("Goals"));
        assert!(!is_valid_table_name("_goals"));
        assert!(!is_valid_table_name("1goals"));
        assert!(!is_valid_table_name("goals; DROP TABLE x"));
        assert!(!is_valid_table_name(""));
    }

    #[test]
    fn test_column_name() {
        assert!(is_valid_column_name("id"));
        assert!(is_valid_column_name("_internal"));
        assert!(is_valid_column_name("parent_goal_id"));
        assert!(!is_valid_column_name("Parent"));
        assert!(!is_valid_column_name("1col"));
        assert!(!is_valid_column_name("col-name"));
    }
}
