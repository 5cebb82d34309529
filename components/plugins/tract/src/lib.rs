/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! The `Tract` domain plugin (`spec.md` §4.4): a four-table, FK-linked
//! structural-planning store (`goals` -> `csfs` -> `fwus` ->
//! `implementation_contexts`). Its only validation duty is the FK-safe
//! reordering algorithm (`reorder_for_fk`) -- payload field shape is
//! intentionally left to the client.

use std::collections::{HashMap, VecDeque};

use rusqlite::Connection;

use engram_traits::ident::is_valid_table_name;
use engram_traits::{ChangeLogEntry, DomainPlugin, Operation, PendingEntry, TableSchema, ValidationError};

const CREATE_TRACT_TABLES_SQL: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS goals (
        id              TEXT PRIMARY KEY,
        parent_goal_id  TEXT NULL REFERENCES goals(id),
        title           TEXT NULL,
        description     TEXT NULL,
        status          TEXT NULL,
        created_at      TEXT NULL,
        updated_at      TEXT NULL,
        deleted_at      TEXT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_goals_parent ON goals (parent_goal_id)",
    "CREATE TABLE IF NOT EXISTS csfs (
        id              TEXT PRIMARY KEY,
        goal_id         TEXT NOT NULL REFERENCES goals(id),
        title           TEXT NULL,
        description     TEXT NULL,
        status          TEXT NULL,
        created_at      TEXT NULL,
        updated_at      TEXT NULL,
        deleted_at      TEXT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_csfs_goal ON csfs (goal_id)",
    "CREATE TABLE IF NOT EXISTS fwus (
        id              TEXT PRIMARY KEY,
        csf_id          TEXT NOT NULL REFERENCES csfs(id),
        title           TEXT NULL,
        description     TEXT NULL,
        status          TEXT NULL,
        created_at      TEXT NULL,
        updated_at      TEXT NULL,
        deleted_at      TEXT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_fwus_csf ON fwus (csf_id)",
    "CREATE TABLE IF NOT EXISTS implementation_contexts (
        id              TEXT PRIMARY KEY,
        fwu_id          TEXT NOT NULL REFERENCES fwus(id),
        content         TEXT NULL,
        status          TEXT NULL,
        created_at      TEXT NULL,
        updated_at      TEXT NULL,
        deleted_at      TEXT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_implementation_contexts_fwu ON implementation_contexts (fwu_id)",
];

/// Depth in the FK chain, per `spec.md` §4.4 step 2. Tables this plugin
/// doesn't know about sort after everything it does -- they're accepted
/// (table-name validation is permissive) but have no FK relationship to
/// reason about.
fn depth(table: &str) -> u8 {
    match table {
        "goals" => 0,
        "csfs" => 1,
        "fwus" => 2,
        "implementation_contexts" => 3,
        _ => 4,
    }
}

fn parent_goal_id(entry: &PendingEntry) -> Option<String> {
    entry
        .payload
        .as_ref()?
        .get("parent_goal_id")?
        .as_str()
        .map(str::to_string)
}

/// Kahn's-algorithm topological sort of the `goals` upserts in a batch over
/// `parent_goal_id`, per `spec.md` §4.4 step 5. Goals whose parent isn't in
/// this batch are treated as already-resolved roots. A cycle's members
/// never reach in-degree zero; they're appended in original order after
/// the sorted prefix and left for the replay layer's FK check to reject.
fn topo_sort_goals(goals: Vec<PendingEntry>) -> Vec<PendingEntry> {
    let n = goals.len();
    let id_to_idx: HashMap<&str, usize> = goals
        .iter()
        .enumerate()
        .map(|(i, e)| (e.entity_id.as_str(), i))
        .collect();
    let parent_idx: Vec<Option<usize>> = goals
        .iter()
        .map(|e| parent_goal_id(e).and_then(|p| id_to_idx.get(p.as_str()).copied()))
        .collect();

    let mut indegree = vec![0usize; n];
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (i, parent) in parent_idx.iter().enumerate() {
        if let Some(p) = parent {
            if *p != i {
                indegree[i] += 1;
                children[*p].push(i);
            }
        }
    }

    let mut queue: VecDeque<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
    let mut processed = vec![false; n];
    let mut order = Vec::with_capacity(n);
    while let Some(i) = queue.pop_front() {
        if processed[i] {
            continue;
        }
        processed[i] = true;
        order.push(i);
        for &child in &children[i] {
            indegree[child] -= 1;
            if indegree[child] == 0 {
                queue.push_back(child);
            }
        }
    }
    // Cycle remainder, original order.
    for (i, done) in processed.iter().enumerate() {
        if !done {
            order.push(i);
        }
    }

    let mut goals = goals.into_iter().map(Some).collect::<Vec<_>>();
    order
        .into_iter()
        .map(|i| goals[i].take().expect("each index appears exactly once"))
        .collect()
}

/// `spec.md` §4.4's `reorderForFK` algorithm: partition deletes/upserts
/// (stable), sort deletes deepest-first and upserts shallowest-first, then
/// topologically sort the `goals` upserts among themselves, and finally
/// concatenate deletes before upserts so a same-batch delete-then-recreate
/// still lands in the right place.
pub fn reorder_for_fk(entries: Vec<PendingEntry>) -> Vec<PendingEntry> {
    let (mut deletes, mut upserts): (Vec<PendingEntry>, Vec<PendingEntry>) =
        (Vec::new(), Vec::new());
    for entry in entries {
        match entry.operation {
            Operation::Delete => deletes.push(entry),
            Operation::Upsert => upserts.push(entry),
        }
    }

    deletes.sort_by_key(|e| std::cmp::Reverse(depth(&e.table_name)));
    upserts.sort_by_key(|e| depth(&e.table_name));

    // Re-order the `goals` run (a contiguous prefix after the depth sort,
    // since `goals` is depth 0) via the topological sort, leaving
    // everything else in its stable depth-sorted position.
    let goals_end = upserts.iter().take_while(|e| e.table_name == "goals").count();
    if goals_end > 1 {
        let rest = upserts.split_off(goals_end);
        let goals_run = std::mem::take(&mut upserts);
        upserts = topo_sort_goals(goals_run);
        upserts.extend(rest);
    }

    deletes.into_iter().chain(upserts).collect()
}

#[derive(Debug, Default)]
pub struct TractPlugin;

impl TractPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl DomainPlugin for TractPlugin {
    fn store_type(&self) -> &'static str {
        "tract"
    }

    fn table_schemas(&self) -> Vec<TableSchema> {
        vec![
            TableSchema::new(
                "goals",
                vec![
                    "id".into(),
                    "parent_goal_id".into(),
                    "title".into(),
                    "description".into(),
                    "status".into(),
                    "created_at".into(),
                    "updated_at".into(),
                ],
                true,
            )
            .expect("engram-plugin-tract: goals schema is statically valid"),
            TableSchema::new(
                "csfs",
                vec![
                    "id".into(),
                    "goal_id".into(),
                    "title".into(),
                    "description".into(),
                    "status".into(),
                    "created_at".into(),
                    "updated_at".into(),
                ],
                true,
            )
            .expect("engram-plugin-tract: csfs schema is statically valid"),
            TableSchema::new(
                "fwus",
                vec![
                    "id".into(),
                    "csf_id".into(),
                    "title".into(),
                    "description".into(),
                    "status".into(),
                    "created_at".into(),
                    "updated_at".into(),
                ],
                true,
            )
            .expect("engram-plugin-tract: fwus schema is statically valid"),
            TableSchema::new(
                "implementation_contexts",
                vec![
                    "id".into(),
                    "fwu_id".into(),
                    "content".into(),
                    "status".into(),
                    "created_at".into(),
                    "updated_at".into(),
                ],
                true,
            )
            .expect("engram-plugin-tract: implementation_contexts schema is statically valid"),
        ]
    }

    fn schema_sql(&self) -> &'static [&'static str] {
        CREATE_TRACT_TABLES_SQL
    }

    fn validate_push(
        &self,
        entries: Vec<PendingEntry>,
    ) -> Result<Vec<PendingEntry>, Vec<ValidationError>> {
        let mut errors = Vec::new();
        for (idx, entry) in entries.iter().enumerate() {
            if !is_valid_table_name(&entry.table_name) {
                errors.push(ValidationError::new(
                    idx,
                    &entry.table_name,
                    &entry.entity_id,
                    format!("`{}` is not a valid table identifier", entry.table_name),
                ));
            }
        }
        if !errors.is_empty() {
            return Err(errors);
        }
        Ok(reorder_for_fk(entries))
    }

    fn on_replay(&self, _conn: &Connection, _entries: &[ChangeLogEntry]) {}
}
