/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Use this module to open a new SQLite database connection.
//!
//! A component declares its schema by implementing [ConnectionInitializer],
//! which describes the "prepare" step (pragmas run before anything else),
//! the "init" step (create a fresh schema at `END_VERSION`) and the
//! "upgrade" steps (migrate a single version forward at a time). `open_database`
//! and `open_database_with_flags` drive that trait against a [Connection],
//! handling the new-database-vs-existing-database decision, the
//! `PRAGMA user_version` bookkeeping, and (optionally) deleting and recreating
//! a database file that fails to migrate.
use crate::ConnExt;
use rusqlite::{Connection, OpenFlags, Transaction};
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned from an `upgrade_from` implementation to signal that the
    /// database is beyond repair and can't be migrated.
    #[error("incompatible database version: {0}")]
    IncompatibleVersion(u32),
    #[error("error executing SQL: {0}")]
    SqlError(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Describes how to open and migrate one component's SQLite schema. Each
/// component implements this once for its database connection type.
pub trait ConnectionInitializer {
    const NAME: &'static str;
    const END_VERSION: u32;

    /// Runs before `init`/`upgrade_from`, outside of the schema
    /// transaction; the natural place for `PRAGMA`s that can't run inside
    /// a transaction (`journal_mode`, `foreign_keys`, ...). `db_empty` is
    /// true when this is a brand new, unversioned database file.
    fn prepare(&self, conn: &Connection, db_empty: bool) -> Result<()> {
        let _ = (conn, db_empty);
        Ok(())
    }

    /// Create a fresh schema at `END_VERSION` for a brand new database.
    fn init(&self, db: &Transaction<'_>) -> Result<()>;

    /// Migrate from `version` to `version + 1`. Called repeatedly until the
    /// connection reaches `END_VERSION`.
    fn upgrade_from(&self, db: &Transaction<'_>, version: u32) -> Result<()>;

    /// How to react when opening or migrating the database file fails.
    /// Most components want [ErrorHandling::ReturnError]; a cache-only
    /// store may prefer [ErrorHandling::DeleteAndRecreate].
    fn error_handling(&self) -> ErrorHandling {
        ErrorHandling::ReturnError
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ErrorHandling {
    /// Delete the database file and start over with a fresh schema.
    DeleteAndRecreate,
    /// Return the error; the caller decides what to do (e.g. surface it to
    /// the user, or attempt a data-recovery path of its own).
    ReturnError,
}

pub enum DatabaseLocation {
    File(PathBuf),
    Memory,
}

impl DatabaseLocation {
    fn exists(&self) -> bool {
        match self {
            DatabaseLocation::Memory => false,
            DatabaseLocation::File(path) => path.exists(),
        }
    }

    fn open(&self, open_flags: OpenFlags) -> Result<Connection> {
        match self {
            DatabaseLocation::Memory => Ok(Connection::open_in_memory_with_flags(open_flags)?),
            DatabaseLocation::File(path) => Ok(Connection::open_with_flags(path, open_flags)?),
        }
    }

    fn delete(&self) -> Result<()> {
        if let DatabaseLocation::File(path) = self {
            if path.exists() {
                std::fs::remove_file(path)?;
            }
        }
        Ok(())
    }
}

pub fn open_database<CI: ConnectionInitializer>(path: PathBuf, initializer: &CI) -> Result<Connection> {
    open_database_with_flags(DatabaseLocation::File(path), OpenFlags::default(), initializer)
}

pub fn open_database_with_flags<CI: ConnectionInitializer>(
    location: DatabaseLocation,
    open_flags: OpenFlags,
    initializer: &CI,
) -> Result<Connection> {
    let db_empty = !location.exists();
    let mut conn = location.open(open_flags)?;
    let mut result = run(&mut conn, initializer, db_empty);
    if initializer.error_handling() == ErrorHandling::DeleteAndRecreate {
        result = result.or_else(|e| {
            log::warn!(
                "{}: error opening database, recreating file: {:?}",
                CI::NAME,
                e
            );
            location.delete()?;
            conn = location.open(open_flags)?;
            run(&mut conn, initializer, true)
        });
    }
    result?;
    Ok(conn)
}

fn run<CI: ConnectionInitializer>(conn: &mut Connection, initializer: &CI, db_empty: bool) -> Result<()> {
    log::debug!("{}: opening database", CI::NAME);
    initializer.prepare(conn, db_empty)?;
    let tx = conn.transaction()?;
    if db_empty {
        log::debug!("{}: initializing new database to v{}", CI::NAME, CI::END_VERSION);
        initializer.init(&tx)?;
        set_schema_version(&tx, CI::END_VERSION)?;
    } else {
        let mut version = get_schema_version(&tx)?;
        while version < CI::END_VERSION {
            log::debug!("{}: upgrading database from v{}", CI::NAME, version);
            initializer.upgrade_from(&tx, version)?;
            version += 1;
            set_schema_version(&tx, version)?;
        }
    }
    tx.commit()?;
    log::debug!("{}: database open successful", CI::NAME);
    Ok(())
}

fn get_schema_version(conn: &Connection) -> Result<u32> {
    Ok(conn.query_one::<i64>("PRAGMA user_version")? as u32)
}

fn set_schema_version(conn: &Connection, version: u32) -> Result<()> {
    conn.set_pragma("user_version", version)?;
    Ok(())
}

/// Helpers for exercising [ConnectionInitializer] implementations in tests
/// without needing a real on-disk database managed by the rest of the
/// component.
pub mod test_utils {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    pub fn open_memory_database<CI: ConnectionInitializer>(initializer: &CI) -> Result<Connection> {
        open_database_with_flags(DatabaseLocation::Memory, OpenFlags::default(), initializer)
    }

    /// An on-disk database file seeded at some fixed schema version, so tests
    /// can exercise `upgrade_from` against a realistic starting file instead
    /// of relying on `init` always producing the newest data.
    pub struct MigratedDatabaseFile {
        _tempdir: TempDir,
        pub path: PathBuf,
    }

    impl MigratedDatabaseFile {
        pub fn new(initial_schema_sql: &str, initial_version: u32) -> Self {
            let tempdir = tempfile::tempdir().unwrap();
            let path = tempdir.path().join(Path::new("db.sql"));
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(initial_schema_sql).unwrap();
            set_schema_version(&conn, initial_version).unwrap();
            Self {
                _tempdir: tempdir,
                path,
            }
        }

        pub fn open(&self) -> Connection {
            Connection::open(&self.path).unwrap()
        }
    }
}
