//! Record store facade and transaction unit.
//!
//! # Responsibility
//! - Bundle the character and task repositories behind one `Store`.
//! - Run one user operation as a single all-or-nothing unit.
//!
//! # Invariants
//! - `in_transaction` commits only when the closure returns `Ok`; any error
//!   rolls back every write made inside it.
//! - SQLite units start with `BEGIN IMMEDIATE`, so a second connection
//!   (foreground vs scheduler) waits for the write lock instead of
//!   interleaving with a unit in flight.
//! - Nested units join the outer transaction.

use super::{CharacterRepository, RepoError, RepoResult, TaskRepository};
use crate::db::migrations::latest_version;
use rusqlite::{Connection, Transaction, TransactionBehavior};

/// Storage contract the services and scheduler are written against.
pub trait Store: CharacterRepository + TaskRepository {
    /// Runs `work` atomically against this store.
    fn in_transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<RepoError>;
}

/// SQLite-backed store over one migrated connection.
#[derive(Debug, Clone, Copy)]
pub struct SqliteStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteStore<'conn> {
    /// Wraps a connection returned by `db::open_db`/`open_db_in_memory`.
    ///
    /// # Errors
    /// - `UninitializedConnection` when migrations have not been applied.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        let actual_version =
            conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
        let expected_version = latest_version();
        if actual_version != expected_version {
            return Err(RepoError::UninitializedConnection {
                expected_version,
                actual_version,
            });
        }
        Ok(Self { conn })
    }

    pub(crate) fn conn(&self) -> &'conn Connection {
        self.conn
    }
}

impl Store for SqliteStore<'_> {
    fn in_transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<RepoError>,
    {
        if !self.conn.is_autocommit() {
            return work(self);
        }

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)
            .map_err(RepoError::from)?;
        let value = work(self)?;
        tx.commit().map_err(RepoError::from)?;
        Ok(value)
    }
}
