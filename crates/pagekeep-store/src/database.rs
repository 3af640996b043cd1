//! Database connection management.
//!
//! The [`Database`] struct owns a [`rusqlite::Connection`] and guarantees that
//! migrations are run before any other operation. The connection itself is
//! only reachable through [`Database::with_identity`], which is the single
//! way into the tables.

use std::path::{Path, PathBuf};

use pagekeep_shared::Identity;
use rusqlite::{params, Connection, TransactionBehavior};

use crate::error::{Result, StoreError};
use crate::migrations;
use crate::session::ScopedSession;

/// Wrapper around a [`rusqlite::Connection`].
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) a database at an explicit path.
    ///
    /// Missing parent directories are created.
    pub fn open_at(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        tracing::info!(path = %path.display(), "opening database");

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::prepare(conn)
    }

    /// Open a private in-memory database. Used by tests and ephemeral runs.
    pub fn open_in_memory() -> Result<Self> {
        Self::prepare(Connection::open_in_memory()?)
    }

    fn prepare(conn: Connection) -> Result<Self> {
        // Page owners must reference an existing profile.
        conn.pragma_update(None, "foreign_keys", "ON")?;

        migrations::run_migrations(&conn)?;

        Ok(Self { conn })
    }

    /// Run `work` inside a transaction scoped to `identity`.
    ///
    /// The identity is written to `auth_context` inside the transaction, so
    /// the row-security triggers and views evaluate every statement `work`
    /// issues as that caller. On success the context row is removed and the
    /// transaction commits; on any error the transaction is dropped, which
    /// rolls back both the work and the context row. The context therefore
    /// never outlives the transaction that set it.
    pub fn with_identity<T, F>(&mut self, identity: &Identity, work: F) -> Result<T>
    where
        F: FnOnce(&ScopedSession<'_>) -> Result<T>,
    {
        if identity.subject().is_empty() {
            return Err(StoreError::Validation("identity subject is empty".into()));
        }

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            "INSERT INTO auth_context (slot, subject, role) VALUES (1, ?1, ?2)",
            params![identity.subject(), identity.role()],
        )?;

        let value = work(&ScopedSession::new(&tx, identity))?;

        tx.execute("DELETE FROM auth_context", [])?;
        tx.commit()?;

        Ok(value)
    }

    /// Return the filesystem path of the open database (if any).
    pub fn path(&self) -> Option<PathBuf> {
        self.conn.path().map(PathBuf::from)
    }

    #[cfg(test)]
    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }
}
