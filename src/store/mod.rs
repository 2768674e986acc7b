//! SQLite-backed relational store.
//!
//! The [`Database`] is owned by the caller and lent to every core
//! operation. The core never pools or opens connections on its own; each
//! operation scopes its writes to one short transaction through
//! [`Database::transaction`].

pub mod error;

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use error::{classify, ErrorClass, StoreError};

/// Schema SQL embedded at compile time.
const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Connection-level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    /// How long a statement waits on a lock before failing with BUSY
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

fn default_busy_timeout() -> u64 {
    5000
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

/// A handle on the ticket desk database.
pub struct Database {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Database {
    /// Open (or create) a database file and apply the schema.
    pub fn open(path: &Path, settings: &StoreSettings) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(StoreError::CreateDir)?;
            }
        }

        let conn = Connection::open(path)?;
        let db = Self {
            conn,
            path: Some(path.to_path_buf()),
        };
        db.configure(settings)?;
        db.migrate()?;

        debug!(path = %path.display(), "Opened database");
        Ok(db)
    }

    /// Open a private in-memory database with the schema applied.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let db = Self {
            conn: Connection::open_in_memory()?,
            path: None,
        };
        db.configure(&StoreSettings::default())?;
        db.migrate()?;
        Ok(db)
    }

    fn configure(&self, settings: &StoreSettings) -> Result<(), StoreError> {
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        self.conn
            .busy_timeout(Duration::from_millis(settings.busy_timeout_ms))?;
        Ok(())
    }

    /// Apply the embedded schema. Safe to run repeatedly.
    pub fn migrate(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    /// Path of the backing file (None for in-memory databases)
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Borrow the raw connection for read queries.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Run `f` inside a single transaction.
    ///
    /// Commits when `f` returns `Ok`; any error drops the transaction, which
    /// rolls it back. Failures to begin or commit are classified like any
    /// other storage failure.
    pub fn transaction<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        let tx = self.conn.transaction().map_err(StoreError::from)?;
        let value = f(&tx)?;
        tx.commit().map_err(StoreError::from)?;
        Ok(value)
    }

    /// Check whether `relation` has a row whose `column` equals `id`.
    pub fn row_exists(&self, relation: &str, column: &str, id: i64) -> Result<bool, StoreError> {
        ensure_identifier(relation)?;
        ensure_identifier(column)?;

        let sql = format!("SELECT 1 FROM {relation} WHERE {column} = ?1 LIMIT 1");
        let found = self
            .conn
            .query_row(&sql, params![id], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    /// Resolve the key column of a table.
    ///
    /// Prefers the declared primary key, then a column named `id`, then the
    /// first column. Returns `None` when the table does not exist.
    pub fn primary_key_column(&self, relation: &str) -> Result<Option<String>, StoreError> {
        ensure_identifier(relation)?;

        let mut stmt = self
            .conn
            .prepare("SELECT name, pk FROM pragma_table_info(?1) ORDER BY cid")?;
        let columns = stmt
            .query_map(params![relation], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        if let Some((name, _)) = columns.iter().find(|(_, pk)| *pk == 1) {
            return Ok(Some(name.clone()));
        }
        if let Some((name, _)) = columns.iter().find(|(name, _)| name.eq_ignore_ascii_case("id")) {
            return Ok(Some(name.clone()));
        }
        Ok(columns.into_iter().next().map(|(name, _)| name))
    }

    /// Count rows of `relation` where `column` equals `id`.
    pub fn count_where(&self, relation: &str, column: &str, id: i64) -> Result<i64, StoreError> {
        ensure_identifier(relation)?;
        ensure_identifier(column)?;

        let sql = format!("SELECT COUNT(*) FROM {relation} WHERE {column} = ?1");
        Ok(self.conn.query_row(&sql, params![id], |row| row.get(0))?)
    }
}

/// True for plain SQL identifiers (`[A-Za-z_][A-Za-z0-9_]*`).
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Reject anything that is not a plain identifier before it reaches SQL text.
pub fn ensure_identifier(name: &str) -> Result<(), StoreError> {
    if is_identifier(name) {
        Ok(())
    } else {
        Err(StoreError::InvalidIdentifier(name.to_string()))
    }
}
