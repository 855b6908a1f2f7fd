//! SQLite Database
//!
//! Core database connection and configuration.

use crate::error::{LedgerError, LedgerResult};
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database file path
    pub path: PathBuf,
    /// Enable WAL mode for better concurrency
    pub wal_mode: bool,
    /// How long a writer waits on a locked database file
    pub busy_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/accounts.db"),
            wal_mode: true,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl DatabaseConfig {
    /// Create config for in-memory database
    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::from(":memory:"),
            wal_mode: false, // WAL not supported for in-memory
            busy_timeout: Duration::from_secs(5),
        }
    }

    /// Create config with custom path
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    fn is_memory(&self) -> bool {
        self.path.as_os_str() == ":memory:"
    }
}

/// Thread-safe database wrapper
///
/// One connection shared behind a mutex; clones share it.
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    config: DatabaseConfig,
}

impl Database {
    /// Open or create database
    pub fn open(config: DatabaseConfig) -> LedgerResult<Self> {
        if !config.is_memory() {
            if let Some(parent) = config.path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

        let conn = Connection::open_with_flags(&config.path, flags)?;
        Self::configure_connection(&conn, &config)?;

        tracing::debug!(path = %config.path.display(), "Opened ledger database");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            config,
        })
    }

    /// Open in-memory database
    pub fn open_in_memory() -> LedgerResult<Self> {
        Self::open(DatabaseConfig::in_memory())
    }

    /// Configure connection pragmas
    fn configure_connection(conn: &Connection, config: &DatabaseConfig) -> LedgerResult<()> {
        conn.busy_timeout(config.busy_timeout)?;

        if config.wal_mode {
            // journal_mode returns a row, so query it rather than execute
            let _mode: String = conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
        }

        conn.execute_batch(
            "
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            ",
        )?;

        Ok(())
    }

    /// Get database path
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Execute with connection
    pub fn with_connection<F, T>(&self, f: F) -> LedgerResult<T>
    where
        F: FnOnce(&Connection) -> LedgerResult<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| LedgerError::Lock(e.to_string()))?;
        f(&conn)
    }

    /// Execute with mutable connection (for transactions)
    pub fn with_connection_mut<F, T>(&self, f: F) -> LedgerResult<T>
    where
        F: FnOnce(&mut Connection) -> LedgerResult<T>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| LedgerError::Lock(e.to_string()))?;
        f(&mut conn)
    }

    /// Execute a transaction. Any error returned by `f` rolls it back.
    pub fn transaction<F, T>(&self, f: F) -> LedgerResult<T>
    where
        F: FnOnce(&rusqlite::Transaction) -> LedgerResult<T>,
    {
        self.with_connection_mut(|conn| {
            let tx = conn.transaction()?;
            let result = f(&tx)?;
            tx.commit()?;
            Ok(result)
        })
    }

    /// Check if database is reachable
    pub fn is_valid(&self) -> bool {
        self.with_connection(|conn| conn.execute_batch("SELECT 1;").map_err(LedgerError::from))
            .is_ok()
    }

    /// Whether `table` exists
    pub fn has_table(&self, table: &str) -> LedgerResult<bool> {
        self.with_connection(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
                [table],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    /// Get table row count
    pub fn table_count(&self, table: &str) -> LedgerResult<i64> {
        self.with_connection(|conn| {
            let count: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                    row.get(0)
                })?;
            Ok(count)
        })
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
            config: self.config.clone(),
        }
    }
}
