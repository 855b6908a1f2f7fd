//! Database Migrations
//!
//! Schema creation and version management.

use super::sqlite::Database;
use crate::error::{LedgerError, LedgerResult};
use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Run all migrations
pub fn run_migrations(db: &Database) -> LedgerResult<()> {
    db.with_connection_mut(|conn| {
        create_migrations_table(conn)?;

        let current_version = get_schema_version(conn)?;

        if current_version < 1 {
            let tx = conn.transaction()?;
            migrate_v1(&tx)?;
            set_schema_version(&tx, 1)?;
            tx.commit()?;
            tracing::info!(version = 1, "Applied ledger migration");
        }

        Ok(())
    })
}

/// Drop every ledger table and migrate from scratch
pub fn recreate_schema(db: &Database) -> LedgerResult<()> {
    db.with_connection(|conn| {
        conn.execute_batch(
            "
            DROP TABLE IF EXISTS wallets;
            DROP TABLE IF EXISTS schema_migrations;
            ",
        )?;
        Ok(())
    })?;
    run_migrations(db)
}

/// Create migrations tracking table
fn create_migrations_table(conn: &Connection) -> LedgerResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )?;
    Ok(())
}

/// Get current schema version
fn get_schema_version(conn: &Connection) -> LedgerResult<i32> {
    let result: rusqlite::Result<i32> = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    );

    match result {
        Ok(version) => Ok(version),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(0),
        Err(e) => Err(LedgerError::Migration(e.to_string())),
    }
}

/// Set schema version
fn set_schema_version(conn: &Connection, version: i32) -> LedgerResult<()> {
    conn.execute(
        "INSERT INTO schema_migrations (version) VALUES (?)",
        [version],
    )?;
    Ok(())
}

/// Migration v1: wallets table
///
/// `tasks` holds the ordered JSON list `[{name, status, index}]`.
fn migrate_v1(conn: &Connection) -> LedgerResult<()> {
    conn.execute_batch(
        r"
        CREATE TABLE IF NOT EXISTS wallets (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            private_key TEXT UNIQUE NOT NULL,
            proxy TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            tasks TEXT NOT NULL DEFAULT '[]'
        );

        CREATE INDEX IF NOT EXISTS idx_wallets_status ON wallets(status);
        ",
    )?;

    Ok(())
}

/// Check if migrations are up to date
pub fn check_migrations(db: &Database) -> LedgerResult<bool> {
    if !db.has_table("schema_migrations")? {
        return Ok(false);
    }
    db.with_connection(|conn| {
        let version = get_schema_version(conn)?;
        Ok(version >= SCHEMA_VERSION)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_migrations() {
        let db = Database::open_in_memory().unwrap();
        assert!(!check_migrations(&db).unwrap());

        run_migrations(&db).unwrap();

        assert_eq!(db.table_count("wallets").unwrap(), 0);
        assert!(check_migrations(&db).unwrap());
    }

    #[test]
    fn test_migrations_idempotent() {
        let db = Database::open_in_memory().unwrap();

        run_migrations(&db).unwrap();
        run_migrations(&db).unwrap();

        assert!(check_migrations(&db).unwrap());
        assert_eq!(db.table_count("schema_migrations").unwrap(), 1);
    }

    #[test]
    fn test_recreate_schema_drops_rows() {
        let db = Database::open_in_memory().unwrap();
        run_migrations(&db).unwrap();
        db.with_connection(|conn| {
            conn.execute(
                "INSERT INTO wallets (private_key, status, tasks) VALUES ('k', 'pending', '[]')",
                [],
            )?;
            Ok(())
        })
        .unwrap();
        assert_eq!(db.table_count("wallets").unwrap(), 1);

        recreate_schema(&db).unwrap();
        assert_eq!(db.table_count("wallets").unwrap(), 0);
    }
}
