//! Storage Backend
//!
//! `SQLite` connection, migrations, and the task ledger.

pub mod ledger;
pub mod migrations;
pub mod sqlite;

pub use ledger::{BatchReport, LedgerCounts, NewWallet, TaskLedger, TaskStore};
pub use migrations::run_migrations;
pub use sqlite::{Database, DatabaseConfig};
