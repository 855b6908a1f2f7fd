//! Task Ledger
//!
//! Durable per-wallet task lists. Every mutating call runs in one SQLite
//! transaction, and a wallet's status is recomputed in the same transaction
//! as any change to its task entries.

use super::migrations::{recreate_schema, run_migrations};
use super::sqlite::Database;
use crate::domain::task::model::{derive_wallet_status, mask_secret, TaskEntry, TaskStatus, WalletRecord};
use crate::error::{LedgerError, LedgerResult};
use async_trait::async_trait;
use rusqlite::{params, OptionalExtension, Row, Transaction};
use serde::Serialize;
use std::collections::HashSet;

/// One wallet to register
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWallet {
    pub wallet_id: String,
    pub proxy: Option<String>,
    pub tasks: Vec<String>,
}

impl NewWallet {
    pub fn new(wallet_id: impl Into<String>, proxy: Option<String>, tasks: Vec<String>) -> Self {
        Self {
            wallet_id: wallet_id.into(),
            proxy,
            tasks,
        }
    }
}

/// Outcome of a batch operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Rows actually written
    pub applied: usize,
    /// Wallet ids left untouched (already present, or unknown for replacements)
    pub skipped: Vec<String>,
}

/// Wallet totals by status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LedgerCounts {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
}

/// SQLite-backed task ledger
#[derive(Clone)]
pub struct TaskLedger {
    db: Database,
}

impl TaskLedger {
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Create the schema if absent
    pub fn init(&self) -> LedgerResult<()> {
        run_migrations(&self.db)
    }

    /// Register one wallet. `false` if it already exists.
    pub fn register(
        &self,
        wallet_id: &str,
        proxy: Option<&str>,
        task_names: &[String],
    ) -> LedgerResult<bool> {
        validate_wallet(wallet_id, task_names)?;
        self.db.transaction(|tx| {
            let inserted = insert_wallet(tx, wallet_id, proxy, task_names)?;
            if !inserted {
                tracing::debug!(wallet = %mask_secret(wallet_id), "Wallet already registered");
            }
            Ok(inserted)
        })
    }

    /// Register many wallets in one transaction.
    ///
    /// The batch is validated before anything is written; an invalid entry
    /// rejects the whole batch. Wallets already present are skipped. A
    /// storage failure mid-batch rolls everything back and surfaces as
    /// [`LedgerError::BatchRolledBack`].
    pub fn register_batch(&self, entries: &[NewWallet]) -> LedgerResult<BatchReport> {
        let mut seen = HashSet::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            validate_wallet(&entry.wallet_id, &entry.tasks).map_err(|e| {
                LedgerError::InvalidBatch {
                    reason: format!("entry {}: {}", i + 1, e),
                    committed: 0,
                }
            })?;
            if !seen.insert(entry.wallet_id.as_str()) {
                return Err(LedgerError::InvalidBatch {
                    reason: format!(
                        "entry {}: wallet {} appears twice",
                        i + 1,
                        mask_secret(&entry.wallet_id)
                    ),
                    committed: 0,
                });
            }
        }

        let report = self.db.transaction(|tx| {
            let mut report = BatchReport::default();
            for entry in entries {
                if insert_wallet(tx, &entry.wallet_id, entry.proxy.as_deref(), &entry.tasks)? {
                    report.applied += 1;
                } else {
                    report.skipped.push(entry.wallet_id.clone());
                }
            }
            Ok(report)
        })
        .map_err(rolled_back)?;

        tracing::info!(
            applied = report.applied,
            skipped = report.skipped.len(),
            "Registered wallet batch"
        );
        Ok(report)
    }

    /// Pending entries in insertion order; empty for unknown or completed wallets
    pub fn pending_tasks(&self, wallet_id: &str) -> LedgerResult<Vec<TaskEntry>> {
        let record = self.wallet(wallet_id)?;
        Ok(record
            .map(|r| r.tasks.into_iter().filter(|t| !t.is_completed()).collect())
            .unwrap_or_default())
    }

    /// Set the status of one task entry and recompute the wallet status.
    ///
    /// The first entry named `task_name` whose status differs from `status`
    /// is updated, so repeated names resolve in plan order. Returns `false`
    /// when the wallet or task does not exist.
    pub fn mark_task(&self, wallet_id: &str, task_name: &str, status: TaskStatus) -> LedgerResult<bool> {
        self.db.transaction(|tx| {
            let Some(mut record) = load_wallet(tx, wallet_id)? else {
                tracing::warn!(
                    wallet = %mask_secret(wallet_id),
                    task = task_name,
                    "mark_task on unknown wallet"
                );
                return Ok(false);
            };

            let position = record
                .tasks
                .iter()
                .position(|t| t.name == task_name && t.status != status);

            match position {
                Some(i) => record.tasks[i].status = status,
                None if record.tasks.iter().any(|t| t.name == task_name) => {
                    tracing::debug!(
                        wallet = %record.masked_id(),
                        task = task_name,
                        status = %status,
                        "Task already has requested status"
                    );
                }
                None => {
                    tracing::warn!(
                        wallet = %record.masked_id(),
                        task = task_name,
                        "mark_task on unknown task"
                    );
                    return Ok(false);
                }
            }

            record.status = derive_wallet_status(&record.tasks);
            store_tasks(tx, &record)?;
            Ok(true)
        })
    }

    /// Set the status of the entry at plan position `index` (1-based) and
    /// recompute the wallet status. Returns `false` when the wallet or
    /// position does not exist.
    pub fn mark_task_at(&self, wallet_id: &str, index: u32, status: TaskStatus) -> LedgerResult<bool> {
        self.db.transaction(|tx| {
            let Some(mut record) = load_wallet(tx, wallet_id)? else {
                tracing::warn!(wallet = %mask_secret(wallet_id), index, "mark_task_at on unknown wallet");
                return Ok(false);
            };
            let Some(position) = record.tasks.iter().position(|t| t.index == index) else {
                tracing::warn!(wallet = %record.masked_id(), index, "mark_task_at on unknown position");
                return Ok(false);
            };
            record.tasks[position].status = status;

            record.status = derive_wallet_status(&record.tasks);
            store_tasks(tx, &record)?;
            Ok(true)
        })
    }

    /// Replace a wallet's whole plan; everything becomes pending
    pub fn replace_tasks(&self, wallet_id: &str, task_names: &[String]) -> LedgerResult<bool> {
        validate_wallet(wallet_id, task_names)?;
        self.db.transaction(|tx| replace_in_tx(tx, wallet_id, task_names))
    }

    /// Replace plans of many wallets in one transaction, skipping unknown ids
    pub fn bulk_replace_tasks(&self, entries: &[(String, Vec<String>)]) -> LedgerResult<BatchReport> {
        for (i, (wallet_id, tasks)) in entries.iter().enumerate() {
            validate_wallet(wallet_id, tasks).map_err(|e| LedgerError::InvalidBatch {
                reason: format!("entry {}: {}", i + 1, e),
                committed: 0,
            })?;
        }

        let report = self.db.transaction(|tx| {
            let mut report = BatchReport::default();
            for (wallet_id, tasks) in entries {
                if replace_in_tx(tx, wallet_id, tasks)? {
                    report.applied += 1;
                } else {
                    report.skipped.push(wallet_id.clone());
                }
            }
            Ok(report)
        })
        .map_err(rolled_back)?;

        if !report.skipped.is_empty() {
            tracing::warn!(
                skipped = report.skipped.len(),
                "Plan replacement skipped unknown wallets"
            );
        }
        Ok(report)
    }

    /// Add task names not already pending; the wallet goes back to pending
    pub fn append_tasks(&self, wallet_id: &str, task_names: &[String]) -> LedgerResult<bool> {
        self.db.transaction(|tx| {
            let Some(mut record) = load_wallet(tx, wallet_id)? else {
                return Ok(false);
            };
            let mut next_index = record.tasks.iter().map(|t| t.index).max().unwrap_or(0);
            for name in task_names {
                let already_pending = record
                    .tasks
                    .iter()
                    .any(|t| &t.name == name && !t.is_completed());
                if !already_pending {
                    next_index += 1;
                    record.tasks.push(TaskEntry {
                        name: name.clone(),
                        status: TaskStatus::Pending,
                        index: next_index,
                    });
                }
            }
            record.status = derive_wallet_status(&record.tasks);
            store_tasks(tx, &record)?;
            Ok(true)
        })
    }

    /// Change a wallet's proxy assignment
    pub fn set_proxy(&self, wallet_id: &str, proxy: Option<&str>) -> LedgerResult<bool> {
        self.db.transaction(|tx| {
            let changed = tx.execute(
                "UPDATE wallets SET proxy = ? WHERE private_key = ?",
                params![proxy, wallet_id],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn wallet(&self, wallet_id: &str) -> LedgerResult<Option<WalletRecord>> {
        self.db.with_connection(|conn| load_wallet(conn, wallet_id))
    }

    /// Every wallet, in registration order
    pub fn all_wallets(&self) -> LedgerResult<Vec<WalletRecord>> {
        self.db.with_connection(|conn| {
            let mut stmt =
                conn.prepare("SELECT private_key, proxy, status, tasks FROM wallets ORDER BY id")?;
            let rows = stmt.query_map([], RawRow::from_row)?;
            let records = rows
                .map(|r| r.map_err(LedgerError::from).and_then(RawRow::into_record))
                .collect::<LedgerResult<Vec<_>>>()?;
            Ok(records)
        })
    }

    pub fn list_by_status(&self, status: TaskStatus) -> LedgerResult<Vec<WalletRecord>> {
        self.db.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT private_key, proxy, status, tasks FROM wallets WHERE status = ? ORDER BY id",
            )?;
            let rows = stmt.query_map([status.as_str()], RawRow::from_row)?;
            let records = rows
                .map(|r| r.map_err(LedgerError::from).and_then(RawRow::into_record))
                .collect::<LedgerResult<Vec<_>>>()?;
            Ok(records)
        })
    }

    pub fn counts(&self) -> LedgerResult<LedgerCounts> {
        self.db.with_connection(|conn| {
            let (total, completed): (i64, i64) = conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(status = 'completed'), 0) FROM wallets",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            let total = total as usize;
            let completed = completed as usize;
            Ok(LedgerCounts {
                total,
                completed,
                pending: total - completed,
            })
        })
    }

    /// Drop and recreate the schema. Destroys every record.
    pub fn reset_all(&self) -> LedgerResult<()> {
        recreate_schema(&self.db)?;
        tracing::warn!(path = %self.db.path().display(), "Ledger reset");
        Ok(())
    }
}

/// Async access for account runners
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn pending_tasks(&self, wallet_id: &str) -> LedgerResult<Vec<TaskEntry>>;

    async fn mark_task(&self, wallet_id: &str, task_name: &str, status: TaskStatus) -> LedgerResult<bool>;

    async fn mark_task_at(&self, wallet_id: &str, index: u32, status: TaskStatus) -> LedgerResult<bool>;
}

#[async_trait]
impl TaskStore for TaskLedger {
    async fn pending_tasks(&self, wallet_id: &str) -> LedgerResult<Vec<TaskEntry>> {
        let ledger = self.clone();
        let wallet_id = wallet_id.to_string();
        tokio::task::spawn_blocking(move || ledger.pending_tasks(&wallet_id))
            .await
            .map_err(|e| LedgerError::Background(e.to_string()))?
    }

    async fn mark_task(&self, wallet_id: &str, task_name: &str, status: TaskStatus) -> LedgerResult<bool> {
        let ledger = self.clone();
        let wallet_id = wallet_id.to_string();
        let task_name = task_name.to_string();
        tokio::task::spawn_blocking(move || ledger.mark_task(&wallet_id, &task_name, status))
            .await
            .map_err(|e| LedgerError::Background(e.to_string()))?
    }

    async fn mark_task_at(&self, wallet_id: &str, index: u32, status: TaskStatus) -> LedgerResult<bool> {
        let ledger = self.clone();
        let wallet_id = wallet_id.to_string();
        tokio::task::spawn_blocking(move || ledger.mark_task_at(&wallet_id, index, status))
            .await
            .map_err(|e| LedgerError::Background(e.to_string()))?
    }
}

// ============================================================================
// Row helpers
// ============================================================================

struct RawRow {
    wallet_id: String,
    proxy: Option<String>,
    status: String,
    tasks: String,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            wallet_id: row.get(0)?,
            proxy: row.get(1)?,
            status: row.get(2)?,
            tasks: row.get(3)?,
        })
    }

    fn into_record(self) -> LedgerResult<WalletRecord> {
        let status = TaskStatus::parse(&self.status).ok_or_else(|| LedgerError::Corrupt {
            wallet: mask_secret(&self.wallet_id),
            reason: format!("unknown status '{}'", self.status),
        })?;
        let mut tasks: Vec<TaskEntry> =
            serde_json::from_str(&self.tasks).map_err(|e| LedgerError::Corrupt {
                wallet: mask_secret(&self.wallet_id),
                reason: e.to_string(),
            })?;
        tasks.sort_by_key(|t| t.index);
        Ok(WalletRecord {
            wallet_id: self.wallet_id,
            proxy: self.proxy,
            status,
            tasks,
        })
    }
}

/// Nothing in a failed batch transaction is committed
fn rolled_back(err: LedgerError) -> LedgerError {
    match err {
        LedgerError::SchemaMissing => err,
        other => LedgerError::BatchRolledBack {
            committed: 0,
            source: Box::new(other),
        },
    }
}

fn validate_wallet(wallet_id: &str, task_names: &[String]) -> LedgerResult<()> {
    if wallet_id.trim().is_empty() {
        return Err(LedgerError::InvalidInput("wallet id is empty".into()));
    }
    if task_names.is_empty() {
        return Err(LedgerError::InvalidInput(format!(
            "wallet {} has no tasks",
            mask_secret(wallet_id)
        )));
    }
    if task_names.iter().any(|n| n.trim().is_empty()) {
        return Err(LedgerError::InvalidInput(format!(
            "wallet {} has an empty task name",
            mask_secret(wallet_id)
        )));
    }
    Ok(())
}

fn load_wallet(conn: &rusqlite::Connection, wallet_id: &str) -> LedgerResult<Option<WalletRecord>> {
    let raw = conn
        .query_row(
            "SELECT private_key, proxy, status, tasks FROM wallets WHERE private_key = ?",
            [wallet_id],
            RawRow::from_row,
        )
        .optional()?;
    raw.map(RawRow::into_record).transpose()
}

fn insert_wallet(
    tx: &Transaction<'_>,
    wallet_id: &str,
    proxy: Option<&str>,
    task_names: &[String],
) -> LedgerResult<bool> {
    let tasks = serde_json::to_string(&TaskEntry::pending_list(task_names))?;
    let inserted = tx.execute(
        "INSERT OR IGNORE INTO wallets (private_key, proxy, status, tasks) VALUES (?, ?, ?, ?)",
        params![wallet_id, proxy, TaskStatus::Pending.as_str(), tasks],
    )?;
    Ok(inserted > 0)
}

fn replace_in_tx(tx: &Transaction<'_>, wallet_id: &str, task_names: &[String]) -> LedgerResult<bool> {
    let tasks = serde_json::to_string(&TaskEntry::pending_list(task_names))?;
    let changed = tx.execute(
        "UPDATE wallets SET tasks = ?, status = ? WHERE private_key = ?",
        params![tasks, TaskStatus::Pending.as_str(), wallet_id],
    )?;
    Ok(changed > 0)
}

fn store_tasks(tx: &Transaction<'_>, record: &WalletRecord) -> LedgerResult<()> {
    let tasks = serde_json::to_string(&record.tasks)?;
    tx.execute(
        "UPDATE wallets SET tasks = ?, status = ? WHERE private_key = ?",
        params![tasks, record.status.as_str(), record.wallet_id],
    )?;
    Ok(())
}
