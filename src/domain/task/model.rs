//! Task Model
//!
//! Core data structures for the task ledger and task execution.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a single task entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Waiting to be executed (or failed and left for a later run)
    Pending,
    /// Executed successfully
    Completed,
}

impl TaskStatus {
    /// Storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Completed => "completed",
        }
    }

    /// Parse the storage representation
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "completed" => Some(TaskStatus::Completed),
            _ => None,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overall wallet status, derived from its task entries
pub type WalletStatus = TaskStatus;

/// One named task in a wallet's persisted plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEntry {
    pub name: String,
    pub status: TaskStatus,
    /// 1-based position in the plan
    pub index: u32,
}

impl TaskEntry {
    /// Build a fresh, all-pending entry list preserving order
    pub fn pending_list<S: AsRef<str>>(names: &[S]) -> Vec<TaskEntry> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| TaskEntry {
                name: name.as_ref().to_string(),
                status: TaskStatus::Pending,
                index: i as u32 + 1,
            })
            .collect()
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

/// Status a task list implies for its wallet
pub fn derive_wallet_status(tasks: &[TaskEntry]) -> WalletStatus {
    if tasks.iter().all(TaskEntry::is_completed) {
        TaskStatus::Completed
    } else {
        TaskStatus::Pending
    }
}

/// A wallet and its persisted plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletRecord {
    /// Wallet secret, used verbatim as the primary key
    pub wallet_id: String,
    pub proxy: Option<String>,
    pub status: WalletStatus,
    pub tasks: Vec<TaskEntry>,
}

impl WalletRecord {
    pub fn completed_tasks(&self) -> impl Iterator<Item = &TaskEntry> {
        self.tasks.iter().filter(|t| t.is_completed())
    }

    pub fn pending_tasks(&self) -> impl Iterator<Item = &TaskEntry> {
        self.tasks.iter().filter(|t| !t.is_completed())
    }

    /// Shortened secret for logs and tables
    pub fn masked_id(&self) -> String {
        mask_secret(&self.wallet_id)
    }
}

/// Show only the edges of a secret: `0x1234...cdef`
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 10 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Tagged result of one task attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The task did its work
    Success,
    /// Expected "not yet" condition; eligible for retry or skip-and-continue
    Recoverable(String),
    /// Retrying cannot help
    Fatal(String),
}

impl TaskOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Success)
    }

    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, TaskOutcome::Fatal(_))
    }

    pub fn recoverable(reason: impl Into<String>) -> Self {
        TaskOutcome::Recoverable(reason.into())
    }

    pub fn fatal(reason: impl Into<String>) -> Self {
        TaskOutcome::Fatal(reason.into())
    }
}

impl From<bool> for TaskOutcome {
    fn from(ok: bool) -> Self {
        if ok {
            TaskOutcome::Success
        } else {
            TaskOutcome::Recoverable("task reported failure".to_string())
        }
    }
}

impl<T> From<(bool, T)> for TaskOutcome {
    fn from((ok, _): (bool, T)) -> Self {
        TaskOutcome::from(ok)
    }
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskOutcome::Success => write!(f, "success"),
            TaskOutcome::Recoverable(reason) => write!(f, "recoverable failure: {}", reason),
            TaskOutcome::Fatal(reason) => write!(f, "fatal failure: {}", reason),
        }
    }
}
