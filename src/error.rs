//! Farmhand Error Types
//!
//! Centralized error handling using thiserror for type-safe errors.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for farmhand
#[derive(Error, Debug)]
pub enum FarmError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Input error: {0}")]
    Input(#[from] InputError),

    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),

    #[error("Report error: {0}")]
    Report(#[from] ReportError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Task ledger (storage) errors
#[derive(Error, Debug)]
pub enum LedgerError {
    /// The `wallets` table does not exist yet
    #[error("Ledger schema not initialized (run `farmhand db init` or `farmhand db reset`)")]
    SchemaMissing,

    #[error("SQLite error: {0}")]
    Sqlite(rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt ledger row for wallet {wallet}: {reason}")]
    Corrupt { wallet: String, reason: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Batch rejected ({committed} rows committed): {reason}")]
    InvalidBatch { reason: String, committed: usize },

    /// A write inside a batch transaction failed and the batch was undone
    #[error("Batch rolled back ({committed} rows committed): {source}")]
    BatchRolledBack {
        committed: usize,
        source: Box<LedgerError>,
    },

    #[error("Background ledger call failed: {0}")]
    Background(String),
}

impl From<rusqlite::Error> for LedgerError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(_, Some(msg)) if msg.contains("no such table") => {
                LedgerError::SchemaMissing
            }
            _ => LedgerError::Sqlite(err),
        }
    }
}

/// Task dispatch errors
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Task '{name}' is not registered")]
    UnknownTask { name: String },

    #[error("Task '{name}' registered twice")]
    DuplicateTask { name: String },
}

/// Malformed task plan specifications
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("Task plan has no groups")]
    EmptyPlan,

    #[error("Group #{position} has no members")]
    EmptyGroup { position: usize },

    #[error("Group #{position} contains an empty task name")]
    EmptyName { position: usize },
}

/// Unexpected faults raised by a capability while executing a task
#[derive(Error, Debug)]
pub enum CapabilityError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("{0}")]
    Other(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("IO error: {0}")]
    Io(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Serialize error: {0}")]
    Serialize(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Private key and proxy file errors
#[derive(Error, Debug)]
pub enum InputError {
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Failed to read '{path}': {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("No entries found in {path}")]
    Empty { path: PathBuf },

    #[error("Invalid private key or recovery phrase at line {line}: {preview}")]
    InvalidKey { line: usize, preview: String },

    #[error("Unsupported proxy format at line {line}: '{value}'")]
    InvalidProxy { line: usize, value: String },

    #[error("Account selection out of range: {0}")]
    Selection(String),
}

/// Per-wallet resource acquisition errors
#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Could not reach any RPC endpoint ({tried} tried)")]
    RpcUnavailable { tried: usize },

    #[error("No RPC endpoints configured")]
    NoRpcEndpoints,

    #[error("{0}")]
    Other(String),
}

/// Summary report errors
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to write report '{path}': {reason}")]
    Write { path: PathBuf, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Notification errors
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Notification rejected with status {status}")]
    Rejected { status: u16 },
}

/// Result type alias for farmhand operations
pub type FarmResult<T> = std::result::Result<T, FarmError>;

/// Result type alias for ledger operations
pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for input file operations
pub type InputResult<T> = std::result::Result<T, InputError>;

/// Result type alias for resource acquisition
pub type ResourceResult<T> = std::result::Result<T, ResourceError>;
