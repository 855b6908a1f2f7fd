//! Run summary reports

use crate::domain::task::scheduler::RunReport;
use crate::error::ReportError;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Persists the aggregate report of a run
pub trait ReportWriter: Send + Sync {
    fn persist(&self, report: &RunReport) -> Result<Option<PathBuf>, ReportError>;
}

/// Writes `progress_<timestamp>.json` into a directory and logs a table
#[derive(Debug, Clone)]
pub struct JsonReportWriter {
    dir: PathBuf,
}

impl JsonReportWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ReportWriter for JsonReportWriter {
    fn persist(&self, report: &RunReport) -> Result<Option<PathBuf>, ReportError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| ReportError::Write {
            path: self.dir.clone(),
            reason: e.to_string(),
        })?;

        let file_name = format!("progress_{}.json", report.started_at.format("%Y%m%d_%H%M%S"));
        let path = self.dir.join(file_name);
        let json = serde_json::to_string_pretty(report)?;
        std::fs::write(&path, json).map_err(|e| ReportError::Write {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        for line in render_summary(report).lines() {
            tracing::info!("{}", line);
        }
        tracing::info!(path = %path.display(), "Report written");
        Ok(Some(path))
    }
}

/// Logs the summary table only
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReportWriter;

impl ReportWriter for LogReportWriter {
    fn persist(&self, report: &RunReport) -> Result<Option<PathBuf>, ReportError> {
        for line in render_summary(report).lines() {
            tracing::info!("{}", line);
        }
        Ok(None)
    }
}

/// Plain-text table: one row per account plus totals
pub fn render_summary(report: &RunReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>5}  {:<16}  {:<42}  {:>14}  {:>5}  {:>9}  {:>6}  {:>7}  {}",
        "#", "wallet", "address", "balance", "txs", "completed", "failed", "status", "error"
    );
    for account in &report.accounts {
        let (address, balance, txs) = match &account.stats {
            Some(stats) => (
                stats.address.clone(),
                format!("{:.6}", stats.balance),
                stats.transaction_count.to_string(),
            ),
            None => ("-".to_string(), "-".to_string(), "-".to_string()),
        };
        let _ = writeln!(
            out,
            "{:>5}  {:<16}  {:<42}  {:>14}  {:>5}  {:>9}  {:>6}  {:>7}  {}",
            account.account_index,
            account.wallet,
            address,
            balance,
            txs,
            account.completed.len(),
            account.failed.len(),
            if account.success { "ok" } else { "FAILED" },
            account.error.as_deref().unwrap_or("")
        );
    }
    let _ = write!(
        out,
        "Run {}: {} accounts, {} succeeded, {} failed",
        report.run_id,
        report.accounts.len(),
        report.succeeded(),
        report.failed()
    );
    out
}
