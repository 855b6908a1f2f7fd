//! Account Scheduler
//!
//! Runs the selected accounts with at most `threads` account runners active
//! at once. One account failing or panicking never affects the others.

use super::model::mask_secret;
use super::progress::{LogProgress, ProgressSink, ProgressTracker};
use super::runner::{AccountReport, AccountRunner};
use super::selection::AccountSpec;
use crate::config::SettingsConfig;
use crate::infrastructure::report::{LogReportWriter, ReportWriter};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use rand::seq::SliceRandom;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

/// Scheduler configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Maximum number of concurrently active account runners
    pub max_concurrent: usize,
    /// Randomize execution order
    pub shuffle: bool,
}

impl SchedulerConfig {
    pub fn from_settings(settings: &SettingsConfig) -> Self {
        Self {
            max_concurrent: settings.threads.max(1),
            shuffle: settings.shuffle_wallets,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 1,
            shuffle: true,
        }
    }
}

/// Outcome of one scheduler run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Sorted by account index
    pub accounts: Vec<AccountReport>,
}

impl RunReport {
    pub fn succeeded(&self) -> usize {
        self.accounts.iter().filter(|a| a.success).count()
    }

    pub fn failed(&self) -> usize {
        self.accounts.len() - self.succeeded()
    }

    pub fn total(&self) -> usize {
        self.accounts.len()
    }
}

/// Account Scheduler
pub struct Scheduler {
    runner: Arc<AccountRunner>,
    config: SchedulerConfig,
    progress: Arc<dyn ProgressSink>,
    reports: Arc<dyn ReportWriter>,
}

impl Scheduler {
    pub fn new(runner: Arc<AccountRunner>, config: SchedulerConfig) -> Self {
        Self {
            runner,
            config,
            progress: Arc::new(LogProgress),
            reports: Arc::new(LogReportWriter),
        }
    }

    #[must_use]
    pub fn with_progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = sink;
        self
    }

    #[must_use]
    pub fn with_report_writer(mut self, writer: Arc<dyn ReportWriter>) -> Self {
        self.reports = writer;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Run every account and wait for all of them.
    ///
    /// Accounts start in (optionally shuffled) order as slots free up. The
    /// progress tracker advances exactly once per account, whatever its fate.
    pub async fn run(&self, mut accounts: Vec<AccountSpec>) -> RunReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();

        if self.config.shuffle {
            accounts.shuffle(&mut rand::thread_rng());
        }
        let order: Vec<String> = accounts.iter().map(|a| a.account_index.to_string()).collect();
        tracing::info!(
            run = %run_id,
            accounts = accounts.len(),
            threads = self.config.max_concurrent,
            order = %order.join(", "),
            "Starting run"
        );

        let gate = Arc::new(Semaphore::new(self.config.max_concurrent.max(1)));
        let tracker = Arc::new(ProgressTracker::new(
            accounts.len(),
            "Accounts",
            Arc::clone(&self.progress),
        ));
        let mut set = JoinSet::new();
        let mut reports = Vec::with_capacity(accounts.len());

        for account in accounts {
            let index = account.account_index;
            let wallet = mask_secret(&account.wallet_id);

            let permit = Arc::clone(&gate)
                .acquire_owned()
                .await
                .expect("account gate is never closed");

            let runner = Arc::clone(&self.runner);
            let tracker = Arc::clone(&tracker);
            set.spawn(async move {
                let _permit = permit;
                let report = match AssertUnwindSafe(runner.run(account)).catch_unwind().await {
                    Ok(report) => report,
                    Err(_) => {
                        tracing::error!(account = index, "Account runner panicked");
                        AccountReport::crashed(index, wallet, "account runner panicked")
                    }
                };
                tracker.increment().await;
                report
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => tracing::error!(error = %e, "Account task aborted"),
            }
        }

        reports.sort_by_key(|r| r.account_index);
        let report = RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            accounts: reports,
        };

        tracing::info!(
            run = %run_id,
            succeeded = report.succeeded(),
            failed = report.failed(),
            "Run finished"
        );
        if let Err(e) = self.reports.persist(&report) {
            tracing::warn!(error = %e, "Could not save run report");
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(index: usize, success: bool) -> AccountReport {
        AccountReport {
            success,
            ..AccountReport::new(index, format!("w{}", index))
        }
    }

    #[test]
    fn test_run_report_counts() {
        let report = RunReport {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            accounts: vec![account(1, true), account(2, false), account(3, true)],
        };
        assert_eq!(report.total(), 3);
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 1);
    }

    #[test]
    fn test_config_from_settings() {
        let settings = SettingsConfig {
            threads: 0,
            shuffle_wallets: false,
            ..Default::default()
        };
        let config = SchedulerConfig::from_settings(&settings);
        assert_eq!(config.max_concurrent, 1);
        assert!(!config.shuffle);
    }
}
