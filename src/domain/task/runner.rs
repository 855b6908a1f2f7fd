//! Account Runner
//!
//! Drives one wallet through `Created → Initializing → Running →
//! Succeeded | Failed → CleanedUp`. Resources acquired during initialization
//! are released exactly once on every path, panics included.

use super::model::{mask_secret, TaskOutcome, TaskStatus};
use super::registry::{CapabilityRegistry, WalletContext};
use super::retry::{attempt, RetryPolicy};
use super::selection::AccountSpec;
use crate::config::AppConfig;
use crate::error::LedgerError;
use crate::infrastructure::notify::{notify_best_effort, Notifier};
use crate::infrastructure::session::ResourceProvider;
use crate::infrastructure::storage::TaskStore;
use crate::infrastructure::wallet::{collect_stats, WalletStats};
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

/// Lifecycle of one account run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Created,
    Initializing,
    Running,
    Succeeded,
    Failed,
    CleanedUp,
}

impl fmt::Display for RunnerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunnerState::Created => "created",
            RunnerState::Initializing => "initializing",
            RunnerState::Running => "running",
            RunnerState::Succeeded => "succeeded",
            RunnerState::Failed => "failed",
            RunnerState::CleanedUp => "cleaned_up",
        };
        f.write_str(name)
    }
}

/// What one account run did
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountReport {
    pub account_index: usize,
    /// Masked wallet secret
    pub wallet: String,
    pub completed: Vec<String>,
    pub failed: Vec<String>,
    /// Pending tasks found at the start of the run
    pub pending_total: usize,
    pub success: bool,
    /// Account-level failure (initialization, ledger, panic)
    pub error: Option<String>,
    /// Balance and nonce, when the wallet has a derivable address
    pub stats: Option<WalletStats>,
    pub elapsed_ms: u64,
}

impl AccountReport {
    pub fn new(account_index: usize, wallet: String) -> Self {
        Self {
            account_index,
            wallet,
            completed: Vec::new(),
            failed: Vec::new(),
            pending_total: 0,
            success: false,
            error: None,
            stats: None,
            elapsed_ms: 0,
        }
    }

    /// Report for a runner that died before it could produce one
    pub fn crashed(account_index: usize, wallet: String, reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            ..Self::new(account_index, wallet)
        }
    }
}

/// Runs the task plan of one wallet
pub struct AccountRunner {
    config: Arc<AppConfig>,
    store: Arc<dyn TaskStore>,
    registry: Arc<CapabilityRegistry>,
    resources: Arc<dyn ResourceProvider>,
    notifier: Arc<dyn Notifier>,
    retry: RetryPolicy,
}

impl AccountRunner {
    pub fn new(
        config: Arc<AppConfig>,
        store: Arc<dyn TaskStore>,
        registry: Arc<CapabilityRegistry>,
        resources: Arc<dyn ResourceProvider>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let retry = RetryPolicy::from_settings(&config.settings);
        Self {
            config,
            store,
            registry,
            resources,
            notifier,
            retry,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Run one account to completion. Never panics, never returns an error:
    /// every failure ends up in the report.
    pub async fn run(&self, account: AccountSpec) -> AccountReport {
        let wallet = mask_secret(&account.wallet_id);
        let span = tracing::info_span!("account", account = account.account_index, wallet = %wallet);
        self.run_inner(account, wallet).instrument(span).await
    }

    async fn run_inner(&self, account: AccountSpec, wallet: String) -> AccountReport {
        let started = Instant::now();
        let mut report = AccountReport::new(account.account_index, wallet);
        let mut state = RunnerState::Created;

        transition(&mut state, RunnerState::Initializing);
        let acquired = self
            .resources
            .acquire(account.account_index, account.proxy.as_ref())
            .await;
        match acquired {
            Ok(resources) => {
                let ctx = WalletContext {
                    account_index: account.account_index,
                    wallet_id: account.wallet_id,
                    proxy: account.proxy,
                    http: resources.http.clone(),
                    chain: resources.chain.clone(),
                    config: Arc::clone(&self.config),
                };

                transition(&mut state, RunnerState::Running);
                let result = AssertUnwindSafe(self.run_tasks(&ctx, &mut report))
                    .catch_unwind()
                    .await;
                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(LedgerError::SchemaMissing)) => {
                        tracing::error!("Ledger table missing; initialize the database first");
                        report.error = Some(LedgerError::SchemaMissing.to_string());
                    }
                    Ok(Err(e)) => {
                        tracing::error!(error = %e, "Ledger error");
                        report.error = Some(format!("ledger error: {}", e));
                    }
                    Err(panic) => {
                        let message = panic_message(panic.as_ref());
                        tracing::error!(panic = %message, "Account run panicked");
                        report.error = Some(format!("panicked: {}", message));
                    }
                }

                report.success = report.error.is_none() && report.failed.is_empty();
                transition(
                    &mut state,
                    if report.success {
                        RunnerState::Succeeded
                    } else {
                        RunnerState::Failed
                    },
                );

                report.stats = collect_stats(&ctx.chain, &ctx.wallet_id).await;
                self.resources.release(resources).await;
                transition(&mut state, RunnerState::CleanedUp);
            }
            Err(e) => {
                tracing::error!(error = %e, "Initialization failed");
                report.error = Some(format!("initialization failed: {}", e));
                transition(&mut state, RunnerState::Failed);
                transition(&mut state, RunnerState::CleanedUp);
            }
        }

        notify_best_effort(self.notifier.as_ref(), &self.summary_message(&report)).await;

        let pause = self.config.settings.random_pause_between_accounts.sample_now();
        if !pause.is_zero() {
            tracing::info!("Pausing {}s before the next account", pause.as_secs());
            tokio::time::sleep(pause).await;
        }

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        report
    }

    async fn run_tasks(&self, ctx: &WalletContext, report: &mut AccountReport) -> Result<(), LedgerError> {
        let settings = &self.config.settings;

        let pause = settings.random_initialization_pause.sample_now();
        if !pause.is_zero() {
            tracing::info!("Pausing {}s before starting", pause.as_secs());
            tokio::time::sleep(pause).await;
        }

        let tasks = self.store.pending_tasks(&ctx.wallet_id).await?;
        report.pending_total = tasks.len();
        if tasks.is_empty() {
            tracing::warn!("No pending tasks for this wallet");
            return Ok(());
        }

        let plan: Vec<String> = tasks
            .iter()
            .enumerate()
            .map(|(i, t)| format!("{}. {}", i + 1, t.name))
            .collect();
        tracing::info!(plan = %plan.join(" | "), "Task plan");

        for task in tasks {
            tracing::info!(task = %task.name, "Executing task");

            let outcome = match self.registry.resolve(&task.name) {
                Ok(capability) => attempt(capability.as_ref(), ctx, &self.retry).await.outcome,
                Err(e) => {
                    tracing::error!(task = %task.name, error = %e, "No capability registered");
                    TaskOutcome::Fatal(e.to_string())
                }
            };

            match outcome {
                TaskOutcome::Success => {
                    let recorded = self
                        .store
                        .mark_task_at(&ctx.wallet_id, task.index, TaskStatus::Completed)
                        .await?;
                    if recorded {
                        tracing::info!(task = %task.name, "Task completed");
                    } else {
                        tracing::warn!(
                            task = %task.name,
                            index = task.index,
                            "Task completed but the ledger has no matching entry"
                        );
                    }
                    report.completed.push(task.name);
                    self.pause_between_actions().await;
                }
                failure => {
                    report.failed.push(task.name.clone());
                    if self.config.flow.skip_failed_tasks {
                        tracing::warn!(task = %task.name, outcome = %failure, "Task failed, moving on");
                        self.pause_between_actions().await;
                    } else {
                        tracing::error!(task = %task.name, outcome = %failure, "Task failed, stopping this wallet");
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    async fn pause_between_actions(&self) {
        let pause = self.config.settings.random_pause_between_actions.sample_now();
        if !pause.is_zero() {
            tracing::debug!("Pausing {}s before the next task", pause.as_secs());
            tokio::time::sleep(pause).await;
        }
    }

    fn summary_message(&self, report: &AccountReport) -> String {
        let mut message = format!(
            "Account #{} | <code>{}</code>\n\n",
            report.account_index, report.wallet
        );
        if let Some(stats) = &report.stats {
            message.push_str(&format!(
                "Address: <code>{}</code>\nBalance: {:.6} | Transactions: {}\n\n",
                stats.address, stats.balance, stats.transaction_count
            ));
        }

        if let Some(error) = &report.error {
            message.push_str(&format!("Error: {}\n", error));
            return message;
        }

        if !report.completed.is_empty() {
            message.push_str("Completed:\n");
            for (i, task) in report.completed.iter().enumerate() {
                message.push_str(&format!("{}. {}\n", i + 1, task));
            }
            message.push('\n');
        }
        if !report.failed.is_empty() {
            message.push_str("Failed:\n");
            for (i, task) in report.failed.iter().enumerate() {
                message.push_str(&format!("{}. {}\n", i + 1, task));
            }
            message.push('\n');
        }

        let rate = if report.pending_total == 0 {
            100.0
        } else {
            report.completed.len() as f64 / report.pending_total as f64 * 100.0
        };
        message.push_str(&format!(
            "Tasks: {} | completed: {} | failed: {} | success rate: {:.1}%\nSkip failed tasks: {}\n",
            report.pending_total,
            report.completed.len(),
            report.failed.len(),
            rate,
            if self.config.flow.skip_failed_tasks { "yes" } else { "no" }
        ));
        message
    }
}

fn transition(state: &mut RunnerState, next: RunnerState) {
    tracing::debug!(from = %state, to = %next, "Runner state");
    *state = next;
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PauseRange;
    use crate::domain::task::registry::Capability;
    use crate::error::{CapabilityError, NotifyError, ResourceError, ResourceResult};
    use crate::infrastructure::proxy::Proxy;
    use crate::infrastructure::session::{AccountResources, ChainConnection, HttpSession};
    use crate::domain::task::model::TaskEntry;
    use crate::error::LedgerResult;
    use crate::infrastructure::storage::{Database, TaskLedger};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct CountingProvider {
        fail: bool,
        acquired: AtomicUsize,
        released: AtomicUsize,
    }

    #[async_trait]
    impl ResourceProvider for CountingProvider {
        async fn acquire(&self, _index: usize, _proxy: Option<&Proxy>) -> ResourceResult<AccountResources> {
            if self.fail {
                return Err(ResourceError::RpcUnavailable { tried: 1 });
            }
            self.acquired.fetch_add(1, Ordering::SeqCst);
            let http = HttpSession::new(None, false, Duration::from_secs(1))?;
            let chain = ChainConnection::unchecked(http.client().clone(), "http://127.0.0.1:9".into(), None);
            Ok(AccountResources { http, chain })
        }

        async fn release(&self, resources: AccountResources) {
            self.released.fetch_add(1, Ordering::SeqCst);
            resources.cleanup();
        }
    }

    #[derive(Default)]
    struct RecordingNotifier(Mutex<Vec<String>>);

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, message: &str) -> Result<(), NotifyError> {
            self.0.lock().unwrap().push(message.to_string());
            Ok(())
        }
    }

    struct Exploding;

    #[async_trait]
    impl Capability for Exploding {
        async fn execute(&self, _ctx: &WalletContext) -> Result<TaskOutcome, CapabilityError> {
            panic!("capability exploded")
        }
    }

    /// Recoverable on the first call, success afterwards
    #[derive(Default)]
    struct FailsOnce(AtomicUsize);

    #[async_trait]
    impl Capability for FailsOnce {
        async fn execute(&self, _ctx: &WalletContext) -> Result<TaskOutcome, CapabilityError> {
            if self.0.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(TaskOutcome::recoverable("first try"))
            } else {
                Ok(TaskOutcome::Success)
            }
        }
    }

    /// Serves pending tasks from a ledger but never finds the entry to mark
    struct ForgetfulStore(TaskLedger);

    #[async_trait]
    impl TaskStore for ForgetfulStore {
        async fn pending_tasks(&self, wallet_id: &str) -> LedgerResult<Vec<TaskEntry>> {
            self.0.pending_tasks(wallet_id)
        }

        async fn mark_task(&self, _wallet_id: &str, _task_name: &str, _status: TaskStatus) -> LedgerResult<bool> {
            Ok(false)
        }

        async fn mark_task_at(&self, _wallet_id: &str, _index: u32, _status: TaskStatus) -> LedgerResult<bool> {
            Ok(false)
        }
    }

    fn quiet_config(skip_failed: bool) -> Arc<AppConfig> {
        let mut config = AppConfig::default();
        config.settings.random_initialization_pause = PauseRange::ZERO;
        config.settings.random_pause_between_actions = PauseRange::ZERO;
        config.settings.random_pause_between_accounts = PauseRange::ZERO;
        config.settings.pause_between_attempts = PauseRange::ZERO;
        config.flow.skip_failed_tasks = skip_failed;
        Arc::new(config)
    }

    fn registry() -> Arc<CapabilityRegistry> {
        Arc::new(
            CapabilityRegistry::builder()
                .register_fn("ok", |_| async { Ok(TaskOutcome::Success) }.boxed())
                .unwrap()
                .register_fn("nope", |_| async { Ok(TaskOutcome::recoverable("not yet")) }.boxed())
                .unwrap()
                .register_fn("boom", |_| async { Err(CapabilityError::Other("boom".into())) }.boxed())
                .unwrap()
                .register("explode", Exploding)
                .unwrap()
                .register("flaky", FailsOnce::default())
                .unwrap()
                .build(),
        )
    }

    fn ledger_with(tasks: &[&str]) -> TaskLedger {
        let ledger = TaskLedger::new(Database::open_in_memory().unwrap());
        ledger.init().unwrap();
        let tasks: Vec<String> = tasks.iter().map(|s| s.to_string()).collect();
        ledger.register("wallet-key-0001", None, &tasks).unwrap();
        ledger
    }

    fn account() -> AccountSpec {
        AccountSpec {
            account_index: 1,
            wallet_id: "wallet-key-0001".into(),
            proxy: None,
        }
    }

    struct Harness {
        runner: AccountRunner,
        ledger: TaskLedger,
        provider: Arc<CountingProvider>,
        notifier: Arc<RecordingNotifier>,
    }

    fn harness(tasks: &[&str], skip_failed: bool, provider: CountingProvider) -> Harness {
        let ledger = ledger_with(tasks);
        let provider = Arc::new(provider);
        let notifier = Arc::new(RecordingNotifier::default());
        let runner = AccountRunner::new(
            quiet_config(skip_failed),
            Arc::new(ledger.clone()),
            registry(),
            provider.clone(),
            notifier.clone(),
        );
        Harness {
            runner,
            ledger,
            provider,
            notifier,
        }
    }

    fn pending(ledger: &TaskLedger) -> Vec<String> {
        ledger
            .pending_tasks("wallet-key-0001")
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect()
    }

    #[tokio::test]
    async fn test_all_tasks_succeed() {
        let h = harness(&["ok", "ok"], false, CountingProvider::default());
        let report = h.runner.run(account()).await;

        assert!(report.success);
        assert_eq!(report.completed, vec!["ok".to_string(), "ok".to_string()]);
        assert!(pending(&h.ledger).is_empty());
        assert_eq!(h.provider.released.load(Ordering::SeqCst), 1);
        assert_eq!(h.notifier.0.lock().unwrap().len(), 1);
        assert_eq!(report.stats, None);
    }

    #[tokio::test]
    async fn test_repeated_names_marked_by_position() {
        let h = harness(&["flaky", "nope", "flaky"], true, CountingProvider::default());
        let report = h.runner.run(account()).await;

        assert_eq!(report.completed, vec!["flaky".to_string()]);
        assert_eq!(report.failed, vec!["flaky".to_string(), "nope".to_string()]);
        let remaining: Vec<(String, u32)> = h
            .ledger
            .pending_tasks("wallet-key-0001")
            .unwrap()
            .into_iter()
            .map(|t| (t.name, t.index))
            .collect();
        assert_eq!(remaining, vec![("flaky".to_string(), 1), ("nope".to_string(), 2)]);
    }

    #[tokio::test]
    async fn test_unrecorded_completion_keeps_running() {
        let ledger = ledger_with(&["ok", "ok"]);
        let runner = AccountRunner::new(
            quiet_config(false),
            Arc::new(ForgetfulStore(ledger.clone())),
            registry(),
            Arc::new(CountingProvider::default()),
            Arc::new(RecordingNotifier::default()),
        );

        let report = runner.run(account()).await;
        assert!(report.success);
        assert_eq!(report.completed, vec!["ok".to_string(), "ok".to_string()]);
        assert_eq!(pending(&ledger).len(), 2);
    }

    #[tokio::test]
    async fn test_failure_stops_wallet() {
        let h = harness(&["ok", "nope", "ok"], false, CountingProvider::default());
        let report = h.runner.run(account()).await;

        assert!(!report.success);
        assert_eq!(report.completed, vec!["ok".to_string()]);
        assert_eq!(report.failed, vec!["nope".to_string()]);
        assert_eq!(pending(&h.ledger), vec!["nope".to_string(), "ok".to_string()]);
    }

    #[tokio::test]
    async fn test_skip_failed_continues() {
        let h = harness(&["boom", "ok"], true, CountingProvider::default());
        let report = h.runner.run(account()).await;

        assert!(!report.success);
        assert_eq!(report.failed, vec!["boom".to_string()]);
        assert_eq!(report.completed, vec!["ok".to_string()]);
        assert_eq!(pending(&h.ledger), vec!["boom".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_task_is_a_task_failure() {
        let h = harness(&["mystery", "ok"], true, CountingProvider::default());
        let report = h.runner.run(account()).await;

        assert_eq!(report.failed, vec!["mystery".to_string()]);
        assert_eq!(report.completed, vec!["ok".to_string()]);
        assert!(report.error.is_none());
    }

    #[tokio::test]
    async fn test_resumption_runs_only_pending() {
        let h = harness(&["ok", "nope"], false, CountingProvider::default());
        h.ledger
            .mark_task("wallet-key-0001", "ok", TaskStatus::Completed)
            .unwrap();

        let report = h.runner.run(account()).await;
        assert_eq!(report.pending_total, 1);
        assert!(report.completed.is_empty());
        assert_eq!(report.failed, vec!["nope".to_string()]);
    }

    #[tokio::test]
    async fn test_initialization_failure() {
        let h = harness(
            &["ok"],
            false,
            CountingProvider {
                fail: true,
                ..Default::default()
            },
        );
        let report = h.runner.run(account()).await;

        assert!(!report.success);
        assert!(report.error.as_deref().unwrap().contains("initialization failed"));
        assert_eq!(pending(&h.ledger), vec!["ok".to_string()]);
        assert_eq!(h.provider.released.load(Ordering::SeqCst), 0);
        assert_eq!(h.notifier.0.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_panic_still_cleans_up_once() {
        let h = harness(&["ok", "explode", "ok"], true, CountingProvider::default());
        let report = h.runner.run(account()).await;

        assert!(!report.success);
        assert!(report.error.as_deref().unwrap().contains("capability exploded"));
        assert_eq!(report.completed, vec!["ok".to_string()]);
        assert_eq!(h.provider.acquired.load(Ordering::SeqCst), 1);
        assert_eq!(h.provider.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_schema_missing_fails_account() {
        let provider = Arc::new(CountingProvider::default());
        let ledger = TaskLedger::new(Database::open_in_memory().unwrap());
        let runner = AccountRunner::new(
            quiet_config(false),
            Arc::new(ledger),
            registry(),
            provider.clone(),
            Arc::new(RecordingNotifier::default()),
        );

        let report = runner.run(account()).await;
        assert!(!report.success);
        assert!(report.error.as_deref().unwrap().contains("not initialized"));
        assert_eq!(provider.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_pending_tasks_is_success() {
        let h = harness(&["ok"], false, CountingProvider::default());
        h.ledger
            .mark_task("wallet-key-0001", "ok", TaskStatus::Completed)
            .unwrap();
        let report = h.runner.run(account()).await;
        assert!(report.success);
        assert_eq!(report.pending_total, 0);
    }
}
