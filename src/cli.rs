//! Command-line interface
//!
//! `farmhand run` drives the farming flow; `db` and `config` subcommands
//! maintain the ledger and inspect configuration.

use crate::config::{AppConfig, PathsConfig};
use crate::domain::task::{
    select_accounts, AccountRunner, PlanGenerator, Scheduler, SchedulerConfig, TaskPlanSpec,
    TaskStatus,
};
use crate::error::{FarmResult, LedgerError, LedgerResult};
use crate::infrastructure::input::{read_private_keys, read_proxies};
use crate::infrastructure::notify;
use crate::infrastructure::proxy::Proxy;
use crate::infrastructure::report::JsonReportWriter;
use crate::infrastructure::session::DefaultResourceProvider;
use crate::infrastructure::storage::{BatchReport, Database, DatabaseConfig, NewWallet, TaskLedger};
use crate::integrations;
use crate::logging;
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "farmhand", author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file merged over the defaults
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run every selected account through its pending tasks
    Run,
    /// Inspect and maintain the task ledger
    Db {
        #[command(subcommand)]
        command: DbCommand,
    },
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum DbCommand {
    /// Create the schema and register keys that are not in the ledger yet
    Init,
    /// Drop every record and register all keys with fresh plans
    Reset {
        #[arg(long)]
        yes: bool,
    },
    /// Give completed wallets (or all with --all) a fresh plan
    Regenerate {
        #[arg(long)]
        all: bool,
        #[arg(long)]
        yes: bool,
    },
    /// Print ledger contents
    Show,
    /// Register keys that are not in the ledger yet
    AddWallets {
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Print the resolved configuration
    Show,
    /// Print the configuration search paths
    Path,
    /// Write the default configuration to the user config path
    Init {
        #[arg(long)]
        force: bool,
    },
}

/// Dispatch a parsed command line
pub async fn execute(cli: Cli) -> FarmResult<()> {
    let command = cli.command.unwrap_or(Command::Run);

    // These work without a valid configuration
    match &command {
        Command::Config {
            command: ConfigCommand::Path,
        } => {
            print_config_paths(cli.config.as_deref());
            return Ok(());
        }
        Command::Config {
            command: ConfigCommand::Init { force },
        } => {
            let path = AppConfig::write_default_user_config(*force)?;
            println!("Wrote {}", path.display());
            return Ok(());
        }
        _ => {}
    }

    // Loading logs before the configured subscriber exists
    let config = tracing::subscriber::with_default(logging::bootstrap_subscriber(io::stderr), || {
        AppConfig::load(cli.config.as_deref())
    })?;
    let config = Arc::new(config);
    logging::init_logging(&config.logging);

    match command {
        Command::Run => run_farm(config).await,
        Command::Db { command } => run_db(&config, command),
        Command::Config {
            command: ConfigCommand::Show,
        } => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
        Command::Config { .. } => Ok(()),
    }
}

async fn run_farm(config: Arc<AppConfig>) -> FarmResult<()> {
    let keys = read_private_keys(&PathsConfig::expand(&config.paths.private_keys))?;
    let proxies = read_proxies(&PathsConfig::expand(&config.paths.proxies))?;
    let accounts = select_accounts(&keys, &proxies, &config.settings)?;
    tracing::info!(keys = keys.len(), proxies = proxies.len(), selected = accounts.len(), "Inputs loaded");

    let ledger = open_ledger(&config)?;
    if !ledger.database().has_table("wallets")? {
        return Err(LedgerError::SchemaMissing.into());
    }

    let registry = integrations::builtin_registry(&config)?;
    for name in config.plan_spec()?.task_names() {
        if !registry.contains(name) {
            tracing::warn!(task = name, "Task has no registered capability and will fail");
        }
    }

    let runner = AccountRunner::new(
        Arc::clone(&config),
        Arc::new(ledger),
        Arc::new(registry),
        Arc::new(DefaultResourceProvider::new(Arc::clone(&config))),
        Arc::from(notify::from_config(&config.telegram)),
    );
    let scheduler = Scheduler::new(Arc::new(runner), SchedulerConfig::from_settings(&config.settings))
        .with_report_writer(Arc::new(JsonReportWriter::new(PathsConfig::expand(
            &config.paths.reports_dir,
        ))));

    let report = scheduler.run(accounts).await;
    tracing::info!(
        total = report.total(),
        succeeded = report.succeeded(),
        failed = report.failed(),
        "All accounts processed"
    );
    Ok(())
}

fn run_db(config: &AppConfig, command: DbCommand) -> FarmResult<()> {
    let ledger = open_ledger(config)?;

    match command {
        DbCommand::Init => {
            let spec = config.plan_spec()?;
            ledger.init()?;
            let (keys, proxies) = load_inputs(config)?;
            let report = register_keys(&ledger, &keys, &proxies, &spec)?;
            println!(
                "Ledger ready at {}: {} wallets added, {} already present",
                ledger.database().path().display(),
                report.applied,
                report.skipped.len()
            );
        }
        DbCommand::Reset { yes } => {
            let spec = config.plan_spec()?;
            let (keys, proxies) = load_inputs(config)?;
            if !confirm("Delete every wallet record and start over?", yes)? {
                println!("Aborted");
                return Ok(());
            }
            ledger.reset_all()?;
            let report = register_keys(&ledger, &keys, &proxies, &spec)?;
            println!("Ledger recreated with {} wallets", report.applied);
        }
        DbCommand::Regenerate { all, yes } => {
            let spec = config.plan_spec()?;
            let scope = if all { "every wallet" } else { "completed wallets" };
            if !confirm(&format!("Replace the task plans of {}?", scope), yes)? {
                println!("Aborted");
                return Ok(());
            }
            let report = regenerate_plans(&ledger, &spec, all)?;
            println!("Regenerated {} plans", report.applied);
        }
        DbCommand::Show => print_ledger(&ledger)?,
        DbCommand::AddWallets { yes } => {
            let spec = config.plan_spec()?;
            let (keys, proxies) = load_inputs(config)?;
            let known: Vec<String> = ledger.all_wallets()?.into_iter().map(|w| w.wallet_id).collect();
            let missing = keys.iter().filter(|k| !known.contains(k)).count();
            if missing == 0 {
                println!("Every key is already in the ledger");
                return Ok(());
            }
            if !confirm(&format!("Register {} new wallets?", missing), yes)? {
                println!("Aborted");
                return Ok(());
            }
            let report = register_keys(&ledger, &keys, &proxies, &spec)?;
            println!("Added {} wallets", report.applied);
        }
    }
    Ok(())
}

fn open_ledger(config: &AppConfig) -> LedgerResult<TaskLedger> {
    let path = PathsConfig::expand(&config.paths.database);
    Ok(TaskLedger::new(Database::open(DatabaseConfig::with_path(path))?))
}

/// Keys are required; proxies are optional for ledger maintenance
fn load_inputs(config: &AppConfig) -> FarmResult<(Vec<String>, Vec<Proxy>)> {
    let keys = read_private_keys(&PathsConfig::expand(&config.paths.private_keys))?;
    let proxies = read_proxies(&PathsConfig::expand(&config.paths.proxies)).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Proxies unavailable, wallets registered without one");
        Vec::new()
    });
    Ok((keys, proxies))
}

/// Register every key with a freshly generated plan; known wallets are skipped
pub fn register_keys(
    ledger: &TaskLedger,
    keys: &[String],
    proxies: &[Proxy],
    spec: &TaskPlanSpec,
) -> LedgerResult<BatchReport> {
    let entries: Vec<NewWallet> = keys
        .iter()
        .enumerate()
        .map(|(i, key)| {
            let proxy = (!proxies.is_empty()).then(|| proxies[i % proxies.len()].as_url());
            NewWallet::new(key.clone(), proxy, PlanGenerator::generate_now(spec))
        })
        .collect();
    ledger.register_batch(&entries)
}

/// Replace the plans of completed wallets, or of all wallets
pub fn regenerate_plans(ledger: &TaskLedger, spec: &TaskPlanSpec, all: bool) -> LedgerResult<BatchReport> {
    let targets = if all {
        ledger.all_wallets()?
    } else {
        ledger.list_by_status(TaskStatus::Completed)?
    };
    let entries: Vec<(String, Vec<String>)> = targets
        .into_iter()
        .map(|w| (w.wallet_id, PlanGenerator::generate_now(spec)))
        .collect();
    ledger.bulk_replace_tasks(&entries)
}

fn print_ledger(ledger: &TaskLedger) -> LedgerResult<()> {
    let counts = ledger.counts()?;
    println!(
        "{} wallets: {} completed, {} pending",
        counts.total, counts.completed, counts.pending
    );
    for (i, wallet) in ledger.all_wallets()?.iter().enumerate() {
        let pending: Vec<&str> = wallet.pending_tasks().map(|t| t.name.as_str()).collect();
        println!(
            "{:>4}  {:<16}  {:<9}  {}/{}  {}",
            i + 1,
            wallet.masked_id(),
            wallet.status.as_str(),
            wallet.completed_tasks().count(),
            wallet.tasks.len(),
            pending.join(", ")
        );
    }
    Ok(())
}

fn print_config_paths(explicit: Option<&std::path::Path>) {
    let candidates = [
        ("user", AppConfig::user_config_path()),
        ("project", AppConfig::project_config_path()),
        ("explicit", explicit.map(|p| p.to_path_buf())),
    ];
    for (label, path) in candidates {
        if let Some(path) = path {
            let state = if path.exists() { "found" } else { "missing" };
            println!("{:<8} {} ({})", label, path.display(), state);
        }
    }
}

fn confirm(prompt: &str, assume_yes: bool) -> io::Result<bool> {
    if assume_yes {
        return Ok(true);
    }
    print!("{} [y/N]: ", prompt);
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::task::TaskGroup;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_commands() {
        let cli = Cli::parse_from(["farmhand", "--config", "my.toml", "db", "regenerate", "--all", "--yes"]);
        assert_eq!(cli.config, Some(PathBuf::from("my.toml")));
        assert_eq!(
            cli.command,
            Some(Command::Db {
                command: DbCommand::Regenerate { all: true, yes: true }
            })
        );

        let cli = Cli::parse_from(["farmhand"]);
        assert_eq!(cli.command, None);

        let cli = Cli::parse_from(["farmhand", "db", "add-wallets"]);
        assert_eq!(
            cli.command,
            Some(Command::Db {
                command: DbCommand::AddWallets { yes: false }
            })
        );
    }

    fn ledger() -> TaskLedger {
        let ledger = TaskLedger::new(Database::open_in_memory().unwrap());
        ledger.init().unwrap();
        ledger
    }

    fn spec() -> TaskPlanSpec {
        TaskPlanSpec::new(vec![TaskGroup::single("faucet"), TaskGroup::single("swap")]).unwrap()
    }

    #[test]
    fn test_register_keys_cycles_proxies_and_skips_known() {
        let ledger = ledger();
        let keys: Vec<String> = (1..=3).map(|i| format!("key-{}", i)).collect();
        let proxies: Vec<Proxy> = vec!["1.1.1.1:80".parse().unwrap(), "2.2.2.2:80".parse().unwrap()];

        let report = register_keys(&ledger, &keys[..2], &proxies, &spec()).unwrap();
        assert_eq!(report.applied, 2);

        let report = register_keys(&ledger, &keys, &proxies, &spec()).unwrap();
        assert_eq!(report.applied, 1);
        assert_eq!(report.skipped.len(), 2);

        let third = ledger.wallet("key-3").unwrap().unwrap();
        assert_eq!(third.proxy.as_deref(), Some("http://1.1.1.1:80"));
        assert_eq!(ledger.counts().unwrap().total, 3);
    }

    #[test]
    fn test_db_show_does_not_need_a_plan() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.paths.database = dir.path().join("ledger.db");
        config.flow.tasks = vec!["no_such_preset".to_string()];
        open_ledger(&config).unwrap().init().unwrap();

        assert!(config.plan_spec().is_err());
        run_db(&config, DbCommand::Show).unwrap();
        assert!(run_db(&config, DbCommand::Regenerate { all: true, yes: true }).is_err());
    }

    #[test]
    fn test_regenerate_only_completed_by_default() {
        let ledger = ledger();
        let keys = vec!["done".to_string(), "busy".to_string()];
        register_keys(&ledger, &keys, &[], &spec()).unwrap();
        for task in ["faucet", "swap"] {
            ledger.mark_task("done", task, TaskStatus::Completed).unwrap();
        }
        ledger.mark_task("busy", "faucet", TaskStatus::Completed).unwrap();

        let report = regenerate_plans(&ledger, &spec(), false).unwrap();
        assert_eq!(report.applied, 1);
        assert_eq!(ledger.wallet("done").unwrap().unwrap().status, TaskStatus::Pending);
        assert_eq!(ledger.pending_tasks("busy").unwrap().len(), 1);

        let report = regenerate_plans(&ledger, &spec(), true).unwrap();
        assert_eq!(report.applied, 2);
        assert_eq!(ledger.pending_tasks("busy").unwrap().len(), 2);
    }
}
