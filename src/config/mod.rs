//! Configuration management for farmhand
//!
//! This module handles loading, parsing, and validating configuration from:
//! 1. Embedded default_config.toml (compile-time defaults)
//! 2. User config at ~/.config/farmhand/config.toml (or platform-specific location)
//! 3. Project-local config at ./config.toml
//! 4. An explicit `--config` path
//!
//! Later sources are deep-merged over earlier ones. The result is validated once
//! and then shared read-only (`Arc<AppConfig>`) by every component.

use crate::domain::task::plan::{TaskGroup, TaskPlanSpec};
use crate::error::{ConfigError, ConfigResult};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration embedded in binary
const DEFAULT_CONFIG: &str = include_str!("../../default_config.toml");

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub settings: SettingsConfig,
    #[serde(default)]
    pub flow: FlowConfig,
    #[serde(default)]
    pub presets: BTreeMap<String, Vec<TaskGroup>>,
    #[serde(default)]
    pub rpcs: RpcConfig,
    #[serde(default)]
    pub others: OthersConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub integrations: BTreeMap<String, HttpIntegrationConfig>,
}

/// Inclusive range of whole seconds, written as `[min, max]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[u64; 2]", into = "[u64; 2]")]
pub struct PauseRange {
    pub min: u64,
    pub max: u64,
}

impl PauseRange {
    pub const ZERO: PauseRange = PauseRange { min: 0, max: 0 };

    pub const fn new(min: u64, max: u64) -> Self {
        Self { min, max }
    }

    /// Draw a duration uniformly from the range
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.max <= self.min {
            return Duration::from_secs(self.min);
        }
        Duration::from_secs(rng.gen_range(self.min..=self.max))
    }

    /// Draw a duration using the thread-local generator
    pub fn sample_now(&self) -> Duration {
        self.sample(&mut rand::thread_rng())
    }

    fn is_valid(&self) -> bool {
        self.min <= self.max
    }
}

impl From<[u64; 2]> for PauseRange {
    fn from(value: [u64; 2]) -> Self {
        Self::new(value[0], value[1])
    }
}

impl From<PauseRange> for [u64; 2] {
    fn from(value: PauseRange) -> Self {
        [value.min, value.max]
    }
}

/// Run-wide pacing and concurrency settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsConfig {
    /// Maximum number of accounts processed at the same time
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// Attempts per task at the orchestration layer
    #[serde(default = "default_task_attempts")]
    pub task_attempts: u32,
    /// Attempts per outbound request inside integrations
    #[serde(default = "default_request_attempts")]
    pub request_attempts: u32,
    #[serde(default = "default_pause_between_attempts")]
    pub pause_between_attempts: PauseRange,
    #[serde(default = "default_true")]
    pub shuffle_wallets: bool,
    /// 1-based inclusive account range; `[0, 0]` selects all (or `exact_accounts_to_use`)
    #[serde(default)]
    pub accounts_range: [usize; 2],
    #[serde(default)]
    pub exact_accounts_to_use: Vec<usize>,
    #[serde(default = "default_initialization_pause")]
    pub random_initialization_pause: PauseRange,
    #[serde(default = "default_pause_between_actions")]
    pub random_pause_between_actions: PauseRange,
    #[serde(default = "default_pause_between_accounts")]
    pub random_pause_between_accounts: PauseRange,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            task_attempts: default_task_attempts(),
            request_attempts: default_request_attempts(),
            pause_between_attempts: default_pause_between_attempts(),
            shuffle_wallets: true,
            accounts_range: [0, 0],
            exact_accounts_to_use: Vec::new(),
            random_initialization_pause: default_initialization_pause(),
            random_pause_between_actions: default_pause_between_actions(),
            random_pause_between_accounts: default_pause_between_accounts(),
        }
    }
}

/// Which presets make up a wallet's plan and how failures are handled
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowConfig {
    /// Preset names, expanded in order
    #[serde(default)]
    pub tasks: Vec<String>,
    #[serde(default)]
    pub skip_failed_tasks: bool,
}

/// RPC endpoints for the target chain
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RpcConfig {
    #[serde(default)]
    pub chain: Vec<String>,
}

/// Network client behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OthersConfig {
    #[serde(default = "default_true")]
    pub skip_ssl_verification: bool,
    #[serde(default = "default_true")]
    pub use_proxy_for_rpc: bool,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for OthersConfig {
    fn default() -> Self {
        Self {
            skip_ssl_verification: true,
            use_proxy_for_rpc: true,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Telegram account summaries
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub user_ids: Vec<i64>,
}

/// Input, ledger and report locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_private_keys_path")]
    pub private_keys: PathBuf,
    #[serde(default = "default_proxies_path")]
    pub proxies: PathBuf,
    #[serde(default = "default_database_path")]
    pub database: PathBuf,
    #[serde(default = "default_reports_dir")]
    pub reports_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            private_keys: default_private_keys_path(),
            proxies: default_proxies_path(),
            database: default_database_path(),
            reports_dir: default_reports_dir(),
        }
    }
}

impl PathsConfig {
    /// Expand `~` and environment variables in a configured path
    pub fn expand(path: &Path) -> PathBuf {
        let raw = path.to_string_lossy();
        PathBuf::from(shellexpand::full(&raw).map_or_else(|_| raw.to_string(), |p| p.into_owned()))
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default = "default_true")]
    pub timestamps: bool,
    #[serde(default = "default_false")]
    pub file_line: bool,
    #[serde(default = "default_true")]
    pub file_output: bool,
    #[serde(default)]
    pub file_path: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            timestamps: true,
            file_line: false,
            file_output: true,
            file_path: None,
        }
    }
}

/// A task backed by a single HTTP request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpIntegrationConfig {
    #[serde(default = "default_http_method")]
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub body: Option<serde_json::Value>,
    /// Expected status; any 2xx when absent
    #[serde(default)]
    pub expect_status: Option<u16>,
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_threads() -> usize {
    1
}

fn default_task_attempts() -> u32 {
    1
}

fn default_request_attempts() -> u32 {
    3
}

fn default_pause_between_attempts() -> PauseRange {
    PauseRange::new(3, 10)
}

fn default_initialization_pause() -> PauseRange {
    PauseRange::new(5, 30)
}

fn default_pause_between_actions() -> PauseRange {
    PauseRange::new(5, 15)
}

fn default_pause_between_accounts() -> PauseRange {
    PauseRange::new(3, 10)
}

fn default_request_timeout() -> u64 {
    30
}

fn default_private_keys_path() -> PathBuf {
    PathBuf::from("data/private_keys.txt")
}

fn default_proxies_path() -> PathBuf {
    PathBuf::from("data/proxies.txt")
}

fn default_database_path() -> PathBuf {
    PathBuf::from("data/accounts.db")
}

fn default_reports_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_http_method() -> String {
    "GET".to_string()
}

fn default_true() -> bool {
    true
}

fn default_false() -> bool {
    false
}

// ============================================================================
// Configuration loading
// ============================================================================

impl AppConfig {
    /// Load configuration with fallback chain:
    /// 1. Embedded default_config.toml
    /// 2. User config ~/.config/farmhand/config.toml
    /// 3. Project-local ./config.toml
    /// 4. `explicit`, which must exist when given
    pub fn load(explicit: Option<&Path>) -> ConfigResult<Self> {
        let mut merged: toml::Value = toml::from_str(DEFAULT_CONFIG).map_err(|e| {
            ConfigError::Parse(format!("Failed to parse default config: {}", e))
        })?;

        for path in [Self::user_config_path(), Self::project_config_path()]
            .into_iter()
            .flatten()
        {
            if path.exists() {
                match Self::read_value(&path) {
                    Ok(overlay) => {
                        merge_values(&mut merged, overlay);
                        tracing::info!("Loaded config from {:?}", path);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config {:?}: {}", path, e);
                    }
                }
            }
        }

        if let Some(path) = explicit {
            if !path.exists() {
                return Err(ConfigError::FileNotFound {
                    path: path.to_path_buf(),
                });
            }
            merge_values(&mut merged, Self::read_value(path)?);
            tracing::info!("Loaded config from {:?}", path);
        }

        let config = merged
            .try_into::<AppConfig>()
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a complete configuration document, without the fallback chain
    pub fn from_toml_str(contents: &str) -> ConfigResult<Self> {
        let config: AppConfig =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Embedded defaults only
    pub fn embedded() -> ConfigResult<Self> {
        Self::from_toml_str(DEFAULT_CONFIG)
    }

    fn read_value(path: &Path) -> ConfigResult<toml::Value> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        toml::from_str(&contents).map_err(|e| {
            ConfigError::Parse(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    /// Get the user config path (~/.config/farmhand/config.toml)
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|config_dir| config_dir.join("farmhand").join("config.toml"))
    }

    /// Get the project-local config path (./config.toml)
    pub fn project_config_path() -> Option<PathBuf> {
        std::env::current_dir()
            .ok()
            .map(|cwd| cwd.join("config.toml"))
    }

    /// Raw embedded default document
    pub fn default_document() -> &'static str {
        DEFAULT_CONFIG
    }

    /// Write the embedded defaults to the user config path
    pub fn write_default_user_config(overwrite: bool) -> ConfigResult<PathBuf> {
        let config_path = Self::user_config_path().ok_or_else(|| {
            ConfigError::Io("Could not determine user config directory".to_string())
        })?;

        if config_path.exists() && !overwrite {
            return Err(ConfigError::Invalid(format!(
                "{} already exists",
                config_path.display()
            )));
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }

        std::fs::write(&config_path, DEFAULT_CONFIG)
            .map_err(|e| ConfigError::Io(e.to_string()))?;

        Ok(config_path)
    }

    /// Serialize the resolved configuration
    pub fn to_toml_string(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    /// Reject configurations the core cannot run with
    pub fn validate(&self) -> ConfigResult<()> {
        let s = &self.settings;
        if s.threads == 0 {
            return Err(ConfigError::Invalid("settings.threads must be at least 1".into()));
        }
        if s.task_attempts == 0 || s.request_attempts == 0 {
            return Err(ConfigError::Invalid(
                "settings.task_attempts and settings.request_attempts must be at least 1".into(),
            ));
        }
        for (name, range) in [
            ("pause_between_attempts", s.pause_between_attempts),
            ("random_initialization_pause", s.random_initialization_pause),
            ("random_pause_between_actions", s.random_pause_between_actions),
            ("random_pause_between_accounts", s.random_pause_between_accounts),
        ] {
            if !range.is_valid() {
                return Err(ConfigError::Invalid(format!(
                    "settings.{} has min {} greater than max {}",
                    name, range.min, range.max
                )));
            }
        }
        let [start, end] = s.accounts_range;
        if (start == 0) != (end == 0) || start > end {
            return Err(ConfigError::Invalid(format!(
                "settings.accounts_range [{}, {}] must be [0, 0] or 1-based with start <= end",
                start, end
            )));
        }
        if s.exact_accounts_to_use.contains(&0) {
            return Err(ConfigError::Invalid(
                "settings.exact_accounts_to_use holds 1-based account numbers".into(),
            ));
        }
        if self.rpcs.chain.is_empty() {
            return Err(ConfigError::Invalid("rpcs.chain must list at least one URL".into()));
        }
        if self.flow.tasks.is_empty() {
            return Err(ConfigError::Invalid("flow.tasks must name at least one preset".into()));
        }
        self.plan_spec()?;
        for (name, integration) in &self.integrations {
            if reqwest::Method::from_bytes(integration.method.to_ascii_uppercase().as_bytes()).is_err() {
                return Err(ConfigError::Invalid(format!(
                    "integrations.{} has invalid method '{}'",
                    name, integration.method
                )));
            }
            if integration.url.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("integrations.{} has an empty url", name)));
            }
        }
        if self.telegram.enabled
            && (self.telegram.bot_token.is_empty() || self.telegram.user_ids.is_empty())
        {
            return Err(ConfigError::Invalid(
                "telegram.enabled requires bot_token and user_ids".into(),
            ));
        }
        Ok(())
    }

    /// Expand `flow.tasks` into the plan spec used for every wallet
    pub fn plan_spec(&self) -> ConfigResult<TaskPlanSpec> {
        let mut groups = Vec::new();
        for preset in &self.flow.tasks {
            let entries = self.presets.get(preset).ok_or_else(|| {
                ConfigError::Invalid(format!("flow.tasks references unknown preset '{}'", preset))
            })?;
            groups.extend(entries.iter().cloned());
        }
        TaskPlanSpec::new(groups).map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG).unwrap_or_else(|_| Self {
            settings: SettingsConfig::default(),
            flow: FlowConfig::default(),
            presets: BTreeMap::new(),
            rpcs: RpcConfig::default(),
            others: OthersConfig::default(),
            telegram: TelegramConfig::default(),
            paths: PathsConfig::default(),
            logging: LoggingConfig::default(),
            integrations: BTreeMap::new(),
        })
    }
}

/// Deep merge: tables merge key by key, everything else is replaced by the overlay
fn merge_values(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                match base_table.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_table.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
