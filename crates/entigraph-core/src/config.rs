use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use config as cfg;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::info;

/// What a scan does when one branch fails for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// End the whole scan with the first branch failure.
    #[default]
    FailFast,
    /// Skip the failed branch, keep going, report skipped branches at the end.
    BestEffort,
}

/// Per-call scan tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ScanConfig {
    /// Maximum rows requested per page.
    #[serde(default = "ScanConfig::default_page_size")]
    pub page_size: usize,
    /// Store calls allowed in flight at once, across every layer of the scan.
    #[serde(default = "ScanConfig::default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "ScanConfig::default_per_call_timeout_ms")]
    pub per_call_timeout_ms: u64,
    /// Total attempts per page, the first one included.
    #[serde(default = "ScanConfig::default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "ScanConfig::default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "ScanConfig::default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default)]
    pub failure_mode: FailureMode,
}

impl ScanConfig {
    /// Upper bound on `max_concurrency`; each slot is a semaphore permit and
    /// a channel slot in every composed stream.
    pub const MAX_CONCURRENCY: usize = 1024;
    /// Upper bound on `page_size`.
    pub const MAX_PAGE_SIZE: usize = 10_000;

    fn default_page_size() -> usize {
        100
    }

    fn default_max_concurrency() -> usize {
        num_cpus::get().clamp(2, 16)
    }

    fn default_per_call_timeout_ms() -> u64 {
        10_000
    }

    fn default_retry_attempts() -> u32 {
        3
    }

    fn default_retry_backoff_ms() -> u64 {
        100
    }

    fn default_max_backoff_ms() -> u64 {
        5_000
    }

    pub fn per_call_timeout(&self) -> Duration {
        Duration::from_millis(self.per_call_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_per_call_timeout(mut self, timeout: Duration) -> Self {
        self.per_call_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.retry_attempts = attempts;
        self.retry_backoff_ms = backoff.as_millis() as u64;
        self
    }

    pub fn with_failure_mode(mut self, failure_mode: FailureMode) -> Self {
        self.failure_mode = failure_mode;
        self
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.page_size > 0, "scan.page_size must be > 0");
        anyhow::ensure!(
            self.page_size <= Self::MAX_PAGE_SIZE,
            "scan.page_size must be <= {}",
            Self::MAX_PAGE_SIZE
        );
        anyhow::ensure!(self.max_concurrency > 0, "scan.max_concurrency must be > 0");
        anyhow::ensure!(
            self.max_concurrency <= Self::MAX_CONCURRENCY,
            "scan.max_concurrency must be <= {}",
            Self::MAX_CONCURRENCY
        );
        anyhow::ensure!(
            self.per_call_timeout_ms > 0,
            "scan.per_call_timeout_ms must be > 0"
        );
        anyhow::ensure!(self.retry_attempts > 0, "scan.retry_attempts must be > 0");
        anyhow::ensure!(
            self.max_backoff_ms >= self.retry_backoff_ms,
            "scan.max_backoff_ms must be >= scan.retry_backoff_ms"
        );
        Ok(())
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            page_size: Self::default_page_size(),
            max_concurrency: Self::default_max_concurrency(),
            per_call_timeout_ms: Self::default_per_call_timeout_ms(),
            retry_attempts: Self::default_retry_attempts(),
            retry_backoff_ms: Self::default_retry_backoff_ms(),
            max_backoff_ms: Self::default_max_backoff_ms(),
            failure_mode: FailureMode::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
    #[serde(default = "LoggingConfig::default_with_target")]
    pub with_target: bool,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }

    fn default_with_target() -> bool {
        true
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            with_target: Self::default_with_target(),
        }
    }
}

/// Sizing of the in-memory store used by the CLI and tests.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StoreConfig {
    /// Number of token ranges the ring is split into.
    #[serde(default = "StoreConfig::default_partitions")]
    pub partitions: usize,
    /// Tenants returned per scope page, regardless of the requested limit.
    #[serde(default = "StoreConfig::default_scope_page_limit")]
    pub scope_page_limit: usize,
}

impl StoreConfig {
    fn default_partitions() -> usize {
        8
    }

    fn default_scope_page_limit() -> usize {
        50
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            partitions: Self::default_partitions(),
            scope_page_limit: Self::default_scope_page_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Settings {
    #[serde(default = "Settings::default_env")]
    pub env: String,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            env: Self::default_env(),
            scan: ScanConfig::default(),
            logging: LoggingConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl Settings {
    fn default_env() -> String {
        env::var("APP_ENV")
            .ok()
            .or_else(|| env::var("RUST_ENV").ok())
            .unwrap_or_else(|| "development".to_string())
    }

    pub fn validate(&self) -> Result<()> {
        self.scan.validate()?;
        anyhow::ensure!(
            !self.logging.level.trim().is_empty(),
            "logging.level cannot be empty"
        );
        anyhow::ensure!(self.store.partitions > 0, "store.partitions must be > 0");
        anyhow::ensure!(
            self.store.scope_page_limit > 0,
            "store.scope_page_limit must be > 0"
        );
        Ok(())
    }
}

pub struct ConfigManager;

impl ConfigManager {
    /// Get the default configuration directory.
    ///
    /// Priority order:
    /// 1. ~/.entigraph/
    /// 2. ./config/
    /// 3. Current directory
    pub fn default_config_dir() -> PathBuf {
        if let Some(home_dir) = dirs::home_dir() {
            let user_dir = home_dir.join(".entigraph");
            if user_dir.exists() {
                info!("Using config directory: {:?}", user_dir);
                return user_dir;
            }
        }

        let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let project_config = cwd.join("config");
        if project_config.exists() {
            info!("Using config directory: {:?}", project_config);
            return project_config;
        }

        info!("Using config directory: {:?}", cwd);
        cwd
    }

    pub fn get_config_dir(custom_path: Option<PathBuf>) -> PathBuf {
        custom_path.unwrap_or_else(Self::default_config_dir)
    }

    /// Layer `default.*`, `{env}.*`, `local.toml` and `ENTIGRAPH__*`
    /// environment variables, later sources winning.
    pub fn load_from_sources(config_dir: &Path, env_name: &str) -> Result<Settings> {
        let settings: Settings = cfg::Config::builder()
            .add_source(cfg::File::from(config_dir.join("default.toml")).required(false))
            .add_source(cfg::File::from(config_dir.join("default.yaml")).required(false))
            .add_source(cfg::File::from(config_dir.join("default.json")).required(false))
            .add_source(
                cfg::File::from(config_dir.join(format!("{}.toml", env_name))).required(false),
            )
            .add_source(
                cfg::File::from(config_dir.join(format!("{}.yaml", env_name))).required(false),
            )
            .add_source(
                cfg::File::from(config_dir.join(format!("{}.json", env_name))).required(false),
            )
            .add_source(cfg::File::from(config_dir.join("local.toml")).required(false))
            .add_source(
                cfg::Environment::with_prefix("ENTIGRAPH")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("building configuration")?
            .try_deserialize()
            .context("deserializing configuration")?;
        Ok(settings)
    }

    /// Load and validate settings for `env_override` (or the ambient env).
    pub fn load(config_dir: Option<PathBuf>, env_override: Option<String>) -> Result<Settings> {
        let env_name = env_override.unwrap_or_else(Settings::default_env);
        let dir = Self::get_config_dir(config_dir);
        let settings = Self::load_from_sources(&dir, &env_name)
            .with_context(|| format!("loading configuration from {:?}", dir))?;
        settings.validate()?;
        Ok(settings)
    }
}
