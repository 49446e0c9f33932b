use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::migration::SwapStrategy;
use crate::store::StoreOptions;
use crate::sync::{FailurePolicy, SyncDelegate, SyncProcessor, SyncQueue, DEFAULT_DRAIN_INTERVAL};

const APP_DIR: &str = "runstore";

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }

    pub fn default_value(value: T) -> Self {
        Self::new(value, ConfigSource::Default)
    }
}

/// Store settings
#[derive(Debug, Clone, Serialize)]
pub struct StoreSettings {
    /// How long SQLite waits on a locked database, in milliseconds
    pub busy_timeout_ms: ConfigValue<u64>,
    /// How a migrated store replaces the original files
    pub swap_strategy: ConfigValue<SwapStrategy>,
}

/// Sync queue settings
#[derive(Debug, Clone, Serialize)]
pub struct SyncSettings {
    /// What happens to a mutation whose delivery failed
    pub failure_policy: ConfigValue<FailurePolicy>,
    /// Seconds between periodic drains
    pub drain_interval_secs: ConfigValue<u64>,
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Path to the SQLite store
    pub database_path: ConfigValue<PathBuf>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    pub store: StoreSettings,
    pub sync: SyncSettings,
}

/// Internal structs for deserializing the config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    database_path: Option<PathBuf>,
    store: StoreFile,
    sync: SyncFile,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct StoreFile {
    busy_timeout_ms: Option<u64>,
    swap_strategy: Option<SwapStrategy>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct SyncFile {
    failure_policy: Option<FailurePolicy>,
    drain_interval_secs: Option<u64>,
}

const DEFAULT_CONFIG: &str = "\
# runstore configuration
# database_path: runstore.sqlite
store:
  busy_timeout_ms: 5000
  swap_strategy: atomic_replace   # or delete_then_move
sync:
  failure_policy: retain          # or drop
  drain_interval_secs: 30
";

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        Self::load_with_env(config_path, |key| std::env::var(key).ok())
    }

    /// Like [`Config::load`], reading environment variables through `env`.
    pub fn load_with_env<F>(config_path: Option<PathBuf>, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::defaults();

        // Try to load from config file
        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config.config_file = Some(path.clone());

            if let Some(db_path) = file_config.database_path {
                // Resolve relative paths against config file's directory
                let resolved_path = if db_path.is_relative() {
                    path.parent().map(|p| p.join(&db_path)).unwrap_or(db_path)
                } else {
                    db_path
                };
                config.database_path = ConfigValue::new(resolved_path, ConfigSource::File);
            }
            if let Some(ms) = file_config.store.busy_timeout_ms {
                config.store.busy_timeout_ms = ConfigValue::new(ms, ConfigSource::File);
            }
            if let Some(strategy) = file_config.store.swap_strategy {
                config.store.swap_strategy = ConfigValue::new(strategy, ConfigSource::File);
            }
            if let Some(policy) = file_config.sync.failure_policy {
                config.sync.failure_policy = ConfigValue::new(policy, ConfigSource::File);
            }
            if let Some(secs) = file_config.sync.drain_interval_secs {
                config.sync.drain_interval_secs = ConfigValue::new(secs, ConfigSource::File);
            }
        }

        // Apply environment variable overrides
        if let Some(db_path) = env("RUNSTORE_DATABASE_PATH") {
            config.database_path =
                ConfigValue::new(PathBuf::from(db_path), ConfigSource::Environment);
        }
        if let Some(raw) = env("RUNSTORE_SWAP_STRATEGY") {
            config.store.swap_strategy =
                ConfigValue::new(parse_env("RUNSTORE_SWAP_STRATEGY", &raw)?, ConfigSource::Environment);
        }
        if let Some(raw) = env("RUNSTORE_FAILURE_POLICY") {
            config.sync.failure_policy =
                ConfigValue::new(parse_env("RUNSTORE_FAILURE_POLICY", &raw)?, ConfigSource::Environment);
        }

        if config.sync.drain_interval_secs.value == 0 {
            return Err(ConfigError::InvalidValue {
                key: "sync.drain_interval_secs".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(config)
    }

    fn defaults() -> Self {
        Self {
            database_path: ConfigValue::default_value(
                Self::default_data_dir().join("runstore.sqlite"),
            ),
            config_file: None,
            store: StoreSettings {
                busy_timeout_ms: ConfigValue::default_value(5000),
                swap_strategy: ConfigValue::default_value(SwapStrategy::default()),
            },
            sync: SyncSettings {
                failure_policy: ConfigValue::default_value(FailurePolicy::default()),
                drain_interval_secs: ConfigValue::default_value(DEFAULT_DRAIN_INTERVAL.as_secs()),
            },
        }
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            busy_timeout: Duration::from_millis(self.store.busy_timeout_ms.value),
            swap_strategy: self.store.swap_strategy.value,
        }
    }

    pub fn drain_interval(&self) -> Duration {
        Duration::from_secs(self.sync.drain_interval_secs.value)
    }

    /// A processor for `queue` using the configured failure policy and drain
    /// interval.
    pub fn sync_processor<D: SyncDelegate>(&self, queue: SyncQueue, delegate: D) -> SyncProcessor<D> {
        SyncProcessor::new(queue, delegate)
            .with_policy(self.sync.failure_policy.value)
            .with_drain_interval(self.drain_interval())
    }

    /// Writes a commented default config file. Refuses to overwrite.
    pub fn write_default(path: &Path) -> Result<(), ConfigError> {
        if path.exists() {
            return Err(ConfigError::AlreadyExists(path.to_path_buf()));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::WriteError(path.to_path_buf(), e))?;
        }
        std::fs::write(path, DEFAULT_CONFIG).map_err(|e| ConfigError::WriteError(path.to_path_buf(), e))
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/runstore/
    /// - macOS: ~/Library/Application Support/runstore/
    /// - Windows: %APPDATA%/runstore/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }

    /// Default data directory (platform-specific):
    /// - Linux: ~/.local/share/runstore/
    /// - macOS: ~/Library/Application Support/runstore/
    /// - Windows: %APPDATA%/runstore/
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

fn parse_env<T: FromStr<Err = String>>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.parse().map_err(|reason| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
        reason,
    })
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    WriteError(PathBuf, std::io::Error),
    AlreadyExists(PathBuf),
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::WriteError(path, e) => {
                write!(f, "Failed to write config file '{}': {}", path.display(), e)
            }
            ConfigError::AlreadyExists(path) => {
                write!(f, "Config file '{}' already exists", path.display())
            }
            ConfigError::InvalidValue { key, value, reason } => {
                write!(f, "Invalid value '{}' for {}: {}", value, key, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
