//! Node configuration.
//!
//! Values are layered, later sources winning:
//!
//! 1. built-in defaults
//! 2. the YAML configuration file, if it exists
//! 3. `RESCACHE__*` environment variables (`__` separates nested keys, e.g.
//!    `RESCACHE__LEDGER__BASE_URL`)
//! 4. command line flags

use crate::observability::LogFormat;
use config::{Config, Environment, File};
use rescache_sync::{LedgerConfig, SyncOptions};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Prefix of configuration environment variables.
pub const ENV_PREFIX: &str = "RESCACHE";

/// Errors loading the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A source could not be read or deserialized.
    #[error("configuration error: {0}")]
    Load(#[from] config::ConfigError),

    /// A value is present but unusable.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Complete node configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Remote ledger connection.
    pub ledger: LedgerConfig,
    /// Backfill and live channel tuning.
    pub sync: SyncOptions,
    /// Local block store.
    pub storage: StorageSettings,
    /// HTTP API.
    pub api: ApiSettings,
    /// Logging.
    pub log: LogSettings,
}

/// Which block store backend to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Volatile in-memory store.
    #[default]
    Memory,
    /// Persistent RocksDB store.
    Rocksdb,
}

/// Block store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Backend to use.
    pub backend: StorageBackend,
    /// Data directory for persistent backends.
    pub path: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            path: PathBuf::from("./data/blocks"),
        }
    }
}

/// HTTP API settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    /// Listen address.
    pub listen_addr: SocketAddr,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Level for rescache crates (trace, debug, info, warn, error).
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Values given on the command line. `None` leaves the loaded value alone.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// Ledger base URL.
    pub base_url: Option<String>,
    /// API listen address.
    pub api_addr: Option<SocketAddr>,
    /// Log level.
    pub log_level: Option<String>,
    /// Log format.
    pub log_format: Option<LogFormat>,
    /// Storage backend.
    pub storage: Option<StorageBackend>,
    /// Storage data directory.
    pub data_dir: Option<PathBuf>,
}

impl NodeConfig {
    /// Loads defaults, then `path` if it exists, then the environment.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::load_with_env(path, Environment::with_prefix(ENV_PREFIX))
    }

    fn load_with_env(path: &Path, env: Environment) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(Config::try_from(&NodeConfig::default())?)
            .add_source(File::from(path).required(false))
            .add_source(env.separator("__").try_parsing(true))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Applies command line values on top of the loaded configuration.
    pub fn apply(mut self, overrides: Overrides) -> Self {
        if let Some(base_url) = overrides.base_url {
            self.ledger.base_url = base_url;
        }
        if let Some(addr) = overrides.api_addr {
            self.api.listen_addr = addr;
        }
        if let Some(level) = overrides.log_level {
            self.log.level = level;
        }
        if let Some(format) = overrides.log_format {
            self.log.format = format;
        }
        if let Some(backend) = overrides.storage {
            self.storage.backend = backend;
        }
        if let Some(path) = overrides.data_dir {
            self.storage.path = path;
        }
        self
    }

    /// Checks values the type system cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sync.batch_size == 0 {
            return Err(ConfigError::Invalid("sync.batch_size must be > 0".into()));
        }
        if self.sync.concurrency == 0 {
            return Err(ConfigError::Invalid("sync.concurrency must be > 0".into()));
        }
        if self.ledger.fetch_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "ledger.fetch_interval_ms must be > 0".into(),
            ));
        }
        if self.ledger.reconnect_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "ledger.reconnect_interval_ms must be > 0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn no_env() -> Environment {
        Environment::with_prefix(ENV_PREFIX).source(Some(HashMap::new()))
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config =
            NodeConfig::load_with_env(Path::new("/nonexistent/rescache.yaml"), no_env()).unwrap();
        assert_eq!(config, NodeConfig::default());
        assert_eq!(config.sync.batch_size, 100);
        assert_eq!(config.ledger.fetch_interval_ms, 30_000);
    }

    #[test]
    fn test_yaml_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "ledger:\n  base_url: resilientdb://ledger:18000\n  ws_secure: true\nsync:\n  concurrency: 8\nstorage:\n  backend: rocksdb\nlog:\n  format: json"
        )
        .unwrap();

        let config = NodeConfig::load_with_env(file.path(), no_env()).unwrap();

        assert_eq!(config.ledger.base_url, "resilientdb://ledger:18000");
        assert!(config.ledger.ws_secure);
        assert_eq!(config.ledger.reconnect_interval_ms, 5_000);
        assert_eq!(config.sync.concurrency, 8);
        assert_eq!(config.sync.batch_size, 100);
        assert_eq!(config.storage.backend, StorageBackend::Rocksdb);
        assert_eq!(config.log.format, LogFormat::Json);
    }

    #[test]
    fn test_environment_overrides_file() {
        let env = Environment::with_prefix(ENV_PREFIX).source(Some(HashMap::from([
            (
                "RESCACHE__LEDGER__BASE_URL".to_string(),
                "resilientdb://env:1".to_string(),
            ),
            ("RESCACHE__SYNC__BATCH_SIZE".to_string(), "25".to_string()),
        ])));

        let config = NodeConfig::load_with_env(Path::new("/nonexistent.yaml"), env).unwrap();

        assert_eq!(config.ledger.base_url, "resilientdb://env:1");
        assert_eq!(config.sync.batch_size, 25);
    }

    #[test]
    fn test_overrides_win() {
        let config = NodeConfig::default().apply(Overrides {
            base_url: Some("resilientdb://cli:2".to_string()),
            api_addr: Some("0.0.0.0:9000".parse().unwrap()),
            storage: Some(StorageBackend::Rocksdb),
            ..Default::default()
        });

        assert_eq!(config.ledger.base_url, "resilientdb://cli:2");
        assert_eq!(config.api.listen_addr.port(), 9000);
        assert_eq!(config.storage.backend, StorageBackend::Rocksdb);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_validate() {
        assert!(NodeConfig::default().validate().is_ok());

        let mut config = NodeConfig::default();
        config.sync.concurrency = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
