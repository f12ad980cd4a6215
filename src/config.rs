//! Configuration management for the querier
//!
//! TOML file support, environment variable overrides and defaults.
//!
//! ```toml
//! [store]
//! url = "http://localhost:8123"
//! database = "qryn"
//! cluster_name = ""
//!
//! [query]
//! merge_row_limit = 0
//! discovery_lookback_secs = 604800
//! sample_lookback_secs = 172800
//!
//! [server]
//! log_level = "info"
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::query::planner::PlannerConfig;
use crate::store::TableNames;

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "QUERIER_CONFIG";

/// Config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "querier.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ApplicationConfig {
    /// Column store connection
    #[serde(default)]
    pub store: StoreConfig,

    /// Query compilation settings
    #[serde(default)]
    pub query: QuerySettings,

    /// Process settings
    #[serde(default)]
    pub server: ServerSettings,
}

/// Column store configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StoreConfig {
    /// HTTP endpoint of the store
    ///
    /// Read by the store client that implements `ColumnStore` outside this
    /// crate; here it is only validated and shown by `check-config`.
    #[serde(default = "default_store_url")]
    pub url: String,

    /// Database holding the profile tables
    #[serde(default = "default_database")]
    pub database: String,

    /// Cluster name; non-empty switches to distributed tables
    #[serde(default)]
    pub cluster_name: String,
}

/// Query compilation settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct QuerySettings {
    /// Newest samples kept by a stacktrace merge (0 = unlimited)
    #[serde(default)]
    pub merge_row_limit: u64,

    /// Default lookback of discovery requests, seconds
    #[serde(default = "default_discovery_lookback_secs")]
    pub discovery_lookback_secs: u64,

    /// Default lookback of merge and series requests, seconds
    #[serde(default = "default_sample_lookback_secs")]
    pub sample_lookback_secs: u64,
}

/// Process settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ServerSettings {
    /// Log level (error, warn, info, debug, trace) or a filter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// Default value functions
fn default_store_url() -> String { "http://localhost:8123".to_string() }
fn default_database() -> String { "qryn".to_string() }
fn default_discovery_lookback_secs() -> u64 { 7 * 24 * 3600 }
fn default_sample_lookback_secs() -> u64 { 48 * 3600 }
fn default_log_level() -> String { "info".to_string() }

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
            database: default_database(),
            cluster_name: String::new(),
        }
    }
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            merge_row_limit: 0,
            discovery_lookback_secs: default_discovery_lookback_secs(),
            sample_lookback_secs: default_sample_lookback_secs(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl ApplicationConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("failed to read config file {}: {}", path.display(), e))
        })?;
        toml::from_str(&contents).map_err(|e| {
            Error::Configuration(format!("failed to parse config file {}: {}", path.display(), e))
        })
    }

    /// Load configuration with environment variable overrides
    pub fn from_file_with_env(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from environment variables only
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Resolve the config source: `QUERIER_CONFIG`, then `./querier.toml`,
    /// then defaults. Environment overrides apply in every case.
    pub fn load() -> Result<Self> {
        let config = if let Ok(path) = std::env::var(CONFIG_ENV) {
            Self::from_file_with_env(path)?
        } else if Path::new(DEFAULT_CONFIG_FILE).exists() {
            Self::from_file_with_env(DEFAULT_CONFIG_FILE)?
        } else {
            Self::from_env()
        };
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        // Store
        if let Ok(url) = std::env::var("QUERIER_STORE_URL") {
            self.store.url = url;
        }
        if let Ok(database) = std::env::var("QUERIER_DATABASE") {
            self.store.database = database;
        }
        if let Ok(cluster) = std::env::var("QUERIER_CLUSTER") {
            self.store.cluster_name = cluster;
        }

        // Query
        if let Ok(limit) = std::env::var("QUERIER_MERGE_LIMIT") {
            if let Ok(l) = limit.parse() {
                self.query.merge_row_limit = l;
            }
        }

        // Logging
        if let Ok(log_level) = std::env::var("RUST_LOG") {
            self.server.log_level = log_level;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.store.database.is_empty() {
            return Err(Error::Configuration("database cannot be empty".to_string()));
        }
        if !self
            .store
            .database
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(Error::Configuration(format!(
                "database name '{}' must be alphanumeric",
                self.store.database
            )));
        }
        if url::Url::parse(&self.store.url).is_err() {
            return Err(Error::Configuration(format!(
                "store url {} is not a valid URL",
                crate::store::util::sanitize_url(&self.store.url)
            )));
        }
        if self.query.discovery_lookback_secs == 0 || self.query.sample_lookback_secs == 0 {
            return Err(Error::Configuration("lookbacks must be > 0".to_string()));
        }
        Ok(())
    }

    /// Table layout for this deployment
    pub fn table_names(&self) -> TableNames {
        TableNames::new(&self.store.database, Some(&self.store.cluster_name))
    }

    /// Planner settings
    pub fn planner_config(&self) -> PlannerConfig {
        PlannerConfig {
            discovery_lookback: Duration::from_secs(self.query.discovery_lookback_secs),
            sample_lookback: Duration::from_secs(self.query.sample_lookback_secs),
            merge_row_limit: match self.query.merge_row_limit {
                0 => None,
                n => Some(n),
            },
        }
    }

    /// Save configuration to a TOML file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Serialization(format!("failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ApplicationConfig::default();
        assert_eq!(config.store.database, "qryn");
        assert_eq!(config.query.merge_row_limit, 0);
        assert!(config.validate().is_ok());
        assert!(!config.table_names().is_distributed());
        assert_eq!(config.planner_config().merge_row_limit, None);
    }

    #[test]
    fn test_invalid_store_url() {
        let mut config = ApplicationConfig::default();
        config.store.url = "not a url".to_string();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("not a valid URL"));
    }

    #[test]
    fn test_invalid_database() {
        let mut config = ApplicationConfig::default();
        config.store.database = "qryn; DROP".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[store]\ndatabase = \"profiles\"\ncluster_name = \"main\"\n\n[query]\nmerge_row_limit = 250"
        )
        .unwrap();

        let config = ApplicationConfig::from_file(file.path()).unwrap();
        assert_eq!(config.store.database, "profiles");
        assert_eq!(config.store.url, "http://localhost:8123");
        assert!(config.table_names().is_distributed());
        assert_eq!(config.planner_config().merge_row_limit, Some(250));
        assert_eq!(
            config.planner_config().sample_lookback,
            Duration::from_secs(48 * 3600)
        );
    }

    #[test]
    fn test_from_file_missing() {
        let err = ApplicationConfig::from_file("/nonexistent/querier.toml").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("querier.toml");
        let mut config = ApplicationConfig::default();
        config.query.merge_row_limit = 10;
        config.save_to_file(&path).unwrap();
        assert_eq!(ApplicationConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("QUERIER_MERGE_LIMIT", "42");
        let config = ApplicationConfig::from_env();
        assert_eq!(config.query.merge_row_limit, 42);
        std::env::remove_var("QUERIER_MERGE_LIMIT");
    }
}
