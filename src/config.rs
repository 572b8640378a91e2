//! Store configuration
//!
//! Every field has a default, so a YAML file only needs to name what it
//! changes:
//!
//! ```yaml
//! name: people
//! engine: document
//! data_dir: ./quadstore_data
//! options:
//!   write_buffer_size: 67108864
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default store name
pub const DEFAULT_NAME: &str = "rdfstore_js";

/// Default order of the embedded quad index
pub const DEFAULT_TREE_ORDER: usize = 15;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Invalid value
    #[error("Invalid configuration value for {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Storage engine selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Lexicon plus in-process quad index
    #[default]
    Embedded,
    /// RocksDB document store
    Document,
}

/// Store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Keep data across restarts
    pub persistent: bool,
    /// Order of the embedded quad index
    ///
    /// Advisory: it is validated and recorded, but the embedded index is an
    /// ordered set whose node size is fixed, so the value does not change
    /// its behaviour.
    pub tree_order: usize,
    /// Store name, also the file stem of persisted data
    pub name: String,
    /// Wipe existing state on startup
    pub overwrite: bool,
    /// Capacity of the document store's match cache (0 disables it)
    pub max_cache_size: usize,
    /// Backend variant
    pub engine: EngineKind,
    /// Directory for persisted data
    pub data_dir: PathBuf,
    /// Host of an out-of-process store
    pub host: String,
    /// Port of an out-of-process store
    pub port: u16,
    /// Program started by `connect` to host an out-of-process store
    /// (default: `quadstore` on the `PATH`)
    pub server_binary: Option<PathBuf>,
    /// Seconds a spawned server gets to answer `/status`
    pub startup_timeout_secs: u64,
    /// Timeout in seconds for remote document fetches and remote store requests
    pub request_timeout_secs: u64,
    /// Extra backend parameters
    pub options: HashMap<String, u64>,
    /// Deliver notifications for bulk loads
    pub events_on_batch_load: bool,
    /// Base IRI for relative references
    pub base_uri: Option<String>,
    /// Prefixes registered at startup (prefix → IRI)
    pub default_prefixes: HashMap<String, String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            persistent: false,
            tree_order: DEFAULT_TREE_ORDER,
            name: DEFAULT_NAME.to_string(),
            overwrite: false,
            max_cache_size: 1000,
            engine: EngineKind::Embedded,
            data_dir: PathBuf::from("./quadstore_data"),
            host: "127.0.0.1".to_string(),
            port: 8890,
            server_binary: None,
            startup_timeout_secs: 10,
            request_timeout_secs: 30,
            options: HashMap::new(),
            events_on_batch_load: false,
            base_uri: None,
            default_prefixes: HashMap::new(),
        }
    }
}

impl StoreConfig {
    /// Load a configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Load a configuration from YAML text
    pub fn from_yaml_str(text: &str) -> ConfigResult<Self> {
        let config: StoreConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as YAML
    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Check value ranges
    pub fn validate(&self) -> ConfigResult<()> {
        if self.tree_order < 2 {
            return Err(ConfigError::Invalid {
                field: "tree_order",
                reason: format!("must be at least 2, got {}", self.tree_order),
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "request_timeout_secs",
                reason: "must be positive".to_string(),
            });
        }
        if self.name.is_empty() {
            return Err(ConfigError::Invalid {
                field: "name",
                reason: "must not be empty".to_string(),
            });
        }
        if self.name.contains(['/', '\\']) {
            return Err(ConfigError::Invalid {
                field: "name",
                reason: format!("must not contain path separators: {}", self.name),
            });
        }
        Ok(())
    }

    /// Endpoint of the out-of-process store described by `host`/`port`
    pub fn endpoint(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    /// Directory holding this store's files
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join(&self.name)
    }

    /// Snapshot file of a persistent embedded store
    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.snapshot", self.name))
    }

    /// Value of a backend option
    pub fn option(&self, key: &str) -> Option<u64> {
        self.options.get(key).copied()
    }
}
