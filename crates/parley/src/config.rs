//! Server configuration.
//!
//! Defaults suit a local run. The `parley` binary layers two optional
//! sources on top:
//!
//! 1. A JSON file named by `PARLEY_CONFIG`. Every field is optional.
//! 2. `PARLEY_BIND`, which overrides the bind address.
//!
//! ```json
//! { "bind_addr": "0.0.0.0:56789", "idle_timeout": { "secs": 300, "nanos": 0 } }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default listen address.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:56789";

/// Env var naming the JSON config file.
pub const CONFIG_PATH_ENV: &str = "PARLEY_CONFIG";

/// Env var overriding `bind_addr`.
pub const BIND_ENV: &str = "PARLEY_BIND";

/// Configuration for a Parley server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the listener binds to.
    pub bind_addr: String,

    /// Close a connection that sends nothing for this long.
    /// `None` (the default) never times out.
    pub idle_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            idle_timeout: None,
        }
    }
}

/// Errors loading a config file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl ServerConfig {
    /// Parses a JSON config file. Missing fields keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| {
            ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Builds the config from `PARLEY_CONFIG` and `PARLEY_BIND`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };

        if let Ok(addr) = std::env::var(BIND_ENV) {
            if !addr.is_empty() {
                config.bind_addr = addr;
            }
        }

        Ok(config)
    }
}
