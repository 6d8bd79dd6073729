//! Server configuration.
//!
//! Loaded from a TOML file; every field has a default so an empty file (or
//! none at all) is a valid configuration.
//!
//! ```toml
//! listen = "0.0.0.0:7800"
//! state_path = "/var/lib/convoy/gdm.json"
//! debug_secret = "s3cret"
//! auto_resolve_interval_secs = 60
//! clusters = ["east", "west"]
//! ```

use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::{DEFAULT_LISTEN, DEFAULT_PARALLELISM, DEFAULT_QUEUE_RETENTION, DEFAULT_WAIT_TIMEOUT_SECS};
use crate::platform::paths::default_state_path;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config file {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse config: {0}")]
  Parse(#[source] toml::de::Error),

  #[error("failed to serialize config: {0}")]
  Serialize(#[source] toml::ser::Error),

  #[error("invalid config: {0}")]
  Validation(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  /// Address the HTTP server binds to.
  pub listen: String,

  /// GDM file; `<data_dir>/gdm.json` when unset.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub state_path: Option<PathBuf>,

  /// Keep the GDM in memory instead of on disk.
  pub memory: bool,

  /// Requests presenting this value in `x-convoy-debug-secret` see internal error detail.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub debug_secret: Option<String>,

  /// Completed rectifications kept per target.
  pub queue_retention: usize,

  /// Upper bound on `wait=true` item requests.
  pub wait_timeout_secs: u64,

  /// Clusters queried at once during a convergence pass.
  pub parallelism: usize,

  /// Run a convergence pass this often; never when unset.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub auto_resolve_interval_secs: Option<u64>,

  /// Clusters a convergence pass inspects. When empty, those named in the GDM.
  pub clusters: Vec<String>,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      listen: DEFAULT_LISTEN.to_string(),
      state_path: None,
      memory: false,
      debug_secret: None,
      queue_retention: DEFAULT_QUEUE_RETENTION,
      wait_timeout_secs: DEFAULT_WAIT_TIMEOUT_SECS,
      parallelism: DEFAULT_PARALLELISM,
      auto_resolve_interval_secs: None,
      clusters: Vec::new(),
    }
  }
}

impl ServerConfig {
  pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    Self::from_toml(&content)
  }

  pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
    let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
    config.validate()?;
    Ok(config)
  }

  pub fn to_toml(&self) -> Result<String, ConfigError> {
    toml::to_string_pretty(self).map_err(ConfigError::Serialize)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    self.listen_addr()?;
    if self.parallelism == 0 {
      return Err(ConfigError::Validation("parallelism must be at least 1".to_string()));
    }
    if self.auto_resolve_interval_secs == Some(0) {
      return Err(ConfigError::Validation(
        "auto_resolve_interval_secs must be at least 1".to_string(),
      ));
    }
    Ok(())
  }

  pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
    self
      .listen
      .parse()
      .map_err(|e| ConfigError::Validation(format!("invalid listen address {:?}: {}", self.listen, e)))
  }

  pub fn state_path(&self) -> PathBuf {
    self.state_path.clone().unwrap_or_else(default_state_path)
  }

  pub fn wait_timeout(&self) -> Duration {
    Duration::from_secs(self.wait_timeout_secs)
  }

  pub fn auto_resolve_interval(&self) -> Option<Duration> {
    self.auto_resolve_interval_secs.map(Duration::from_secs)
  }
}
