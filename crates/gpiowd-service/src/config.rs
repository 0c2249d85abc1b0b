//! Service configuration loading
//!
//! The daemon refuses to start without a configuration file: the line numbers
//! and period have no safe defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use gpiowd_supervisor::SupervisorConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ServiceError;

/// Configuration file read when no path is given.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/gpiowd/config.json";

/// Socket the daemon listens on by default.
pub const DEFAULT_SOCKET_PATH: &str = "/run/gpiowd.sock";

/// Complete daemon configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Watchdog lines and timings
    pub supervisor: SupervisorConfig,
    /// Unix socket serving the endpoint group
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,
    /// sysfs GPIO class directory
    #[serde(default = "default_sysfs_root")]
    pub sysfs_root: PathBuf,
}

fn default_socket_path() -> PathBuf {
    PathBuf::from(DEFAULT_SOCKET_PATH)
}

fn default_sysfs_root() -> PathBuf {
    PathBuf::from(gpiowd_sysfs::DEFAULT_ROOT)
}

impl ServiceConfig {
    /// Wrap a supervisor configuration with default paths.
    #[must_use]
    pub fn new(supervisor: SupervisorConfig) -> Self {
        Self {
            supervisor,
            socket_path: default_socket_path(),
            sysfs_root: default_sysfs_root(),
        }
    }

    /// Load and validate configuration from `path`.
    ///
    /// # Errors
    ///
    /// Fails with [`ServiceError::InvalidConfiguration`] if the file is
    /// missing, unparsable, or carries invalid supervisor settings.
    pub async fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| {
                ServiceError::InvalidConfiguration(format!("cannot read {}: {e}", path.display()))
            })
            .with_context(|| format!("Failed to load config file: {}", path.display()))?;

        let config: ServiceConfig = serde_json::from_str(&content)
            .map_err(|e| ServiceError::InvalidConfiguration(e.to_string()))
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Fails with [`ServiceError::InvalidConfiguration`] naming the offending value.
    pub fn validate(&self) -> Result<()> {
        self.supervisor
            .validate()
            .map_err(|e| ServiceError::InvalidConfiguration(e.to_string()))?;

        if self.socket_path.as_os_str().is_empty() {
            return Err(ServiceError::InvalidConfiguration("socket_path is empty".into()).into());
        }
        Ok(())
    }
}
