pub mod schema;

pub use schema::{GraphqlFlagsConfig, PeerlearnConfig, SnapshotSchedule};

use crate::metrics::seed::PerfOperation;
use crate::types::PerfMethod;
use anyhow::{Context, Result};
use cron::Schedule;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

/// File name of the config inside the peerlearn home directory.
pub const CONFIG_FILE: &str = "peerlearn.toml";

/// Settings that can be overridden from the environment, e.g. in a container.
const ENV_LISTEN_ADDR: &str = "PEERLEARN_LISTEN_ADDR";
const ENV_RPC_URL: &str = "PEERLEARN_RPC_URL";
const ENV_GRAPHQL_URL: &str = "PEERLEARN_GRAPHQL_URL";
const ENV_SPACES: &str = "PEERLEARN_SPACES";
const ENV_DEFAULT_SPACE: &str = "PEERLEARN_DEFAULT_SPACE";
const ENV_LOG_LEVEL: &str = "PEERLEARN_LOG_LEVEL";

/// A config that parsed but cannot run.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("at least one space must be configured")]
    NoSpaces,
    #[error("default_space {0:?} is not one of the configured spaces")]
    UnknownDefaultSpace(String),
    #[error("snapshot schedule {schedule:?} is not a valid cron expression: {reason}")]
    BadSchedule { schedule: String, reason: String },
    #[error("snapshots: {0}")]
    BadSnapshotTarget(String),
}

/// Default peerlearn home directory (~/.peerlearn).
pub fn default_home_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().join(".peerlearn"))
        .unwrap_or_else(|| PathBuf::from(".peerlearn"))
}

/// Where the config lives under `home`.
pub fn config_path(home: &Path) -> PathBuf {
    home.join(CONFIG_FILE)
}

/// Load config from `path` (defaults when absent), apply `PEERLEARN_*`
/// overrides and check the result.
pub fn load_config(path: &Path) -> Result<PeerlearnConfig> {
    let mut config = read_config(path)?;
    apply_overrides(&mut config, |name| std::env::var(name).ok());
    config
        .validate()
        .with_context(|| format!("Invalid config at {}", path.display()))?;
    Ok(config)
}

fn read_config(path: &Path) -> Result<PeerlearnConfig> {
    if !path.exists() {
        debug!("No config at {}, using defaults", path.display());
        return Ok(PeerlearnConfig::default());
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    toml::from_str(&contents).with_context(|| format!("Failed to parse {} (TOML)", path.display()))
}

/// Overlay environment settings. Blank values are ignored.
pub fn apply_overrides<F>(config: &mut PeerlearnConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    if let Some(addr) = var(ENV_LISTEN_ADDR) {
        config.listen_addr = addr;
    }
    if let Some(url) = var(ENV_RPC_URL) {
        config.arkiv_rpc_url = url;
    }
    if let Some(url) = var(ENV_GRAPHQL_URL) {
        config.graphql_url = url;
    }
    if let Some(list) = var(ENV_SPACES) {
        config.spaces = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
    }
    if let Some(space) = var(ENV_DEFAULT_SPACE) {
        config.default_space = space;
    }
    if let Some(level) = var(ENV_LOG_LEVEL) {
        config.log_level = level;
    }
}

impl PeerlearnConfig {
    /// Reject settings the server would only trip over at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.spaces.is_empty() {
            return Err(ConfigError::NoSpaces);
        }
        if !self.spaces.contains(&self.default_space) {
            return Err(ConfigError::UnknownDefaultSpace(self.default_space.clone()));
        }

        let snapshots = &self.snapshots;
        if snapshots.enabled {
            Schedule::from_str(&snapshots.schedule).map_err(|e| ConfigError::BadSchedule {
                schedule: snapshots.schedule.clone(),
                reason: e.to_string(),
            })?;
            PerfMethod::from_str(&snapshots.method).map_err(ConfigError::BadSnapshotTarget)?;
            for op in &snapshots.operations {
                PerfOperation::from_str(op).map_err(ConfigError::BadSnapshotTarget)?;
            }
        }
        Ok(())
    }
}

/// Save config to the given path (TOML format).
pub fn save_config(config: &PeerlearnConfig, path: &Path) -> Result<()> {
    let contents = toml::to_string_pretty(config).context("Failed to serialize config")?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, contents)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
