use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::{fs, time::Duration};
use tracing::debug;

use crate::error::SyncError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub control_plane: ControlPlaneConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlPlaneConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Per-request timeout, zero (the default) for none: a slow fetch
    /// only delays the next tick.
    #[serde(default)]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
    /// Every N-th tick also requests statistics, known roles, issues and suggestions
    #[serde(default = "default_stat_period")]
    pub stat_period: u64,
    /// Delay before the extra refresh that follows a successful mutation
    #[serde(default = "default_consistency_window_ms")]
    pub consistency_window_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub console: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            control_plane: ControlPlaneConfig::default(),
            polling: PollingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            request_timeout_ms: 0,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: default_refresh_interval_ms(),
            stat_period: default_stat_period(),
            consistency_window_ms: default_consistency_window_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
            console: default_true(),
        }
    }
}

fn default_endpoint() -> String {
    "http://127.0.0.1:8081/admin/api".to_string()
}

fn default_refresh_interval_ms() -> u64 {
    2_500
}

fn default_stat_period() -> u64 {
    10
}

fn default_consistency_window_ms() -> u64 {
    2_000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl PollingConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn consistency_window(&self) -> Duration {
        Duration::from_millis(self.consistency_window_ms)
    }
}

impl ControlPlaneConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms))
    }
}

impl SyncConfig {
    pub fn load() -> Result<Self, SyncError> {
        // Try loading from different locations in order
        let config_paths = [
            PathBuf::from("topology-sync.yml"),
            dirs::config_dir()
                .map(|p| p.join("topology-sync/config.yml"))
                .unwrap_or_default(),
            PathBuf::from("/etc/topology-sync/config.yml"),
        ];

        for path in &config_paths {
            if path.is_file() {
                debug!("Loading configuration from {}", path.display());
                return Self::load_from_file(path);
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_file(path: &Path) -> Result<Self, SyncError> {
        let content = fs::read_to_string(path)
            .map_err(|e| SyncError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Self = serde_yaml::from_str(&content)
            .map_err(|e| SyncError::Config(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        if self.polling.refresh_interval_ms == 0 {
            return Err(SyncError::config("polling.refresh_interval_ms must be positive"));
        }
        if self.polling.stat_period == 0 {
            return Err(SyncError::config("polling.stat_period must be positive"));
        }
        if self.control_plane.endpoint.trim().is_empty() {
            return Err(SyncError::config("control_plane.endpoint must not be empty"));
        }
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<(), SyncError> {
        let yaml = serde_yaml::to_string(self)
            .map_err(|e| SyncError::Config(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| SyncError::Config(format!("Failed to create config directory: {}", e)))?;
        }

        // Write atomically using a temporary file
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, yaml)
            .map_err(|e| SyncError::Config(format!("Failed to write config: {}", e)))?;

        fs::rename(&temp_path, path)
            .map_err(|e| SyncError::Config(format!("Failed to save config: {}", e)))?;

        Ok(())
    }
}
