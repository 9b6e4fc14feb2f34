//! Application configuration
//!
//! Loaded from a TOML file. The default location is
//! `<config_dir>/charge-coordinator/config.toml`; the `CHARGE_COORDINATOR_CONFIG`
//! environment variable overrides it. A missing file is created with defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::shared::errors::InfraError;

pub const CONFIG_ENV_VAR: &str = "CHARGE_COORDINATOR_CONFIG";

/// Default config file path
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        return PathBuf::from(path);
    }
    dirs_next::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("charge-coordinator")
        .join("config.toml")
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseSettings,
    pub logging: LoggingConfig,
    pub allocation: AllocationConfig,
    pub broadcaster: BroadcasterConfig,
    pub watchdog: WatchdogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub api_host: String,
    pub api_port: u16,
    /// Seconds to wait for background tasks on shutdown
    pub shutdown_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_host: "0.0.0.0".to_string(),
            api_port: 8080,
            shutdown_timeout: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: "sqlite://./charge-coordinator.db?mode=rwc".to_string(),
        }
    }
}

impl DatabaseSettings {
    pub fn connection_url(&self) -> String {
        self.url.clone()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `text` or `json`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

/// Allocation engine tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationConfig {
    /// How long a port may stay Reserved without a hardware ack
    pub reservation_grace_secs: u64,
    /// How long a port may stay Completing without a final report
    pub completion_grace_secs: u64,
    /// Retries of hardware and watchdog triggers that hit a busy port
    pub cas_retry_limit: u32,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            reservation_grace_secs: 90,
            completion_grace_secs: 300,
            cas_retry_limit: 32,
        }
    }
}

impl AllocationConfig {
    pub fn reservation_grace(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.reservation_grace_secs as i64)
    }

    pub fn completion_grace(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.completion_grace_secs as i64)
    }
}

/// Event broadcaster retention and queueing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcasterConfig {
    /// Events retained per port for replay
    pub replay_buffer_size: usize,
    /// Maximum age of a retained event
    pub replay_window_secs: u64,
    /// Per-subscriber queue; a full queue disconnects the subscriber
    pub subscriber_queue_capacity: usize,
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        Self {
            replay_buffer_size: 256,
            replay_window_secs: 600,
            subscriber_queue_capacity: 512,
        }
    }
}

impl BroadcasterConfig {
    pub fn replay_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.replay_window_secs as i64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    pub enabled: bool,
    pub check_interval_secs: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_secs: 10,
        }
    }
}

impl AppConfig {
    /// Load config from `path`, writing defaults there if the file is missing.
    pub fn load(path: &Path) -> Result<Self, InfraError> {
        if !path.exists() {
            let config = Self::default();
            config.save(path)?;
            info!("Default configuration written to {}", path.display());
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| InfraError::Config(format!("read {}: {}", path.display(), e)))?;
        let config = Self::from_toml(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, InfraError> {
        toml::from_str(content).map_err(|e| InfraError::Config(e.to_string()))
    }

    pub fn save(&self, path: &Path) -> Result<(), InfraError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| InfraError::Config(format!("create {}: {}", parent.display(), e)))?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| InfraError::Config(e.to_string()))?;
        std::fs::write(path, content)
            .map_err(|e| InfraError::Config(format!("write {}: {}", path.display(), e)))
    }

    pub fn validate(&self) -> Result<(), InfraError> {
        let checks = [
            (self.server.api_port == 0, "server.api_port must be non-zero"),
            (
                self.allocation.reservation_grace_secs == 0,
                "allocation.reservation_grace_secs must be positive",
            ),
            (
                self.allocation.completion_grace_secs == 0,
                "allocation.completion_grace_secs must be positive",
            ),
            (
                self.broadcaster.replay_buffer_size == 0,
                "broadcaster.replay_buffer_size must be positive",
            ),
            (
                self.broadcaster.subscriber_queue_capacity == 0,
                "broadcaster.subscriber_queue_capacity must be positive",
            ),
            (
                self.watchdog.check_interval_secs == 0,
                "watchdog.check_interval_secs must be positive",
            ),
        ];
        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, msg)) => Err(InfraError::Config(msg.to_string())),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let cfg = AppConfig::from_toml(
            r#"
            [server]
            api_port = 9090

            [allocation]
            reservation_grace_secs = 30
            "#,
        )
        .unwrap();
        assert_eq!(cfg.server.api_port, 9090);
        assert_eq!(cfg.server.api_host, "0.0.0.0");
        assert_eq!(cfg.allocation.reservation_grace_secs, 30);
        assert_eq!(cfg.allocation.completion_grace_secs, 300);
        assert_eq!(cfg.broadcaster.replay_buffer_size, 256);
    }

    #[test]
    fn zero_queue_capacity_is_rejected() {
        let mut cfg = AppConfig::default();
        cfg.broadcaster.subscriber_queue_capacity = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn defaults_are_valid() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn load_writes_missing_file() {
        let path = std::env::temp_dir()
            .join(format!("charge-coordinator-{}", uuid::Uuid::new_v4()))
            .join("config.toml");
        let cfg = AppConfig::load(&path).unwrap();
        assert!(path.exists());
        let reloaded = AppConfig::load(&path).unwrap();
        assert_eq!(reloaded.server.api_port, cfg.server.api_port);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
