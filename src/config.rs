// src/config.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const CONFIG_FILE_NAME: &str = "transacted-dual-send.json";

// Configuration structures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub connection: ConnectionSettings,
    #[serde(default)]
    pub transaction: TransactionSettings,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    #[serde(default = "default_timeout")]
    pub connection_timeout_ms: u64,
    #[serde(default = "default_heartbeat")]
    pub heartbeat_seconds: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionSettings {
    /// Upper bound for each broker call inside the session; unbounded when absent.
    #[serde(default)]
    pub operation_timeout_ms: Option<u64>,
    /// Pause after each uncommitted send.
    #[serde(default)]
    pub step_delay_ms: u64,
    /// Log queue depths between the steps of the transaction.
    #[serde(default)]
    pub inspect_queue_depth: bool,
    #[serde(default = "default_durable")]
    pub durable_queues: bool,
}

// Default values
fn default_timeout() -> u64 { 5000 }
fn default_heartbeat() -> u16 { 30 }
fn default_durable() -> bool { true }
fn default_log_level() -> String { "info".to_string() }

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionSettings::default(),
            transaction: TransactionSettings::default(),
            log_level: default_log_level(),
        }
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connection_timeout_ms: default_timeout(),
            heartbeat_seconds: default_heartbeat(),
        }
    }
}

impl Default for TransactionSettings {
    fn default() -> Self {
        Self {
            operation_timeout_ms: None,
            step_delay_ms: 0,
            inspect_queue_depth: false,
            durable_queues: default_durable(),
        }
    }
}

impl ConnectionSettings {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }
}

impl TransactionSettings {
    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_ms.map(Duration::from_millis)
    }

    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }
}

/// Looks for the settings file in the usual places. `None` means run on defaults.
pub fn find_config_file() -> Option<PathBuf> {
    let config_dir_file = Path::new("config").join(CONFIG_FILE_NAME);
    let locations = [
        ("Current directory", PathBuf::from(CONFIG_FILE_NAME)),
        ("Config directory", config_dir_file),
    ];

    for (location_name, path) in locations {
        if path.exists() {
            debug!("Found config file in {}: {}", location_name, path.display());
            return Some(path);
        }
    }

    // Try the user's home directory
    if let Some(home_dir) = home::home_dir() {
        let home_config = home_dir.join(format!(".{}", CONFIG_FILE_NAME));
        if home_config.exists() {
            debug!("Found config file in home directory: {}", home_config.display());
            return Some(home_config);
        }
    }

    None
}

/// Loads settings from `explicit` if given (it must exist), otherwise from the
/// first file `find_config_file` turns up, otherwise defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match find_config_file() {
            Some(path) => path,
            None => return Ok(AppConfig::default()),
        },
    };
    read_config_file(&path)
}

pub fn read_config_file(path: &Path) -> Result<AppConfig> {
    let config_content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;

    let config: AppConfig = serde_json::from_str(&config_content).with_context(|| {
        format!("{} contains invalid JSON or wrongly typed fields", path.display())
    })?;

    config.validate()?;
    Ok(config)
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        if self.log_level.trim().is_empty() {
            return Err(anyhow!("Configuration error: log_level cannot be empty"));
        }
        if self.transaction.operation_timeout_ms == Some(0) {
            return Err(anyhow!(
                "Configuration error: transaction.operation_timeout_ms must be positive"
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("{}-{}", std::process::id(), name));
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_defaults_from_empty_object() {
        let config: AppConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.connection.connection_timeout(), Duration::from_secs(5));
        assert_eq!(config.connection.heartbeat_seconds, 30);
        assert_eq!(config.transaction.operation_timeout(), None);
        assert!(config.transaction.durable_queues);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_read_partial_file() {
        let path = write_temp(
            "partial.json",
            r#"{ "transaction": { "step_delay_ms": 1500, "inspect_queue_depth": true } }"#,
        );
        let config = read_config_file(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(config.transaction.step_delay(), Duration::from_millis(1500));
        assert!(config.transaction.inspect_queue_depth);
        assert_eq!(config.connection, ConnectionSettings::default());
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let missing = std::env::temp_dir().join("no-such-transacted-dual-send.json");
        let err = load_config(Some(&missing)).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let path = write_temp(
            "zero-timeout.json",
            r#"{ "transaction": { "operation_timeout_ms": 0 } }"#,
        );
        let result = read_config_file(&path);
        fs::remove_file(&path).ok();
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_bad_json() {
        let path = write_temp("bad.json", r#"{ "connection": { "heartbeat_seconds": "often" } }"#);
        let result = read_config_file(&path);
        fs::remove_file(&path).ok();
        assert!(result.is_err());
    }
}
