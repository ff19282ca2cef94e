use anyhow::{Context, Result};
use dotenv::dotenv;
use std::env;
use std::path::PathBuf;

use crate::config::AppConfig;

pub const CONFIG_PATH_VAR: &str = "TXN_CONFIG";
pub const OPERATION_TIMEOUT_VAR: &str = "TXN_OPERATION_TIMEOUT_MS";
pub const STEP_DELAY_VAR: &str = "TXN_STEP_DELAY_MS";
pub const INSPECT_DEPTH_VAR: &str = "TXN_INSPECT_QUEUE_DEPTH";

/// Settings taken from the environment (and a `.env` file, if present).
/// They win over the JSON settings file.
#[derive(Debug, Default, PartialEq)]
pub struct EnvOverrides {
    pub config_path: Option<PathBuf>,
    pub operation_timeout_ms: Option<u64>,
    pub step_delay_ms: Option<u64>,
    pub inspect_queue_depth: Option<bool>,
}

impl EnvOverrides {
    pub fn load() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(EnvOverrides {
            config_path: value(CONFIG_PATH_VAR).map(PathBuf::from),
            operation_timeout_ms: value(OPERATION_TIMEOUT_VAR)
                .map(|val| parse_millis(OPERATION_TIMEOUT_VAR, &val))
                .transpose()?,
            step_delay_ms: value(STEP_DELAY_VAR)
                .map(|val| parse_millis(STEP_DELAY_VAR, &val))
                .transpose()?,
            inspect_queue_depth: value(INSPECT_DEPTH_VAR)
                .map(|val| {
                    val.trim()
                        .to_ascii_lowercase()
                        .parse()
                        .with_context(|| format!("{} must be true or false", INSPECT_DEPTH_VAR))
                })
                .transpose()?,
        })
    }

    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(timeout) = self.operation_timeout_ms {
            config.transaction.operation_timeout_ms = Some(timeout);
        }
        if let Some(delay) = self.step_delay_ms {
            config.transaction.step_delay_ms = delay;
        }
        if let Some(inspect) = self.inspect_queue_depth {
            config.transaction.inspect_queue_depth = inspect;
        }
    }
}

fn parse_millis(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .with_context(|| format!("{} must be a number of milliseconds", key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_no_variables() {
        let overrides = EnvOverrides::from_lookup(lookup(&[])).unwrap();
        assert_eq!(overrides, EnvOverrides::default());
    }

    #[test]
    fn test_overrides_applied() {
        let overrides = EnvOverrides::from_lookup(lookup(&[
            (OPERATION_TIMEOUT_VAR, "2000"),
            (STEP_DELAY_VAR, " 250 "),
            (INSPECT_DEPTH_VAR, "TRUE"),
            (CONFIG_PATH_VAR, "/etc/txn.json"),
        ]))
        .unwrap();

        let mut config = AppConfig::default();
        overrides.apply(&mut config);

        assert_eq!(config.transaction.operation_timeout_ms, Some(2000));
        assert_eq!(config.transaction.step_delay_ms, 250);
        assert!(config.transaction.inspect_queue_depth);
        assert_eq!(overrides.config_path, Some(PathBuf::from("/etc/txn.json")));
    }

    #[test]
    fn test_blank_variables_are_ignored() {
        let overrides = EnvOverrides::from_lookup(lookup(&[(STEP_DELAY_VAR, "  ")])).unwrap();
        assert_eq!(overrides.step_delay_ms, None);
    }

    #[test]
    fn test_bad_number_is_an_error() {
        let result = EnvOverrides::from_lookup(lookup(&[(OPERATION_TIMEOUT_VAR, "soon")]));
        assert!(result.is_err());
    }
}
