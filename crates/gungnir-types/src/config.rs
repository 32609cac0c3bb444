//! Task configuration.
//!
//! A [`Config`] is a flat, read-only map from dotted keys (for example
//! `gungnir.metrics.enabled`) to JSON values.  It is queried by `prepare`
//! hooks for feature flags and tunables.  The map can be deserialized from
//! YAML or JSON, so the same file format works for local runs and for the
//! configuration shipped with a submitted topology.

use crate::constants::{
    DEFAULT_METRICS_INTERVAL_SECS, GROUPING_MAX_KEYS, METRICS_ENABLED, METRICS_INTERVAL_SECS,
};
use crate::error::DetailedError;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// An error reading or validating configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ConfigError {
    /// A required key is absent.
    #[error("missing required configuration key '{key}'")]
    Missing { key: String },

    /// The key is present but holds a value of the wrong type.
    #[error("configuration key '{key}' must be {expected}")]
    InvalidType { key: String, expected: &'static str },

    /// The key holds a value of the right type that is out of range.
    #[error("invalid value for configuration key '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    /// The configuration document could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

impl DetailedError for ConfigError {
    fn error_code(&self) -> Cow<'static, str> {
        match self {
            Self::Missing { .. } => Cow::from("MissingConfigKey"),
            Self::InvalidType { .. } => Cow::from("InvalidConfigType"),
            Self::InvalidValue { .. } => Cow::from("InvalidConfigValue"),
            Self::Parse(_) => Cow::from("ConfigParseError"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Config {
    entries: BTreeMap<String, JsonValue>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Returns a copy of `self` with `key` set to `value`.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.entries.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, ConfigError> {
        self.typed(key, "a boolean", JsonValue::as_bool)
    }

    pub fn get_u64(&self, key: &str) -> Result<Option<u64>, ConfigError> {
        self.typed(key, "a non-negative integer", JsonValue::as_u64)
    }

    pub fn get_str(&self, key: &str) -> Result<Option<&str>, ConfigError> {
        self.typed(key, "a string", JsonValue::as_str)
    }

    /// Reads an integer number of seconds.
    pub fn get_duration_secs(&self, key: &str) -> Result<Option<Duration>, ConfigError> {
        Ok(self.get_u64(key)?.map(Duration::from_secs))
    }

    pub fn require_bool(&self, key: &str) -> Result<bool, ConfigError> {
        self.get_bool(key)?.ok_or_else(|| missing(key))
    }

    pub fn require_u64(&self, key: &str) -> Result<u64, ConfigError> {
        self.get_u64(key)?.ok_or_else(|| missing(key))
    }

    pub fn require_str(&self, key: &str) -> Result<&str, ConfigError> {
        self.get_str(key)?.ok_or_else(|| missing(key))
    }

    /// Whether dispatch counters and metric descriptions should be registered.
    pub fn metrics_enabled(&self) -> Result<bool, ConfigError> {
        Ok(self.get_bool(METRICS_ENABLED)?.unwrap_or(false))
    }

    pub fn metrics_interval(&self) -> Result<Duration, ConfigError> {
        let interval = self
            .get_duration_secs(METRICS_INTERVAL_SECS)?
            .unwrap_or(Duration::from_secs(DEFAULT_METRICS_INTERVAL_SECS));
        if interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: METRICS_INTERVAL_SECS.to_string(),
                reason: "interval must be at least one second".to_string(),
            });
        }
        Ok(interval)
    }

    /// Upper bound on per-key operator instances, if one is configured.
    pub fn grouping_max_keys(&self) -> Result<Option<u64>, ConfigError> {
        self.get_u64(GROUPING_MAX_KEYS)
    }

    fn typed<'a, T>(
        &'a self,
        key: &str,
        expected: &'static str,
        convert: impl FnOnce(&'a JsonValue) -> Option<T>,
    ) -> Result<Option<T>, ConfigError> {
        match self.entries.get(key) {
            None | Some(JsonValue::Null) => Ok(None),
            Some(value) => convert(value).map(Some).ok_or(ConfigError::InvalidType {
                key: key.to_string(),
                expected,
            }),
        }
    }
}

fn missing(key: &str) -> ConfigError {
    ConfigError::Missing {
        key: key.to_string(),
    }
}

#[cfg(test)]
mod test {
    use super::{Config, ConfigError};
    use crate::constants::{GROUPING_MAX_KEYS, METRICS_ENABLED, METRICS_INTERVAL_SECS};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[test]
    fn yaml_config() {
        let config = Config::from_yaml_str(
            r#"
gungnir.metrics.enabled: true
gungnir.metrics.interval.secs: 15
gungnir.topology.name: "clicks"
"#,
        )
        .unwrap();

        assert!(config.metrics_enabled().unwrap());
        assert_eq!(config.metrics_interval().unwrap(), Duration::from_secs(15));
        assert_eq!(config.require_str("gungnir.topology.name").unwrap(), "clicks");
        assert_eq!(config.grouping_max_keys().unwrap(), None);
    }

    #[test]
    fn defaults() {
        let config = Config::new();
        assert!(!config.metrics_enabled().unwrap());
        assert_eq!(config.metrics_interval().unwrap(), Duration::from_secs(60));
    }

    #[test]
    fn missing_and_mistyped_keys() {
        let config = Config::new()
            .with(METRICS_ENABLED, "yes")
            .with(GROUPING_MAX_KEYS, 16);

        assert_eq!(
            config.metrics_enabled(),
            Err(ConfigError::InvalidType {
                key: METRICS_ENABLED.to_string(),
                expected: "a boolean"
            })
        );
        assert_eq!(config.grouping_max_keys().unwrap(), Some(16));
        assert_eq!(
            config.require_str("gungnir.topology.name"),
            Err(ConfigError::Missing {
                key: "gungnir.topology.name".to_string()
            })
        );
    }

    #[test]
    fn zero_interval_is_rejected() {
        let config = Config::from_json_str(r#"{"gungnir.metrics.interval.secs": 0}"#).unwrap();
        assert!(matches!(
            config.metrics_interval(),
            Err(ConfigError::InvalidValue { key, .. }) if key == METRICS_INTERVAL_SECS
        ));
    }
}
