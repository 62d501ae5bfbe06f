//! Load-time driver configuration
//!
//! Configuration is read once, before the device is touched. Missing
//! fields take their defaults, so an empty JSON object is a valid
//! configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while loading configuration
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Failed to read configuration: {0}")]
    Io(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Node name for {0} is empty")]
    EmptyName(&'static str),

    #[error("Both nodes are named {0}")]
    DuplicateName(String),
}

/// Verbosity applied to the `log` facade at load time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Fixed major for the restricted node; 0 selects a dynamic minor
    pub major: u32,
    pub device_name: String,
    pub user_device_name: String,
    pub log_level: LogLevel,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            major: 0,
            device_name: crate::DEFAULT_DEVICE_NAME.to_string(),
            user_device_name: crate::DEFAULT_USER_DEVICE_NAME.to_string(),
            log_level: LogLevel::default(),
        }
    }
}

impl DriverConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: DriverConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text =
            std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_json(&text)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device_name.is_empty() {
            return Err(ConfigError::EmptyName("device_name"));
        }
        if self.user_device_name.is_empty() {
            return Err(ConfigError::EmptyName("user_device_name"));
        }
        if self.device_name == self.user_device_name {
            return Err(ConfigError::DuplicateName(self.device_name.clone()));
        }
        Ok(())
    }

    /// Sets the global `log` ceiling to the configured level
    pub fn apply_log_level(&self) {
        log::set_max_level(self.log_level.to_level_filter());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_object_gives_defaults() {
        let config = DriverConfig::from_json("{}").unwrap();
        assert_eq!(config, DriverConfig::default());
        assert_eq!(config.device_name, "vboxguest");
        assert_eq!(config.user_device_name, "vboxuser");
        assert_eq!(config.log_level, LogLevel::Info);
    }

    #[test]
    fn test_partial_override() {
        let config = DriverConfig::from_json(r#"{"major": 230, "log_level": "debug"}"#).unwrap();
        assert_eq!(config.major, 230);
        assert_eq!(config.log_level.to_level_filter(), log::LevelFilter::Debug);
        assert_eq!(config.device_name, "vboxguest");
    }

    #[test]
    fn test_validation() {
        assert_eq!(
            DriverConfig::from_json(r#"{"device_name": ""}"#),
            Err(ConfigError::EmptyName("device_name"))
        );
        assert_eq!(
            DriverConfig::from_json(r#"{"user_device_name": "vboxguest"}"#),
            Err(ConfigError::DuplicateName("vboxguest".to_string()))
        );
        assert!(matches!(
            DriverConfig::from_json(r#"{"log_level": "loud"}"#),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"device_name": "guestdev", "user_device_name": "guestuser"}}"#).unwrap();

        let config = DriverConfig::from_file(file.path()).unwrap();
        assert_eq!(config.device_name, "guestdev");
        assert_eq!(config.user_device_name, "guestuser");

        let missing = file.path().with_extension("missing");
        assert!(matches!(
            DriverConfig::from_file(missing),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_json_round_trip() {
        let config = DriverConfig {
            major: 12,
            log_level: LogLevel::Trace,
            ..DriverConfig::default()
        };
        let json = config.to_json().unwrap();
        assert!(json.contains("\"trace\""));
        assert_eq!(DriverConfig::from_json(&json).unwrap(), config);
    }
}
