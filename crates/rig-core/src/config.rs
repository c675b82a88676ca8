//! Rig configuration using Figment.
//!
//! Configuration is loaded from:
//! 1. a TOML file (base configuration)
//! 2. environment variables prefixed with `RIG_`, split on `__`
//!
//! ```toml
//! [logging]
//! level = "debug"
//! format = "compact"
//!
//! [acquisition]
//! join_timeout = "2s"
//! event_channel_capacity = 128
//!
//! [[devices]]
//! id = "spec-1"
//! kind = "spectrometer"
//! [devices.parameters]
//! integration_time_ms = 20.0
//! trigger_mode = 0
//! ```
//!
//! # Example
//! ```no_run
//! use rig_core::config::RigConfig;
//!
//! # fn main() -> Result<(), rig_core::RigError> {
//! let config = RigConfig::load_from("config/rig.toml")?;
//! config.validate()?;
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::device::DeviceSettings;
use crate::error::{RigError, RigResult};
use crate::limits::{DEFAULT_EVENT_CHANNEL_CAPACITY, DEFAULT_JOIN_TIMEOUT};
use crate::parameter::{ParamValue, ParameterSet};

/// Device kinds a configuration may name.
pub const KNOWN_DEVICE_KINDS: [&str; 3] = ["spectrometer", "camera", "serial"];

/// Top-level rig configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RigConfig {
    /// Log level and format.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Worker timeouts and channel sizing.
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    /// Devices to build.
    #[serde(default)]
    pub devices: Vec<DeviceDefinition>,
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error
    #[serde(default = "default_log_level")]
    pub level: String,
    /// pretty, compact or json
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// `[acquisition]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Upper bound on how long stop waits for the worker.
    #[serde(default = "default_join_timeout", with = "humantime_serde")]
    pub join_timeout: Duration,
    /// Capacity of buffered sample subscriptions.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            join_timeout: default_join_timeout(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

impl AcquisitionConfig {
    /// Runtime settings for every built device.
    pub fn device_settings(&self) -> DeviceSettings {
        DeviceSettings {
            join_timeout: self.join_timeout,
            event_channel_capacity: self.event_channel_capacity,
        }
    }
}

/// One device to build at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDefinition {
    /// Unique device identifier
    pub id: String,
    /// spectrometer, camera or serial
    pub kind: String,
    /// Initial parameter values, applied with `preset`
    #[serde(default)]
    pub parameters: BTreeMap<String, ParamValue>,
    /// Backend specific options, interpreted by the driver factory
    #[serde(default)]
    pub options: BTreeMap<String, serde_json::Value>,
}

impl DeviceDefinition {
    /// Definition without parameters or options.
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            parameters: BTreeMap::new(),
            options: BTreeMap::new(),
        }
    }

    /// Add an initial parameter value.
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Add a backend option.
    pub fn with_option(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.options.insert(name.into(), value.into());
        self
    }

    /// Initial parameters as a [`ParameterSet`].
    pub fn parameter_set(&self) -> ParameterSet {
        self.parameters
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_join_timeout() -> Duration {
    DEFAULT_JOIN_TIMEOUT
}

fn default_event_channel_capacity() -> usize {
    DEFAULT_EVENT_CHANNEL_CAPACITY
}

impl RigConfig {
    /// Figment with defaults, the given TOML file and `RIG_` environment
    /// overrides, e.g. `RIG_LOGGING__LEVEL=debug`.
    pub fn figment<P: AsRef<Path>>(path: P) -> Figment {
        Figment::from(Serialized::defaults(RigConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("RIG_").split("__"))
    }

    /// Load from `path` with environment overrides.
    pub fn load_from<P: AsRef<Path>>(path: P) -> RigResult<Self> {
        Ok(Self::figment(path).extract()?)
    }

    /// Parse a TOML document without consulting the environment.
    pub fn from_toml_str(toml: &str) -> RigResult<Self> {
        Ok(Figment::from(Serialized::defaults(RigConfig::default()))
            .merge(Toml::string(toml))
            .extract()?)
    }

    /// Check values that serde cannot, such as log level and duplicate ids.
    pub fn validate(&self) -> RigResult<()> {
        crate::telemetry::parse_log_level(&self.logging.level)?;
        self.logging
            .format
            .parse::<crate::telemetry::OutputFormat>()?;

        if self.acquisition.join_timeout.is_zero() {
            return Err(RigError::Configuration(
                "acquisition.join_timeout must be greater than zero".to_string(),
            ));
        }
        if self.acquisition.event_channel_capacity == 0 {
            return Err(RigError::Configuration(
                "acquisition.event_channel_capacity must be at least 1".to_string(),
            ));
        }

        let mut ids = HashSet::new();
        for device in &self.devices {
            if !KNOWN_DEVICE_KINDS.contains(&device.kind.as_str()) {
                return Err(RigError::Configuration(format!(
                    "Device '{}' has unknown kind '{}'. Must be one of: {}",
                    device.id,
                    device.kind,
                    KNOWN_DEVICE_KINDS.join(", ")
                )));
            }
            if !ids.insert(&device.id) {
                return Err(RigError::Configuration(format!(
                    "Duplicate device ID: {}",
                    device.id
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    const SAMPLE: &str = r#"
[logging]
level = "debug"
format = "json"

[acquisition]
join_timeout = "250ms"

[[devices]]
id = "spec-1"
kind = "spectrometer"

[devices.parameters]
integration_time_ms = 20.0
trigger_mode = 1

[[devices]]
id = "cam-1"
kind = "camera"

[devices.options]
width = 64
"#;

    #[test]
    fn parses_full_document() {
        let config = RigConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.acquisition.join_timeout, Duration::from_millis(250));
        assert_eq!(
            config.acquisition.event_channel_capacity,
            DEFAULT_EVENT_CHANNEL_CAPACITY
        );
        assert_eq!(config.devices.len(), 2);

        let params = config.devices[0].parameter_set();
        assert_eq!(params.get("integration_time_ms"), Some(&ParamValue::Float(20.0)));
        assert_eq!(params.get("trigger_mode"), Some(&ParamValue::Int(1)));
        assert!(config.devices[1].parameters.is_empty());
        assert_eq!(config.devices[1].options["width"], 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_document_uses_defaults() {
        let config = RigConfig::from_toml_str("").unwrap();
        assert_eq!(config, RigConfig::default());
        assert_eq!(config.acquisition.join_timeout, Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = RigConfig::default();
        config.logging.level = "loud".into();
        assert!(config.validate().is_err());

        let mut config = RigConfig::default();
        config.devices.push(DeviceDefinition::new("x", "oscilloscope"));
        assert!(config.validate().is_err());

        let mut config = RigConfig::default();
        config.devices.push(DeviceDefinition::new("x", "camera"));
        config.devices.push(DeviceDefinition::new("x", "serial"));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate device ID"));
    }

    #[test]
    #[serial]
    fn environment_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        std::env::set_var("RIG_LOGGING__LEVEL", "warn");
        let config = RigConfig::load_from(file.path());
        std::env::remove_var("RIG_LOGGING__LEVEL");

        let config = config.unwrap();
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    #[serial]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = RigConfig::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.logging.level, "info");
    }
}
