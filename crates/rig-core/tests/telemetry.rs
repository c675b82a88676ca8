//! Global subscriber installation. Kept in its own test binary because
//! it installs a process-wide subscriber.

use rig_core::config::RigConfig;
use rig_core::telemetry::{self, OutputFormat, TracingConfig};
use serial_test::serial;
use tracing::Level;

#[test]
#[serial]
fn init_is_idempotent() {
    let config = TracingConfig::new(Level::INFO).with_format(OutputFormat::Compact);
    assert!(telemetry::init(config.clone()).is_ok());
    assert!(telemetry::init(config).is_ok());
}

#[test]
#[serial]
fn init_from_config_rejects_unknown_level() {
    let mut config = RigConfig::default();
    config.logging.level = "chatty".into();
    assert!(telemetry::init_from_config(&config).is_err());

    config.logging.level = "debug".into();
    config.logging.format = "json".into();
    assert!(telemetry::init_from_config(&config).is_ok());
}
