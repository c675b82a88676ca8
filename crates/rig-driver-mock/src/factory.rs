//! Building devices from configuration.
//!
//! Each simulated instrument has a [`DriverFactory`] keyed by the device
//! `kind` used in configuration files. A [`DriverRegistry`] maps kinds to
//! factories; [`build_device`] and [`build_all`] use one holding the three
//! mock drivers.
//!
//! ```toml
//! [[devices]]
//! id = "spec0"
//! kind = "spectrometer"
//!
//! [devices.parameters]
//! integration_time_ms = 50.0
//!
//! [devices.options]
//! pixels = 512
//! ```

use std::collections::BTreeMap;

use anyhow::{anyhow, bail, Context, Result};
use rig_core::{
    ControlSurface, Device, DeviceDefinition, DeviceProfile, DeviceSettings, HardwareBackend,
    RigConfig,
};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::mock_camera::{CameraProfile, MockCamera, MockCameraConfig};
use crate::mock_serial::{MockSerialConfig, MockSerialPort, SerialProfile};
use crate::mock_spectrometer::{MockSpectrometer, MockSpectrometerConfig, SpectrometerProfile};

/// Creates devices of one kind from a [`DeviceDefinition`].
pub trait DriverFactory: Send + Sync {
    /// Value of `kind` in configuration.
    fn driver_type(&self) -> &'static str;

    /// Human readable name.
    fn name(&self) -> &'static str;

    /// Check the backend options without building anything.
    fn validate(&self, definition: &DeviceDefinition) -> Result<()>;

    /// Build the device and preset its configured parameters.
    fn build(
        &self,
        definition: &DeviceDefinition,
        settings: DeviceSettings,
    ) -> Result<Box<dyn ControlSurface>>;
}

fn parse_options<T: DeserializeOwned>(definition: &DeviceDefinition) -> Result<T> {
    let options = serde_json::Value::Object(definition.options.clone().into_iter().collect());
    serde_json::from_value(options)
        .with_context(|| format!("invalid options for device '{}'", definition.id))
}

/// Create the device and apply configured initial values.
fn assemble<P, B>(
    definition: &DeviceDefinition,
    profile: P,
    backend: B,
    settings: DeviceSettings,
) -> Result<Box<dyn ControlSurface>>
where
    P: DeviceProfile,
    B: HardwareBackend,
{
    let device = Device::with_settings(definition.id.clone(), profile, backend, settings);
    for (name, value) in &definition.parameters {
        let stored = device.preset(name, value.clone()).with_context(|| {
            format!("invalid initial value for '{}' on device '{}'", name, definition.id)
        })?;
        debug!(device = %definition.id, param = %name, value = %stored, "Preset parameter");
    }
    Ok(Box::new(device))
}

/// Factory for [`MockSpectrometer`] devices.
pub struct MockSpectrometerFactory;

impl DriverFactory for MockSpectrometerFactory {
    fn driver_type(&self) -> &'static str {
        "spectrometer"
    }

    fn name(&self) -> &'static str {
        "Mock Spectrometer"
    }

    fn validate(&self, definition: &DeviceDefinition) -> Result<()> {
        let cfg: MockSpectrometerConfig = parse_options(definition)?;
        if cfg.pixels == 0 {
            bail!("spectrometer '{}' needs at least one pixel", definition.id);
        }
        if cfg.wavelength_end_nm <= cfg.wavelength_start_nm {
            bail!("spectrometer '{}' has an empty wavelength range", definition.id);
        }
        Ok(())
    }

    fn build(
        &self,
        definition: &DeviceDefinition,
        settings: DeviceSettings,
    ) -> Result<Box<dyn ControlSurface>> {
        self.validate(definition)?;
        let cfg: MockSpectrometerConfig = parse_options(definition)?;
        assemble(
            definition,
            SpectrometerProfile,
            MockSpectrometer::with_config(cfg),
            settings,
        )
    }
}

/// Factory for [`MockCamera`] devices.
pub struct MockCameraFactory;

impl DriverFactory for MockCameraFactory {
    fn driver_type(&self) -> &'static str {
        "camera"
    }

    fn name(&self) -> &'static str {
        "Mock Camera"
    }

    fn validate(&self, definition: &DeviceDefinition) -> Result<()> {
        let cfg: MockCameraConfig = parse_options(definition)?;
        if cfg.width == 0 || cfg.height == 0 {
            bail!("camera '{}' has an empty sensor", definition.id);
        }
        Ok(())
    }

    fn build(
        &self,
        definition: &DeviceDefinition,
        settings: DeviceSettings,
    ) -> Result<Box<dyn ControlSurface>> {
        self.validate(definition)?;
        let cfg: MockCameraConfig = parse_options(definition)?;
        assemble(definition, CameraProfile, MockCamera::with_config(cfg), settings)
    }
}

/// Factory for [`MockSerialPort`] devices.
pub struct MockSerialFactory;

impl DriverFactory for MockSerialFactory {
    fn driver_type(&self) -> &'static str {
        "serial"
    }

    fn name(&self) -> &'static str {
        "Mock Serial Utility"
    }

    fn validate(&self, definition: &DeviceDefinition) -> Result<()> {
        let _: MockSerialConfig = parse_options(definition)?;
        Ok(())
    }

    fn build(
        &self,
        definition: &DeviceDefinition,
        settings: DeviceSettings,
    ) -> Result<Box<dyn ControlSurface>> {
        let cfg: MockSerialConfig = parse_options(definition)?;
        assemble(definition, SerialProfile, MockSerialPort::with_config(cfg), settings)
    }
}

/// Maps device kinds to factories.
#[derive(Default)]
pub struct DriverRegistry {
    factories: BTreeMap<&'static str, Box<dyn DriverFactory>>,
}

impl DriverRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the spectrometer, camera and serial mock drivers.
    pub fn with_mock_drivers() -> Self {
        let mut registry = Self::new();
        registry.register_factory(Box::new(MockSpectrometerFactory));
        registry.register_factory(Box::new(MockCameraFactory));
        registry.register_factory(Box::new(MockSerialFactory));
        registry
    }

    /// Register a factory, replacing any previous one for the same kind.
    pub fn register_factory(&mut self, factory: Box<dyn DriverFactory>) {
        self.factories.insert(factory.driver_type(), factory);
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }

    /// Build `definition` with the factory registered for its kind.
    pub fn build(
        &self,
        definition: &DeviceDefinition,
        settings: DeviceSettings,
    ) -> Result<Box<dyn ControlSurface>> {
        let factory = self.factories.get(definition.kind.as_str()).ok_or_else(|| {
            anyhow!(
                "unknown device kind '{}' for device '{}' (known: {})",
                definition.kind,
                definition.id,
                self.kinds().join(", ")
            )
        })?;
        let device = factory.build(definition, settings)?;
        info!(device = %definition.id, driver = factory.name(), "Device created");
        Ok(device)
    }
}

/// Build one device with default runtime settings.
pub fn build_device(definition: &DeviceDefinition) -> Result<Box<dyn ControlSurface>> {
    build_device_with(definition, DeviceSettings::default())
}

/// Build one device with explicit runtime settings.
pub fn build_device_with(
    definition: &DeviceDefinition,
    settings: DeviceSettings,
) -> Result<Box<dyn ControlSurface>> {
    DriverRegistry::with_mock_drivers().build(definition, settings)
}

/// Validate `config` and build every device it declares, in order.
pub fn build_all(config: &RigConfig) -> Result<Vec<Box<dyn ControlSurface>>> {
    config.validate().context("invalid rig configuration")?;
    let registry = DriverRegistry::with_mock_drivers();
    let settings = config.acquisition.device_settings();
    config
        .devices
        .iter()
        .map(|definition| registry.build(definition, settings))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rig_core::ParamValue;
    use tracing_test::traced_test;

    #[test]
    fn builds_each_known_kind() {
        for kind in ["spectrometer", "camera", "serial"] {
            let device = build_device(&DeviceDefinition::new(format!("{}0", kind), kind)).unwrap();
            assert_eq!(device.kind(), kind);
            assert_eq!(device.current_state(), "DISCONNECTED");
        }
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let err = build_device(&DeviceDefinition::new("x", "oscilloscope")).err().unwrap();
        assert!(err.to_string().contains("unknown device kind"));
    }

    #[test]
    fn configured_parameters_are_preset() {
        let def = DeviceDefinition::new("spec0", "spectrometer")
            .with_parameter("integration_time_ms", 0.0)
            .with_parameter("trigger_mode", 3);
        let device = build_device(&def).unwrap();
        assert_eq!(device.get("integration_time_ms").unwrap(), ParamValue::Float(0.001));
        assert_eq!(device.get("trigger_mode").unwrap(), ParamValue::Int(3));
    }

    #[test]
    fn invalid_initial_value_names_the_parameter() {
        let def = DeviceDefinition::new("spec0", "spectrometer").with_parameter("trigger_mode", 9);
        let err = build_device(&def).err().unwrap();
        assert!(format!("{:#}", err).contains("trigger_mode"));
    }

    #[test]
    fn bad_options_are_reported() {
        let def = DeviceDefinition::new("cam0", "camera").with_option("width", "wide");
        let err = build_device(&def).err().unwrap();
        assert!(err.to_string().contains("cam0"));
    }

    #[test]
    #[traced_test]
    fn creation_is_logged() {
        build_device(&DeviceDefinition::new("ser0", "serial")).unwrap();
        assert!(logs_contain("Device created"));
        assert!(logs_contain("Mock Serial Utility"));
    }
}
