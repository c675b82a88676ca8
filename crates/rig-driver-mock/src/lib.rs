//! Simulated instruments for rig-core
//!
//! This crate provides device profiles plus simulated hardware backends, so
//! the whole device lifecycle can be exercised without physical hardware.
//! Reads block the worker thread (`std::thread`), the same way a vendor SDK
//! call would.
//!
//! # Available Devices
//!
//! - [`SpectrometerProfile`] + [`MockSpectrometer`] - emission-line spectra,
//!   external trigger modes
//! - [`CameraProfile`] + [`MockCamera`] - moving test pattern, camera id
//!   lookup with CONNECTION_ERROR on miss
//! - [`SerialProfile`] + [`MockSerialPort`] - canned command replies and the
//!   `execute_instruction` custom operation
//!
//! Every backend supports scripted dark readings, error injection
//! ([`ErrorConfig`]) and lifecycle counters for checking that handles are
//! released exactly once.
//!
//! # Building From Configuration
//!
//! ```rust,ignore
//! use rig_core::RigConfig;
//! use rig_driver_mock::build_all;
//!
//! let config = RigConfig::load_from("rig.toml")?;
//! for device in build_all(&config)? {
//!     device.connect()?;
//! }
//! ```

pub mod common;
pub mod factory;
mod mock_camera;
mod mock_serial;
mod mock_spectrometer;
pub mod pattern;

// Re-export common types
pub use common::{
    ErrorConfig, ErrorScenario, LifecycleCounts, MockMode, MockRng, ScriptedRead, TimingConfig,
};

// Re-export device types
pub use mock_camera::{
    CameraProfile, CameraState, MockCamera, MockCameraConfig, COLOR_BAYER, COLOR_CBYCRY,
    COLOR_MONO,
};
pub use mock_serial::{
    MockSerialConfig, MockSerialPort, SerialDeviceExt, SerialProfile, SerialState,
    SerialTransport, BAUD_RATES, EXECUTE_INSTRUCTION,
};
pub use mock_spectrometer::{
    MockSpectrometer, MockSpectrometerConfig, SpectrometerHardwareState, SpectrometerProfile,
    SpectrometerState, BACKGROUND_MODES, TRIGGER_MODES,
};

pub use factory::{
    build_all, build_device, build_device_with, DriverFactory, DriverRegistry,
    MockCameraFactory, MockSerialFactory, MockSpectrometerFactory,
};

/// Device type aliases for the simulated instruments.
pub type MockSpectrometerDevice = rig_core::Device<SpectrometerProfile, MockSpectrometer>;
/// Simulated camera device.
pub type MockCameraDevice = rig_core::Device<CameraProfile, MockCamera>;
/// Simulated serial device.
pub type MockSerialDevice = rig_core::Device<SerialProfile, MockSerialPort>;
