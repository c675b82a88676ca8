//! Spectrometer profile and simulated spectrometer.

use std::time::Duration;

use parking_lot::Mutex;
use rig_core::{
    DeviceInfo, DeviceProfile, HardwareBackend, HardwareError, Operation, ParameterSet,
    ParameterSpec, SamplePayload, StateRoles, TransitionTable,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::common::timing::millis;
use crate::common::{
    ErrorConfig, LifecycleCounts, MockMode, ReadKind, ScriptedRead, SimulatedHardware,
    TimingConfig,
};
use crate::pattern::{emission_spectrum, wavelength_axis};

// =============================================================================
// Profile
// =============================================================================

/// Spectrometer state tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpectrometerState {
    /// No spectrometer open.
    Disconnected,
    /// Open and idle.
    On,
    /// Spectra are being read.
    Measuring,
    /// A read failed.
    Fault,
    /// The last spectrum was dark, or no background is stored for CUSTOM correction.
    Alarm,
}

impl std::fmt::Display for SpectrometerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SpectrometerState::Disconnected => "DISCONNECTED",
            SpectrometerState::On => "ON",
            SpectrometerState::Measuring => "MEASURING",
            SpectrometerState::Fault => "FAULT",
            SpectrometerState::Alarm => "ALARM",
        };
        f.write_str(label)
    }
}

/// Trigger modes 1..=4 wait for an external trigger; 0 free-runs.
pub const TRIGGER_MODES: [i64; 5] = [0, 1, 2, 3, 4];

/// `AUTO` uses the detector's dark pixels, `CUSTOM` subtracts
/// `custom_background_intensity`.
pub const BACKGROUND_MODES: [&str; 3] = ["NONE", "AUTO", "CUSTOM"];

/// Profile of the spectrometer device type.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpectrometerProfile;

impl DeviceProfile for SpectrometerProfile {
    type State = SpectrometerState;

    fn kind(&self) -> &'static str {
        "spectrometer"
    }

    fn roles(&self) -> StateRoles<SpectrometerState> {
        StateRoles {
            disconnected: SpectrometerState::Disconnected,
            on: SpectrometerState::On,
            active: SpectrometerState::Measuring,
            fault: SpectrometerState::Fault,
            alarm: SpectrometerState::Alarm,
            connection_error: None,
        }
    }

    fn transitions(&self) -> TransitionTable<SpectrometerState> {
        use Operation::*;
        use SpectrometerState::*;

        TransitionTable::builder()
            .register(Disconnected, [Connect, Disconnect, StopAcquisition])
            .register(
                On,
                [StartAcquisition, CaptureOnce, Disconnect, StopAcquisition, SetBounds],
            )
            .register(Measuring, [StopAcquisition])
            .register(Fault, [StopAcquisition, ResetFault, Disconnect])
            .register(Alarm, [StopAcquisition, ResetFault, Disconnect])
            .build()
    }

    fn parameters(&self) -> Vec<ParameterSpec<SpectrometerState>> {
        let on = [SpectrometerState::On];
        vec![
            ParameterSpec::new("integration_time_ms", 1000.0)
                .with_range(0.001, f64::INFINITY)
                .with_unit("ms")
                .writable_in(on),
            ParameterSpec::new("trigger_mode", 0)
                .with_choices(TRIGGER_MODES)
                .writable_in(on),
            ParameterSpec::new("background_correction", "NONE")
                .with_choices(BACKGROUND_MODES)
                .writable_in(on),
            ParameterSpec::new("nonlinearity_correction", false).writable_in(on),
            ParameterSpec::new("custom_background_intensity", Vec::<f64>::new()).writable_in(on),
        ]
    }

    /// Custom correction without a stored background cannot produce a usable
    /// spectrum.
    fn is_plausible(&self, payload: &SamplePayload, settings: &ParameterSet) -> bool {
        let custom = settings.get_str("background_correction") == Some("CUSTOM");
        let stored = settings
            .get_list("custom_background_intensity")
            .is_some_and(|bg| !bg.is_empty());
        if custom && !stored {
            warn!("No background stored for custom background correction");
            return false;
        }
        payload.is_plausible()
    }
}

// =============================================================================
// MockSpectrometer
// =============================================================================

/// Configuration for [`MockSpectrometer`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MockSpectrometerConfig {
    /// Reported model name.
    pub model: String,
    /// Reported serial number.
    pub serial_number: String,
    /// Detector pixel count.
    pub pixels: usize,
    /// Wavelength of the first pixel.
    pub wavelength_start_nm: f64,
    /// Wavelength of the last pixel.
    pub wavelength_end_nm: f64,
    /// Centre of the simulated emission line
    pub peak_nm: f64,
    /// Read timing.
    pub mode: MockMode,
    /// Fixed read latency overriding the integration time
    pub read_latency_ms: Option<u64>,
    /// RNG seed for reproducible noise and errors.
    pub seed: Option<u64>,
}

impl Default for MockSpectrometerConfig {
    fn default() -> Self {
        Self {
            model: "MOCK-SPEC-2048".to_string(),
            serial_number: "MS000001".to_string(),
            pixels: 2048,
            wavelength_start_nm: 200.0,
            wavelength_end_nm: 1100.0,
            peak_nm: 650.0,
            mode: MockMode::Instant,
            read_latency_ms: None,
            seed: None,
        }
    }
}

impl MockSpectrometerConfig {
    fn timing(&self) -> TimingConfig {
        TimingConfig {
            mode: self.mode,
            read_latency: self.read_latency_ms.map(Duration::from_millis),
        }
    }
}

/// Settings currently programmed into the simulated device.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrometerHardwareState {
    /// Programmed trigger mode.
    pub trigger_mode: i64,
    /// Programmed integration time.
    pub integration_time_ms: f64,
    /// NONE, AUTO or CUSTOM.
    pub background_correction: String,
    /// Whether nonlinearity correction is on.
    pub nonlinearity_correction: bool,
    /// Length of the stored custom background, 0 when none.
    pub background_pixels: usize,
}

impl Default for SpectrometerHardwareState {
    fn default() -> Self {
        Self {
            trigger_mode: 0,
            integration_time_ms: 1000.0,
            background_correction: "NONE".to_string(),
            nonlinearity_correction: false,
            background_pixels: 0,
        }
    }
}

/// Simulated spectrometer with an external trigger input.
#[derive(Debug)]
pub struct MockSpectrometer {
    config: MockSpectrometerConfig,
    wavelengths: Vec<f64>,
    hw: SimulatedHardware,
    programmed: Mutex<SpectrometerHardwareState>,
}

impl MockSpectrometer {
    /// Spectrometer with the default configuration.
    pub fn new() -> Self {
        Self::with_config(MockSpectrometerConfig::default())
    }

    /// Spectrometer with an explicit configuration.
    pub fn with_config(config: MockSpectrometerConfig) -> Self {
        let wavelengths = wavelength_axis(
            config.pixels,
            config.wavelength_start_nm,
            config.wavelength_end_nm,
        );
        let hw = SimulatedHardware::new(
            "spectrometer",
            config.timing(),
            ErrorConfig::none(),
            config.seed,
        );
        Self {
            config,
            wavelengths,
            hw,
            programmed: Mutex::new(SpectrometerHardwareState::default()),
        }
    }

    /// Replace the error-injection policy.
    pub fn with_errors(mut self, errors: ErrorConfig) -> Self {
        self.hw.set_errors(errors);
        self
    }

    /// Configuration in use.
    pub fn config(&self) -> &MockSpectrometerConfig {
        &self.config
    }

    /// Deliver one external trigger pulse.
    pub fn fire_trigger(&self) {
        self.hw.gate().fire();
    }

    /// Make the next `count` reads return an all-dark spectrum.
    pub fn script_dark(&self, count: usize) {
        self.hw.script(std::iter::repeat(ScriptedRead::Dark).take(count));
    }

    /// Queue outcomes for the next reads.
    pub fn script(&self, reads: impl IntoIterator<Item = ScriptedRead>) {
        self.hw.script(reads);
    }

    /// Lifecycle counters.
    pub fn counts(&self) -> LifecycleCounts {
        self.hw.counts()
    }

    /// Settings last pushed by `apply_params`.
    pub fn programmed(&self) -> SpectrometerHardwareState {
        self.programmed.lock().clone()
    }

    /// Error-injection policy.
    pub fn errors(&self) -> &ErrorConfig {
        self.hw.errors()
    }

    fn check_background(&self, background: &[f64]) -> Result<(), HardwareError> {
        if background.is_empty() || background.len() == self.wavelengths.len() {
            Ok(())
        } else {
            Err(HardwareError::configuration(format!(
                "background has {} values, detector has {} pixels",
                background.len(),
                self.wavelengths.len()
            )))
        }
    }
}

impl Default for MockSpectrometer {
    fn default() -> Self {
        Self::new()
    }
}

impl HardwareBackend for MockSpectrometer {
    type Handle = u64;

    fn acquire(&self, _params: &ParameterSet) -> Result<u64, HardwareError> {
        self.hw.open()
    }

    fn release(&self, handle: &u64) {
        self.hw.close(*handle);
    }

    fn identify(&self, _handle: &u64) -> Result<DeviceInfo, HardwareError> {
        self.hw.check("identify")?;
        Ok(DeviceInfo::new(&self.config.model, &self.config.serial_number)
            .with_capability("pixels", self.config.pixels)
            .with_capability(
                "wavelength_range_nm",
                vec![self.config.wavelength_start_nm, self.config.wavelength_end_nm],
            ))
    }

    fn read_sample(&self, _handle: &u64, params: &ParameterSet) -> Result<SamplePayload, HardwareError> {
        let integration_ms = params.get_f64("integration_time_ms").unwrap_or(1000.0);
        let kind = self.hw.begin_read(millis(integration_ms), None)?;

        if kind == ReadKind::Dark {
            return Ok(SamplePayload::Spectrum(vec![0.0; self.wavelengths.len()]));
        }

        let baseline = match params.get_str("background_correction") {
            Some("AUTO") => 0.5,
            _ => 100.0,
        };
        let rng = self.hw.rng();
        let mut spectrum = emission_spectrum(
            &self.wavelengths,
            self.config.peak_nm,
            integration_ms,
            baseline,
            || rng.noise(1.0),
        );

        if params.get_str("background_correction") == Some("CUSTOM") {
            let background = params.get_list("custom_background_intensity").unwrap_or(&[]);
            self.check_background(background)?;
            for (value, bg) in spectrum.iter_mut().zip(background) {
                *value -= bg;
            }
        }
        Ok(SamplePayload::Spectrum(spectrum))
    }

    fn apply_params(&self, _handle: &u64, params: &ParameterSet) -> Result<(), HardwareError> {
        self.hw.check("apply")?;

        let mut programmed = self.programmed.lock();
        if let Some(mode) = params.get_i64("trigger_mode") {
            if !TRIGGER_MODES.contains(&mode) {
                return Err(HardwareError::configuration(format!(
                    "unsupported trigger mode {}",
                    mode
                )));
            }
            programmed.trigger_mode = mode;
        }
        if let Some(ms) = params.get_f64("integration_time_ms") {
            programmed.integration_time_ms = ms;
        }
        if let Some(bg) = params.get_str("background_correction") {
            programmed.background_correction = bg.to_string();
        }
        if let Some(nl) = params.get_bool("nonlinearity_correction") {
            programmed.nonlinearity_correction = nl;
        }
        if let Some(background) = params.get_list("custom_background_intensity") {
            self.check_background(background)?;
            programmed.background_pixels = background.len();
        }
        self.hw.gate().set_external(programmed.trigger_mode != 0);
        self.hw.note_applied();
        debug!(
            trigger_mode = programmed.trigger_mode,
            integration_ms = programmed.integration_time_ms,
            "Spectrometer programmed"
        );
        Ok(())
    }

    fn unblock(&self, _handle: &u64) -> Result<(), HardwareError> {
        {
            let mut programmed = self.programmed.lock();
            programmed.trigger_mode = 0;
            programmed.integration_time_ms = 1.0;
        }
        self.hw.unblock();
        Ok(())
    }
}
