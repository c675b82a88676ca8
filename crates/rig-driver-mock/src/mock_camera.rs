//! Camera profile and simulated camera.
//!
//! The camera is addressed by `camera_id`, which must be chosen before
//! connecting. Connecting to an id that is not present on the simulated bus
//! leaves the device in CONNECTION_ERROR.

use std::time::Duration;

use parking_lot::Mutex;
use rig_core::{
    DeviceInfo, DeviceProfile, HardwareBackend, HardwareError, ImageFrame, Operation,
    ParameterSet, ParameterSpec, PixelBuffer, SamplePayload, StateRoles, TransitionTable,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::common::timing::millis;
use crate::common::{
    ErrorConfig, LifecycleCounts, MockMode, ReadKind, ScriptedRead, SimulatedHardware,
    TimingConfig,
};
use crate::pattern::{test_frame, to_mono8};

/// Camera state tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CameraState {
    /// No camera open.
    Disconnected,
    /// Open and idle.
    On,
    /// Frames are being grabbed.
    Capture,
    /// A grab failed.
    Fault,
    /// The last frame was black.
    Alarm,
    /// Opening the camera failed.
    ConnectionError,
}

impl std::fmt::Display for CameraState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            CameraState::Disconnected => "DISCONNECTED",
            CameraState::On => "ON",
            CameraState::Capture => "CAPTURE",
            CameraState::Fault => "FAULT",
            CameraState::Alarm => "ALARM",
            CameraState::ConnectionError => "CONNECTION_ERROR",
        };
        f.write_str(label)
    }
}

/// 8-bit monochrome.
pub const COLOR_MONO: i64 = 1;
/// 16-bit raw Bayer.
pub const COLOR_BAYER: i64 = 2;
/// 16-bit packed CbYCrY.
pub const COLOR_CBYCRY: i64 = 4;

/// Profile of the camera device type.
#[derive(Debug, Clone, Copy, Default)]
pub struct CameraProfile;

impl DeviceProfile for CameraProfile {
    type State = CameraState;

    fn kind(&self) -> &'static str {
        "camera"
    }

    fn roles(&self) -> StateRoles<CameraState> {
        StateRoles {
            disconnected: CameraState::Disconnected,
            on: CameraState::On,
            active: CameraState::Capture,
            fault: CameraState::Fault,
            alarm: CameraState::Alarm,
            connection_error: Some(CameraState::ConnectionError),
        }
    }

    fn transitions(&self) -> TransitionTable<CameraState> {
        use CameraState::*;
        use Operation::*;

        TransitionTable::builder()
            .register(Disconnected, [Connect, Disconnect, StopAcquisition])
            .register(ConnectionError, [Connect, Disconnect, StopAcquisition])
            .register(
                On,
                [StartAcquisition, CaptureOnce, StopAcquisition, Disconnect, SetBounds],
            )
            .register(Capture, [StopAcquisition])
            .register(Fault, [StopAcquisition, ResetFault, Disconnect])
            .register(Alarm, [StopAcquisition, ResetFault, Disconnect])
            .build()
    }

    fn parameters(&self) -> Vec<ParameterSpec<CameraState>> {
        let on = [CameraState::On];
        vec![
            ParameterSpec::new("camera_id", 0)
                .with_range(0.0, 255.0)
                .writable_in([CameraState::Disconnected, CameraState::ConnectionError]),
            ParameterSpec::new("color_mode", COLOR_MONO)
                .with_choices([COLOR_MONO, COLOR_BAYER, COLOR_CBYCRY])
                .writable_in(on),
            ParameterSpec::new("display_mode", 1)
                .with_choices([1, 4, 8])
                .writable_in(on),
            ParameterSpec::new("frame_rate", 1.0)
                .with_range(0.1, 30.0)
                .with_unit("Hz")
                .writable_in(on),
            ParameterSpec::new("exposure_ms", 3.0)
                .with_range(0.0, f64::INFINITY)
                .with_unit("ms")
                .writable_in(on),
        ]
    }
}

/// Configuration for [`MockCamera`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MockCameraConfig {
    /// Reported model name.
    pub model: String,
    /// Reported serial number.
    pub serial_number: String,
    /// Sensor width in pixels.
    pub width: u32,
    /// Sensor height in pixels.
    pub height: u32,
    /// Camera ids present on the simulated bus
    pub available_ids: Vec<i64>,
    /// Read timing.
    pub mode: MockMode,
    /// Fixed frame latency.
    pub read_latency_ms: Option<u64>,
    /// RNG seed for reproducible noise and errors.
    pub seed: Option<u64>,
}

impl Default for MockCameraConfig {
    fn default() -> Self {
        Self {
            model: "MOCK-CAM-640".to_string(),
            serial_number: "MC000001".to_string(),
            width: 640,
            height: 480,
            available_ids: vec![0],
            mode: MockMode::Instant,
            read_latency_ms: None,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Programmed {
    color_mode: i64,
    frame_rate: f64,
    exposure_ms: f64,
}

impl Default for Programmed {
    fn default() -> Self {
        Self {
            color_mode: COLOR_MONO,
            frame_rate: 1.0,
            exposure_ms: 3.0,
        }
    }
}

/// Simulated camera producing a moving test pattern.
#[derive(Debug)]
pub struct MockCamera {
    config: MockCameraConfig,
    hw: SimulatedHardware,
    programmed: Mutex<Programmed>,
    frames: Mutex<u64>,
}

impl MockCamera {
    /// Camera with the default configuration.
    pub fn new() -> Self {
        Self::with_config(MockCameraConfig::default())
    }

    /// Camera with an explicit configuration.
    pub fn with_config(config: MockCameraConfig) -> Self {
        let timing = TimingConfig {
            mode: config.mode,
            read_latency: config.read_latency_ms.map(Duration::from_millis),
        };
        let hw = SimulatedHardware::new("camera", timing, ErrorConfig::none(), config.seed);
        Self {
            config,
            hw,
            programmed: Mutex::new(Programmed::default()),
            frames: Mutex::new(0),
        }
    }

    /// Replace the error-injection policy.
    pub fn with_errors(mut self, errors: ErrorConfig) -> Self {
        self.hw.set_errors(errors);
        self
    }

    /// Configuration in use.
    pub fn config(&self) -> &MockCameraConfig {
        &self.config
    }

    /// Make the next `count` frames come back black.
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

    /// Error-injection policy.
    pub fn errors(&self) -> &ErrorConfig {
        self.hw.errors()
    }

    fn bits_per_pixel(color_mode: i64) -> u32 {
        if color_mode == COLOR_MONO {
            8
        } else {
            16
        }
    }

    fn frame_time(&self, params: &ParameterSet) -> Duration {
        let rate = params.get_f64("frame_rate").unwrap_or(1.0).max(0.1);
        let exposure = params.get_f64("exposure_ms").unwrap_or(0.0);
        millis((1000.0 / rate).max(exposure))
    }
}

impl Default for MockCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl HardwareBackend for MockCamera {
    type Handle = u64;

    fn acquire(&self, params: &ParameterSet) -> Result<u64, HardwareError> {
        let id = params.get_i64("camera_id").unwrap_or(0);
        if !self.config.available_ids.contains(&id) {
            warn!(camera_id = id, "No camera with this id on the bus");
            return Err(HardwareError::connection(format!("camera {} not found", id)));
        }
        self.hw.open()
    }

    fn release(&self, handle: &u64) {
        self.hw.close(*handle);
    }

    fn identify(&self, _handle: &u64) -> Result<DeviceInfo, HardwareError> {
        self.hw.check("identify")?;
        let color_mode = self.programmed.lock().color_mode;
        Ok(DeviceInfo::new(&self.config.model, &self.config.serial_number)
            .with_capability("sensor_size", vec![self.config.width, self.config.height])
            .with_capability("bits_per_pixel", Self::bits_per_pixel(color_mode)))
    }

    fn read_sample(&self, _handle: &u64, params: &ParameterSet) -> Result<SamplePayload, HardwareError> {
        let kind = self.hw.begin_read(self.frame_time(params), None)?;
        let (width, height) = (self.config.width, self.config.height);
        let color_mode = params.get_i64("color_mode").unwrap_or(COLOR_MONO);
        let len = width as usize * height as usize;

        let pixels = match (kind, color_mode == COLOR_MONO) {
            (ReadKind::Dark, true) => PixelBuffer::U8(vec![0; len]),
            (ReadKind::Dark, false) => PixelBuffer::U16(vec![0; len]),
            (ReadKind::Live, mono) => {
                let frame_num = {
                    let mut frames = self.frames.lock();
                    *frames += 1;
                    *frames
                };
                let frame = test_frame(width, height, frame_num);
                if mono {
                    PixelBuffer::U8(to_mono8(&frame))
                } else {
                    PixelBuffer::U16(frame)
                }
            }
        };
        Ok(SamplePayload::Image(ImageFrame {
            width,
            height,
            pixels,
        }))
    }

    fn apply_params(&self, _handle: &u64, params: &ParameterSet) -> Result<(), HardwareError> {
        self.hw.check("apply")?;
        let mut programmed = self.programmed.lock();
        if let Some(mode) = params.get_i64("color_mode") {
            programmed.color_mode = mode;
        }
        if let Some(rate) = params.get_f64("frame_rate") {
            programmed.frame_rate = rate;
        }
        if let Some(exposure) = params.get_f64("exposure_ms") {
            programmed.exposure_ms = exposure;
        }
        self.hw.note_applied();
        debug!(
            color_mode = programmed.color_mode,
            frame_rate = programmed.frame_rate,
            "Camera programmed"
        );
        Ok(())
    }

    fn unblock(&self, _handle: &u64) -> Result<(), HardwareError> {
        self.hw.unblock();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rig_core::{HardwareErrorKind, ParamValue};

    fn small() -> MockCamera {
        MockCamera::with_config(MockCameraConfig {
            width: 16,
            height: 8,
            seed: Some(3),
            ..Default::default()
        })
    }

    #[test]
    fn camera_id_clamps_to_byte_range() {
        let spec = CameraProfile
            .parameters()
            .into_iter()
            .find(|p| p.name == "camera_id")
            .unwrap();
        assert_eq!(spec.validate(ParamValue::Int(300)).ok(), Some(ParamValue::Int(255)));
        assert_eq!(spec.validate(ParamValue::Int(-4)).ok(), Some(ParamValue::Int(0)));
    }

    #[test]
    fn color_mode_is_strict() {
        let spec = CameraProfile
            .parameters()
            .into_iter()
            .find(|p| p.name == "color_mode")
            .unwrap();
        assert!(spec.validate(ParamValue::Int(3)).is_err());
        assert!(spec.validate(ParamValue::Int(COLOR_BAYER)).is_ok());
    }

    #[test]
    fn unknown_camera_id_fails_to_acquire() {
        let cam = small();
        let err = cam
            .acquire(&ParameterSet::new().with("camera_id", 7))
            .unwrap_err();
        assert_eq!(err.kind, HardwareErrorKind::Connection);
        assert_eq!(cam.counts().acquired, 0);
    }

    #[test]
    fn mono_frames_are_eight_bit() {
        let cam = small();
        let handle = cam.acquire(&ParameterSet::new()).unwrap();
        let params = ParameterSet::new().with("color_mode", COLOR_MONO);
        match cam.read_sample(&handle, &params).unwrap() {
            SamplePayload::Image(frame) => {
                assert_eq!((frame.width, frame.height), (16, 8));
                assert!(matches!(frame.pixels, PixelBuffer::U8(ref p) if p.len() == 128));
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn dark_frame_is_implausible() {
        let cam = small();
        let handle = cam.acquire(&ParameterSet::new()).unwrap();
        let params = ParameterSet::new().with("color_mode", COLOR_BAYER);
        cam.script_dark(1);
        let dark = cam.read_sample(&handle, &params).unwrap();
        assert!(!CameraProfile.is_plausible(&dark, &ParameterSet::new()));
        let live = cam.read_sample(&handle, &params).unwrap();
        assert!(CameraProfile.is_plausible(&live, &ParameterSet::new()));
    }
}
