//! Measurement data produced by the acquisition worker.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw pixel storage of an image frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PixelBuffer {
    /// 8-bit pixels.
    U8(Vec<u8>),
    /// 16-bit pixels.
    U16(Vec<u16>),
}

impl PixelBuffer {
    /// Number of pixels.
    pub fn len(&self) -> usize {
        match self {
            PixelBuffer::U8(p) => p.len(),
            PixelBuffer::U16(p) => p.len(),
        }
    }

    /// Whether the buffer holds no pixels.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn any_lit(&self) -> bool {
        match self {
            PixelBuffer::U8(p) => p.iter().any(|&v| v != 0),
            PixelBuffer::U16(p) => p.iter().any(|&v| v != 0),
        }
    }
}

/// One camera frame, row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageFrame {
    /// Columns.
    pub width: u32,
    /// Rows.
    pub height: u32,
    /// `width * height` pixels.
    pub pixels: PixelBuffer,
}

/// Payload of one reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum SamplePayload {
    /// Single value, e.g. a serial reply parsed as a number.
    Scalar(f64),
    /// One intensity per pixel.
    Spectrum(Vec<f64>),
    /// Camera frame.
    Image(ImageFrame),
    /// Raw text reply.
    Text(String),
}

impl SamplePayload {
    /// Default plausibility rule.
    ///
    /// A reading is degenerate when it holds no non-zero finite value (all
    /// dark spectrum, black frame, zero scalar) or, for text, when it is empty.
    pub fn is_plausible(&self) -> bool {
        match self {
            SamplePayload::Scalar(v) => v.is_finite() && *v != 0.0,
            SamplePayload::Spectrum(values) => values.iter().any(|v| v.is_finite() && *v != 0.0),
            SamplePayload::Image(frame) => frame.pixels.any_lit(),
            SamplePayload::Text(text) => !text.is_empty(),
        }
    }
}

/// One published measurement. Built only by the worker, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Name of the producing device.
    pub device: String,
    /// Starts at 1 per device and keeps counting across start/stop cycles.
    pub sequence: u64,
    /// Time the reading completed.
    pub timestamp: DateTime<Utc>,
    /// The reading.
    pub payload: SamplePayload,
}

impl Sample {
    /// Sample stamped with the current time.
    pub fn new(device: impl Into<String>, sequence: u64, payload: SamplePayload) -> Self {
        Self {
            device: device.into(),
            sequence,
            timestamp: Utc::now(),
            payload,
        }
    }
}

/// Identity metadata read back from the hardware on connect.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Model name reported by the hardware.
    pub model: String,
    /// Serial number reported by the hardware.
    pub serial_number: String,
    /// Free-form capabilities, e.g. pixel count or sensor size.
    #[serde(default)]
    pub capabilities: BTreeMap<String, serde_json::Value>,
}

impl DeviceInfo {
    /// Identity without capabilities.
    pub fn new(model: impl Into<String>, serial_number: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            serial_number: serial_number.into(),
            capabilities: BTreeMap::new(),
        }
    }

    /// Add one capability entry.
    pub fn with_capability(
        mut self,
        name: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.capabilities.insert(name.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dark_spectrum_is_degenerate() {
        assert!(!SamplePayload::Spectrum(vec![0.0; 16]).is_plausible());
        assert!(!SamplePayload::Spectrum(vec![f64::NAN, 0.0]).is_plausible());
        assert!(SamplePayload::Spectrum(vec![0.0, 3.5]).is_plausible());
    }

    #[test]
    fn black_frame_is_degenerate() {
        let black = ImageFrame {
            width: 2,
            height: 2,
            pixels: PixelBuffer::U16(vec![0; 4]),
        };
        assert!(!SamplePayload::Image(black).is_plausible());

        let lit = ImageFrame {
            width: 2,
            height: 1,
            pixels: PixelBuffer::U8(vec![0, 9]),
        };
        assert!(SamplePayload::Image(lit).is_plausible());
    }

    #[test]
    fn empty_reply_is_degenerate() {
        assert!(!SamplePayload::Text(String::new()).is_plausible());
        assert!(SamplePayload::Text("OK".into()).is_plausible());
    }

    #[test]
    fn sample_serializes_with_tagged_payload() {
        let sample = Sample::new("spec-1", 1, SamplePayload::Scalar(2.5));
        let json = serde_json::to_value(&sample).unwrap();
        assert_eq!(json["sequence"], 1);
        assert_eq!(json["payload"]["type"], "scalar");
        assert_eq!(json["payload"]["data"], 2.5);
    }

    #[test]
    fn device_info_capabilities() {
        let info = DeviceInfo::new("HR4000", "HR4C1234").with_capability("pixels", 3648);
        assert_eq!(info.capabilities["pixels"], 3648);
    }
}
