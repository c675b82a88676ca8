//! Timing of simulated reads.
//!
//! - **Instant**: no delays, for unit tests
//! - **Realistic**: reads take as long as the hardware would (integration
//!   time, frame period, serial round trip)
//!
//! A fixed `read_latency` overrides both.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How long simulated reads take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MockMode {
    /// No delay.
    #[default]
    Instant,
    /// Sleep for the exposure or integration time.
    Realistic,
}

/// Read timing of one simulated instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimingConfig {
    /// Instant or realistic timing.
    pub mode: MockMode,
    /// Fixed latency overriding `mode`.
    pub read_latency: Option<Duration>,
}

impl TimingConfig {
    /// No delay.
    pub fn instant() -> Self {
        Self::default()
    }

    /// Delay by the configured exposure.
    pub fn realistic() -> Self {
        Self {
            mode: MockMode::Realistic,
            read_latency: None,
        }
    }

    /// Constant delay per read.
    pub fn fixed(latency: Duration) -> Self {
        Self {
            mode: MockMode::Instant,
            read_latency: Some(latency),
        }
    }

    /// Delay of one read whose hardware duration would be `hardware`.
    pub fn read_delay(&self, hardware: Duration) -> Duration {
        match (self.read_latency, self.mode) {
            (Some(fixed), _) => fixed,
            (None, MockMode::Realistic) => hardware,
            (None, MockMode::Instant) => Duration::ZERO,
        }
    }
}

/// Convert a millisecond setting to a `Duration`, treating bad values as zero.
pub fn millis(ms: f64) -> Duration {
    if ms.is_finite() && ms > 0.0 {
        Duration::from_secs_f64(ms / 1000.0)
    } else {
        Duration::ZERO
    }
}
