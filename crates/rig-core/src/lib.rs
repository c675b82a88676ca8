//! `rig-core`
//!
//! Guarded device state machines coupled to cancellable acquisition loops.
//!
//! Instrument drivers (spectrometers, cameras, serial devices) share one
//! pattern: a closed set of device states gates which operations are legal,
//! and a background loop repeatedly pulls data from a blocking hardware call,
//! publishes it, and reacts to errors or implausible readings by changing
//! state. This crate implements that pattern once.
//!
//! ## Components
//!
//! - [`StateMachine`]: current state tag plus per-state operation allow-lists
//! - [`ParameterGuard`]: clamps or rejects writes against declared bounds and
//!   the states in which each parameter may be written
//! - [`DeviceSession`]: acquires the hardware handle on connect and releases
//!   it exactly once
//! - acquisition worker: one cancellable thread per session, classifying each
//!   reading as valid, degenerate (ALARM) or failed (FAULT)
//! - [`EventBus`]: best-effort, in-order delivery of samples to subscribers
//!
//! [`Device`] composes these for one instrument, driven by a
//! [`DeviceProfile`] and a [`HardwareBackend`]. [`ControlSurface`] is the
//! object-safe view a transport layer holds.
//!
//! ## Lifecycle
//!
//! ```text
//! DISCONNECTED ──connect──▶ ON ──start──▶ <active> ──stop──▶ ON
//!                                            │
//!                         degenerate reading ├──▶ ALARM (loop continues)
//!                             hardware error └──▶ FAULT (loop ends)
//!                                                   │
//!                                      reset_fault ─┴──▶ ON
//! ```

pub mod acquisition;
pub mod config;
pub mod device;
pub mod error;
pub mod events;
pub mod limits;
pub mod parameter;
pub mod sample;
pub mod session;
pub mod state;
pub mod telemetry;

// Re-export commonly used types
pub use acquisition::{CancellationToken, WorkerExit};
pub use config::{AcquisitionConfig, DeviceDefinition, LoggingConfig, RigConfig};
pub use device::{ControlSurface, Device, DeviceProfile, DeviceSettings};
pub use error::{HardwareError, HardwareErrorKind, RigError, RigResult};
pub use events::{EventBus, SubscriptionId};
pub use parameter::{Bounds, OutOfBounds, ParamKind, ParamValue, ParameterGuard, ParameterSet, ParameterSpec};
pub use sample::{DeviceInfo, ImageFrame, PixelBuffer, Sample, SamplePayload};
pub use session::{DeviceSession, HandleGuard, HardwareBackend};
pub use state::{Operation, StateMachine, StateRoles, StateTag, TransitionTable};
