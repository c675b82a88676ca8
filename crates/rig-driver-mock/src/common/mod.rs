//! Common infrastructure for simulated instruments.
//!
//! - **errors**: error injection
//! - **hardware**: shared read prologue, scripting and lifecycle counters
//! - **rng**: seeded random number generator
//! - **timing**: instant vs realistic read delays
//! - **trigger**: external trigger gate released by the unblock hook

pub mod errors;
pub mod hardware;
pub mod rng;
pub mod timing;
pub mod trigger;

// Re-export commonly used types
pub use errors::{ErrorConfig, ErrorScenario};
pub use hardware::{LifecycleCounts, ReadKind, ScriptedRead, SimulatedHardware};
pub use rng::MockRng;
pub use timing::{MockMode, TimingConfig};
pub use trigger::{GateOutcome, TriggerGate};
