//! Error types for rig devices.
//!
//! Two layers of errors exist:
//!
//! - **`HardwareError`** is what a [`HardwareBackend`](crate::session::HardwareBackend)
//!   returns. It carries a coarse [`HardwareErrorKind`] plus a human readable
//!   message and never knows about device states.
//! - **`RigError`** is what the control surface of a device returns. Guard
//!   violations, parameter validation failures and lifecycle problems are all
//!   expressed here, and hardware failures are wrapped into the matching
//!   variant (`Connection`, `Configuration` or `Hardware`).
//!
//! Errors that happen inside the acquisition worker never reach a caller
//! directly. They are logged and surfaced as state changes (FAULT or ALARM).

use std::time::Duration;

use thiserror::Error;

// =============================================================================
// Hardware Errors
// =============================================================================

/// Coarse classification of a hardware failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareErrorKind {
    /// The handle could not be acquired or was lost.
    Connection,
    /// The hardware refused a setting.
    Configuration,
    /// A transfer failed or returned garbage.
    Communication,
    /// The instrument reported an internal fault.
    Hardware,
    /// No answer within the expected time.
    Timeout,
    /// Anything else.
    Unknown,
}

impl std::fmt::Display for HardwareErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            HardwareErrorKind::Connection => "connection",
            HardwareErrorKind::Configuration => "configuration",
            HardwareErrorKind::Communication => "communication",
            HardwareErrorKind::Hardware => "hardware",
            HardwareErrorKind::Timeout => "timeout",
            HardwareErrorKind::Unknown => "unknown",
        };
        write!(f, "{}", label)
    }
}

/// Error returned by hardware collaborators.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind} error: {message}")]
pub struct HardwareError {
    /// Coarse failure class.
    pub kind: HardwareErrorKind,
    /// What the backend reported.
    pub message: String,
}

impl HardwareError {
    /// Build an error of any kind.
    pub fn new(kind: HardwareErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for a `connection` error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(HardwareErrorKind::Connection, message)
    }

    /// Shorthand for a `configuration` error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(HardwareErrorKind::Configuration, message)
    }

    /// Shorthand for a `communication` error.
    pub fn communication(message: impl Into<String>) -> Self {
        Self::new(HardwareErrorKind::Communication, message)
    }

    /// Shorthand for a `hardware` error.
    pub fn hardware(message: impl Into<String>) -> Self {
        Self::new(HardwareErrorKind::Hardware, message)
    }

    /// Shorthand for a `timeout` error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(HardwareErrorKind::Timeout, message)
    }
}

// =============================================================================
// Rig Errors
// =============================================================================

/// Error type for all device control operations.
#[derive(Error, Debug)]
pub enum RigError {
    /// The operation is not in the allow-list of the current state.
    ///
    /// The state of the device is left unchanged.
    #[error("Operation '{operation}' is not allowed in state {state}")]
    OperationNotAllowedInState {
        /// Name of the rejected operation.
        operation: String,
        /// State the device was in.
        state: String,
    },

    /// A parameter write failed validation. The stored value is unchanged.
    #[error("Invalid value for parameter '{name}': {reason}")]
    InvalidParameterValue {
        /// Parameter name.
        name: String,
        /// Why the value was refused.
        reason: String,
    },

    /// No parameter with this name exists on the device.
    #[error("Unknown parameter '{0}'")]
    UnknownParameter(String),

    /// The parameter can never be written.
    #[error("Parameter '{0}' is read-only")]
    ParameterReadOnly(String),

    /// Acquiring the hardware handle failed. Calling `connect()` again retries.
    #[error("Connection failed: {0}")]
    Connection(#[source] HardwareError),

    /// Hardware rejected a configuration, or a configuration value is
    /// semantically invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A hardware call made on the control path failed.
    #[error("Hardware error: {0}")]
    Hardware(#[source] HardwareError),

    /// An operation needed the hardware handle but none is held.
    #[error("Device '{0}' is not connected")]
    NotConnected(String),

    /// The acquisition worker did not exit within the join timeout.
    ///
    /// The session is kept so that a later `stop_acquisition()` can finish
    /// the join.
    #[error("Acquisition worker did not stop within {0:?}")]
    StopTimeout(Duration),

    /// The worker thread panicked. The device is in FAULT.
    #[error("Acquisition worker panicked")]
    WorkerPanicked,

    /// A subscriber callback tried to stop the worker it is running on.
    #[error("Operation '{0}' cannot be called from the device's own acquisition worker")]
    CalledFromWorker(String),

    /// A single capture was cancelled before it produced a sample.
    #[error("Acquisition was cancelled before a sample was produced")]
    AcquisitionCancelled,

    /// A single capture produced a well-formed but implausible reading.
    #[error("Device '{0}' produced a degenerate sample")]
    DegenerateSample(String),

    /// The configuration could not be read or extracted.
    #[error("Failed to load configuration: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Filesystem error while reading configuration.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The tracing subscriber could not be built.
    #[error("Failed to initialize tracing: {0}")]
    Tracing(String),
}

impl From<figment::Error> for RigError {
    fn from(err: figment::Error) -> Self {
        RigError::Config(Box::new(err))
    }
}

/// Result alias used by all control operations.
pub type RigResult<T> = std::result::Result<T, RigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hardware_error_display_includes_kind() {
        let err = HardwareError::timeout("no trigger received");
        assert_eq!(err.to_string(), "timeout error: no trigger received");
        assert_eq!(err.kind, HardwareErrorKind::Timeout);
    }

    #[test]
    fn guard_violation_names_operation_and_state() {
        let err = RigError::OperationNotAllowedInState {
            operation: "start_acquisition".to_string(),
            state: "DISCONNECTED".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("start_acquisition"));
        assert!(msg.contains("DISCONNECTED"));
    }

    #[test]
    fn connection_error_keeps_source() {
        use std::error::Error as _;

        let err = RigError::Connection(HardwareError::connection("port busy"));
        let source = err.source().map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("connection error: port busy"));
    }
}
