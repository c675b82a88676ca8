//! Serial utility profile and simulated serial port.
//!
//! Besides the polling acquisition loop, a serial device exposes one custom
//! guarded operation, [`SerialDeviceExt::execute_instruction`], which writes
//! an ASCII command and reads back a fixed number of bytes.

use std::collections::BTreeMap;
use std::time::Duration;

use parking_lot::Mutex;
use rig_core::{
    Device, DeviceInfo, DeviceProfile, HardwareBackend, HardwareError, Operation, ParameterSet,
    ParameterSpec, RigError, RigResult, SamplePayload, StateRoles, TransitionTable,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::common::{
    ErrorConfig, LifecycleCounts, MockMode, ReadKind, ScriptedRead, SimulatedHardware,
    TimingConfig,
};

/// Serial utility state tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SerialState {
    /// Port closed.
    Disconnected,
    /// Port open and idle.
    On,
    /// A transaction or poll loop is running.
    Communicating,
    /// A transfer failed.
    Fault,
    /// The last reply was empty.
    Alarm,
}

impl std::fmt::Display for SerialState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SerialState::Disconnected => "DISCONNECTED",
            SerialState::On => "ON",
            SerialState::Communicating => "COMMUNICATING",
            SerialState::Fault => "FAULT",
            SerialState::Alarm => "ALARM",
        };
        f.write_str(label)
    }
}

/// Custom operation sending one command.
pub const EXECUTE_INSTRUCTION: Operation = Operation::Custom("execute_instruction");

/// Accepted baud rates.
pub const BAUD_RATES: [i64; 21] = [
    9600, 14400, 19200, 38400, 57600, 115200, 128000, 256000, 230400, 460800, 500000, 576000,
    921600, 1000000, 1152000, 1500000, 2000000, 2500000, 3000000, 3500000, 4000000,
];

/// Profile of the serial utility device type.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialProfile;

impl DeviceProfile for SerialProfile {
    type State = SerialState;

    fn kind(&self) -> &'static str {
        "serial"
    }

    fn roles(&self) -> StateRoles<SerialState> {
        StateRoles {
            disconnected: SerialState::Disconnected,
            on: SerialState::On,
            active: SerialState::Communicating,
            fault: SerialState::Fault,
            alarm: SerialState::Alarm,
            connection_error: None,
        }
    }

    fn transitions(&self) -> TransitionTable<SerialState> {
        use Operation::*;
        use SerialState::*;

        TransitionTable::builder()
            .register(Disconnected, [Connect, Disconnect, StopAcquisition])
            .register(
                On,
                [
                    StartAcquisition,
                    CaptureOnce,
                    EXECUTE_INSTRUCTION,
                    StopAcquisition,
                    Disconnect,
                ],
            )
            .register(Communicating, [StopAcquisition])
            .register(Fault, [StopAcquisition, ResetFault, Disconnect])
            .register(Alarm, [StopAcquisition, ResetFault, Disconnect])
            .build()
    }

    fn parameters(&self) -> Vec<ParameterSpec<SerialState>> {
        let closed = [SerialState::Disconnected];
        vec![
            ParameterSpec::new("comport", "COM1").writable_in(closed),
            ParameterSpec::new("baud_rate", 9600)
                .with_choices(BAUD_RATES)
                .writable_in(closed),
            ParameterSpec::new("byte_size", 8)
                .with_choices([5, 6, 7, 8])
                .writable_in(closed),
            ParameterSpec::new("parity", "N")
                .with_choices(["N", "E", "O", "M", "S"])
                .writable_in(closed),
            ParameterSpec::new("stopbits", 1.0)
                .with_choices([1.0, 1.5, 2.0])
                .writable_in(closed),
            ParameterSpec::new("read_timeout_s", 0.1)
                .with_range(0.0, 1000.0)
                .with_unit("s")
                .writable_in(closed),
            ParameterSpec::new("write_timeout_s", 0.1)
                .with_range(0.0, 1000.0)
                .with_unit("s")
                .writable_in(closed),
            ParameterSpec::new("xonxoff", false).writable_in(closed),
            ParameterSpec::new("poll_command", "*VER").writable_in(closed),
        ]
    }
}

// =============================================================================
// Transport
// =============================================================================

/// Backend able to run a raw command/reply exchange.
pub trait SerialTransport: HardwareBackend {
    /// Write `command` and read up to `reply_len` bytes back.
    ///
    /// A `reply_len` of zero writes without reading.
    fn transact(
        &self,
        handle: &Self::Handle,
        command: &str,
        reply_len: usize,
    ) -> Result<String, HardwareError>;
}

/// Serial-specific operations on a [`Device`].
pub trait SerialDeviceExt {
    /// Guarded command/reply exchange: ON → COMMUNICATING → ON.
    fn execute_instruction(&self, command: &str, reply_len: usize) -> RigResult<String>;
}

impl<B: SerialTransport> SerialDeviceExt for Device<SerialProfile, B> {
    fn execute_instruction(&self, command: &str, reply_len: usize) -> RigResult<String> {
        if !command.is_ascii() {
            return Err(RigError::InvalidParameterValue {
                name: "command".to_string(),
                reason: "commands must be ASCII".to_string(),
            });
        }
        self.execute_custom(
            EXECUTE_INSTRUCTION,
            Some(SerialState::Communicating),
            |guard| guard.backend().transact(guard.handle(), command, reply_len),
        )
    }
}

// =============================================================================
// MockSerialPort
// =============================================================================

/// Configuration for [`MockSerialPort`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MockSerialConfig {
    /// Ports that exist on the simulated host
    pub available_ports: Vec<String>,
    /// Canned replies keyed by command
    pub responses: BTreeMap<String, String>,
    /// Read timing.
    pub mode: MockMode,
    /// Fixed reply latency.
    pub read_latency_ms: Option<u64>,
    /// RNG seed for error injection.
    pub seed: Option<u64>,
}

impl Default for MockSerialConfig {
    fn default() -> Self {
        let mut responses = BTreeMap::new();
        responses.insert("*VER".to_string(), "MOCK-SERIAL v1.0\r\n".to_string());
        responses.insert("*IDN?".to_string(), "MOCK,SERIAL-UTILITY,MS0001,1.0\r\n".to_string());
        Self {
            available_ports: vec!["COM1".to_string()],
            responses,
            mode: MockMode::Instant,
            read_latency_ms: None,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Link {
    port: String,
    baud_rate: i64,
}

/// Simulated serial port answering from a table of canned replies.
///
/// Unknown commands get an empty reply.
#[derive(Debug)]
pub struct MockSerialPort {
    config: MockSerialConfig,
    hw: SimulatedHardware,
    link: Mutex<Link>,
    sent: Mutex<Vec<String>>,
}

impl MockSerialPort {
    /// Port with the default configuration.
    pub fn new() -> Self {
        Self::with_config(MockSerialConfig::default())
    }

    /// Port with an explicit configuration.
    pub fn with_config(config: MockSerialConfig) -> Self {
        let timing = TimingConfig {
            mode: config.mode,
            read_latency: config.read_latency_ms.map(Duration::from_millis),
        };
        let hw = SimulatedHardware::new("serial", timing, ErrorConfig::none(), config.seed);
        Self {
            config,
            hw,
            link: Mutex::new(Link::default()),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Replace the error-injection policy.
    pub fn with_errors(mut self, errors: ErrorConfig) -> Self {
        self.hw.set_errors(errors);
        self
    }

    /// Add a canned reply.
    pub fn with_response(mut self, command: impl Into<String>, reply: impl Into<String>) -> Self {
        self.config.responses.insert(command.into(), reply.into());
        self
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

    /// Commands written so far, oldest first.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// Name of the open port, empty when closed.
    pub fn port(&self) -> String {
        self.link.lock().port.clone()
    }

    fn reply_for(&self, command: &str, reply_len: usize) -> String {
        self.config
            .responses
            .get(command)
            .map(|reply| reply.chars().take(reply_len).collect())
            .unwrap_or_default()
    }

    /// Wire time of `bytes` bytes at the configured baud rate, 10 bits per byte.
    fn wire_time(&self, bytes: usize) -> Duration {
        let baud = self.link.lock().baud_rate.max(1) as f64;
        Duration::from_secs_f64(bytes as f64 * 10.0 / baud)
    }
}

impl Default for MockSerialPort {
    fn default() -> Self {
        Self::new()
    }
}

impl HardwareBackend for MockSerialPort {
    type Handle = u64;

    fn acquire(&self, params: &ParameterSet) -> Result<u64, HardwareError> {
        let port = params.get_str("comport").unwrap_or_default().to_string();
        if !self.config.available_ports.contains(&port) {
            return Err(HardwareError::connection(format!("could not open port {}", port)));
        }
        let handle = self.hw.open()?;
        *self.link.lock() = Link {
            port,
            baud_rate: params.get_i64("baud_rate").unwrap_or(9600),
        };
        Ok(handle)
    }

    fn release(&self, handle: &u64) {
        self.hw.close(*handle);
    }

    fn identify(&self, _handle: &u64) -> Result<DeviceInfo, HardwareError> {
        self.hw.check("identify")?;
        let link = self.link.lock();
        Ok(DeviceInfo::new("MOCK-SERIAL", link.port.clone())
            .with_capability("port", link.port.clone())
            .with_capability("baud_rate", link.baud_rate))
    }

    fn read_sample(&self, handle: &u64, params: &ParameterSet) -> Result<SamplePayload, HardwareError> {
        let command = params.get_str("poll_command").unwrap_or_default().to_string();
        let kind = self.hw.begin_read(self.wire_time(command.len() + 256), None)?;
        let reply = match kind {
            ReadKind::Dark => String::new(),
            ReadKind::Live => self.transact(handle, &command, 256)?,
        };
        Ok(SamplePayload::Text(reply))
    }

    fn apply_params(&self, _handle: &u64, params: &ParameterSet) -> Result<(), HardwareError> {
        self.hw.check("apply")?;
        if let Some(baud) = params.get_i64("baud_rate") {
            self.link.lock().baud_rate = baud;
        }
        self.hw.note_applied();
        Ok(())
    }

    fn unblock(&self, _handle: &u64) -> Result<(), HardwareError> {
        self.hw.unblock();
        Ok(())
    }
}

impl SerialTransport for MockSerialPort {
    fn transact(&self, _handle: &u64, command: &str, reply_len: usize) -> Result<String, HardwareError> {
        self.hw.check("transact")?;
        self.sent.lock().push(command.to_string());
        debug!(port = %self.port(), command, "Issuing command");
        if reply_len == 0 {
            return Ok(String::new());
        }
        let reply = self.reply_for(command, reply_len);
        debug!(port = %self.port(), reply = %reply.trim_end(), "Received reply");
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rig_core::ParamValue;

    fn spec(name: &str) -> ParameterSpec<SerialState> {
        SerialProfile
            .parameters()
            .into_iter()
            .find(|p| p.name == name)
            .unwrap()
    }

    #[test]
    fn settings_only_writable_while_disconnected() {
        for spec in SerialProfile.parameters() {
            assert_eq!(spec.writable_in, vec![SerialState::Disconnected], "{}", spec.name);
        }
    }

    #[test]
    fn stopbits_accept_integer_writes() {
        let stopbits = spec("stopbits");
        assert_eq!(stopbits.validate(ParamValue::Int(2)).ok(), Some(ParamValue::Float(2.0)));
        assert!(stopbits.validate(ParamValue::Float(1.25)).is_err());
    }

    #[test]
    fn timeouts_clamp() {
        let timeout = spec("read_timeout_s");
        assert_eq!(
            timeout.validate(ParamValue::Float(5000.0)).ok(),
            Some(ParamValue::Float(1000.0))
        );
    }

    #[test]
    fn missing_port_fails_to_open() {
        let port = MockSerialPort::new();
        let params = ParameterSet::new().with("comport", "COM9");
        assert!(port.acquire(&params).is_err());
    }

    #[test]
    fn transact_truncates_reply() {
        let port = MockSerialPort::new();
        let handle = port
            .acquire(&ParameterSet::new().with("comport", "COM1"))
            .unwrap();
        assert_eq!(port.transact(&handle, "*VER", 4).unwrap(), "MOCK");
        assert_eq!(port.transact(&handle, "*VER", 0).unwrap(), "");
        assert_eq!(port.transact(&handle, "BOGUS", 10).unwrap(), "");
        assert_eq!(port.sent(), vec!["*VER", "*VER", "BOGUS"]);
    }

    #[test]
    fn unknown_poll_reply_is_implausible() {
        let port = MockSerialPort::new();
        let handle = port
            .acquire(&ParameterSet::new().with("comport", "COM1"))
            .unwrap();
        let params = ParameterSet::new().with("poll_command", "NOPE");
        let payload = port.read_sample(&handle, &params).unwrap();
        assert!(!SerialProfile.is_plausible(&payload, &ParameterSet::new()));
    }
}
