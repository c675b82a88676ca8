//! Behaviour shared by all simulated instruments.
//!
//! [`SimulatedHardware`] bundles error injection, the trigger gate, read
//! timing, a script of upcoming readings and lifecycle counters. Each mock
//! backend owns one and adds its own data generation on top.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rig_core::HardwareError;
use tracing::{debug, trace};

use super::errors::ErrorConfig;
use super::rng::MockRng;
use super::timing::TimingConfig;
use super::trigger::{GateOutcome, TriggerGate};

/// Scripted result of an upcoming read.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedRead {
    /// Generate a normal reading
    Live,
    /// Return a well-formed but implausible reading
    Dark,
    /// Fail the read with this error
    Fail(HardwareError),
}

/// What the backend should produce for the current read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadKind {
    /// Normal reading.
    Live,
    /// Implausible reading.
    Dark,
}

/// Call counts, for verifying the acquire/release lifecycle in tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LifecycleCounts {
    /// Successful `acquire` calls.
    pub acquired: usize,
    /// `release` calls.
    pub released: usize,
    /// Accepted `apply_params` calls.
    pub applied: usize,
    /// `unblock` calls.
    pub unblocked: usize,
    /// Reads attempted.
    pub reads: usize,
}

#[derive(Debug, Default)]
struct Counters {
    acquired: AtomicUsize,
    released: AtomicUsize,
    applied: AtomicUsize,
    unblocked: AtomicUsize,
    reads: AtomicUsize,
}

/// Link, counters, error policy and read script of one mock instrument.
#[derive(Debug)]
pub struct SimulatedHardware {
    kind: &'static str,
    timing: TimingConfig,
    errors: ErrorConfig,
    rng: MockRng,
    gate: TriggerGate,
    script: Mutex<VecDeque<ScriptedRead>>,
    counters: Counters,
    next_handle: AtomicU64,
}

impl SimulatedHardware {
    /// Fresh link with no reads scripted.
    pub fn new(kind: &'static str, timing: TimingConfig, errors: ErrorConfig, seed: Option<u64>) -> Self {
        Self {
            kind,
            timing,
            errors,
            rng: MockRng::new(seed),
            gate: TriggerGate::new(),
            script: Mutex::new(VecDeque::new()),
            counters: Counters::default(),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Device kind, used in logs.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Noise source.
    pub fn rng(&self) -> &MockRng {
        &self.rng
    }

    /// External trigger gate.
    pub fn gate(&self) -> &TriggerGate {
        &self.gate
    }

    /// Error-injection policy.
    pub fn errors(&self) -> &ErrorConfig {
        &self.errors
    }

    /// Replace the error-injection policy.
    pub fn set_errors(&mut self, errors: ErrorConfig) {
        self.errors = errors;
    }

    /// Run the error policy for `operation`.
    pub fn check(&self, operation: &'static str) -> Result<(), HardwareError> {
        self.errors.check_operation(operation)
    }

    /// Open a simulated link and hand out a fresh handle id.
    pub fn open(&self) -> Result<u64, HardwareError> {
        self.check("acquire")?;
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.counters.acquired.fetch_add(1, Ordering::SeqCst);
        debug!(kind = self.kind, handle, "Simulated link opened");
        Ok(handle)
    }

    /// Close a simulated link.
    pub fn close(&self, handle: u64) {
        self.counters.released.fetch_add(1, Ordering::SeqCst);
        debug!(kind = self.kind, handle, "Simulated link closed");
    }

    /// Count an accepted `apply_params`.
    pub fn note_applied(&self) {
        self.counters.applied.fetch_add(1, Ordering::SeqCst);
    }

    /// Unblock hook: free-run and wake any blocked read.
    pub fn unblock(&self) {
        self.counters.unblocked.fetch_add(1, Ordering::SeqCst);
        self.gate.release();
        debug!(kind = self.kind, "Simulated hardware switched to free-run");
    }

    /// Common prologue of every read: error injection, trigger wait, read
    /// delay and the next scripted outcome.
    pub fn begin_read(
        &self,
        hardware_time: Duration,
        trigger_timeout: Option<Duration>,
    ) -> Result<ReadKind, HardwareError> {
        self.counters.reads.fetch_add(1, Ordering::SeqCst);
        self.check("read")?;

        if self.gate.is_external()
            && self.gate.wait_for_trigger(trigger_timeout) == GateOutcome::TimedOut
        {
            return Err(HardwareError::timeout("no trigger received"));
        }

        let delay = self.timing.read_delay(hardware_time);
        if !self.gate.pause(delay) {
            trace!(kind = self.kind, "Read delay cut short by unblock");
        }

        match self.script.lock().pop_front() {
            None | Some(ScriptedRead::Live) => Ok(ReadKind::Live),
            Some(ScriptedRead::Dark) => Ok(ReadKind::Dark),
            Some(ScriptedRead::Fail(err)) => Err(err),
        }
    }

    /// Queue outcomes for the next reads, in order.
    pub fn script(&self, reads: impl IntoIterator<Item = ScriptedRead>) {
        self.script.lock().extend(reads);
    }

    /// Snapshot of the lifecycle counters.
    pub fn counts(&self) -> LifecycleCounts {
        LifecycleCounts {
            acquired: self.counters.acquired.load(Ordering::SeqCst),
            released: self.counters.released.load(Ordering::SeqCst),
            applied: self.counters.applied.load(Ordering::SeqCst),
            unblocked: self.counters.unblocked.load(Ordering::SeqCst),
            reads: self.counters.reads.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::errors::ErrorScenario;

    fn hardware() -> SimulatedHardware {
        SimulatedHardware::new("test", TimingConfig::instant(), ErrorConfig::none(), Some(1))
    }

    #[test]
    fn script_is_consumed_in_order() {
        let hw = hardware();
        hw.script([
            ScriptedRead::Dark,
            ScriptedRead::Live,
            ScriptedRead::Fail(HardwareError::hardware("lamp failure")),
        ]);

        assert_eq!(hw.begin_read(Duration::ZERO, None), Ok(ReadKind::Dark));
        assert_eq!(hw.begin_read(Duration::ZERO, None), Ok(ReadKind::Live));
        assert!(hw.begin_read(Duration::ZERO, None).is_err());
        assert_eq!(hw.begin_read(Duration::ZERO, None), Ok(ReadKind::Live));
        assert_eq!(hw.counts().reads, 4);
    }

    #[test]
    fn external_trigger_times_out() {
        let hw = hardware();
        hw.gate().set_external(true);
        let err = hw
            .begin_read(Duration::ZERO, Some(Duration::from_millis(5)))
            .unwrap_err();
        assert_eq!(err.kind, rig_core::HardwareErrorKind::Timeout);
    }

    #[test]
    fn open_respects_error_injection() {
        let hw = SimulatedHardware::new(
            "test",
            TimingConfig::instant(),
            ErrorConfig::scenario(ErrorScenario::Timeout { operation: "acquire" }),
            None,
        );
        assert!(hw.open().is_err());
        assert_eq!(hw.counts().acquired, 0);
    }

    #[test]
    fn handles_are_unique() {
        let hw = hardware();
        let a = hw.open().unwrap();
        let b = hw.open().unwrap();
        assert_ne!(a, b);
        hw.close(a);
        hw.close(b);
        let counts = hw.counts();
        assert_eq!((counts.acquired, counts.released), (2, 2));
    }
}
