//! Guarded state machine.
//!
//! A device has a closed set of state tags and, per tag, an allow-list of
//! operations. Transitions *between* tags are unrestricted; what the machine
//! restricts is which operations may run while a tag is current.
//!
//! ```
//! use rig_core::state::{Operation, StateMachine, TransitionTable};
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
//! enum Lamp { Off, On }
//!
//! impl std::fmt::Display for Lamp {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{:?}", self)
//!     }
//! }
//!
//! let table = TransitionTable::builder()
//!     .register(Lamp::Off, [Operation::Connect])
//!     .register(Lamp::On, [Operation::Disconnect])
//!     .build();
//! let machine = StateMachine::new("lamp", Lamp::Off, table);
//!
//! assert!(machine.can_execute(Operation::Connect));
//! assert!(machine.guard(Operation::Disconnect, || Ok(())).is_err());
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt::{Debug, Display};
use std::hash::Hash;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::{RigError, RigResult};

/// A value from a device's closed set of state tags.
///
/// Implemented for every `Copy` enum that is hashable and printable.
pub trait StateTag: Copy + Eq + Hash + Debug + Display + Send + Sync + 'static {}

impl<T> StateTag for T where T: Copy + Eq + Hash + Debug + Display + Send + Sync + 'static {}

/// Identifier of a guarded operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    /// Acquire the hardware handle.
    Connect,
    /// Release the hardware handle.
    Disconnect,
    /// Spawn the continuous acquisition worker.
    StartAcquisition,
    /// Cancel and join the worker.
    StopAcquisition,
    /// Run one acquisition iteration.
    CaptureOnce,
    /// Leave FAULT or ALARM.
    ResetFault,
    /// Change the range of a numeric parameter.
    SetBounds,
    /// Device specific action, e.g. `execute_instruction` on a serial device.
    Custom(&'static str),
}

impl Operation {
    /// Name used in logs and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Connect => "connect",
            Operation::Disconnect => "disconnect",
            Operation::StartAcquisition => "start_acquisition",
            Operation::StopAcquisition => "stop_acquisition",
            Operation::CaptureOnce => "capture_once",
            Operation::ResetFault => "reset_fault",
            Operation::SetBounds => "set_bounds",
            Operation::Custom(name) => *name,
        }
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which tag of a device's set plays which lifecycle role.
///
/// The device facade drives transitions through these roles, so the same
/// control code serves a spectrometer (`MEASURING`) and a camera (`CAPTURE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateRoles<S> {
    /// No handle held.
    pub disconnected: S,
    /// Connected and idle.
    pub on: S,
    /// A worker is acquiring.
    pub active: S,
    /// A hardware error ended acquisition.
    pub fault: S,
    /// The last reading was degenerate.
    pub alarm: S,
    /// Tag entered when acquiring the handle fails. Profiles without one
    /// leave the state unchanged on a failed connect.
    pub connection_error: Option<S>,
}

// =============================================================================
// Transition Table
// =============================================================================

/// Immutable map of state tag to the operations legal in it.
#[derive(Debug, Clone)]
pub struct TransitionTable<S> {
    allowed: HashMap<S, HashSet<Operation>>,
}

impl<S: StateTag> TransitionTable<S> {
    /// Start an empty table.
    pub fn builder() -> TransitionTableBuilder<S> {
        TransitionTableBuilder {
            allowed: HashMap::new(),
        }
    }

    /// True iff `op` is in the allow-list of `state`.
    pub fn allows(&self, state: S, op: Operation) -> bool {
        self.allowed
            .get(&state)
            .map(|ops| ops.contains(&op))
            .unwrap_or(false)
    }

    /// Allow-list of `state`, sorted for stable output.
    pub fn allowed(&self, state: S) -> Vec<Operation> {
        let mut ops: Vec<Operation> = self
            .allowed
            .get(&state)
            .map(|ops| ops.iter().copied().collect())
            .unwrap_or_default();
        ops.sort();
        ops
    }
}

/// Setup-time builder for a [`TransitionTable`].
#[derive(Debug)]
pub struct TransitionTableBuilder<S> {
    allowed: HashMap<S, HashSet<Operation>>,
}

impl<S: StateTag> TransitionTableBuilder<S> {
    /// Declare operations legal in `state`. Repeated calls extend the list.
    pub fn register(mut self, state: S, ops: impl IntoIterator<Item = Operation>) -> Self {
        self.allowed.entry(state).or_default().extend(ops);
        self
    }

    /// Freeze the table.
    pub fn build(self) -> TransitionTable<S> {
        TransitionTable {
            allowed: self.allowed,
        }
    }
}

// =============================================================================
// State Machine
// =============================================================================

/// Current state tag plus the allow-list that gates operations.
pub struct StateMachine<S> {
    device: String,
    current: RwLock<S>,
    table: TransitionTable<S>,
}

impl<S: StateTag> StateMachine<S> {
    /// Machine starting in `initial`.
    pub fn new(device: impl Into<String>, initial: S, table: TransitionTable<S>) -> Self {
        Self {
            device: device.into(),
            current: RwLock::new(initial),
            table,
        }
    }

    /// Current tag.
    pub fn current(&self) -> S {
        *self.current.read()
    }

    /// Whether `op` is allowed in the current tag.
    pub fn can_execute(&self, op: Operation) -> bool {
        self.table.allows(self.current(), op)
    }

    /// Fails with `OperationNotAllowedInState` unless `op` may run now.
    pub fn check(&self, op: Operation) -> RigResult<()> {
        let state = self.current();
        if self.table.allows(state, op) {
            Ok(())
        } else {
            debug!(device = %self.device, op = %op, state = %state, "Operation rejected by guard");
            Err(RigError::OperationNotAllowedInState {
                operation: op.to_string(),
                state: state.to_string(),
            })
        }
    }

    /// Run `f` only if `op` is allowed in the current state.
    pub fn guard<T>(&self, op: Operation, f: impl FnOnce() -> RigResult<T>) -> RigResult<T> {
        self.check(op)?;
        f()
    }

    /// Unconditionally replace the current tag, returning the previous one.
    pub fn transition(&self, next: S) -> S {
        let previous = std::mem::replace(&mut *self.current.write(), next);
        if previous != next {
            debug!(device = %self.device, from = %previous, to = %next, "State transition");
        }
        previous
    }

    /// Move to `next` only if the current tag is `expected`.
    pub fn transition_from(&self, expected: S, next: S) -> bool {
        let mut current = self.current.write();
        if *current != expected {
            return false;
        }
        *current = next;
        if expected != next {
            debug!(device = %self.device, from = %expected, to = %next, "State transition");
        }
        true
    }

    /// Allow-list of the current tag.
    pub fn allowed_operations(&self) -> Vec<Operation> {
        self.table.allowed(self.current())
    }

    /// The allow-list table.
    pub fn table(&self) -> &TransitionTable<S> {
        &self.table
    }
}

impl<S: StateTag> std::fmt::Debug for StateMachine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateMachine")
            .field("device", &self.device)
            .field("current", &self.current())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Tag {
        Disconnected,
        On,
        Measuring,
    }

    impl Display for Tag {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            let label = match self {
                Tag::Disconnected => "DISCONNECTED",
                Tag::On => "ON",
                Tag::Measuring => "MEASURING",
            };
            f.write_str(label)
        }
    }

    fn machine() -> StateMachine<Tag> {
        let table = TransitionTable::builder()
            .register(Tag::Disconnected, [Operation::Connect])
            .register(
                Tag::On,
                [Operation::StartAcquisition, Operation::Disconnect],
            )
            .register(Tag::Measuring, [Operation::StopAcquisition])
            .build();
        StateMachine::new("test", Tag::Disconnected, table)
    }

    #[test]
    fn initial_state_gates_operations() {
        let m = machine();
        assert_eq!(m.current(), Tag::Disconnected);
        assert!(m.can_execute(Operation::Connect));
        assert!(!m.can_execute(Operation::StartAcquisition));
    }

    #[test]
    fn rejected_operation_leaves_state_unchanged() {
        let m = machine();
        let mut ran = false;
        let result = m.guard(Operation::StartAcquisition, || {
            ran = true;
            Ok(())
        });

        match result {
            Err(RigError::OperationNotAllowedInState { operation, state }) => {
                assert_eq!(operation, "start_acquisition");
                assert_eq!(state, "DISCONNECTED");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(!ran);
        assert_eq!(m.current(), Tag::Disconnected);
    }

    #[test]
    fn transitions_are_unrestricted() {
        let m = machine();
        assert_eq!(m.transition(Tag::Measuring), Tag::Disconnected);
        assert_eq!(m.current(), Tag::Measuring);
        assert_eq!(m.allowed_operations(), vec![Operation::StopAcquisition]);
    }

    #[test]
    fn transition_from_only_applies_on_match() {
        let m = machine();
        assert!(!m.transition_from(Tag::Measuring, Tag::On));
        assert_eq!(m.current(), Tag::Disconnected);

        m.transition(Tag::Measuring);
        assert!(m.transition_from(Tag::Measuring, Tag::On));
        assert_eq!(m.current(), Tag::On);
    }

    #[test]
    fn unregistered_state_allows_nothing() {
        let table: TransitionTable<Tag> = TransitionTable::builder()
            .register(Tag::On, [Operation::Disconnect])
            .build();
        assert!(!table.allows(Tag::Measuring, Operation::StopAcquisition));
        assert!(table.allowed(Tag::Measuring).is_empty());
    }

    #[test]
    fn custom_operations_display_their_name() {
        let op = Operation::Custom("execute_instruction");
        assert_eq!(op.to_string(), "execute_instruction");
    }

    #[test]
    #[traced_test]
    fn transitions_are_logged() {
        let m = machine();
        m.transition(Tag::On);
        assert!(logs_contain("State transition"));
        assert!(logs_contain("from=DISCONNECTED"));
        assert!(logs_contain("to=ON"));
    }
}
