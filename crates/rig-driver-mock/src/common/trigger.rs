//! External trigger simulation.
//!
//! In external-trigger mode a simulated read blocks until [`TriggerGate::fire`]
//! is called. The backend's unblock hook calls [`TriggerGate::release`], which
//! switches the gate to free-running and wakes every waiter, including those
//! sleeping out an integration time in [`TriggerGate::pause`].

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct GateState {
    external: bool,
    pending: u32,
    /// Bumped by every release so that paused readers notice it.
    generation: u64,
}

/// How a wait on the gate ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// A trigger was consumed.
    Fired,
    /// The gate was switched to free-run.
    FreeRunning,
    /// No trigger before the timeout.
    TimedOut,
}

/// Blocks reads until a trigger fires or the gate is released.
#[derive(Debug, Default)]
pub struct TriggerGate {
    state: Mutex<GateState>,
    cv: Condvar,
}

impl TriggerGate {
    /// Gate in free-run mode.
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch between external trigger and free-run. Free-run wakes every waiter.
    pub fn set_external(&self, external: bool) {
        let mut state = self.state.lock();
        state.external = external;
        if !external {
            self.cv.notify_all();
        }
    }

    /// Whether reads wait for a trigger.
    pub fn is_external(&self) -> bool {
        self.state.lock().external
    }

    /// Deliver one trigger pulse.
    pub fn fire(&self) {
        self.state.lock().pending += 1;
        self.cv.notify_all();
    }

    /// Switch to free-run and wake all waiters.
    pub fn release(&self) {
        let mut state = self.state.lock();
        state.external = false;
        state.pending = 0;
        state.generation += 1;
        self.cv.notify_all();
    }

    /// Block until a trigger arrives, the gate is released or `timeout`
    /// (if any) expires. Consumes one pending trigger.
    pub fn wait_for_trigger(&self, timeout: Option<Duration>) -> GateOutcome {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.state.lock();
        loop {
            if !state.external {
                return GateOutcome::FreeRunning;
            }
            if state.pending > 0 {
                state.pending -= 1;
                return GateOutcome::Fired;
            }
            match deadline {
                None => self.cv.wait(&mut state),
                Some(deadline) => {
                    if self.cv.wait_until(&mut state, deadline).timed_out() {
                        if !state.external {
                            return GateOutcome::FreeRunning;
                        }
                        return GateOutcome::TimedOut;
                    }
                }
            }
        }
    }

    /// Sleep for `duration` unless released meanwhile. Returns false when
    /// the pause was cut short.
    pub fn pause(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            return true;
        }
        let deadline = Instant::now() + duration;
        let mut state = self.state.lock();
        let generation = state.generation;
        while state.generation == generation {
            if self.cv.wait_until(&mut state, deadline).timed_out() {
                return state.generation == generation;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn free_running_gate_does_not_block() {
        let gate = TriggerGate::new();
        assert_eq!(gate.wait_for_trigger(None), GateOutcome::FreeRunning);
    }

    #[test]
    fn pending_trigger_is_consumed_once() {
        let gate = TriggerGate::new();
        gate.set_external(true);
        gate.fire();
        assert_eq!(gate.wait_for_trigger(None), GateOutcome::Fired);
        assert_eq!(
            gate.wait_for_trigger(Some(Duration::from_millis(10))),
            GateOutcome::TimedOut
        );
    }

    #[test]
    fn release_wakes_blocked_waiter() {
        let gate = Arc::new(TriggerGate::new());
        gate.set_external(true);

        let waiter = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || gate.wait_for_trigger(None))
        };
        thread::sleep(Duration::from_millis(20));
        gate.release();

        assert_eq!(waiter.join().ok(), Some(GateOutcome::FreeRunning));
        assert!(!gate.is_external());
    }

    #[test]
    fn release_cuts_pause_short() {
        let gate = Arc::new(TriggerGate::new());
        let sleeper = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || {
                let started = Instant::now();
                let completed = gate.pause(Duration::from_secs(10));
                (completed, started.elapsed())
            })
        };
        thread::sleep(Duration::from_millis(20));
        gate.release();

        let (completed, elapsed) = sleeper.join().unwrap();
        assert!(!completed);
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    fn pause_runs_to_completion_without_release() {
        let gate = TriggerGate::new();
        assert!(gate.pause(Duration::from_millis(5)));
        assert!(gate.pause(Duration::ZERO));
    }
}
