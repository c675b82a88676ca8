//! Cancellable acquisition worker.
//!
//! One worker thread per active session repeatedly performs a blocking read
//! through the device's [`HandleGuard`], classifies the result and drives
//! the state machine:
//!
//! ```text
//!   ┌──────────────┐   valid       ┌─────────────┐
//!   │ read_sample  │──────────────▶│ publish     │──▶ active tag
//!   │ (no lock     │   degenerate  └─────────────┘
//!   │  held)       │──────────────▶ ALARM, keep looping
//!   │              │   error
//!   └──────────────┘──────────────▶ FAULT, exit
//! ```
//!
//! Cancellation is cooperative: the control path sets the token and calls
//! the backend's unblock hook so that an in-flight read returns; the worker
//! checks the token at iteration boundaries. A reading that completes after
//! cancellation is discarded without classification.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tracing::{debug, error, info_span, warn};

use crate::device::{DeviceCore, DeviceProfile};
use crate::error::{HardwareError, RigError, RigResult};
use crate::limits::JOIN_POLL_INTERVAL;
use crate::sample::Sample;
use crate::session::{HandleGuard, HardwareBackend};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Cooperative cancellation flag shared by control path and worker.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// A token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether [`cancel`](Self::cancel) was called on any clone.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why a worker ended.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerExit {
    /// The token was cancelled.
    Cancelled,
    /// The iteration bound was reached with a valid sample last.
    Completed,
    /// The iteration bound was reached with a degenerate sample last.
    Degenerate,
    /// A read failed and the device moved to FAULT.
    Faulted(HardwareError),
}

/// Result of a bounded join that did not produce a [`WorkerExit`].
#[derive(Debug)]
pub enum JoinFailure {
    /// The worker is still running; the handle is returned for a later join.
    TimedOut(AcquisitionHandle),
    /// The worker thread panicked.
    Panicked,
}

pub(crate) type CaptureReply = oneshot::Sender<RigResult<Arc<Sample>>>;

/// A running (or finished, not yet joined) acquisition session.
#[derive(Debug)]
pub struct AcquisitionHandle {
    id: u64,
    device: String,
    token: CancellationToken,
    thread: JoinHandle<WorkerExit>,
    started: Instant,
}

impl AcquisitionHandle {
    /// Session id, unique within the process.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Set the cancellation token. Does not wait.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the worker thread has returned.
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Whether the caller is running on this session's worker thread.
    pub fn is_current_thread(&self) -> bool {
        self.thread.thread().id() == thread::current().id()
    }

    /// Wait up to `timeout` for the worker to exit.
    pub fn join_timeout(self, timeout: Duration) -> Result<WorkerExit, JoinFailure> {
        let deadline = Instant::now() + timeout;
        while !self.thread.is_finished() {
            if Instant::now() >= deadline {
                warn!(
                    device = %self.device,
                    session = self.id,
                    timeout_ms = timeout.as_millis() as u64,
                    "Acquisition worker did not exit in time"
                );
                return Err(JoinFailure::TimedOut(self));
            }
            thread::sleep(JOIN_POLL_INTERVAL);
        }

        let device = self.device;
        let id = self.id;
        let ran_for = self.started.elapsed();
        match self.thread.join() {
            Ok(exit) => {
                debug!(device = %device, session = id, ?exit, ran_ms = ran_for.as_millis() as u64, "Acquisition worker joined");
                Ok(exit)
            }
            Err(e) => {
                error!(device = %device, session = id, "Acquisition worker panicked: {:?}", e);
                Err(JoinFailure::Panicked)
            }
        }
    }
}

pub(crate) struct LoopContext<P: DeviceProfile, B: HardwareBackend> {
    pub core: Arc<DeviceCore<P>>,
    pub handle: Arc<HandleGuard<B>>,
    /// Stop after this many iterations; `None` loops until cancelled.
    pub limit: Option<u64>,
    pub reply: Option<CaptureReply>,
}

pub(crate) struct AcquisitionLoop;

/// Clears the device's acquiring flag when the worker ends, including by
/// panic.
struct RunningFlag<'a>(&'a AtomicBool);

impl Drop for RunningFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl AcquisitionLoop {
    /// Spawn the worker thread `acq-<device>`.
    pub(crate) fn spawn<P, B>(ctx: LoopContext<P, B>) -> RigResult<AcquisitionHandle>
    where
        P: DeviceProfile,
        B: HardwareBackend,
    {
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let device = ctx.core.name.clone();

        ctx.core.acquiring.store(true, Ordering::SeqCst);
        let worker_token = token.clone();
        let spawned = thread::Builder::new()
            .name(format!("acq-{}", device))
            .spawn(move || run(ctx, worker_token, id));

        let thread = match spawned {
            Ok(thread) => thread,
            Err(e) => return Err(RigError::Io(e)),
        };

        Ok(AcquisitionHandle {
            id,
            device,
            token,
            thread,
            started: Instant::now(),
        })
    }
}

fn run<P, B>(ctx: LoopContext<P, B>, token: CancellationToken, id: u64) -> WorkerExit
where
    P: DeviceProfile,
    B: HardwareBackend,
{
    let LoopContext {
        core,
        handle,
        limit,
        reply,
    } = ctx;
    let span = info_span!("acquisition", device = %core.name, kind = core.profile.kind(), session = id);
    let _enter = span.enter();
    let roles = core.roles;
    let running = RunningFlag(&core.acquiring);

    debug!("Acquisition worker started");
    let mut iterations: u64 = 0;
    let mut produced: Option<Arc<Sample>> = None;

    let exit = loop {
        if token.is_cancelled() {
            break WorkerExit::Cancelled;
        }

        let params = core.params.snapshot();
        let reading = handle.read_sample(&params);

        if token.is_cancelled() {
            debug!("Discarding reading completed after cancellation");
            break WorkerExit::Cancelled;
        }
        iterations += 1;

        match reading {
            Ok(payload) if core.profile.is_plausible(&payload, &params) => {
                let sequence = core.next_sequence();
                let sample = Arc::new(Sample::new(core.name.clone(), sequence, payload));
                core.machine.transition(roles.active);
                let delivered = core.bus.publish(&sample);
                debug!(sequence, delivered, "Sample published");
                *core.last_sample.write() = Some(Arc::clone(&sample));
                produced = Some(sample);

                if limit.is_some_and(|n| iterations >= n) {
                    break WorkerExit::Completed;
                }
            }
            Ok(_) => {
                warn!(state = %roles.alarm, "Degenerate reading");
                core.machine.transition(roles.alarm);
                produced = None;

                if limit.is_some_and(|n| iterations >= n) {
                    break WorkerExit::Degenerate;
                }
            }
            Err(err) => {
                error!(error = %err, state = %roles.fault, "Hardware error during acquisition");
                core.machine.transition(roles.fault);
                break WorkerExit::Faulted(err);
            }
        }
    };

    if matches!(exit, WorkerExit::Cancelled | WorkerExit::Completed) {
        core.machine.transition_from(roles.active, roles.on);
    }
    drop(running);
    debug!(?exit, iterations, "Acquisition worker exiting");

    if let Some(reply) = reply {
        let outcome = match &exit {
            WorkerExit::Completed => produced.ok_or(RigError::AcquisitionCancelled),
            WorkerExit::Cancelled => Err(RigError::AcquisitionCancelled),
            WorkerExit::Degenerate => Err(RigError::DegenerateSample(core.name.clone())),
            WorkerExit::Faulted(err) => Err(RigError::Hardware(err.clone())),
        };
        // The caller may have given up waiting.
        let _ = reply.send(outcome);
    }

    exit
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_shared_between_clones() {
        let token = CancellationToken::new();
        let worker = token.clone();
        assert!(!worker.is_cancelled());
        token.cancel();
        assert!(worker.is_cancelled());
    }

    #[test]
    fn join_timeout_returns_handle_when_worker_is_slow() {
        let token = CancellationToken::new();
        let worker_token = token.clone();
        let thread = thread::spawn(move || {
            while !worker_token.is_cancelled() {
                thread::sleep(Duration::from_millis(1));
            }
            WorkerExit::Cancelled
        });
        let handle = AcquisitionHandle {
            id: 0,
            device: "slow".into(),
            token,
            thread,
            started: Instant::now(),
        };

        let handle = match handle.join_timeout(Duration::from_millis(20)) {
            Err(JoinFailure::TimedOut(handle)) => handle,
            other => panic!("expected timeout, got {other:?}"),
        };
        handle.cancel();
        let exit = handle.join_timeout(Duration::from_secs(5));
        assert_eq!(exit.ok(), Some(WorkerExit::Cancelled));
    }

    #[test]
    fn join_reports_panicked_worker() {
        let thread = thread::spawn(|| -> WorkerExit { panic!("worker bug") });
        let handle = AcquisitionHandle {
            id: 0,
            device: "broken".into(),
            token: CancellationToken::new(),
            thread,
            started: Instant::now(),
        };
        assert!(matches!(
            handle.join_timeout(Duration::from_secs(5)),
            Err(JoinFailure::Panicked)
        ));
    }
}
