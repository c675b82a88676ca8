//! Device facade.
//!
//! [`Device`] composes the state machine, parameter guard, session, event bus
//! and acquisition worker for one device instance. The per-type policy (tag
//! set, allow-lists, parameter table, plausibility rule) comes from a
//! [`DeviceProfile`]; the hardware comes from a [`HardwareBackend`].
//!
//! All control-path operations of one device are serialized by a control
//! mutex. The worker itself never takes that mutex, but subscriber callbacks
//! run on the worker thread. A callback that calls back into its own device
//! therefore contends with the control path; see [`Device::subscribe`].
//!
//! # Example
//!
//! ```rust,ignore
//! let device = Device::new("spec-1", SpectrometerProfile, MockSpectrometer::new());
//! device.connect()?;
//! let (_id, mut rx) = device.subscribe_channel(64);
//! device.start_acquisition()?;
//! let first = rx.blocking_recv();
//! device.stop_acquisition()?;
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::acquisition::{AcquisitionHandle, AcquisitionLoop, CaptureReply, JoinFailure, LoopContext};
use crate::error::{HardwareError, RigError, RigResult};
use crate::events::{EventBus, SubscriptionId};
use crate::limits::{DEFAULT_EVENT_CHANNEL_CAPACITY, DEFAULT_JOIN_TIMEOUT};
use crate::parameter::{ParamValue, ParameterGuard, ParameterSet, ParameterSpec};
use crate::sample::{DeviceInfo, Sample, SamplePayload};
use crate::session::{DeviceSession, HandleGuard, HardwareBackend};
use crate::state::{Operation, StateMachine, StateRoles, StateTag, TransitionTable};

// =============================================================================
// Profile
// =============================================================================

/// Static description of a device type.
pub trait DeviceProfile: Send + Sync + 'static {
    /// Tag enum of this device type.
    type State: StateTag;

    /// Short type name, e.g. `"spectrometer"`.
    fn kind(&self) -> &'static str;

    /// Which tags play the shared lifecycle roles.
    fn roles(&self) -> StateRoles<Self::State>;

    /// Allow-list of operations per tag.
    fn transitions(&self) -> TransitionTable<Self::State>;

    /// Parameter table with defaults.
    fn parameters(&self) -> Vec<ParameterSpec<Self::State>>;

    /// Classify a well-formed reading taken with `settings`. Implausible
    /// readings raise ALARM.
    fn is_plausible(&self, payload: &SamplePayload, _settings: &ParameterSet) -> bool {
        payload.is_plausible()
    }
}

/// Per-device runtime settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceSettings {
    /// How long a stop waits for the worker.
    pub join_timeout: Duration,
    /// Capacity used by [`Device::subscribe_buffered`].
    pub event_channel_capacity: usize,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }
}

/// State shared between the control path and the worker.
pub(crate) struct DeviceCore<P: DeviceProfile> {
    pub name: String,
    pub profile: P,
    pub roles: StateRoles<P::State>,
    pub machine: StateMachine<P::State>,
    pub params: ParameterGuard<P::State>,
    pub bus: EventBus,
    pub sequence: AtomicU64,
    pub acquiring: AtomicBool,
    pub last_sample: RwLock<Option<Arc<Sample>>>,
    pub info: RwLock<Option<DeviceInfo>>,
}

impl<P: DeviceProfile> DeviceCore<P> {
    pub fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }
}

struct Control<B: HardwareBackend> {
    session: DeviceSession<B>,
    acquisition: Option<AcquisitionHandle>,
}

// =============================================================================
// Device
// =============================================================================

/// One controllable device instance.
pub struct Device<P: DeviceProfile, B: HardwareBackend> {
    core: Arc<DeviceCore<P>>,
    control: Mutex<Control<B>>,
    settings: DeviceSettings,
}

impl<P: DeviceProfile, B: HardwareBackend> Device<P, B> {
    /// Device in its disconnected tag with default settings.
    pub fn new(name: impl Into<String>, profile: P, backend: B) -> Self {
        Self::with_settings(name, profile, backend, DeviceSettings::default())
    }

    /// Device with explicit runtime settings.
    pub fn with_settings(
        name: impl Into<String>,
        profile: P,
        backend: B,
        settings: DeviceSettings,
    ) -> Self {
        let name = name.into();
        let roles = profile.roles();
        let machine = StateMachine::new(name.clone(), roles.disconnected, profile.transitions());
        let params = ParameterGuard::new(profile.parameters());

        let core = DeviceCore {
            name: name.clone(),
            roles,
            machine,
            params,
            bus: EventBus::new(name.clone()),
            sequence: AtomicU64::new(0),
            acquiring: AtomicBool::new(false),
            last_sample: RwLock::new(None),
            info: RwLock::new(None),
            profile,
        };

        Self {
            core: Arc::new(core),
            control: Mutex::new(Control {
                session: DeviceSession::new(name, backend),
                acquisition: None,
            }),
            settings,
        }
    }

    /// Instance name, used in every log line.
    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Device type name from the profile.
    pub fn kind(&self) -> &'static str {
        self.core.profile.kind()
    }

    /// Static type description.
    pub fn profile(&self) -> &P {
        &self.core.profile
    }

    /// Lifecycle role assignment of the profile.
    pub fn roles(&self) -> StateRoles<P::State> {
        self.core.roles
    }

    /// Runtime settings this device was built with.
    pub fn settings(&self) -> DeviceSettings {
        self.settings
    }

    /// Shared backend, also while disconnected.
    pub fn backend(&self) -> Arc<B> {
        Arc::clone(self.control.lock().session.backend())
    }

    /// Current state tag.
    pub fn current_state(&self) -> P::State {
        self.core.machine.current()
    }

    /// Whether `op` is in the allow-list of the current tag.
    pub fn can_execute(&self, op: Operation) -> bool {
        self.core.machine.can_execute(op)
    }

    /// Operations allowed in the current tag.
    pub fn allowed_operations(&self) -> Vec<Operation> {
        self.core.machine.allowed_operations()
    }

    /// Whether a hardware handle is held.
    pub fn is_connected(&self) -> bool {
        self.control.lock().session.is_open()
    }

    /// True while a worker thread is running.
    pub fn is_acquiring(&self) -> bool {
        self.core.acquiring.load(Ordering::SeqCst)
    }

    /// Identity read during the last successful connect.
    pub fn device_info(&self) -> Option<DeviceInfo> {
        self.core.info.read().clone()
    }

    /// Most recent valid sample, kept across stops.
    pub fn last_sample(&self) -> Option<Arc<Sample>> {
        self.core.last_sample.read().clone()
    }

    // -------------------------------------------------------------------------
    // Session
    // -------------------------------------------------------------------------

    /// Acquire the hardware handle and move to ON.
    pub fn connect(&self) -> RigResult<()> {
        self.connect_with(&ParameterSet::new())
    }

    /// Connect and apply `overrides` on top of the configured values.
    ///
    /// Overrides are validated as writes in the ON state before the handle
    /// is acquired. The merged settings are pushed to the hardware once; if
    /// that fails the handle is released again.
    pub fn connect_with(&self, overrides: &ParameterSet) -> RigResult<()> {
        let mut control = self.control.lock();
        let core = &self.core;
        let roles = core.roles;
        core.machine.check(Operation::Connect)?;

        let mut pending = Vec::with_capacity(overrides.len());
        for (name, value) in overrides.iter() {
            let value = core.params.prepare(roles.on, name, value.clone())?;
            pending.push((name.to_string(), value));
        }

        info!(device = %core.name, kind = core.profile.kind(), "Connecting");
        let params = core.params.snapshot();
        let handle = match control.session.open(&params) {
            Ok(handle) => handle,
            Err(err) => {
                if let Some(state) = roles.connection_error {
                    core.machine.transition(state);
                }
                error!(device = %core.name, error = %err, state = %core.machine.current(), "Connection failed");
                return Err(RigError::Connection(err));
            }
        };
        core.machine.transition(roles.on);

        match handle.identify() {
            Ok(info) => {
                info!(device = %core.name, model = %info.model, serial = %info.serial_number, "Identified");
                *core.info.write() = Some(info);
            }
            Err(err) => warn!(device = %core.name, error = %err, "Could not read device identity"),
        }

        let mut candidate = core.params.snapshot();
        for (name, value) in &pending {
            candidate.insert(name.clone(), value.clone());
        }
        if let Err(err) = handle.apply_params(&candidate) {
            control.session.close();
            *core.info.write() = None;
            core.machine
                .transition(roles.connection_error.unwrap_or(roles.disconnected));
            error!(device = %core.name, error = %err, "Hardware rejected initial settings");
            return Err(RigError::Configuration(err.to_string()));
        }
        for (name, value) in pending {
            core.params.commit(&name, value);
        }

        info!(device = %core.name, state = %roles.on, "Connected");
        Ok(())
    }

    /// Stop any acquisition and release the handle. No-op without a handle.
    pub fn disconnect(&self) -> RigResult<()> {
        let mut control = self.control.lock();
        self.core.machine.check(Operation::Disconnect)?;
        self.stop_locked(&mut control, Operation::Disconnect)?;

        if !control.session.close() {
            debug!(device = %self.core.name, "Disconnect without a held handle");
            return Ok(());
        }
        *self.core.info.write() = None;
        self.core.machine.transition(self.core.roles.disconnected);
        info!(device = %self.core.name, "Disconnected");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Acquisition
    // -------------------------------------------------------------------------

    /// Spawn the acquisition worker. Any previous session is stopped first.
    pub fn start_acquisition(&self) -> RigResult<()> {
        let mut control = self.control.lock();
        self.core.machine.check(Operation::StartAcquisition)?;
        self.stop_locked(&mut control, Operation::StartAcquisition)?;

        let handle = control.session.require()?;
        let acquisition = self.spawn_worker(handle, None, None)?;
        info!(
            device = %self.core.name,
            session = acquisition.id(),
            state = %self.core.roles.active,
            "Acquisition started"
        );
        control.acquisition = Some(acquisition);
        Ok(())
    }

    /// Cancel the worker, unblock its read, join it and re-apply the
    /// configured parameters. No-op without a worker.
    pub fn stop_acquisition(&self) -> RigResult<()> {
        let mut control = self.control.lock();
        self.core.machine.check(Operation::StopAcquisition)?;
        self.stop_locked(&mut control, Operation::StopAcquisition)
    }

    /// Run exactly one iteration of the acquisition loop and return its
    /// sample.
    ///
    /// Blocks the calling thread; do not call from inside an async runtime.
    /// The control mutex is not held while waiting, so a concurrent
    /// `stop_acquisition()` cancels the capture.
    pub fn capture_once(&self) -> RigResult<Arc<Sample>> {
        let (id, reply) = {
            let mut control = self.control.lock();
            self.core.machine.check(Operation::CaptureOnce)?;
            self.stop_locked(&mut control, Operation::CaptureOnce)?;

            let handle = control.session.require()?;
            let (tx, rx) = oneshot::channel();
            let acquisition = self.spawn_worker(handle, Some(1), Some(tx))?;
            let id = acquisition.id();
            debug!(device = %self.core.name, session = id, "Single capture started");
            control.acquisition = Some(acquisition);
            (id, rx)
        };

        let outcome = reply
            .blocking_recv()
            .unwrap_or(Err(RigError::WorkerPanicked));

        let mut control = self.control.lock();
        if control.acquisition.as_ref().map(AcquisitionHandle::id) == Some(id) {
            if let Some(acquisition) = control.acquisition.take() {
                match acquisition.join_timeout(self.settings.join_timeout) {
                    Ok(_) => {}
                    Err(JoinFailure::TimedOut(acquisition)) => control.acquisition = Some(acquisition),
                    Err(JoinFailure::Panicked) => return Err(RigError::WorkerPanicked),
                }
            }
        }
        outcome
    }

    /// Leave FAULT or ALARM: stop a still running worker and return to ON.
    pub fn reset_fault(&self) -> RigResult<()> {
        let mut control = self.control.lock();
        self.core.machine.check(Operation::ResetFault)?;
        self.stop_locked(&mut control, Operation::ResetFault)?;
        let previous = self.core.machine.transition(self.core.roles.on);
        info!(device = %self.core.name, from = %previous, "Fault reset");
        Ok(())
    }

    /// Run a device-specific guarded action against the hardware.
    ///
    /// While `f` runs the device sits in `busy` (if given) and returns to
    /// the previous tag afterwards. A hardware error moves it to FAULT.
    pub fn execute_custom<T>(
        &self,
        op: Operation,
        busy: Option<P::State>,
        f: impl FnOnce(&HandleGuard<B>) -> Result<T, HardwareError>,
    ) -> RigResult<T> {
        let control = self.control.lock();
        self.core.machine.check(op)?;
        let handle = control.session.require()?;

        let previous = busy.map(|state| self.core.machine.transition(state));
        match f(&handle) {
            Ok(value) => {
                if let Some(previous) = previous {
                    self.core.machine.transition(previous);
                }
                debug!(device = %self.core.name, op = %op, "Custom operation completed");
                Ok(value)
            }
            Err(err) => {
                error!(device = %self.core.name, op = %op, error = %err, "Custom operation failed");
                self.core.machine.transition(self.core.roles.fault);
                Err(RigError::Hardware(err))
            }
        }
    }

    // -------------------------------------------------------------------------
    // Parameters
    // -------------------------------------------------------------------------

    /// Current value. Never guarded.
    pub fn get(&self, name: &str) -> RigResult<ParamValue> {
        self.core.params.read(name)
    }

    /// Guarded write. Returns the stored value, which may be clamped.
    pub fn set(&self, name: &str, value: impl Into<ParamValue>) -> RigResult<ParamValue> {
        let control = self.control.lock();
        let state = self.core.machine.current();
        let value = self.core.params.prepare(state, name, value.into())?;

        if let Some(handle) = control.session.handle() {
            let mut candidate = self.core.params.snapshot();
            candidate.insert(name, value.clone());
            handle
                .apply_params(&candidate)
                .map_err(|e| RigError::Configuration(e.to_string()))?;
        }
        self.core.params.commit(name, value.clone());
        debug!(device = %self.core.name, param = name, value = %value, "Parameter updated");
        Ok(value)
    }

    /// Initial value from configuration; validated, not state-guarded.
    pub fn preset(&self, name: &str, value: impl Into<ParamValue>) -> RigResult<ParamValue> {
        self.core.params.preset(name, value.into())
    }

    /// Replace the range of a numeric parameter. The stored value is kept.
    pub fn set_bounds(&self, name: &str, min: f64, max: f64) -> RigResult<()> {
        let _control = self.control.lock();
        self.core.machine.check(Operation::SetBounds)?;
        self.core.params.set_bounds(name, min, max)?;
        info!(device = %self.core.name, param = name, min, max, "Parameter bounds updated");
        Ok(())
    }

    /// Snapshot of all current values.
    pub fn parameters(&self) -> ParameterSet {
        self.core.params.snapshot()
    }

    /// Current spec of a parameter, including updated bounds.
    pub fn parameter_spec(&self, name: &str) -> Option<ParameterSpec<P::State>> {
        self.core.params.spec(name)
    }

    // -------------------------------------------------------------------------
    // Events
    // -------------------------------------------------------------------------

    /// Register a callback for every valid sample.
    ///
    /// Callbacks run on the acquisition worker thread. They may read
    /// parameters and state, but must not stop their own device:
    /// `stop_acquisition()`, `start_acquisition()`, `capture_once()`,
    /// `reset_fault()` and `disconnect()` called from a callback return
    /// [`RigError::CalledFromWorker`]. A callback that blocks on the control
    /// lock (for example `set()`) while another thread is stopping the
    /// device holds that stop up until its join timeout expires.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Sample) + Send + Sync + 'static,
    {
        self.core.bus.subscribe(callback)
    }

    /// Bounded channel subscription. Samples are dropped for this
    /// subscriber while its channel is full.
    pub fn subscribe_channel(&self, capacity: usize) -> (SubscriptionId, mpsc::Receiver<Arc<Sample>>) {
        self.core.bus.subscribe_channel(capacity)
    }

    /// Channel subscription sized by the configured event channel capacity.
    pub fn subscribe_buffered(&self) -> (SubscriptionId, mpsc::Receiver<Arc<Sample>>) {
        self.subscribe_channel(self.settings.event_channel_capacity)
    }

    /// Remove a subscription. Returns false for an unknown id.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.core.bus.unsubscribe(id)
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn spawn_worker(
        &self,
        handle: Arc<HandleGuard<B>>,
        limit: Option<u64>,
        reply: Option<CaptureReply>,
    ) -> RigResult<AcquisitionHandle> {
        let previous = self.core.machine.transition(self.core.roles.active);
        let ctx = LoopContext {
            core: Arc::clone(&self.core),
            handle,
            limit,
            reply,
        };
        AcquisitionLoop::spawn(ctx).map_err(|e| {
            self.core.acquiring.store(false, Ordering::SeqCst);
            self.core.machine.transition(previous);
            e
        })
    }

    fn stop_locked(&self, control: &mut Control<B>, op: Operation) -> RigResult<()> {
        let core = &self.core;
        if control
            .acquisition
            .as_ref()
            .is_some_and(AcquisitionHandle::is_current_thread)
        {
            warn!(device = %core.name, op = %op, "Stop requested from the acquisition worker");
            return Err(RigError::CalledFromWorker(op.to_string()));
        }
        let Some(acquisition) = control.acquisition.take() else {
            return Ok(());
        };
        let session = acquisition.id();
        acquisition.cancel();

        let handle = control.session.handle();
        if !acquisition.is_finished() {
            if let Some(handle) = &handle {
                if let Err(err) = handle.unblock() {
                    warn!(device = %core.name, error = %err, "Unblock hook failed");
                }
            }
        }

        match acquisition.join_timeout(self.settings.join_timeout) {
            Ok(_) => {}
            Err(JoinFailure::TimedOut(acquisition)) => {
                control.acquisition = Some(acquisition);
                return Err(RigError::StopTimeout(self.settings.join_timeout));
            }
            Err(JoinFailure::Panicked) => {
                core.acquiring.store(false, Ordering::SeqCst);
                core.machine.transition(core.roles.fault);
                return Err(RigError::WorkerPanicked);
            }
        }

        if let Some(handle) = &handle {
            let configured = core.params.snapshot();
            if let Err(err) = handle.apply_params(&configured) {
                warn!(device = %core.name, error = %err, "Could not restore configured parameters");
            }
        }
        core.machine.transition_from(core.roles.active, core.roles.on);
        info!(device = %core.name, session, state = %core.machine.current(), "Acquisition stopped");
        Ok(())
    }
}

impl<P: DeviceProfile, B: HardwareBackend> Drop for Device<P, B> {
    fn drop(&mut self) {
        let mut control = self.control.lock();
        match self.stop_locked(&mut control, Operation::StopAcquisition) {
            Ok(()) => {
                control.session.close();
            }
            Err(err) => {
                error!(device = %self.core.name, error = %err, "Error stopping acquisition on drop");
                control.session.detach();
            }
        }
    }
}

impl<P: DeviceProfile, B: HardwareBackend> std::fmt::Debug for Device<P, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.core.name)
            .field("kind", &self.core.profile.kind())
            .field("state", &self.core.machine.current())
            .finish()
    }
}

// =============================================================================
// ControlSurface
// =============================================================================

/// Object-safe control interface, for holding heterogeneous devices.
///
/// Every method forwards to the [`Device`] method of the same name.
pub trait ControlSurface: Send + Sync {
    /// Instance name.
    fn name(&self) -> &str;
    /// Device type name.
    fn kind(&self) -> &'static str;
    /// Display form of the current state tag.
    fn current_state(&self) -> String;
    /// Operations allowed in the current tag.
    fn allowed_operations(&self) -> Vec<Operation>;
    /// See [`Device::connect`].
    fn connect(&self) -> RigResult<()>;
    /// See [`Device::connect_with`].
    fn connect_with(&self, overrides: &ParameterSet) -> RigResult<()>;
    /// See [`Device::disconnect`].
    fn disconnect(&self) -> RigResult<()>;
    /// See [`Device::start_acquisition`].
    fn start_acquisition(&self) -> RigResult<()>;
    /// See [`Device::stop_acquisition`].
    fn stop_acquisition(&self) -> RigResult<()>;
    /// See [`Device::capture_once`].
    fn capture_once(&self) -> RigResult<Arc<Sample>>;
    /// See [`Device::reset_fault`].
    fn reset_fault(&self) -> RigResult<()>;
    /// See [`Device::get`].
    fn get(&self, name: &str) -> RigResult<ParamValue>;
    /// See [`Device::set`].
    fn set(&self, name: &str, value: ParamValue) -> RigResult<ParamValue>;
    /// See [`Device::preset`].
    fn preset(&self, name: &str, value: ParamValue) -> RigResult<ParamValue>;
    /// See [`Device::set_bounds`].
    fn set_bounds(&self, name: &str, min: f64, max: f64) -> RigResult<()>;
    /// See [`Device::parameters`].
    fn parameters(&self) -> ParameterSet;
    /// See [`Device::subscribe`].
    fn subscribe(&self, callback: Box<dyn Fn(&Sample) + Send + Sync>) -> SubscriptionId;
    /// See [`Device::subscribe_channel`].
    fn subscribe_channel(&self, capacity: usize) -> (SubscriptionId, mpsc::Receiver<Arc<Sample>>);
    /// See [`Device::subscribe_buffered`].
    fn subscribe_buffered(&self) -> (SubscriptionId, mpsc::Receiver<Arc<Sample>>);
    /// See [`Device::unsubscribe`].
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
    /// See [`Device::device_info`].
    fn device_info(&self) -> Option<DeviceInfo>;
    /// See [`Device::last_sample`].
    fn last_sample(&self) -> Option<Arc<Sample>>;
    /// See [`Device::is_acquiring`].
    fn is_acquiring(&self) -> bool;
}

impl<P: DeviceProfile, B: HardwareBackend> ControlSurface for Device<P, B> {
    fn name(&self) -> &str {
        Device::name(self)
    }

    fn kind(&self) -> &'static str {
        Device::kind(self)
    }

    fn current_state(&self) -> String {
        Device::current_state(self).to_string()
    }

    fn allowed_operations(&self) -> Vec<Operation> {
        Device::allowed_operations(self)
    }

    fn connect(&self) -> RigResult<()> {
        Device::connect(self)
    }

    fn connect_with(&self, overrides: &ParameterSet) -> RigResult<()> {
        Device::connect_with(self, overrides)
    }

    fn disconnect(&self) -> RigResult<()> {
        Device::disconnect(self)
    }

    fn start_acquisition(&self) -> RigResult<()> {
        Device::start_acquisition(self)
    }

    fn stop_acquisition(&self) -> RigResult<()> {
        Device::stop_acquisition(self)
    }

    fn capture_once(&self) -> RigResult<Arc<Sample>> {
        Device::capture_once(self)
    }

    fn reset_fault(&self) -> RigResult<()> {
        Device::reset_fault(self)
    }

    fn get(&self, name: &str) -> RigResult<ParamValue> {
        Device::get(self, name)
    }

    fn set(&self, name: &str, value: ParamValue) -> RigResult<ParamValue> {
        Device::set(self, name, value)
    }

    fn preset(&self, name: &str, value: ParamValue) -> RigResult<ParamValue> {
        Device::preset(self, name, value)
    }

    fn set_bounds(&self, name: &str, min: f64, max: f64) -> RigResult<()> {
        Device::set_bounds(self, name, min, max)
    }

    fn parameters(&self) -> ParameterSet {
        Device::parameters(self)
    }

    fn subscribe(&self, callback: Box<dyn Fn(&Sample) + Send + Sync>) -> SubscriptionId {
        self.core.bus.subscribe(callback)
    }

    fn subscribe_channel(&self, capacity: usize) -> (SubscriptionId, mpsc::Receiver<Arc<Sample>>) {
        Device::subscribe_channel(self, capacity)
    }

    fn subscribe_buffered(&self) -> (SubscriptionId, mpsc::Receiver<Arc<Sample>>) {
        Device::subscribe_buffered(self)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        Device::unsubscribe(self, id)
    }

    fn device_info(&self) -> Option<DeviceInfo> {
        Device::device_info(self)
    }

    fn last_sample(&self) -> Option<Arc<Sample>> {
        Device::last_sample(self)
    }

    fn is_acquiring(&self) -> bool {
        Device::is_acquiring(self)
    }
}
