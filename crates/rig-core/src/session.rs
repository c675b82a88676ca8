//! Hardware handle lifecycle.
//!
//! [`HardwareBackend`] is the seam to the vendor SDK (or a simulator). A
//! [`DeviceSession`] acquires a handle on connect and releases it exactly
//! once: explicitly on disconnect, or through [`HandleGuard`]'s `Drop` when
//! the last owner goes away (device dropped, worker finished late).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{HardwareError, RigError, RigResult};
use crate::parameter::ParameterSet;
use crate::sample::{DeviceInfo, SamplePayload};

/// Blocking hardware collaborator of a device.
///
/// `unblock` and `apply_params` are called from the control path while a
/// `read_sample` may be in flight on the worker thread, hence `Sync`.
pub trait HardwareBackend: Send + Sync + 'static {
    /// Opaque handle returned by `acquire`.
    type Handle: Send + Sync + 'static;

    /// Open the device. `params` carries connection settings such as
    /// `camera_id` or `comport`.
    fn acquire(&self, params: &ParameterSet) -> Result<Self::Handle, HardwareError>;

    /// Close the device. Must tolerate repeated calls.
    fn release(&self, handle: &Self::Handle);

    /// Read model and serial number.
    fn identify(&self, handle: &Self::Handle) -> Result<DeviceInfo, HardwareError>;

    /// Blocking read of one sample using the given settings.
    fn read_sample(
        &self,
        handle: &Self::Handle,
        params: &ParameterSet,
    ) -> Result<SamplePayload, HardwareError>;

    /// Push the full parameter set to the hardware.
    fn apply_params(&self, handle: &Self::Handle, params: &ParameterSet)
        -> Result<(), HardwareError>;

    /// Reconfigure to free-run with a minimal timeout so that an in-flight
    /// `read_sample` returns promptly.
    fn unblock(&self, handle: &Self::Handle) -> Result<(), HardwareError>;
}

/// An acquired handle that is released exactly once.
pub struct HandleGuard<B: HardwareBackend> {
    device: String,
    backend: Arc<B>,
    handle: B::Handle,
    released: AtomicBool,
}

impl<B: HardwareBackend> HandleGuard<B> {
    /// Backend that issued the handle.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Raw handle.
    pub fn handle(&self) -> &B::Handle {
        &self.handle
    }

    /// Whether `release` already ran.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// See [`HardwareBackend::identify`].
    pub fn identify(&self) -> Result<DeviceInfo, HardwareError> {
        self.backend.identify(&self.handle)
    }

    /// See [`HardwareBackend::read_sample`].
    pub fn read_sample(&self, params: &ParameterSet) -> Result<SamplePayload, HardwareError> {
        self.backend.read_sample(&self.handle, params)
    }

    /// See [`HardwareBackend::apply_params`].
    pub fn apply_params(&self, params: &ParameterSet) -> Result<(), HardwareError> {
        self.backend.apply_params(&self.handle, params)
    }

    /// See [`HardwareBackend::unblock`].
    pub fn unblock(&self) -> Result<(), HardwareError> {
        self.backend.unblock(&self.handle)
    }

    /// Release the handle if that has not happened yet.
    pub fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.backend.release(&self.handle);
            debug!(device = %self.device, "Hardware handle released");
        }
    }
}

impl<B: HardwareBackend> Drop for HandleGuard<B> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Owns the optional handle of one device.
pub struct DeviceSession<B: HardwareBackend> {
    device: String,
    backend: Arc<B>,
    handle: Option<Arc<HandleGuard<B>>>,
}

impl<B: HardwareBackend> DeviceSession<B> {
    /// Session without a handle.
    pub fn new(device: impl Into<String>, backend: B) -> Self {
        Self {
            device: device.into(),
            backend: Arc::new(backend),
            handle: None,
        }
    }

    /// Shared backend.
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Whether a handle is held.
    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Current handle, if any.
    pub fn handle(&self) -> Option<Arc<HandleGuard<B>>> {
        self.handle.clone()
    }

    /// Like [`handle`](Self::handle) but fails with `NotConnected`.
    pub fn require(&self) -> RigResult<Arc<HandleGuard<B>>> {
        self.handle()
            .ok_or_else(|| RigError::NotConnected(self.device.clone()))
    }

    /// Acquire a handle, returning the existing one if already open.
    pub fn open(&mut self, params: &ParameterSet) -> Result<Arc<HandleGuard<B>>, HardwareError> {
        if let Some(handle) = &self.handle {
            return Ok(Arc::clone(handle));
        }
        let handle = self.backend.acquire(params)?;
        let guard = Arc::new(HandleGuard {
            device: self.device.clone(),
            backend: Arc::clone(&self.backend),
            handle,
            released: AtomicBool::new(false),
        });
        info!(device = %self.device, "Hardware handle acquired");
        self.handle = Some(Arc::clone(&guard));
        Ok(guard)
    }

    /// Release the handle now. Returns false when none was held.
    pub fn close(&mut self) -> bool {
        match self.handle.take() {
            Some(guard) => {
                guard.release();
                true
            }
            None => false,
        }
    }

    /// Forget the handle without releasing it; the last remaining owner
    /// releases it on drop.
    pub fn detach(&mut self) -> bool {
        self.handle.take().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingBackend {
        acquired: AtomicUsize,
        released: AtomicUsize,
        refuse: AtomicBool,
    }

    impl HardwareBackend for CountingBackend {
        type Handle = u32;

        fn acquire(&self, _params: &ParameterSet) -> Result<u32, HardwareError> {
            if self.refuse.load(Ordering::SeqCst) {
                return Err(HardwareError::connection("no device"));
            }
            Ok(self.acquired.fetch_add(1, Ordering::SeqCst) as u32)
        }

        fn release(&self, _handle: &u32) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }

        fn identify(&self, _handle: &u32) -> Result<DeviceInfo, HardwareError> {
            Ok(DeviceInfo::new("counter", "0"))
        }

        fn read_sample(&self, _h: &u32, _p: &ParameterSet) -> Result<SamplePayload, HardwareError> {
            Ok(SamplePayload::Scalar(1.0))
        }

        fn apply_params(&self, _h: &u32, _p: &ParameterSet) -> Result<(), HardwareError> {
            Ok(())
        }

        fn unblock(&self, _h: &u32) -> Result<(), HardwareError> {
            Ok(())
        }
    }

    #[test]
    fn close_releases_exactly_once() {
        let mut session = DeviceSession::new("s", CountingBackend::default());
        let guard = session.open(&ParameterSet::new()).unwrap();
        assert!(session.is_open());

        assert!(session.close());
        assert!(!session.close());
        guard.release();
        drop(guard);

        assert_eq!(session.backend().released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn detached_handle_released_by_last_owner() {
        let mut session = DeviceSession::new("s", CountingBackend::default());
        let guard = session.open(&ParameterSet::new()).unwrap();

        assert!(session.detach());
        assert_eq!(session.backend().released.load(Ordering::SeqCst), 0);
        drop(guard);
        assert_eq!(session.backend().released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn open_is_idempotent() {
        let mut session = DeviceSession::new("s", CountingBackend::default());
        session.open(&ParameterSet::new()).unwrap();
        session.open(&ParameterSet::new()).unwrap();
        assert_eq!(session.backend().acquired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_open_holds_nothing() {
        let backend = CountingBackend::default();
        backend.refuse.store(true, Ordering::SeqCst);
        let mut session = DeviceSession::new("s", backend);

        assert!(session.open(&ParameterSet::new()).is_err());
        assert!(!session.is_open());
        assert!(matches!(session.require(), Err(RigError::NotConnected(_))));
    }
}
