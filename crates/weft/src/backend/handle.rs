//! Device handles and the shared runtime instance behind them.

use std::sync::{Arc, Mutex, OnceLock, Weak};

use crate::error::Result;

use super::runtime::{self, RawDevice, RawInstance, RuntimeApi};
use super::Backend;

/// Process-wide runtime instance. Handles share one instance; it is
/// released when the last handle drops, so a later handle re-creates it.
struct SharedInstance {
    api: Arc<RuntimeApi>,
    // Stored as usize so the instance satisfies Send/Sync bounds.
    raw: usize,
}

impl SharedInstance {
    fn raw_ptr(&self) -> RawInstance {
        self.raw as RawInstance
    }
}

impl Drop for SharedInstance {
    fn drop(&mut self) {
        self.api.instance_release(self.raw_ptr());
    }
}

fn shared_instance(api: &Arc<RuntimeApi>) -> Result<Arc<SharedInstance>> {
    static SLOT: OnceLock<Mutex<Weak<SharedInstance>>> = OnceLock::new();
    let slot = SLOT.get_or_init(|| Mutex::new(Weak::new()));
    let mut guard = slot.lock().expect("shared runtime instance slot poisoned");
    if let Some(existing) = guard.upgrade() {
        return Ok(existing);
    }
    log::debug!("creating shared runtime instance");
    let raw = api.instance_create()?;
    let instance = Arc::new(SharedInstance {
        api: Arc::clone(api),
        raw: raw as usize,
    });
    *guard = Arc::downgrade(&instance);
    Ok(instance)
}

/// RAII wrapper owning one logical device on a backend.
///
/// Graphs targeting the same physical device should share a handle; the
/// device is released when the handle drops, and the runtime instance when
/// the last handle in the process drops.
pub struct Handle {
    backend: Backend,
    api: Arc<RuntimeApi>,
    instance: Arc<SharedInstance>,
    // Stored as usize so the handle satisfies Send/Sync bounds.
    device: usize,
}

impl Handle {
    /// Creates a handle for `backend`, lazily bringing up the shared
    /// runtime instance and this handle's device.
    pub fn create(backend: Backend) -> Result<Self> {
        log::info!("creating handle for backend {backend}");
        let api = runtime::api()?;
        let instance = shared_instance(&api)?;
        let device = api.device_create(instance.raw_ptr(), backend.hal_driver())?;
        Ok(Handle {
            backend,
            api,
            instance,
            device: device as usize,
        })
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub(crate) fn api(&self) -> &Arc<RuntimeApi> {
        &self.api
    }

    pub(crate) fn device_ptr(&self) -> RawDevice {
        self.device as RawDevice
    }

    pub(crate) fn instance_ptr(&self) -> RawInstance {
        self.instance.raw_ptr()
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.api.device_release(self.device_ptr());
        // `instance` drops after the device, releasing the runtime
        // instance if this was the last handle.
    }
}
