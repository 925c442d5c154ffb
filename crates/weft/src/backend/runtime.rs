//! Raw bindings to the runtime's C ABI, resolved at first use.
//!
//! The runtime ships as a shared library exposing a flat entry-point set:
//! instance and device lifetime, per-session module loading, the call
//! push/invoke/pop cycle, and buffer-view allocation plus host transfer.
//! Every call returns a status handle; ok is the null status.

use std::ffi::{c_char, c_void};
use std::sync::{Arc, OnceLock};

use libloading::Library;

use crate::error::{Error, Result};

pub(crate) type RawStatus = *mut c_void;
pub(crate) type RawInstance = *mut c_void;
pub(crate) type RawDevice = *mut c_void;
pub(crate) type RawSession = *mut c_void;
pub(crate) type RawCall = *mut c_void;
pub(crate) type RawBufferView = *mut c_void;

type StatusCodeFn = unsafe extern "C" fn(status: RawStatus) -> i32;
type StatusFreeFn = unsafe extern "C" fn(status: RawStatus);
type InstanceCreateFn = unsafe extern "C" fn(out_instance: *mut RawInstance) -> RawStatus;
type InstanceReleaseFn = unsafe extern "C" fn(instance: RawInstance);
type DeviceCreateFn = unsafe extern "C" fn(
    instance: RawInstance,
    driver: *const c_char,
    out_device: *mut RawDevice,
) -> RawStatus;
type DeviceReleaseFn = unsafe extern "C" fn(device: RawDevice);
type SessionCreateFn = unsafe extern "C" fn(
    instance: RawInstance,
    device: RawDevice,
    out_session: *mut RawSession,
) -> RawStatus;
type SessionReleaseFn = unsafe extern "C" fn(session: RawSession);
type SessionLoadModuleFn =
    unsafe extern "C" fn(session: RawSession, data: *const u8, length: usize) -> RawStatus;
type CallCreateFn = unsafe extern "C" fn(
    session: RawSession,
    entrypoint: *const c_char,
    out_call: *mut RawCall,
) -> RawStatus;
type CallReleaseFn = unsafe extern "C" fn(call: RawCall);
type CallPushInputFn = unsafe extern "C" fn(call: RawCall, view: RawBufferView) -> RawStatus;
type CallInvokeFn = unsafe extern "C" fn(call: RawCall) -> RawStatus;
type CallPopOutputFn =
    unsafe extern "C" fn(call: RawCall, out_view: *mut RawBufferView) -> RawStatus;
type BufferViewAllocateFn = unsafe extern "C" fn(
    device: RawDevice,
    shape: *const usize,
    rank: usize,
    element_type: u32,
    data: *const u8,
    length: usize,
    out_view: *mut RawBufferView,
) -> RawStatus;
type BufferViewRetainFn = unsafe extern "C" fn(view: RawBufferView);
type BufferViewReleaseFn = unsafe extern "C" fn(view: RawBufferView);
type BufferViewByteLengthFn = unsafe extern "C" fn(view: RawBufferView) -> usize;
type BufferViewReadFn = unsafe extern "C" fn(
    device: RawDevice,
    view: RawBufferView,
    out_data: *mut u8,
    length: usize,
) -> RawStatus;

struct RuntimeFns {
    status_code: StatusCodeFn,
    status_free: StatusFreeFn,
    instance_create: InstanceCreateFn,
    instance_release: InstanceReleaseFn,
    device_create: DeviceCreateFn,
    device_release: DeviceReleaseFn,
    session_create: SessionCreateFn,
    session_release: SessionReleaseFn,
    session_load_module: SessionLoadModuleFn,
    call_create: CallCreateFn,
    call_release: CallReleaseFn,
    call_push_input: CallPushInputFn,
    call_invoke: CallInvokeFn,
    call_pop_output: CallPopOutputFn,
    buffer_view_allocate: BufferViewAllocateFn,
    buffer_view_retain: BufferViewRetainFn,
    buffer_view_release: BufferViewReleaseFn,
    buffer_view_byte_length: BufferViewByteLengthFn,
    buffer_view_read: BufferViewReadFn,
}

/// Loaded runtime library plus its resolved entry points.
pub(crate) struct RuntimeApi {
    _lib: Library,
    fns: RuntimeFns,
}

static RUNTIME_API: OnceLock<std::result::Result<Arc<RuntimeApi>, String>> = OnceLock::new();

/// True when the runtime shared library can be loaded on this host.
pub fn is_available() -> bool {
    api().is_ok()
}

/// Process-wide runtime bindings, loaded once.
pub(crate) fn api() -> Result<Arc<RuntimeApi>> {
    let init = RUNTIME_API.get_or_init(|| match RuntimeApi::load() {
        Ok(api) => Ok(Arc::new(api)),
        Err(err) => Err(err.to_string()),
    });
    match init {
        Ok(api) => Ok(Arc::clone(api)),
        Err(message) => Err(Error::runtime_failure(format!(
            "runtime library unavailable: {message}"
        ))),
    }
}

impl RuntimeApi {
    fn load() -> Result<Self> {
        let lib = load_runtime_library()?;
        let fns = RuntimeFns {
            status_code: load_symbol(&lib, b"ireert_status_code\0")?,
            status_free: load_symbol(&lib, b"ireert_status_free\0")?,
            instance_create: load_symbol(&lib, b"ireert_instance_create\0")?,
            instance_release: load_symbol(&lib, b"ireert_instance_release\0")?,
            device_create: load_symbol(&lib, b"ireert_device_create\0")?,
            device_release: load_symbol(&lib, b"ireert_device_release\0")?,
            session_create: load_symbol(&lib, b"ireert_session_create\0")?,
            session_release: load_symbol(&lib, b"ireert_session_release\0")?,
            session_load_module: load_symbol(&lib, b"ireert_session_load_module\0")?,
            call_create: load_symbol(&lib, b"ireert_call_create\0")?,
            call_release: load_symbol(&lib, b"ireert_call_release\0")?,
            call_push_input: load_symbol(&lib, b"ireert_call_push_input\0")?,
            call_invoke: load_symbol(&lib, b"ireert_call_invoke\0")?,
            call_pop_output: load_symbol(&lib, b"ireert_call_pop_output\0")?,
            buffer_view_allocate: load_symbol(&lib, b"ireert_buffer_view_allocate\0")?,
            buffer_view_retain: load_symbol(&lib, b"ireert_buffer_view_retain\0")?,
            buffer_view_release: load_symbol(&lib, b"ireert_buffer_view_release\0")?,
            buffer_view_byte_length: load_symbol(&lib, b"ireert_buffer_view_byte_length\0")?,
            buffer_view_read: load_symbol(&lib, b"ireert_buffer_view_read\0")?,
        };
        Ok(RuntimeApi { _lib: lib, fns })
    }

    fn check(&self, status: RawStatus, op: &str) -> Result<()> {
        if status.is_null() {
            return Ok(());
        }
        // SAFETY: Non-null statuses are owned by the caller and released
        // exactly once after the code is extracted.
        let code = unsafe {
            let code = (self.fns.status_code)(status);
            (self.fns.status_free)(status);
            code
        };
        Err(Error::runtime_failure(format!(
            "runtime call {op} failed with code {code}"
        )))
    }

    pub(crate) fn instance_create(&self) -> Result<RawInstance> {
        let mut instance: RawInstance = std::ptr::null_mut();
        // SAFETY: `instance` is a valid out pointer for the call.
        let status = unsafe { (self.fns.instance_create)(&mut instance) };
        self.check(status, "ireert_instance_create")?;
        Ok(instance)
    }

    pub(crate) fn instance_release(&self, instance: RawInstance) {
        if !instance.is_null() {
            // SAFETY: Instance was created by this library and is released once.
            unsafe { (self.fns.instance_release)(instance) };
        }
    }

    pub(crate) fn device_create(&self, instance: RawInstance, driver: &str) -> Result<RawDevice> {
        let c_driver = std::ffi::CString::new(driver)
            .map_err(|_| Error::runtime_failure("driver name contains NUL byte"))?;
        let mut device: RawDevice = std::ptr::null_mut();
        // SAFETY: Pointers are valid for the duration of the call.
        let status =
            unsafe { (self.fns.device_create)(instance, c_driver.as_ptr(), &mut device) };
        self.check(status, "ireert_device_create")?;
        Ok(device)
    }

    pub(crate) fn device_release(&self, device: RawDevice) {
        if !device.is_null() {
            // SAFETY: Device was created by this library and is released once.
            unsafe { (self.fns.device_release)(device) };
        }
    }

    pub(crate) fn session_create(
        &self,
        instance: RawInstance,
        device: RawDevice,
    ) -> Result<RawSession> {
        let mut session: RawSession = std::ptr::null_mut();
        // SAFETY: Pointers are valid for the duration of the call.
        let status = unsafe { (self.fns.session_create)(instance, device, &mut session) };
        self.check(status, "ireert_session_create")?;
        Ok(session)
    }

    pub(crate) fn session_release(&self, session: RawSession) {
        if !session.is_null() {
            // SAFETY: Session was created by this library and is released once.
            unsafe { (self.fns.session_release)(session) };
        }
    }

    pub(crate) fn session_load_module(&self, session: RawSession, data: &[u8]) -> Result<()> {
        // SAFETY: `data` stays alive for the duration of the call; the
        // runtime copies the module bytes it needs.
        let status =
            unsafe { (self.fns.session_load_module)(session, data.as_ptr(), data.len()) };
        self.check(status, "ireert_session_load_module")
    }

    pub(crate) fn call_create(&self, session: RawSession, entrypoint: &str) -> Result<RawCall> {
        let c_entry = std::ffi::CString::new(entrypoint)
            .map_err(|_| Error::runtime_failure("entrypoint name contains NUL byte"))?;
        let mut call: RawCall = std::ptr::null_mut();
        // SAFETY: Pointers are valid for the duration of the call.
        let status = unsafe { (self.fns.call_create)(session, c_entry.as_ptr(), &mut call) };
        self.check(status, "ireert_call_create")?;
        Ok(call)
    }

    pub(crate) fn call_release(&self, call: RawCall) {
        if !call.is_null() {
            // SAFETY: Call was created by this library and is released once.
            unsafe { (self.fns.call_release)(call) };
        }
    }

    pub(crate) fn call_push_input(&self, call: RawCall, view: RawBufferView) -> Result<()> {
        // SAFETY: Both handles belong to this library.
        let status = unsafe { (self.fns.call_push_input)(call, view) };
        self.check(status, "ireert_call_push_input")
    }

    pub(crate) fn call_invoke(&self, call: RawCall) -> Result<()> {
        // SAFETY: Call handle belongs to this library.
        let status = unsafe { (self.fns.call_invoke)(call) };
        self.check(status, "ireert_call_invoke")
    }

    pub(crate) fn call_pop_output(&self, call: RawCall) -> Result<RawBufferView> {
        let mut view: RawBufferView = std::ptr::null_mut();
        // SAFETY: Pointers are valid for the duration of the call; the
        // popped view reference is owned by the caller.
        let status = unsafe { (self.fns.call_pop_output)(call, &mut view) };
        self.check(status, "ireert_call_pop_output")?;
        Ok(view)
    }

    pub(crate) fn buffer_view_allocate(
        &self,
        device: RawDevice,
        shape: &[usize],
        element_type: u32,
        data: &[u8],
    ) -> Result<RawBufferView> {
        let mut view: RawBufferView = std::ptr::null_mut();
        // SAFETY: Slices stay alive for the duration of the call; the
        // runtime copies the host bytes into the new device allocation.
        let status = unsafe {
            (self.fns.buffer_view_allocate)(
                device,
                shape.as_ptr(),
                shape.len(),
                element_type,
                data.as_ptr(),
                data.len(),
                &mut view,
            )
        };
        self.check(status, "ireert_buffer_view_allocate")?;
        Ok(view)
    }

    pub(crate) fn buffer_view_retain(&self, view: RawBufferView) {
        if !view.is_null() {
            // SAFETY: View belongs to this library; retain adds one reference.
            unsafe { (self.fns.buffer_view_retain)(view) };
        }
    }

    pub(crate) fn buffer_view_release(&self, view: RawBufferView) {
        if !view.is_null() {
            // SAFETY: View belongs to this library; release drops one reference.
            unsafe { (self.fns.buffer_view_release)(view) };
        }
    }

    pub(crate) fn buffer_view_byte_length(&self, view: RawBufferView) -> usize {
        // SAFETY: View belongs to this library and is alive.
        unsafe { (self.fns.buffer_view_byte_length)(view) }
    }

    /// Blocking device-to-host transfer; returns once the device signals
    /// completion.
    pub(crate) fn buffer_view_read(
        &self,
        device: RawDevice,
        view: RawBufferView,
        out: &mut [u8],
    ) -> Result<()> {
        // SAFETY: Destination slice is valid and writable for its length.
        let status = unsafe {
            (self.fns.buffer_view_read)(device, view, out.as_mut_ptr(), out.len())
        };
        self.check(status, "ireert_buffer_view_read")
    }
}

fn load_runtime_library() -> Result<Library> {
    if let Ok(value) = std::env::var("WEFT_RUNTIME_LIB") {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            // SAFETY: Dynamic library probe only; no symbols invoked yet.
            return unsafe { Library::new(trimmed) }.map_err(|err| {
                Error::runtime_failure(format!("failed to load runtime library {trimmed}: {err}"))
            });
        }
    }

    let candidates = [
        "libiree_runtime.so",
        "libiree_runtime.dylib",
        "iree_runtime.dll",
    ];
    for candidate in candidates {
        // SAFETY: Dynamic library probe only; no symbols invoked yet.
        if let Ok(lib) = unsafe { Library::new(candidate) } {
            return Ok(lib);
        }
    }

    Err(Error::runtime_failure(
        "failed to load runtime library (tried libiree_runtime.so, libiree_runtime.dylib, iree_runtime.dll)",
    ))
}

fn load_symbol<T: Copy>(lib: &Library, name: &'static [u8]) -> Result<T> {
    // SAFETY: Caller provides the expected symbol type from the runtime ABI.
    let symbol = unsafe { lib.get::<T>(name) }.map_err(|err| {
        Error::runtime_failure(format!(
            "failed to resolve runtime symbol {}: {err}",
            String::from_utf8_lossy(name)
        ))
    })?;
    Ok(*symbol)
}
