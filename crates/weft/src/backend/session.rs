//! Per-graph runtime sessions and the call push/invoke/pop cycle.

use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, Result};

use super::handle::Handle;
use super::runtime::{RawBufferView, RawCall, RawSession, RuntimeApi};
use super::Backend;

/// Runtime session bound to one device with the graph's compiled module
/// loaded. Owned by the graph that compiled it and released on drop.
pub struct Session {
    api: Arc<RuntimeApi>,
    backend: Backend,
    // Stored as usize so sessions satisfy Send/Sync bounds.
    raw: usize,
}

impl Session {
    /// Opens a session on the handle's device and loads the artifact.
    pub(crate) fn create(handle: &Handle, artifact: &Path) -> Result<Session> {
        log::info!("creating runtime session for {}", artifact.display());
        let api = Arc::clone(handle.api());
        let raw = api.session_create(handle.instance_ptr(), handle.device_ptr())?;
        let session = Session {
            api,
            backend: handle.backend(),
            raw: raw as usize,
        };
        let module = std::fs::read(artifact).map_err(|err| {
            Error::runtime_failure(format!(
                "failed to read compiled artifact {}: {err}",
                artifact.display()
            ))
        })?;
        session
            .api
            .session_load_module(session.raw_ptr(), &module)?;
        Ok(session)
    }

    /// Sessions are device-scoped; executing through a handle for another
    /// backend is a caller error.
    pub(crate) fn check_handle(&self, handle: &Handle) -> Result<()> {
        if handle.backend() != self.backend {
            return Err(Error::runtime_failure(format!(
                "graph was compiled for backend {} but executed with a {} handle",
                self.backend,
                handle.backend()
            )));
        }
        Ok(())
    }

    pub(crate) fn api(&self) -> &Arc<RuntimeApi> {
        &self.api
    }

    pub(crate) fn create_call(&self, entrypoint: &str) -> Result<Call> {
        let raw = self.api.call_create(self.raw_ptr(), entrypoint)?;
        Ok(Call {
            api: Arc::clone(&self.api),
            raw: raw as usize,
        })
    }

    fn raw_ptr(&self) -> RawSession {
        self.raw as RawSession
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.api.session_release(self.raw_ptr());
    }
}

/// One invocation of the loaded entrypoint: push arguments in signature
/// order, invoke, pop one view per result.
pub(crate) struct Call {
    api: Arc<RuntimeApi>,
    raw: usize,
}

impl Call {
    pub(crate) fn push_input(&self, view: RawBufferView) -> Result<()> {
        self.api.call_push_input(self.raw_ptr(), view)
    }

    pub(crate) fn invoke(&self) -> Result<()> {
        self.api.call_invoke(self.raw_ptr())
    }

    pub(crate) fn pop_output(&self) -> Result<RawBufferView> {
        self.api.call_pop_output(self.raw_ptr())
    }

    fn raw_ptr(&self) -> RawCall {
        self.raw as RawCall
    }
}

impl Drop for Call {
    fn drop(&mut self) {
        self.api.call_release(self.raw_ptr());
    }
}
