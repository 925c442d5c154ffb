//! Device buffer ownership and host transfer.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::types::DataType;

use super::handle::Handle;
use super::runtime::{RawBufferView, RuntimeApi};

/// Host scalar types that map onto a buffer element type.
///
/// Implementors must be plain-old-data: any bit pattern of `Self` is valid
/// and the type carries no padding, so host slices can be reinterpreted as
/// raw bytes for transfer.
pub trait Element: Copy + 'static {
    const DATA_TYPE: DataType;
}

impl Element for half::f16 {
    const DATA_TYPE: DataType = DataType::Half;
}

impl Element for half::bf16 {
    const DATA_TYPE: DataType = DataType::BFloat16;
}

impl Element for f32 {
    const DATA_TYPE: DataType = DataType::Float;
}

impl Element for f64 {
    const DATA_TYPE: DataType = DataType::Double;
}

impl Element for u8 {
    const DATA_TYPE: DataType = DataType::Uint8;
}

impl Element for i8 {
    const DATA_TYPE: DataType = DataType::Int8;
}

impl Element for i16 {
    const DATA_TYPE: DataType = DataType::Int16;
}

impl Element for i32 {
    const DATA_TYPE: DataType = DataType::Int32;
}

impl Element for i64 {
    const DATA_TYPE: DataType = DataType::Int64;
}

/// Move-only owner of one device buffer view.
///
/// A default-constructed buffer is empty; execute fills empty output slots
/// destination-passing style. The view is released exactly once on drop.
#[derive(Default)]
pub struct Buffer {
    api: Option<Arc<RuntimeApi>>,
    // Stored as usize so buffers satisfy Send/Sync bounds; null when empty.
    view: usize,
}

impl Buffer {
    /// Empty buffer with no device storage attached.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a device buffer of `shape` and fills it from `data`.
    pub fn allocate<T: Element>(handle: &Handle, shape: &[i64], data: &[T]) -> Result<Buffer> {
        log::debug!("allocating device buffer of shape {shape:?}");
        let expected: i64 = shape.iter().product();
        if expected != data.len() as i64 {
            return Err(Error::runtime_failure(format!(
                "buffer shape {shape:?} implies {expected} elements but {} were provided",
                data.len()
            )));
        }
        let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
        // SAFETY: Element implementors are plain-old-data, so the host
        // slice can be viewed as its raw bytes.
        let bytes = unsafe {
            std::slice::from_raw_parts(data.as_ptr() as *const u8, std::mem::size_of_val(data))
        };
        let view = handle.api().buffer_view_allocate(
            handle.device_ptr(),
            &dims,
            T::DATA_TYPE.hal_element_type()?,
            bytes,
        )?;
        Ok(Buffer {
            api: Some(Arc::clone(handle.api())),
            view: view as usize,
        })
    }

    /// Wraps an externally owned view, retaining it so drop keeps
    /// retain/release parity with the importer.
    pub fn import(handle: &Handle, view: *mut std::ffi::c_void) -> Result<Buffer> {
        if view.is_null() {
            return Err(Error::runtime_failure("cannot import a null buffer view"));
        }
        handle.api().buffer_view_retain(view);
        Ok(Buffer {
            api: Some(Arc::clone(handle.api())),
            view: view as usize,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.view == 0
    }

    pub(crate) fn raw_view(&self) -> RawBufferView {
        self.view as RawBufferView
    }

    /// Takes ownership of a view popped from a call, releasing whatever the
    /// buffer held before. Adopting the view already held just drops the
    /// extra reference.
    pub(crate) fn adopt_view(&mut self, api: &Arc<RuntimeApi>, view: RawBufferView) {
        if view as usize == self.view {
            api.buffer_view_release(view);
            return;
        }
        if let Some(existing) = &self.api {
            existing.buffer_view_release(self.raw_view());
        }
        self.api = Some(Arc::clone(api));
        self.view = view as usize;
    }

    /// Blocking device-to-host read of the whole buffer.
    pub fn read<T: Element>(&self, handle: &Handle) -> Result<Vec<T>> {
        if self.is_empty() {
            return Err(Error::runtime_failure("cannot read from an empty buffer"));
        }
        let api = self.api.as_ref().expect("non-empty buffer missing api");
        let byte_length = api.buffer_view_byte_length(self.raw_view());
        let element_size = std::mem::size_of::<T>();
        if element_size == 0 || byte_length % element_size != 0 {
            return Err(Error::runtime_failure(format!(
                "buffer byte length {byte_length} is not a multiple of the element size {element_size}"
            )));
        }
        let count = byte_length / element_size;
        let mut values: Vec<T> = Vec::with_capacity(count);
        // SAFETY: The spare capacity spans exactly `byte_length` writable
        // bytes; the runtime fills all of them before we set the length,
        // and Element implementors accept any bit pattern.
        unsafe {
            let out =
                std::slice::from_raw_parts_mut(values.as_mut_ptr() as *mut u8, byte_length);
            api.buffer_view_read(handle.device_ptr(), self.raw_view(), out)?;
            values.set_len(count);
        }
        Ok(values)
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(api) = &self.api {
            api.buffer_view_release(self.raw_view());
        }
    }
}
