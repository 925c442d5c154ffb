//! Graph-level context: name and default data types used by inference.

use crate::types::DataType;

/// Defaults shared by every node of one graph. Tensor records that reach
/// validation without an element type inherit from here: boundary tensors
/// take the I/O type, virtual tensors the intermediate type (falling back
/// to the compute type when intermediate is unset).
#[derive(Debug, Clone, Default)]
pub struct Context {
    name: String,
    io_data_type: DataType,
    compute_data_type: DataType,
    intermediate_data_type: DataType,
}

impl Context {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn io_data_type(&self) -> DataType {
        self.io_data_type
    }

    pub fn compute_data_type(&self) -> DataType {
        self.compute_data_type
    }

    pub fn intermediate_data_type(&self) -> DataType {
        self.intermediate_data_type
    }

    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub(crate) fn set_io_data_type(&mut self, data_type: DataType) {
        self.io_data_type = data_type;
    }

    pub(crate) fn set_compute_data_type(&mut self, data_type: DataType) {
        self.compute_data_type = data_type;
    }

    pub(crate) fn set_intermediate_data_type(&mut self, data_type: DataType) {
        self.intermediate_data_type = data_type;
    }

    /// Element type a tensor defaults to when inference finds it unset.
    pub(crate) fn default_data_type(&self, is_virtual: bool) -> DataType {
        if is_virtual {
            if self.intermediate_data_type.is_set() {
                self.intermediate_data_type
            } else {
                self.compute_data_type
            }
        } else {
            self.io_data_type
        }
    }
}
