//! Tensor records and the handles used to reference them.

use crate::error::{Error, Result};
use crate::layout;
use crate::types::DataType;

/// Stable handle to a tensor record stored in a graph's arena.
///
/// Handles are plain indices; they stay valid for the lifetime of the graph
/// that issued them and are meaningless across graphs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TensorId(pub(crate) usize);

/// Value carried by a scalar tensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScalarValue {
    Float(f64),
    Int(i64),
}

/// Metadata for one tensor value in a graph.
///
/// `dim` is the logical shape; `stride` is the physical layout. The pair
/// must describe a dense permuted layout once validation completes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TensorAttr {
    name: String,
    dim: Vec<i64>,
    stride: Vec<i64>,
    data_type: DataType,
    is_virtual: bool,
    is_output: bool,
    scalar_value: Option<ScalarValue>,
}

impl TensorAttr {
    pub fn new() -> Self {
        Self::default()
    }

    // Consuming builders, used while describing a graph.

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_dim(mut self, dim: impl Into<Vec<i64>>) -> Self {
        self.dim = dim.into();
        self
    }

    pub fn with_stride(mut self, stride: impl Into<Vec<i64>>) -> Self {
        self.stride = stride.into();
        self
    }

    pub fn with_data_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }

    pub fn with_output(mut self, output: bool) -> Self {
        self.set_output(output);
        self
    }

    // Chainable mutators, used on records already registered in a graph.

    pub fn set_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = name.into();
        self
    }

    pub fn set_dim(&mut self, dim: impl Into<Vec<i64>>) -> &mut Self {
        self.dim = dim.into();
        self
    }

    pub fn set_stride(&mut self, stride: impl Into<Vec<i64>>) -> &mut Self {
        self.stride = stride.into();
        self
    }

    pub fn set_data_type(&mut self, data_type: DataType) -> &mut Self {
        self.data_type = data_type;
        self
    }

    /// Marking a tensor as a user-visible output also clears its virtual
    /// flag: outputs are materialized by definition.
    pub fn set_output(&mut self, output: bool) -> &mut Self {
        self.is_output = output;
        if output {
            self.is_virtual = false;
        }
        self
    }

    pub(crate) fn set_virtual(&mut self, is_virtual: bool) -> &mut Self {
        self.is_virtual = is_virtual;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dim(&self) -> &[i64] {
        &self.dim
    }

    pub fn stride(&self) -> &[i64] {
        &self.stride
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn is_virtual(&self) -> bool {
        self.is_virtual
    }

    pub fn is_output(&self) -> bool {
        self.is_output
    }

    pub fn is_scalar(&self) -> bool {
        self.scalar_value.is_some()
    }

    pub fn scalar_value(&self) -> Option<ScalarValue> {
        self.scalar_value
    }

    /// Logical dims permuted into decreasing-stride order; the shape the
    /// emitted dialect sees.
    pub fn physical_dims(&self) -> Vec<i64> {
        layout::physical_dims(&self.dim, &self.stride)
    }

    /// Number of elements implied by the logical shape.
    pub fn volume(&self) -> i64 {
        self.dim.iter().product()
    }

    /// Post-inference check that every property is resolved and coherent.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::attribute_not_set("tensor name not set"));
        }
        if self.dim.is_empty() {
            return Err(Error::attribute_not_set(format!(
                "tensor '{}' has no dims set and none could be inferred",
                self.name
            )));
        }
        if self.stride.is_empty() {
            return Err(Error::attribute_not_set(format!(
                "tensor '{}' has no strides set and none could be inferred",
                self.name
            )));
        }
        if !self.data_type.is_set() {
            return Err(Error::attribute_not_set(format!(
                "tensor '{}' has no data type set and none could be inferred",
                self.name
            )));
        }
        if let Some(bad) = self.dim.iter().find(|&&d| d <= 0) {
            return Err(Error::invalid_attribute(format!(
                "tensor '{}' has non-positive dim {bad}",
                self.name
            )));
        }
        layout::validate_dense_layout(&self.name, &self.dim, &self.stride)
    }
}

impl From<f32> for TensorAttr {
    /// Scalar tensor holding one float; shape and stride are forced to `[1]`.
    fn from(value: f32) -> Self {
        TensorAttr {
            dim: vec![1],
            stride: vec![1],
            data_type: DataType::Float,
            scalar_value: Some(ScalarValue::Float(f64::from(value))),
            ..Default::default()
        }
    }
}

impl From<i64> for TensorAttr {
    /// Scalar tensor holding one integer; shape and stride are forced to `[1]`.
    fn from(value: i64) -> Self {
        TensorAttr {
            dim: vec![1],
            stride: vec![1],
            data_type: DataType::Int64,
            scalar_value: Some(ScalarValue::Int(value)),
            ..Default::default()
        }
    }
}
