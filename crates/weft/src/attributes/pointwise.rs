//! Attributes for element-wise binary nodes.

use super::tensor::TensorId;

/// Binary pointwise operation selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointwiseMode {
    Add,
    Sub,
    Mul,
    Div,
}

/// Element-wise binary op: inputs IN_0 and IN_1, output OUT_0. Operand
/// shapes must be identical or broadcast-compatible (size-1 extents).
#[derive(Debug, Clone, Default)]
pub struct PointwiseAttr {
    pub(crate) name: String,
    pub(crate) mode: Option<PointwiseMode>,
    pub(crate) in0: Option<TensorId>,
    pub(crate) in1: Option<TensorId>,
    pub(crate) out: Option<TensorId>,
}

impl PointwiseAttr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_mode(mut self, mode: PointwiseMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> Option<PointwiseMode> {
        self.mode
    }

    pub fn in0(&self) -> Option<TensorId> {
        self.in0
    }

    pub fn in1(&self) -> Option<TensorId> {
        self.in1
    }

    pub fn out(&self) -> Option<TensorId> {
        self.out
    }
}
