//! Attributes for matrix multiplication nodes.

use super::tensor::TensorId;

/// Matrix multiply: inputs A and B, output C. Both operands must have rank
/// at least 2 and agree on the contraction extent.
#[derive(Debug, Clone, Default)]
pub struct MatmulAttr {
    pub(crate) name: String,
    pub(crate) a: Option<TensorId>,
    pub(crate) b: Option<TensorId>,
    pub(crate) c: Option<TensorId>,
}

impl MatmulAttr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn a(&self) -> Option<TensorId> {
        self.a
    }

    pub fn b(&self) -> Option<TensorId> {
        self.b
    }

    pub fn c(&self) -> Option<TensorId> {
        self.c
    }
}
