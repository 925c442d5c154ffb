//! Attributes for convolution forward and backward nodes.

use super::tensor::TensorId;

/// Forward convolution: inputs X (image) and W (filter), output Y.
#[derive(Debug, Clone, Default)]
pub struct ConvFPropAttr {
    pub(crate) name: String,
    pub(crate) padding: Vec<i64>,
    pub(crate) stride: Vec<i64>,
    pub(crate) dilation: Vec<i64>,
    pub(crate) x: Option<TensorId>,
    pub(crate) w: Option<TensorId>,
    pub(crate) y: Option<TensorId>,
}

impl ConvFPropAttr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_padding(mut self, padding: impl Into<Vec<i64>>) -> Self {
        self.padding = padding.into();
        self
    }

    pub fn with_stride(mut self, stride: impl Into<Vec<i64>>) -> Self {
        self.stride = stride.into();
        self
    }

    pub fn with_dilation(mut self, dilation: impl Into<Vec<i64>>) -> Self {
        self.dilation = dilation.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn padding(&self) -> &[i64] {
        &self.padding
    }

    pub fn stride(&self) -> &[i64] {
        &self.stride
    }

    pub fn dilation(&self) -> &[i64] {
        &self.dilation
    }

    pub fn x(&self) -> Option<TensorId> {
        self.x
    }

    pub fn w(&self) -> Option<TensorId> {
        self.w
    }

    pub fn y(&self) -> Option<TensorId> {
        self.y
    }
}

/// Data gradient: inputs DY (output gradient) and W (filter), output DX.
///
/// The application sets DX's shape explicitly; inference does not derive it.
#[derive(Debug, Clone, Default)]
pub struct ConvDGradAttr {
    pub(crate) name: String,
    pub(crate) padding: Vec<i64>,
    pub(crate) stride: Vec<i64>,
    pub(crate) dilation: Vec<i64>,
    pub(crate) dy: Option<TensorId>,
    pub(crate) w: Option<TensorId>,
    pub(crate) dx: Option<TensorId>,
}

impl ConvDGradAttr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_padding(mut self, padding: impl Into<Vec<i64>>) -> Self {
        self.padding = padding.into();
        self
    }

    pub fn with_stride(mut self, stride: impl Into<Vec<i64>>) -> Self {
        self.stride = stride.into();
        self
    }

    pub fn with_dilation(mut self, dilation: impl Into<Vec<i64>>) -> Self {
        self.dilation = dilation.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn padding(&self) -> &[i64] {
        &self.padding
    }

    pub fn stride(&self) -> &[i64] {
        &self.stride
    }

    pub fn dilation(&self) -> &[i64] {
        &self.dilation
    }

    pub fn dy(&self) -> Option<TensorId> {
        self.dy
    }

    pub fn w(&self) -> Option<TensorId> {
        self.w
    }

    pub fn dx(&self) -> Option<TensorId> {
        self.dx
    }
}

/// Weight gradient: inputs DY (output gradient) and X (image), output DW.
///
/// The application sets DW's shape explicitly; inference does not derive it.
#[derive(Debug, Clone, Default)]
pub struct ConvWGradAttr {
    pub(crate) name: String,
    pub(crate) padding: Vec<i64>,
    pub(crate) stride: Vec<i64>,
    pub(crate) dilation: Vec<i64>,
    pub(crate) dy: Option<TensorId>,
    pub(crate) x: Option<TensorId>,
    pub(crate) dw: Option<TensorId>,
}

impl ConvWGradAttr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_padding(mut self, padding: impl Into<Vec<i64>>) -> Self {
        self.padding = padding.into();
        self
    }

    pub fn with_stride(mut self, stride: impl Into<Vec<i64>>) -> Self {
        self.stride = stride.into();
        self
    }

    pub fn with_dilation(mut self, dilation: impl Into<Vec<i64>>) -> Self {
        self.dilation = dilation.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn padding(&self) -> &[i64] {
        &self.padding
    }

    pub fn stride(&self) -> &[i64] {
        &self.stride
    }

    pub fn dilation(&self) -> &[i64] {
        &self.dilation
    }

    pub fn dy(&self) -> Option<TensorId> {
        self.dy
    }

    pub fn x(&self) -> Option<TensorId> {
        self.x
    }

    pub fn dw(&self) -> Option<TensorId> {
        self.dw
    }
}
