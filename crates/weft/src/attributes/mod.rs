//! Attribute records: compile-time constant metadata describing tensors and
//! operator nodes before validation resolves the full graph.

mod conv;
mod matmul;
mod pointwise;
mod tensor;

pub use conv::{ConvDGradAttr, ConvFPropAttr, ConvWGradAttr};
pub use matmul::MatmulAttr;
pub use pointwise::{PointwiseAttr, PointwiseMode};
pub use tensor::{ScalarValue, TensorAttr, TensorId};
