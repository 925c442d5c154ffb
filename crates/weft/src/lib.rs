pub mod attributes;
pub mod backend;
pub mod cache;
mod emitter;
pub mod error;
pub mod graph;
pub mod layout;
pub mod types;

pub use attributes::{
    ConvDGradAttr, ConvFPropAttr, ConvWGradAttr, MatmulAttr, PointwiseAttr, PointwiseMode,
    ScalarValue, TensorAttr, TensorId,
};
pub use backend::{Backend, Buffer, Element, Handle};
pub use cache::{CacheFileKind, CompileStatistics};
pub use error::{Error, ErrorKind, Result};
pub use graph::{Context, Graph, VariantPack};
pub use types::DataType;
