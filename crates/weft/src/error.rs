//! Structured error type shared by every fallible operation in the crate.

use std::fmt;

use thiserror::Error;

/// Stable error classification for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A required attribute was never set on a tensor, node or graph.
    AttributeNotSet,
    /// An attribute was set to a value that fails validation.
    InvalidAttribute,
    /// An operation requiring a validated graph ran before `validate()`.
    NotValidated,
    /// Type or shape propagation could not resolve a tensor property.
    ShapeInferenceFailure,
    /// The external compiler returned a non-zero exit status.
    CompileFailure,
    /// A runtime ABI call failed.
    RuntimeFailure,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::AttributeNotSet => "attribute not set",
            ErrorKind::InvalidAttribute => "invalid attribute",
            ErrorKind::NotValidated => "not validated",
            ErrorKind::ShapeInferenceFailure => "shape inference failure",
            ErrorKind::CompileFailure => "compile failure",
            ErrorKind::RuntimeFailure => "runtime failure",
        };
        f.write_str(name)
    }
}

/// Error value carrying a stable kind plus a human-readable message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct Error {
    kind: ErrorKind,
    message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn attribute_not_set(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AttributeNotSet, message)
    }

    pub fn invalid_attribute(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidAttribute, message)
    }

    pub fn not_validated(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotValidated, message)
    }

    pub fn shape_inference(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ShapeInferenceFailure, message)
    }

    pub fn compile_failure(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CompileFailure, message)
    }

    pub fn runtime_failure(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RuntimeFailure, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
