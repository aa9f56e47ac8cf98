use thiserror::Error;

use crate::shape::Shape;

/// Structural problems detected while assembling an architecture.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ConfigurationError {
    #[error("`{0}` must not be empty")]
    EmptyList(&'static str),
    #[error("`{what}` has length {got}, expected {expected}")]
    MismatchedLengths { what: &'static str, expected: usize, got: usize },
    #[error("kernel size {0} is even, only odd kernel sizes preserve spatial extent")]
    EvenKernelSize(usize),
    #[error("a {height}x{width} input vanishes after {pool_count} poolings, leaving no {channels}-channel features")]
    NonPositiveFeatureSize { channels: usize, height: usize, width: usize, pool_count: usize },
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("operation `{op}` cannot accept input of shape {shape}")]
    InvalidShape { op: &'static str, shape: Shape },
}

impl ConfigurationError {
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter { name, reason: reason.into() }
    }
}

/// Two shapes that were required to agree did not.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("{context}: expected {expected}, got {got}")]
pub struct ShapeMismatchError {
    pub context: &'static str,
    pub expected: String,
    pub got: String,
}

impl ShapeMismatchError {
    pub fn new(context: &'static str, expected: impl ToString, got: impl ToString) -> Self {
        Self { context, expected: expected.to_string(), got: got.to_string() }
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    ShapeMismatch(#[from] ShapeMismatchError),
}

pub type Result<T> = std::result::Result<T, Error>;
