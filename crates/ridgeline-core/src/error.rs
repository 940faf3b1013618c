//! Error types for Ridgeline core primitives.

use std::fmt;

/// Errors surfaced while waiting on a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// The wait window elapsed before the promise was settled.
    Timeout,
    /// The producer reported failure instead of delivering a value.
    ResolutionFailure(String),
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "Timed out waiting for delivery"),
            Self::ResolutionFailure(reason) => {
                write!(f, "Producer reported failure: {reason}")
            }
        }
    }
}

impl std::error::Error for CoreError {}

/// A specialized Result type for Ridgeline core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
