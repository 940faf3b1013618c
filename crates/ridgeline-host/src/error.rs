//! Error types for host identity resolution.

use std::fmt;

/// Host resolution errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    /// No local host name could be resolved.
    Unknown(String),
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(msg) => write!(f, "Could not resolve local host name: {msg}"),
        }
    }
}

impl std::error::Error for HostError {}

/// A specialized Result type for host resolution operations.
pub type Result<T> = std::result::Result<T, HostError>;
