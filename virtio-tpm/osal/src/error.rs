// Licensed under the Apache-2.0 license

//! Error types for OSAL
use core::fmt;

pub type OsalResult<T> = Result<T, OsalError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OsalError {
    /// Memory allocation failed
    OutOfMemory,
    /// Resource not available (poisoned lock, thread spawn refused)
    ResourceUnavailable,
    /// Other error
    Other(&'static str),
}

impl fmt::Display for OsalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OsalError::OutOfMemory => write!(f, "Out of memory"),
            OsalError::ResourceUnavailable => write!(f, "Resource unavailable"),
            OsalError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for OsalError {}
