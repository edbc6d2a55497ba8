// Licensed under the Apache-2.0 license

//! Transport error types

use thiserror::Error;
use virtio_tpm_osal::OsalError;

pub type TransportResult<T> = Result<T, TransportError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Request region could not be allocated
    #[error("out of memory allocating a {0}-byte region")]
    NoMemory(usize),

    /// Channel refused the transaction
    #[error("device unavailable: {0}")]
    DeviceUnavailable(&'static str),

    /// No completion before the deadline
    #[error("no completion within {0} ms")]
    Timeout(u32),

    /// Response payload larger than the caller's buffer
    #[error("response payload is {needed} bytes but the buffer holds {capacity}")]
    SizeMismatch { needed: usize, capacity: usize },

    /// A transaction is already outstanding
    #[error("a command is already in flight")]
    Busy,

    #[error("command is empty")]
    EmptyCommand,

    /// No completed response to read
    #[error("no response available")]
    NoResponse,

    /// Completion shorter than the response header
    #[error("response of {0} bytes is shorter than its header")]
    MalformedResponse(usize),

    /// Header length runs past what the device wrote
    #[error("response header declares {declared} payload bytes but only {available} were written")]
    LengthMismatch { declared: usize, available: usize },

    #[error("operation not supported: {0}")]
    NotSupported(&'static str),

    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    #[error("OSAL error: {0}")]
    Osal(#[from] OsalError),
}
