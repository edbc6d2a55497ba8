// Licensed under the Apache-2.0 license

//! Virtio TPM Transport Layer
//!
//! Synchronous command transport for a TPM reached over a virtqueue.

pub mod completion;
pub mod error;
pub mod header;
mod state;
pub mod status;
pub mod virtio_tpm;

// Re-export commonly used types
pub use completion::{CompletionHandler, CompletionSignal};
pub use error::{TransportError, TransportResult};
pub use header::{ResponseHeader, HEADER_SIZE};
pub use status::{TpmStatus, STATUS_COMPLETE, STATUS_DATA_AVAIL, STATUS_VALID};
pub use virtio_tpm::{ReclaimReport, VirtioTpm};

/// Capacity of the response region handed to the device
pub const TPM_RESPONSE_LEN: usize = 512;

/// Deadline for a single command
pub const DEFAULT_TIMEOUT_MS: u32 = 120_000;

/// Transport configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    pub timeout_ms: u32,
    pub response_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            response_capacity: TPM_RESPONSE_LEN,
        }
    }
}

impl TransportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout_ms: u32) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_response_capacity(mut self, size: usize) -> Self {
        self.response_capacity = size;
        self
    }

    pub fn validate(&self) -> TransportResult<()> {
        if self.timeout_ms == 0 {
            return Err(TransportError::InvalidConfig("timeout must be non-zero"));
        }
        if self.response_capacity < HEADER_SIZE {
            return Err(TransportError::InvalidConfig(
                "response capacity smaller than the response header",
            ));
        }
        Ok(())
    }
}

/// Operations a TPM chip framework drives a transport with.
///
/// Only `send`, `recv` and `status` move data. The remaining hooks exist for
/// frameworks that call them unconditionally.
pub trait TpmTransport: Send + Sync {
    fn send(&self, command: &[u8]) -> TransportResult<()>;
    fn recv(&self, buf: &mut [u8]) -> TransportResult<usize>;
    fn status(&self) -> u8;

    fn cancel(&self) {}

    /// Adjust command timeouts. Returns `true` if any were changed.
    fn update_timeouts(&self, _timeouts: &mut [u32]) -> bool {
        false
    }

    fn req_canceled(&self, _status: u8) -> bool {
        false
    }

    fn request_locality(&self, _locality: u8) -> TransportResult<u8> {
        Err(TransportError::NotSupported("request_locality"))
    }

    fn relinquish_locality(&self, _locality: u8) -> TransportResult<()> {
        Err(TransportError::NotSupported("relinquish_locality"))
    }

    fn clk_enable(&self, _enable: bool) {}
}
