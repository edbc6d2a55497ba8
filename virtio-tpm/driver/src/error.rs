// Licensed under the Apache-2.0 license

use thiserror::Error;
use virtio_tpm_transport::TransportError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    #[error("device {device} (vendor {vendor:#x}) is not a virtio TPM")]
    UnsupportedDevice { device: u32, vendor: u32 },
    #[error("virtqueue \"{0}\" not found")]
    QueueNotFound(String),
    #[error("transport setup failed: {0}")]
    Transport(#[from] TransportError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChipError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("command did not complete within {0} ms")]
    Timeout(u32),
    #[error("command was canceled (status {0:#04x})")]
    Canceled(u8),
}
