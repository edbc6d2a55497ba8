// Licensed under the Apache-2.0 license

//! virtio TPM front-end
//!
//! Presents the blocking, one-command-at-a-time interface a TPM chip
//! framework expects (`send`, `recv`, `status`) on top of a virtqueue whose
//! completions arrive asynchronously through a callback.
//!
//! - **channel**: queue contract (submit, kick, drain, reset, reclaim)
//! - **transport**: `VirtioTpm`, the blocking bridge with its status register
//!   and response header decoding
//! - **driver**: device id table, probe/remove and the chip adapter
//! - **osal**: locks, the completion signal, deadlines, threads, allocation
//! - **testing**: in-memory loopback virtqueue and device backend
//!
//! ## Architecture Overview
//!
//! ```text
//!             ┌──────────────────┐
//!             │ virtio-tpm-      │
//!             │ driver           │  probe / remove / TpmChip::transmit
//!             └──────────────────┘
//!                      │
//!             ┌──────────────────┐
//!             │ virtio-tpm-      │  send ──► submit + kick ──► wait
//!             │ transport        │  recv ◄── response header decode
//!             └──────────────────┘
//!                 │           ▲
//!          submit │           │ CompletionHandler (callback context)
//!                 ▼           │
//!             ┌──────────────────┐         ┌─────────────────┐
//!             │ virtio-tpm-      │◄────────│ LoopbackQueue   │
//!             │ channel          │         │ (or a real vq)  │
//!             └──────────────────┘         └─────────────────┘
//!                      │
//!             ┌──────────────────┐
//!             │ virtio-tpm-osal  │
//!             │ (OS Abstraction) │
//!             └──────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use virtio_tpm::driver::{probe, DriverConfig};
//! use virtio_tpm::testing::{EchoResponder, LoopbackDevice};
//!
//! let device = Arc::new(LoopbackDevice::new().with_responder(EchoResponder));
//! let driver = probe(device, DriverConfig::new())?;
//!
//! let mut response = [0u8; 512];
//! let len = driver.chip().transmit(&command, &mut response)?;
//!
//! let report = driver.remove();
//! ```

pub use virtio_tpm_channel as channel;
pub use virtio_tpm_driver as driver;
pub use virtio_tpm_osal as osal;
pub use virtio_tpm_testing as testing;
pub use virtio_tpm_transport as transport;

// Re-export main public APIs for convenience
pub use virtio_tpm_channel::{Chain, QueueChannel, TransactionId, UsedChain};
pub use virtio_tpm_driver::{probe, DriverConfig, TpmChip, VirtioDevice, VirtioTpmDevice};
pub use virtio_tpm_transport::{TpmTransport, TransportConfig, VirtioTpm};

// Re-export error types
pub use virtio_tpm_driver::{ChipError, DriverError};
pub use virtio_tpm_transport::TransportError;
