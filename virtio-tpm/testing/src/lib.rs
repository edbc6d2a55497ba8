// Licensed under the Apache-2.0 license

//! Loopback virtio TPM device for tests and demos

pub mod device;
pub mod queue;
pub mod responder;

pub use device::{DeviceEvent, LoopbackDevice, VIRTIO_PCI_VENDOR_ID};
pub use queue::{ring_size, DeviceRequest, LoopbackQueue, DEFAULT_QUEUE_SIZE, MAX_QUEUE_SIZE};
pub use responder::{
    build_response, EchoResponder, FixedResponder, Responder, SilentResponder, TPM2_ST_NO_SESSIONS,
};
