// Licensed under the Apache-2.0 license

//! virtio TPM driver binding
//!
//! Matches virtio devices against the TPM id table, wires the single
//! `"input"` virtqueue to a [`VirtioTpm`] transport and registers the result
//! with a [`TpmChip`]. `remove` undoes all of it.

pub mod chip;
pub mod error;

use std::sync::Arc;
use virtio_tpm_channel::{CompletionCallback, QueueChannel};
use virtio_tpm_transport::{CompletionHandler, ReclaimReport, TransportConfig, VirtioTpm};

pub use chip::{TpmChip, TpmClassOps, VIRTIO_TPM_OPS};
pub use error::{ChipError, DriverError};

pub const DRIVER_NAME: &str = "virtio_tpm";

/// virtio device id of a TPM
pub const VIRTIO_ID_TPM: u32 = 41;
/// Matches any vendor
pub const VIRTIO_DEV_ANY_ID: u32 = 0xffff_ffff;

/// Name of the queue carrying commands and responses
pub const QUEUE_NAME: &str = "input";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtioDeviceId {
    pub device: u32,
    pub vendor: u32,
}

pub const ID_TABLE: &[VirtioDeviceId] = &[VirtioDeviceId {
    device: VIRTIO_ID_TPM,
    vendor: VIRTIO_DEV_ANY_ID,
}];

impl VirtioDeviceId {
    pub fn matches(&self, other: &VirtioDeviceId) -> bool {
        self.device == other.device
            && (self.vendor == VIRTIO_DEV_ANY_ID || self.vendor == other.vendor)
    }
}

/// Whether the driver binds to `id`
pub fn supports(id: &VirtioDeviceId) -> bool {
    ID_TABLE.iter().any(|entry| entry.matches(id))
}

/// Bus-side operations on a virtio device
pub trait VirtioDevice: Send + Sync {
    fn device_id(&self) -> VirtioDeviceId;

    /// Set up the device's only virtqueue with `callback` as its interrupt handler.
    fn find_single_vq(
        &self,
        name: &str,
        callback: CompletionCallback,
    ) -> Result<Arc<dyn QueueChannel>, DriverError>;

    /// Allow the device to start consuming buffers and raising callbacks.
    fn device_ready(&self);

    /// Stop the device. No callbacks run once this returns.
    fn reset_device(&self);

    fn del_vqs(&self);
}

/// Probe options
#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub transport: TransportConfig,
    /// Send a TPM2 capability query after registration
    pub tpm2_probe: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            tpm2_probe: true,
        }
    }
}

impl DriverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_tpm2_probe(mut self, enabled: bool) -> Self {
        self.tpm2_probe = enabled;
        self
    }
}

/// A bound virtio TPM
pub struct VirtioTpmDevice {
    device: Arc<dyn VirtioDevice>,
    transport: Arc<VirtioTpm>,
    chip: TpmChip,
}

/// Bind to `device` and register a chip for it.
pub fn probe(
    device: Arc<dyn VirtioDevice>,
    config: DriverConfig,
) -> Result<VirtioTpmDevice, DriverError> {
    let id = device.device_id();
    if !supports(&id) {
        return Err(DriverError::UnsupportedDevice {
            device: id.device,
            vendor: id.vendor,
        });
    }

    let handler = CompletionHandler::new();
    let signal = handler.signal();
    let channel = device.find_single_vq(QUEUE_NAME, handler.into_callback())?;

    let response_capacity = config.transport.response_capacity;
    let transport = match VirtioTpm::new(channel, signal, config.transport) {
        Ok(transport) => Arc::new(transport),
        Err(e) => {
            device.del_vqs();
            return Err(e.into());
        }
    };

    // From here on the device may raise callbacks.
    device.device_ready();

    let chip = TpmChip::new(transport.clone(), VIRTIO_TPM_OPS)
        .with_response_capacity(response_capacity);
    if config.tpm2_probe {
        match chip.tpm2_probe() {
            Ok(_) => log::info!("{}: TPM2 device detected", DRIVER_NAME),
            Err(e) => log::warn!("{}: TPM2 probe failed: {}", DRIVER_NAME, e),
        }
    }

    log::info!(
        "{}: bound device {} vendor {:#x}",
        DRIVER_NAME,
        id.device,
        id.vendor
    );
    Ok(VirtioTpmDevice {
        device,
        transport,
        chip,
    })
}

impl VirtioTpmDevice {
    pub fn transport(&self) -> &Arc<VirtioTpm> {
        &self.transport
    }

    pub fn chip(&self) -> &TpmChip {
        &self.chip
    }

    pub fn device(&self) -> &Arc<dyn VirtioDevice> {
        &self.device
    }

    /// Tear the binding down: reset, reclaim, delete the queue, free state.
    pub fn remove(self) -> ReclaimReport {
        self.device.reset_device();

        let report = self.transport.reclaim().unwrap_or_else(|e| {
            log::error!("{}: reclaim failed: {}", DRIVER_NAME, e);
            ReclaimReport::default()
        });

        self.device.del_vqs();
        log::info!(
            "{}: removed, {} unconsumed and {} late regions freed",
            DRIVER_NAME,
            report.unconsumed,
            report.late
        );
        report
    }
}
