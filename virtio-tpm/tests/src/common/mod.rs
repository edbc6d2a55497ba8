// Licensed under the Apache-2.0 license

//! Common test utilities
//!
//! Builds a driver bound to a loopback device so each test only states the
//! device behavior it needs.

use log::LevelFilter;
use simple_logger::SimpleLogger;
use std::sync::{Arc, Once};
use std::thread;
use virtio_tpm_channel::TransactionId;
use virtio_tpm_driver::{probe, DriverConfig, VirtioTpmDevice};
use virtio_tpm_osal::Duration;
use virtio_tpm_testing::{LoopbackDevice, LoopbackQueue};
use virtio_tpm_transport::TransportConfig;

/// Shared test constants
pub mod test_constants {
    /// Deadline for tests where the device answers
    pub const TEST_TIMEOUT_MS: u32 = 5_000;
    /// Deadline for tests where the device stays silent
    pub const SHORT_TIMEOUT_MS: u32 = 50;

    pub const TAG_NO_SESSIONS: u32 = 0x8001;

    /// TPM2_Startup(SU_CLEAR)
    pub const STARTUP_CLEAR: [u8; 12] = [
        0x80, 0x01, 0x00, 0x00, 0x00, 0x0c, 0x00, 0x00, 0x01, 0x44, 0x00, 0x00,
    ];

    /// TPM2_GetRandom(8)
    pub const GET_RANDOM_8: [u8; 12] = [
        0x80, 0x01, 0x00, 0x00, 0x00, 0x0c, 0x00, 0x00, 0x01, 0x7b, 0x00, 0x08,
    ];
}

static LOGGER: Once = Once::new();

pub fn init_logger() {
    LOGGER.call_once(|| {
        // A logger may already be installed for this process.
        let _ = SimpleLogger::new().with_level(LevelFilter::Debug).init();
    });
}

/// A bound driver together with the loopback device behind it
pub struct TestBed {
    pub device: Arc<LoopbackDevice>,
    pub driver: VirtioTpmDevice,
}

impl TestBed {
    /// Probe `device` with the given command deadline. The TPM2 probe is skipped.
    pub fn new(device: LoopbackDevice, timeout_ms: u32) -> Self {
        init_logger();
        let device = Arc::new(device);
        let config = DriverConfig::new()
            .with_transport(TransportConfig::new().with_timeout(timeout_ms))
            .with_tpm2_probe(false);
        let driver = probe(device.clone(), config).expect("Failed to probe loopback device");
        Self { device, driver }
    }

    pub fn queue(&self) -> Arc<LoopbackQueue> {
        self.device.queue().expect("Loopback queue missing")
    }
}

/// `count` payload bytes counting up from `start`
pub fn payload(start: u8, count: usize) -> Vec<u8> {
    (0..count).map(|i| start.wrapping_add(i as u8)).collect()
}

/// Play the device for one command from another thread.
///
/// Waits for the next available chain, answers it with `response` and raises
/// the interrupt. Yields the id of the answered transaction.
pub fn answer_in_background(
    queue: Arc<LoopbackQueue>,
    response: Vec<u8>,
) -> thread::JoinHandle<Option<TransactionId>> {
    thread::spawn(move || {
        let request = queue.wait_available(Duration::from_secs(5))?;
        queue.complete(request.head, &response).ok()?;
        queue.interrupt();
        Some(request.id)
    })
}
