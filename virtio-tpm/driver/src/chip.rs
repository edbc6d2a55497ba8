// Licensed under the Apache-2.0 license

//! Chip adapter
//!
//! Reproduces the cycle a TPM chip framework runs over a transport: send the
//! command, poll the status register until the complete mask matches, then
//! read the response.

use crate::error::ChipError;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use virtio_tpm_osal::{time, Deadline, Duration};
use virtio_tpm_transport::{TpmTransport, STATUS_COMPLETE, TPM_RESPONSE_LEN};

/// The framework should run TPM startup itself after registration.
pub const TPM_OPS_AUTO_STARTUP: u32 = 1 << 0;

/// Chip answered a TPM2 capability query.
pub const TPM_CHIP_FLAG_TPM2: u32 = 1 << 1;

/// TPM2 structure tag for responses without sessions
pub const TPM2_ST_NO_SESSIONS: u16 = 0x8001;
/// TPM2_CC_GetCapability
pub const TPM2_CC_GET_CAPABILITY: u32 = 0x0000_017a;
/// TPM2_CAP_TPM_PROPERTIES
pub const TPM2_CAP_TPM_PROPERTIES: u32 = 0x0000_0006;
/// TPM_PT_TOTAL_COMMANDS
pub const TPM_PT_TOTAL_COMMANDS: u32 = 0x0000_0129;

pub const DEFAULT_POLL_TIMEOUT_MS: u32 = 2000;
pub const DEFAULT_POLL_INTERVAL_MS: u32 = 5;

/// Static description handed to the chip framework
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpmClassOps {
    pub flags: u32,
    pub req_complete_mask: u8,
    pub req_complete_val: u8,
}

pub const VIRTIO_TPM_OPS: TpmClassOps = TpmClassOps {
    flags: TPM_OPS_AUTO_STARTUP,
    req_complete_mask: STATUS_COMPLETE,
    req_complete_val: STATUS_COMPLETE,
};

pub struct TpmChip {
    transport: Arc<dyn TpmTransport>,
    ops: TpmClassOps,
    flags: AtomicU32,
    poll_timeout_ms: u32,
    poll_interval: Duration,
    /// Largest response the transport can hand back
    response_capacity: usize,
}

impl TpmChip {
    pub fn new(transport: Arc<dyn TpmTransport>, ops: TpmClassOps) -> Self {
        Self {
            transport,
            ops,
            flags: AtomicU32::new(0),
            poll_timeout_ms: DEFAULT_POLL_TIMEOUT_MS,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS as u64),
            response_capacity: TPM_RESPONSE_LEN,
        }
    }

    pub fn with_response_capacity(mut self, capacity: usize) -> Self {
        self.response_capacity = capacity;
        self
    }

    pub fn with_poll_timeout(mut self, timeout_ms: u32) -> Self {
        self.poll_timeout_ms = timeout_ms;
        self
    }

    pub fn with_poll_interval(mut self, interval_ms: u32) -> Self {
        self.poll_interval = Duration::from_millis(interval_ms as u64);
        self
    }

    pub fn ops(&self) -> &TpmClassOps {
        &self.ops
    }

    pub fn flags(&self) -> u32 {
        self.flags.load(Ordering::Acquire)
    }

    pub fn is_tpm2(&self) -> bool {
        self.flags() & TPM_CHIP_FLAG_TPM2 != 0
    }

    pub fn needs_auto_startup(&self) -> bool {
        self.ops.flags & TPM_OPS_AUTO_STARTUP != 0
    }

    /// Send `command` and copy the response payload into `buf`.
    pub fn transmit(&self, command: &[u8], buf: &mut [u8]) -> Result<usize, ChipError> {
        self.transport.send(command)?;

        let deadline = Deadline::after(Duration::from_millis(self.poll_timeout_ms as u64));
        loop {
            let status = self.transport.status();
            if status & self.ops.req_complete_mask == self.ops.req_complete_val {
                break;
            }
            if self.transport.req_canceled(status) {
                return Err(ChipError::Canceled(status));
            }
            if deadline.has_expired() {
                self.transport.cancel();
                log::warn!("chip: status {:#04x} never completed", status);
                return Err(ChipError::Timeout(self.poll_timeout_ms));
            }
            time::sleep(self.poll_interval);
        }

        Ok(self.transport.recv(buf)?)
    }

    /// Query a TPM2 property and mark the chip as TPM2 when it answers.
    ///
    /// Response codes are deliberately ignored; any well-formed answer counts.
    pub fn tpm2_probe(&self) -> Result<bool, ChipError> {
        let command = tpm2_get_capability_command();
        let mut response = vec![0u8; self.response_capacity];
        self.transmit(&command, &mut response)?;
        self.flags.fetch_or(TPM_CHIP_FLAG_TPM2, Ordering::AcqRel);
        Ok(true)
    }
}

/// TPM2_GetCapability(TPM_PROPERTIES, TPM_PT_TOTAL_COMMANDS, 1)
pub fn tpm2_get_capability_command() -> Vec<u8> {
    let mut command = Vec::with_capacity(22);
    command.extend_from_slice(&TPM2_ST_NO_SESSIONS.to_be_bytes());
    command.extend_from_slice(&22u32.to_be_bytes());
    command.extend_from_slice(&TPM2_CC_GET_CAPABILITY.to_be_bytes());
    command.extend_from_slice(&TPM2_CAP_TPM_PROPERTIES.to_be_bytes());
    command.extend_from_slice(&TPM_PT_TOTAL_COMMANDS.to_be_bytes());
    command.extend_from_slice(&1u32.to_be_bytes());
    command
}
