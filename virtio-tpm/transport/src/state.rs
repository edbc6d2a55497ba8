// Licensed under the Apache-2.0 license

//! Per-device transport state

use crate::status::TpmStatus;
use virtio_tpm_channel::TransactionId;

/// Transaction the channel currently owns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct InFlight {
    pub id: TransactionId,
    /// The submitter gave up waiting; the completion is reaped later.
    pub abandoned: bool,
}

pub(crate) struct TransportState {
    /// `None` while the region is lent to the channel
    pub response: Option<Vec<u8>>,
    pub capacity: usize,
    pub response_len: usize,
    pub status: TpmStatus,
    pub inflight: Option<InFlight>,
}

impl TransportState {
    pub fn new(response: Vec<u8>) -> Self {
        let capacity = response.len();
        Self {
            response: Some(response),
            capacity,
            response_len: 0,
            status: TpmStatus::default(),
            inflight: None,
        }
    }

    /// Bytes of the last completion, if a response is readable.
    pub fn completed_response(&self) -> Option<&[u8]> {
        if !self.status.is_valid() {
            return None;
        }
        self.response
            .as_deref()
            .map(|region| &region[..self.response_len])
    }

    /// Put the response region back after the device returned it.
    pub fn restore_response(&mut self, mut region: Vec<u8>) {
        // Capacity is fixed for the device lifetime.
        if region.len() != self.capacity {
            region.resize(self.capacity, 0);
        }
        self.response = Some(region);
    }
}
