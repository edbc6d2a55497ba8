// Licensed under the Apache-2.0 license

//! Virtio TPM transport
//!
//! Bridges the blocking `send`/`recv`/`status` contract onto a queue channel
//! whose completions arrive through a callback. One transaction is
//! outstanding at a time: the request region is device-readable, the response
//! region device-writable, and the caller sleeps on the completion signal
//! until the matching completion is published or the deadline passes.

use crate::completion::CompletionSignal;
use crate::error::{TransportError, TransportResult};
use crate::header::{ResponseHeader, HEADER_SIZE};
use crate::state::{InFlight, TransportState};
use crate::{TpmTransport, TransportConfig};
use std::sync::Arc;
use virtio_tpm_channel::{Chain, QueueChannel, TransactionId, UsedChain};
use virtio_tpm_osal::{Allocator, Deadline, Duration, HeapAllocator, Mutex, OsalError};

/// Regions recovered while tearing the transport down
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReclaimReport {
    /// Chains the device never consumed
    pub unconsumed: usize,
    /// Chains completed after their submitter stopped waiting
    pub late: usize,
}

impl ReclaimReport {
    pub fn total(&self) -> usize {
        self.unconsumed + self.late
    }
}

pub struct VirtioTpm {
    channel: Arc<dyn QueueChannel>,
    state: Mutex<TransportState>,
    signal: Arc<CompletionSignal>,
    allocator: Arc<dyn Allocator>,
    config: TransportConfig,
}

impl VirtioTpm {
    /// Create the transport for `channel`.
    ///
    /// `signal` must be the one published by the handler registered as the
    /// channel's completion callback.
    pub fn new(
        channel: Arc<dyn QueueChannel>,
        signal: Arc<CompletionSignal>,
        config: TransportConfig,
    ) -> TransportResult<Self> {
        Self::with_allocator(channel, signal, config, Arc::new(HeapAllocator))
    }

    pub fn with_allocator(
        channel: Arc<dyn QueueChannel>,
        signal: Arc<CompletionSignal>,
        config: TransportConfig,
        allocator: Arc<dyn Allocator>,
    ) -> TransportResult<Self> {
        config.validate()?;
        let response = allocator
            .alloc_region(config.response_capacity)
            .map_err(|e| alloc_error(e, config.response_capacity))?;

        Ok(Self {
            channel,
            state: Mutex::new(TransportState::new(response)),
            signal,
            allocator,
            config,
        })
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn channel(&self) -> &Arc<dyn QueueChannel> {
        &self.channel
    }

    /// Length of the most recent completion
    pub fn response_len(&self) -> usize {
        self.state.lock().map(|s| s.response_len).unwrap_or(0)
    }

    /// Whether a transaction is still owned by the channel
    pub fn is_busy(&self) -> bool {
        self.state.lock().map(|s| s.inflight.is_some()).unwrap_or(true)
    }

    /// Submit `command` and block until its completion or the deadline.
    pub fn send(&self, command: &[u8]) -> TransportResult<()> {
        if command.is_empty() {
            return Err(TransportError::EmptyCommand);
        }

        let id = self.submit(command)?;
        self.wait_for(id)
    }

    /// Copy the payload of the last response into `buf`.
    pub fn recv(&self, buf: &mut [u8]) -> TransportResult<usize> {
        let mut state = self.state.lock()?;
        let response = state
            .completed_response()
            .ok_or(TransportError::NoResponse)?;

        let (header, rest) = ResponseHeader::parse(response)
            .ok_or(TransportError::MalformedResponse(response.len()))?;
        let len = header.payload_len();
        if len > rest.len() {
            return Err(TransportError::LengthMismatch {
                declared: len,
                available: rest.len(),
            });
        }
        if len > buf.len() {
            return Err(TransportError::SizeMismatch {
                needed: len,
                capacity: buf.len(),
            });
        }

        log::debug!("recv: tag {:#x}, {} payload bytes", header.tag.get(), len);
        buf[..len].copy_from_slice(&rest[..len]);
        state.status.set_valid(1);
        Ok(len)
    }

    pub fn status(&self) -> u8 {
        self.state.lock().map(|s| s.status.bits()).unwrap_or(0)
    }

    /// Take back every region the channel still holds.
    ///
    /// Call after the channel has been reset. Each recovered region is freed
    /// exactly once here. The response region is kept only when it comes back
    /// with the in-flight transaction's completion; otherwise the next `send`
    /// allocates a fresh one.
    pub fn reclaim(&self) -> TransportResult<ReclaimReport> {
        let mut report = ReclaimReport::default();
        let mut state = self.state.lock()?;
        let inflight = state.inflight.take();

        let mut late = self.signal.reinit()?;
        late.extend(self.channel.drain_completed());
        for used in late {
            report.late += 1;
            log::debug!("reclaim: completion {} returned after abandon", used.id);
            if inflight.is_some_and(|inflight| inflight.id == used.id) {
                take_response(&mut state, used.chain);
            }
        }

        // Unconsumed chains carry no id, so none of their regions are kept.
        for _chain in self.channel.reclaim_unconsumed() {
            report.unconsumed += 1;
        }

        if let Some(inflight) = inflight {
            log::info!(
                "reclaim: dropped transaction {} (abandoned: {})",
                inflight.id,
                inflight.abandoned
            );
        }
        state.status.mark_submitted();
        state.response_len = 0;
        Ok(report)
    }

    fn submit(&self, command: &[u8]) -> TransportResult<TransactionId> {
        let mut state = self.state.lock()?;
        self.reap_abandoned(&mut state)?;
        if state.inflight.is_some() {
            return Err(TransportError::Busy);
        }

        for stale in self.signal.reinit()? {
            log::warn!("send: discarding stale completion {}", stale.id);
        }

        let request = self
            .allocator
            .copy_region(command)
            .map_err(|e| alloc_error(e, command.len()))?;
        let response = match state.response.take() {
            Some(region) => region,
            None => self
                .allocator
                .alloc_region(state.capacity)
                .map_err(|e| alloc_error(e, state.capacity))?,
        };

        state.status.mark_submitted();
        state.response_len = state.capacity;

        log::debug!("send: {} byte command {:02x?}", command.len(), command);
        let chain = Chain::new().with_readable(request).with_writable(response);
        let id = match self.channel.submit_transaction(chain) {
            Ok(id) => id,
            Err(rejected) => {
                log::warn!("send: {}", rejected);
                let mut chain = rejected.into_chain();
                if let Some(region) = chain.writable.pop() {
                    state.restore_response(region);
                }
                return Err(TransportError::DeviceUnavailable(
                    "queue rejected the transaction",
                ));
            }
        };

        state.inflight = Some(InFlight {
            id,
            abandoned: false,
        });
        if !self.channel.notify() {
            log::warn!("send: {} kick was not delivered", self.channel.name());
        }
        Ok(id)
    }

    fn wait_for(&self, id: TransactionId) -> TransportResult<()> {
        let timeout = Duration::from_millis(self.config.timeout_ms as u64);
        let deadline = Deadline::after(timeout);

        loop {
            let records = match deadline.remaining() {
                Some(left) => self.signal.wait_timeout(left)?,
                None => None,
            };

            let mut state = self.state.lock()?;
            let Some(records) = records else {
                if let Some(inflight) = state.inflight.as_mut() {
                    inflight.abandoned = true;
                }
                log::warn!(
                    "send: transaction {} timed out after {} ms",
                    id,
                    self.config.timeout_ms
                );
                return Err(TransportError::Timeout(self.config.timeout_ms));
            };

            if self.accept(&mut state, id, records) {
                return Ok(());
            }
        }
    }

    /// Apply drained completions. Returns `true` once `id` has completed.
    fn accept(
        &self,
        state: &mut TransportState,
        id: TransactionId,
        records: Vec<UsedChain>,
    ) -> bool {
        let mut done = false;
        for used in records {
            if used.id != id {
                log::warn!("completion {} does not match {}, freeing it", used.id, id);
                continue;
            }

            let capacity = state.capacity;
            state.response_len = (used.written as usize).min(capacity);
            if used.written as usize > capacity {
                log::warn!(
                    "completion {} reports {} bytes for a {} byte region",
                    used.id,
                    used.written,
                    capacity
                );
            }
            take_response(state, used.chain);
            state.inflight = None;
            state.status.mark_complete();
            done = true;
        }
        done
    }

    /// Reap the late completion of a transaction whose submitter gave up.
    fn reap_abandoned(&self, state: &mut TransportState) -> TransportResult<()> {
        let Some(inflight) = state.inflight else {
            return Ok(());
        };
        if !inflight.abandoned {
            return Ok(());
        }

        let mut records = self.signal.try_take()?;
        // The callback may not have run yet for a completion already queued.
        records.extend(self.channel.drain_completed());
        for used in records {
            if used.id == inflight.id {
                log::info!("reaped late completion {}", used.id);
                take_response(state, used.chain);
                state.inflight = None;
            } else {
                log::warn!("freeing unexpected completion {}", used.id);
            }
        }
        Ok(())
    }
}

/// Keep the response region of the owning transaction's chain. The request
/// region is freed with the rest of the chain.
fn take_response(state: &mut TransportState, mut chain: Chain) {
    if let Some(region) = chain.writable.pop() {
        state.restore_response(region);
    }
}

fn alloc_error(err: OsalError, size: usize) -> TransportError {
    match err {
        OsalError::OutOfMemory => TransportError::NoMemory(size),
        other => TransportError::Osal(other),
    }
}

impl TpmTransport for VirtioTpm {
    fn send(&self, command: &[u8]) -> TransportResult<()> {
        VirtioTpm::send(self, command)
    }

    fn recv(&self, buf: &mut [u8]) -> TransportResult<usize> {
        VirtioTpm::recv(self, buf)
    }

    fn status(&self) -> u8 {
        VirtioTpm::status(self)
    }

    // The queue has no abort path; a command runs to completion.
    fn cancel(&self) {}

    fn update_timeouts(&self, _timeouts: &mut [u32]) -> bool {
        false
    }

    fn req_canceled(&self, _status: u8) -> bool {
        false
    }

    // Localities do not exist on a virtqueue; every request succeeds.
    fn request_locality(&self, locality: u8) -> TransportResult<u8> {
        Ok(locality)
    }

    fn relinquish_locality(&self, _locality: u8) -> TransportResult<()> {
        Ok(())
    }

    fn clk_enable(&self, _enable: bool) {}
}
