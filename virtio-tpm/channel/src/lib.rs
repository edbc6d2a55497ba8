// Licensed under the Apache-2.0 license

//! Queue channel abstraction
//!
//! A channel moves descriptor chains to a device and hands them back once the
//! device has consumed them. Each chain carries device-readable buffers
//! followed by device-writable buffers, the same split a virtqueue makes with
//! its `WRITE` descriptor flag. Completions are announced out of band through
//! a [`CompletionCallback`] registered when the queue is created.

use std::fmt;
use std::sync::Arc;

mod error;

pub use error::{ChannelError, Rejected};

/// Identifier the channel assigns to a submitted chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u32);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Descriptor chain owned by whoever currently holds it
///
/// Buffers travel by value: submitting a chain lends its regions to the
/// channel, and they come back inside a [`UsedChain`], a [`Rejected`] or a
/// reclaimed chain.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Chain {
    /// Buffers the device reads (driver to device)
    pub readable: Vec<Vec<u8>>,
    /// Buffers the device writes (device to driver)
    pub writable: Vec<Vec<u8>>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_readable(mut self, buf: Vec<u8>) -> Self {
        self.readable.push(buf);
        self
    }

    pub fn with_writable(mut self, buf: Vec<u8>) -> Self {
        self.writable.push(buf);
        self
    }

    pub fn descriptor_count(&self) -> usize {
        self.readable.len() + self.writable.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptor_count() == 0
    }
}

/// Chain returned by the device together with the byte count it wrote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsedChain {
    pub id: TransactionId,
    pub chain: Chain,
    /// Bytes written into the writable buffers, as reported by the device
    pub written: u32,
}

/// Callback run by the channel whenever completed chains are ready.
///
/// Runs in whatever context the device interrupt is delivered on. It must not
/// block.
pub type CompletionCallback = Arc<dyn Fn(&dyn QueueChannel) + Send + Sync>;

/// Operations the front-end needs from a virtqueue
pub trait QueueChannel: Send + Sync {
    /// Queue name given at discovery time
    fn name(&self) -> &str;

    /// Place a chain on the available ring.
    ///
    /// On failure the chain is handed back untouched inside [`Rejected`].
    fn submit_transaction(&self, chain: Chain) -> Result<TransactionId, Rejected>;

    /// Kick the device. Returns `false` when the device could not be notified.
    fn notify(&self) -> bool;

    /// Take the next chain from the used ring, in completion order.
    fn pop_completed(&self) -> Option<UsedChain>;

    /// Stop the queue. Nothing is consumed by the device afterwards.
    fn reset(&self);

    /// Take back every chain the device never returned.
    fn reclaim_unconsumed(&self) -> Vec<Chain>;

    /// Drain the used ring completely.
    fn drain_completed(&self) -> Vec<UsedChain> {
        let mut drained = Vec::new();
        while let Some(used) = self.pop_completed() {
            drained.push(used);
        }
        drained
    }
}
