// Licensed under the Apache-2.0 license

//! Completion handler run from the queue callback

use std::sync::Arc;
use virtio_tpm_channel::{CompletionCallback, QueueChannel, UsedChain};
use virtio_tpm_osal::Completion;

/// Signal carrying drained completions from the callback to the submitter
pub type CompletionSignal = Completion<UsedChain>;

/// Drains the used ring and publishes the result to the waiting submitter.
///
/// Never touches transport state, so it cannot contend with a caller holding
/// the state lock.
#[derive(Clone)]
pub struct CompletionHandler {
    signal: Arc<CompletionSignal>,
}

impl Default for CompletionHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionHandler {
    pub fn new() -> Self {
        Self {
            signal: Arc::new(CompletionSignal::new()),
        }
    }

    pub fn signal(&self) -> Arc<CompletionSignal> {
        self.signal.clone()
    }

    /// Drain every ready completion and release the signal once.
    pub fn on_complete(&self, channel: &dyn QueueChannel) {
        let drained = channel.drain_completed();
        if drained.is_empty() {
            log::debug!("{}: spurious completion callback", channel.name());
            return;
        }

        for used in &drained {
            log::debug!(
                "{}: completion {} wrote {} bytes",
                channel.name(),
                used.id,
                used.written
            );
        }

        if let Err(e) = self.signal.complete(drained) {
            log::error!("{}: failed to publish completions: {}", channel.name(), e);
        }
    }

    /// Wrap the handler for registration with a queue.
    pub fn into_callback(self) -> CompletionCallback {
        Arc::new(move |channel: &dyn QueueChannel| self.on_complete(channel))
    }
}
