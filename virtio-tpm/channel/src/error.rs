// Licensed under the Apache-2.0 license

use crate::Chain;
use thiserror::Error;

/// Reasons a channel refuses a chain
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    #[error("chain has no descriptors")]
    EmptyChain,
    #[error("queue has {free} free descriptors, chain needs {needed}")]
    QueueFull { needed: usize, free: usize },
    #[error("queue is broken")]
    Broken,
    #[error("queue has been reset")]
    Reset,
}

/// A refused submission, carrying the chain back to its owner
#[derive(Error, Debug)]
#[error("submission rejected: {error}")]
pub struct Rejected {
    #[source]
    pub error: ChannelError,
    pub chain: Chain,
}

impl Rejected {
    pub fn new(error: ChannelError, chain: Chain) -> Self {
        Self { error, chain }
    }

    pub fn into_chain(self) -> Chain {
        self.chain
    }
}
