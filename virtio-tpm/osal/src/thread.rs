// Licensed under the Apache-2.0 license

//! Thread abstraction

use crate::error::{OsalError, OsalResult};
use std::thread as std_thread;

/// Thread handle
pub struct ThreadHandle {
    inner: Option<std_thread::JoinHandle<()>>,
}

impl ThreadHandle {
    pub fn join(mut self) -> OsalResult<()> {
        if let Some(handle) = self.inner.take() {
            handle
                .join()
                .map_err(|_| OsalError::Other("Thread join failed"))?;
        }
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.inner.as_ref().map_or(true, |h| h.is_finished())
    }
}

/// Thread builder
#[derive(Default)]
pub struct ThreadBuilder {
    name: Option<String>,
}

impl ThreadBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn spawn<F>(self, f: F) -> OsalResult<ThreadHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut builder = std_thread::Builder::new();

        if let Some(name) = self.name {
            builder = builder.name(name);
        }

        let handle = builder.spawn(f).map_err(|e| {
            log::error!("thread spawn failed: {}", e);
            OsalError::ResourceUnavailable
        })?;

        Ok(ThreadHandle {
            inner: Some(handle),
        })
    }
}
