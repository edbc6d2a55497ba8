// Licensed under the Apache-2.0 license

//! Synchronization primitives abstraction

use crate::error::{OsalError, OsalResult};
use std::sync as std_sync;
use std::time::Duration;

/// Mutex abstraction
pub struct Mutex<T> {
    inner: std_sync::Mutex<T>,
}

impl<T> Mutex<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: std_sync::Mutex::new(value),
        }
    }

    pub fn lock(&self) -> OsalResult<std_sync::MutexGuard<'_, T>> {
        self.inner
            .lock()
            .map_err(|_| OsalError::ResourceUnavailable)
    }
}

impl<T: Default> Default for Mutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// Condition variable abstraction
pub struct Condvar {
    inner: std_sync::Condvar,
}

impl Default for Condvar {
    fn default() -> Self {
        Self::new()
    }
}

impl Condvar {
    pub fn new() -> Self {
        Self {
            inner: std_sync::Condvar::new(),
        }
    }

    /// Wait until notified or `timeout` elapses.
    ///
    /// The returned flag is `true` when the wait ended because of the timeout.
    pub fn wait_timeout<'a, T>(
        &self,
        guard: std_sync::MutexGuard<'a, T>,
        timeout: Duration,
    ) -> OsalResult<(std_sync::MutexGuard<'a, T>, bool)> {
        self.inner
            .wait_timeout(guard, timeout)
            .map(|(guard, result)| (guard, result.timed_out()))
            .map_err(|_| OsalError::ResourceUnavailable)
    }

    pub fn notify_all(&self) {
        self.inner.notify_all();
    }
}

/// One-shot wait/notify signal carrying a payload.
///
/// A producer publishes records with [`Completion::complete`]; a single waiter
/// collects everything published since the last [`Completion::reinit`].
/// Several `complete` calls before the waiter wakes are coalesced in order.
pub struct Completion<T> {
    slot: Mutex<Vec<T>>,
    ready: Condvar,
}

impl<T> Default for Completion<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Completion<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Vec::new()),
            ready: Condvar::new(),
        }
    }

    /// Re-arm the signal, returning any records nobody collected.
    pub fn reinit(&self) -> OsalResult<Vec<T>> {
        let mut slot = self.slot.lock()?;
        Ok(core::mem::take(&mut *slot))
    }

    /// Publish a batch of records and wake the waiter.
    pub fn complete(&self, records: impl IntoIterator<Item = T>) -> OsalResult<()> {
        let mut slot = self.slot.lock()?;
        slot.extend(records);
        drop(slot);
        self.ready.notify_all();
        Ok(())
    }

    /// Block until at least one record is published or `timeout` elapses.
    ///
    /// Returns `Ok(None)` on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> OsalResult<Option<Vec<T>>> {
        let deadline = crate::time::Deadline::after(timeout);
        let mut slot = self.slot.lock()?;
        while slot.is_empty() {
            let Some(remaining) = deadline.remaining() else {
                return Ok(None);
            };
            let (guard, _) = self.ready.wait_timeout(slot, remaining)?;
            slot = guard;
        }
        Ok(Some(core::mem::take(&mut *slot)))
    }

    /// Collect whatever is published without blocking.
    pub fn try_take(&self) -> OsalResult<Vec<T>> {
        let mut slot = self.slot.lock()?;
        Ok(core::mem::take(&mut *slot))
    }
}
