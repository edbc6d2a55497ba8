// Licensed under the Apache-2.0 license

//! Time and deadline abstraction

pub use std::time::Duration;
use std::time::Instant;

/// Absolute point in time after which a wait is abandoned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        let now = Instant::now();
        // Saturate far-future deadlines instead of overflowing Instant.
        let at = now
            .checked_add(timeout)
            .unwrap_or_else(|| now + Duration::from_secs(u32::MAX as u64));
        Self { at }
    }

    /// Time left before the deadline, `None` once it has passed.
    pub fn remaining(&self) -> Option<Duration> {
        let left = self.at.saturating_duration_since(Instant::now());
        if left.is_zero() {
            None
        } else {
            Some(left)
        }
    }

    pub fn has_expired(&self) -> bool {
        self.remaining().is_none()
    }
}

/// Sleep for the specified duration
pub fn sleep(duration: Duration) {
    std::thread::sleep(duration);
}
