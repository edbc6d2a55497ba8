// Licensed under the Apache-2.0 license

//! OS Abstraction Layer (OSAL) for the virtio TPM front-end
//!
//! Wraps the host primitives the transport relies on: locks and condition
//! variables, the one-shot completion signal used to park a submitter until
//! the queue callback fires, deadline arithmetic, named threads and fallible
//! region allocation.

pub mod error;
pub mod memory;
pub mod sync;
pub mod thread;
pub mod time;

// Re-export core types
pub use error::{OsalError, OsalResult};
pub use memory::{Allocator, HeapAllocator};
pub use sync::{Completion, Condvar, Mutex};
pub use thread::{ThreadBuilder, ThreadHandle};
pub use time::{Deadline, Duration};
