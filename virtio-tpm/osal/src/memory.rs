// Licensed under the Apache-2.0 license

//! Memory abstraction
//!
//! Regions handed to a queue are plain byte vectors. Allocation is fallible so
//! that an exhausted heap surfaces as [`OsalError::OutOfMemory`] instead of an
//! abort.

use crate::error::{OsalError, OsalResult};

/// Memory allocator trait
pub trait Allocator: Send + Sync {
    /// Allocate a zero-filled region of `size` bytes
    fn alloc_region(&self, size: usize) -> OsalResult<Vec<u8>>;

    /// Allocate a region holding a copy of `src`
    fn copy_region(&self, src: &[u8]) -> OsalResult<Vec<u8>> {
        let mut region = self.alloc_region(src.len())?;
        region.copy_from_slice(src);
        Ok(region)
    }
}

/// Allocator backed by the global heap
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapAllocator;

impl Allocator for HeapAllocator {
    fn alloc_region(&self, size: usize) -> OsalResult<Vec<u8>> {
        let mut region = Vec::new();
        region
            .try_reserve_exact(size)
            .map_err(|_| OsalError::OutOfMemory)?;
        region.resize(size, 0);
        Ok(region)
    }
}
