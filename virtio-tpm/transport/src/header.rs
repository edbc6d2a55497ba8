// Licensed under the Apache-2.0 license

//! Response header layout

use zerocopy::{big_endian::U32, FromBytes, Immutable, IntoBytes, KnownLayout};

/// Size of [`ResponseHeader`] on the wire
pub const HEADER_SIZE: usize = core::mem::size_of::<ResponseHeader>();

/// Header at the front of every response region.
///
/// `length` counts only the payload after the header.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct ResponseHeader {
    pub tag: U32,
    pub length: U32,
}

impl ResponseHeader {
    pub fn new(tag: u32, length: u32) -> Self {
        Self {
            tag: U32::new(tag),
            length: U32::new(length),
        }
    }

    /// Split a response into its header and the bytes after it.
    pub fn parse(response: &[u8]) -> Option<(&Self, &[u8])> {
        Self::ref_from_prefix(response).ok()
    }

    pub fn payload_len(&self) -> usize {
        self.length.get() as usize
    }
}
