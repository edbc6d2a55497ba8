// Licensed under the Apache-2.0 license

//! Legacy status register exposed to polling chip frameworks

use bitfield::bitfield;
use zerocopy::{FromBytes, Immutable, IntoBytes};

/// Completed response available and not superseded
pub const STATUS_VALID: u8 = 0x80;
/// Device can accept a new command
pub const STATUS_COMMAND_READY: u8 = 0x40;
/// Command execution requested
pub const STATUS_GO: u8 = 0x20;
/// Response data ready
pub const STATUS_DATA_AVAIL: u8 = 0x10;
/// Device expects more data
pub const STATUS_DATA_EXPECT: u8 = 0x08;
/// Caller should resubmit the read
pub const STATUS_RESPONSE_RETRY: u8 = 0x02;
/// Bits that must read as zero
pub const STATUS_READ_ZERO: u8 = 0x23;

/// Mask and value a poller compares against to detect a finished command
pub const STATUS_COMPLETE: u8 = STATUS_DATA_AVAIL | STATUS_VALID;

bitfield! {
    /// Status bitmask.
    /// Bit 7: VALID
    /// Bit 6: COMMAND_READY
    /// Bit 5: GO
    /// Bit 4: DATA_AVAIL
    /// Bit 3: DATA_EXPECT
    /// Bit 1: RESPONSE_RETRY
    #[repr(C)]
    #[derive(Copy, Clone, FromBytes, IntoBytes, Immutable, PartialEq, Eq, Default)]
    pub struct TpmStatus(u8);
    impl Debug;
    pub u8, valid, set_valid: 7, 7;
    pub u8, command_ready, set_command_ready: 6, 6;
    pub u8, go, set_go: 5, 5;
    pub u8, data_avail, set_data_avail: 4, 4;
    pub u8, data_expect, set_data_expect: 3, 3;
    pub u8, response_retry, set_response_retry: 1, 1;
}

impl TpmStatus {
    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn is_valid(&self) -> bool {
        self.valid() != 0
    }

    /// Whether the complete mask/value pair matches
    pub fn is_complete(&self) -> bool {
        self.0 & STATUS_COMPLETE == STATUS_COMPLETE
    }

    /// A response landed: VALID and DATA_AVAIL go up together.
    pub fn mark_complete(&mut self) {
        self.set_valid(1);
        self.set_data_avail(1);
    }

    /// A command was submitted; any previous response is superseded.
    pub fn mark_submitted(&mut self) {
        self.set_valid(0);
        self.set_data_avail(0);
    }
}
