//! Descriptor address layouts.
//!
//! The descriptor's `log_buffer` / `log_current` fields mean different
//! things depending on its version:
//!
//! ```text
//! v4 Absolute: log_buffer = &info + 80        log_current = absolute address
//! v5 Offset:   log_buffer = 80                log_current = offset from &info
//! ```
//!
//! Everything above this module works in arena offsets (0 = first entry
//! byte) and converts through an [`AddressLayout`]. The offset form survives
//! the descriptor being mapped at a different address by a later stage.

use crate::info::{LOGGER_INFO_SIZE, VERSION_ABSOLUTE, VERSION_OFFSET};

/// Conversion between raw descriptor fields and arena offsets.
pub trait AddressLayout: Sync {
    /// Raw field value for arena offset `arena_offset`.
    fn encode(&self, info_address: u64, arena_offset: u64) -> Option<u64>;

    /// Arena offset for a raw field value; `None` if it lies before the arena.
    fn decode(&self, info_address: u64, raw: u64) -> Option<u64>;

    /// Raw value no cursor may exceed.
    fn cursor_limit(&self, info_address: u64, capacity: u32, max_address: u64) -> u64;
}

/// v4: fields hold absolute addresses.
#[derive(Debug, Clone, Copy, Default)]
pub struct AbsoluteLayout;

/// v5: fields hold offsets from the descriptor start.
#[derive(Debug, Clone, Copy, Default)]
pub struct OffsetLayout;

impl AddressLayout for AbsoluteLayout {
    fn encode(&self, info_address: u64, arena_offset: u64) -> Option<u64> {
        info_address
            .checked_add(LOGGER_INFO_SIZE as u64)?
            .checked_add(arena_offset)
    }

    fn decode(&self, info_address: u64, raw: u64) -> Option<u64> {
        raw.checked_sub(info_address.checked_add(LOGGER_INFO_SIZE as u64)?)
    }

    // Bounded by the platform's address ceiling, not the arena
    fn cursor_limit(&self, _info_address: u64, _capacity: u32, max_address: u64) -> u64 {
        max_address
    }
}

impl AddressLayout for OffsetLayout {
    fn encode(&self, _info_address: u64, arena_offset: u64) -> Option<u64> {
        (LOGGER_INFO_SIZE as u64).checked_add(arena_offset)
    }

    fn decode(&self, _info_address: u64, raw: u64) -> Option<u64> {
        raw.checked_sub(LOGGER_INFO_SIZE as u64)
    }

    fn cursor_limit(&self, _info_address: u64, capacity: u32, _max_address: u64) -> u64 {
        LOGGER_INFO_SIZE as u64 + u64::from(capacity)
    }
}

static ABSOLUTE: AbsoluteLayout = AbsoluteLayout;
static OFFSET: OffsetLayout = OffsetLayout;

/// Layout selector stored (as a version number) in the descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LayoutKind {
    Absolute = 1,
    Offset = 2,
}

impl LayoutKind {
    pub const fn from_version(version: u16) -> Option<Self> {
        match version {
            VERSION_ABSOLUTE => Some(Self::Absolute),
            VERSION_OFFSET => Some(Self::Offset),
            _ => None,
        }
    }

    pub const fn version(self) -> u16 {
        match self {
            Self::Absolute => VERSION_ABSOLUTE,
            Self::Offset => VERSION_OFFSET,
        }
    }

    pub(crate) const fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(Self::Absolute),
            2 => Some(Self::Offset),
            _ => None,
        }
    }

    pub fn accessor(self) -> &'static dyn AddressLayout {
        match self {
            Self::Absolute => &ABSOLUTE,
            Self::Offset => &OFFSET,
        }
    }
}
