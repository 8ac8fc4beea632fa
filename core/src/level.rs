//! Debug severity flags.
//!
//! Bit-compatible with the EDK2 `DEBUG_*` error levels, so firmware built
//! against either set of constants filters the same way.

use core::ops::{BitAnd, BitOr, BitOrAssign};

/// Severity bitmask carried by every entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct DebugLevel(pub u32);

impl DebugLevel {
    pub const NONE: Self = Self(0);
    pub const INIT: Self = Self(0x0000_0001);          // Initialization
    pub const WARN: Self = Self(0x0000_0002);          // Warnings
    pub const LOAD: Self = Self(0x0000_0004);          // Image loads
    pub const FS: Self = Self(0x0000_0008);            // Filesystem
    pub const POOL: Self = Self(0x0000_0010);          // Pool allocations
    pub const PAGE: Self = Self(0x0000_0020);          // Page allocations
    pub const INFO: Self = Self(0x0000_0040);          // Informational
    pub const DISPATCH: Self = Self(0x0000_0080);      // Driver dispatcher
    pub const VARIABLE: Self = Self(0x0000_0100);      // Variable services
    pub const BM: Self = Self(0x0000_0400);            // Boot manager
    pub const BLKIO: Self = Self(0x0000_1000);         // Block I/O
    pub const NET: Self = Self(0x0000_4000);           // Network
    pub const UNDI: Self = Self(0x0001_0000);          // UNDI driver
    pub const LOADFILE: Self = Self(0x0002_0000);      // Load file
    pub const EVENT: Self = Self(0x0008_0000);         // Event services
    pub const GCD: Self = Self(0x0010_0000);           // Global coherency database
    pub const CACHE: Self = Self(0x0020_0000);         // Memory range cachability
    pub const VERBOSE: Self = Self(0x0040_0000);       // Detailed debug
    pub const MANAGEABILITY: Self = Self(0x0080_0000); // Manageability
    pub const ERROR: Self = Self(0x8000_0000);         // Errors

    pub const ALL: Self = Self(u32::MAX);

    /// Raw bits.
    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True if any bit is shared with `other`.
    #[inline]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// True if every bit of `other` is set.
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Short name of the most severe flag set.
    pub const fn name(self) -> &'static str {
        if self.intersects(Self::ERROR) {
            "ERROR"
        } else if self.intersects(Self::WARN) {
            "WARN"
        } else if self.intersects(Self::INFO) {
            "INFO"
        } else if self.intersects(Self::VERBOSE) {
            "VERBOSE"
        } else if self.is_empty() {
            "NONE"
        } else {
            "DEBUG"
        }
    }
}

impl BitOr for DebugLevel {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for DebugLevel {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for DebugLevel {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}
