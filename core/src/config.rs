//! Build-time logger configuration.
//!
//! Values a platform would normally fix at build time: arena sizes, the
//! mirror severity gate used by the older descriptor layout, the record
//! filter, and the fixed pre-memory address handed to the earliest stage.

use crate::level::DebugLevel;

// ═══════════════════════════════════════════════════════════════════════════
// CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════

/// Page size (4KB, same as UEFI)
pub const PAGE_SIZE: usize = 4096;

/// Bootstrap arena, used before dynamic memory exists (16KB)
pub const BOOTSTRAP_PAGES: usize = 4;

/// Permanent arena, allocated once dynamic memory exists (2MB)
pub const PERMANENT_PAGES: usize = 512;

/// Mirror gate for descriptors that do not carry their own
pub const DEFAULT_HW_PRINT_LEVEL: DebugLevel =
    DebugLevel(DebugLevel::ERROR.0 | DebugLevel::WARN.0 | DebugLevel::INFO.0);

/// Messages sharing no bit with this are dropped before reservation
pub const DEFAULT_RECORD_LEVEL: DebugLevel = DebugLevel::ALL;

/// Highest address a stage can observe
pub const DEFAULT_MAX_ADDRESS: u64 = u64::MAX;

// ═══════════════════════════════════════════════════════════════════════════
// CONFIG
// ═══════════════════════════════════════════════════════════════════════════

/// Per-platform logger configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoggerConfig {
    /// Pages for a bootstrap arena (including the descriptor)
    pub bootstrap_pages: usize,
    /// Pages for a permanent arena (including the descriptor)
    pub permanent_pages: usize,
    /// Mirror gate used when the descriptor layout has none
    pub hw_print_level: DebugLevel,
    /// Record filter
    pub record_level: DebugLevel,
    /// Pointer-sized constant naming pre-reserved early memory
    pub fixed_address: Option<u64>,
    /// Upper bound for absolute-layout cursors
    pub max_address: u64,
}

impl LoggerConfig {
    pub const fn new() -> Self {
        Self {
            bootstrap_pages: BOOTSTRAP_PAGES,
            permanent_pages: PERMANENT_PAGES,
            hw_print_level: DEFAULT_HW_PRINT_LEVEL,
            record_level: DEFAULT_RECORD_LEVEL,
            fixed_address: None,
            max_address: DEFAULT_MAX_ADDRESS,
        }
    }

    pub const fn with_fixed_address(mut self, address: u64) -> Self {
        self.fixed_address = Some(address);
        self
    }

    pub const fn with_pages(mut self, bootstrap: usize, permanent: usize) -> Self {
        self.bootstrap_pages = bootstrap;
        self.permanent_pages = permanent;
        self
    }

    pub const fn with_hw_print_level(mut self, level: DebugLevel) -> Self {
        self.hw_print_level = level;
        self
    }

    pub const fn with_record_level(mut self, level: DebugLevel) -> Self {
        self.record_level = level;
        self
    }

    pub const fn with_max_address(mut self, max: u64) -> Self {
        self.max_address = max;
        self
    }

    /// Bootstrap region size in bytes.
    #[inline]
    pub const fn bootstrap_bytes(&self) -> usize {
        self.bootstrap_pages * PAGE_SIZE
    }

    /// Permanent region size in bytes.
    #[inline]
    pub const fn permanent_bytes(&self) -> usize {
        self.permanent_pages * PAGE_SIZE
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self::new()
    }
}
