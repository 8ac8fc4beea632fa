//! Entry timestamps.
//!
//! Entries carry raw tick counts. A single (ticks, wall-clock) anchor is
//! stored in the descriptor once a real-time clock is reachable, so tools
//! can turn ticks into time after the fact.
//!
//! # Tick source
//! The default source is the TSC. Reads are always safe; frequency is
//! whatever the platform calibrated and wrote into the anchor.

/// Wall-clock time, layout-compatible with `EFI_TIME` (16 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EfiTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub pad1: u8,
    pub nanosecond: u32,
    pub time_zone: i16,
    pub daylight: u8,
    pub pad2: u8,
}

impl EfiTime {
    /// Pack into four little-endian words (descriptor storage form).
    pub fn to_words(&self) -> [u32; 4] {
        let w0 = u32::from(self.year) | (u32::from(self.month) << 16) | (u32::from(self.day) << 24);
        let w1 = u32::from(self.hour)
            | (u32::from(self.minute) << 8)
            | (u32::from(self.second) << 16)
            | (u32::from(self.pad1) << 24);
        let w2 = self.nanosecond;
        let w3 = u32::from(self.time_zone as u16)
            | (u32::from(self.daylight) << 16)
            | (u32::from(self.pad2) << 24);
        [w0, w1, w2, w3]
    }

    /// Inverse of [`EfiTime::to_words`].
    pub fn from_words(w: [u32; 4]) -> Self {
        Self {
            year: w[0] as u16,
            month: (w[0] >> 16) as u8,
            day: (w[0] >> 24) as u8,
            hour: w[1] as u8,
            minute: (w[1] >> 8) as u8,
            second: (w[1] >> 16) as u8,
            pad1: (w[1] >> 24) as u8,
            nanosecond: w[2],
            time_zone: w[3] as u16 as i16,
            daylight: (w[3] >> 16) as u8,
            pad2: (w[3] >> 24) as u8,
        }
    }

    /// True if nothing has been recorded.
    pub fn is_unset(&self) -> bool {
        self.year == 0 && self.month == 0 && self.day == 0
    }
}

/// Anything that produces monotonically increasing ticks.
pub trait TimeSource {
    fn ticks(&self) -> u64;

    /// Ticks per second, 0 if unknown.
    fn frequency(&self) -> u64 {
        0
    }
}

/// Time stamp counter.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tsc;

impl TimeSource for Tsc {
    #[inline]
    fn ticks(&self) -> u64 {
        read_tsc()
    }
}

/// Read TSC (non-serializing).
#[cfg(target_arch = "x86_64")]
#[inline]
pub fn read_tsc() -> u64 {
    // SAFETY: RDTSC has no memory effects and is available on every x86_64 CPU.
    unsafe { core::arch::x86_64::_rdtsc() }
}

/// Stub for non-x86_64 targets.
#[cfg(not(target_arch = "x86_64"))]
#[inline]
pub fn read_tsc() -> u64 {
    0
}

/// Convert a tick count to nanoseconds. Returns 0 if frequency is unknown.
pub fn ticks_to_nanoseconds(ticks: u64, frequency: u64) -> u64 {
    if frequency == 0 {
        return 0;
    }
    let ns = (ticks as u128) * 1_000_000_000 / (frequency as u128);
    ns.min(u64::MAX as u128) as u64
}
