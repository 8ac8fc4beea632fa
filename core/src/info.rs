//! Logger info block (the buffer descriptor).
//!
//! Lives at the start of the log region; the arena follows immediately.
//! Every field is an atomic of the field's width, so the block can be shared
//! by reference between processors and stages without tearing, and the
//! in-memory layout stays identical to the plain-integer form other
//! components compile against.
//!
//! # Layout (80 bytes)
//!
//! ```text
//!  0  signature 'ALOG'     4  version   6  reserved0
//!  8  log_buffer          16  log_current          (address v4 / offset v5)
//! 24  discarded_size      28  log_buffer_size
//! 32  in_permanent_ram  at_runtime  gone_virtual  hdw_port_initialized
//! 36  hdw_port_disabled   37 reserved1[3]
//! 40  timer_frequency     48  ticks_at_time
//! 56  time (EFI_TIME)     72  hw_print_level       76 reserved2
//! ```

use core::sync::atomic::{AtomicU16, AtomicU32, AtomicU64, AtomicU8, Ordering};

use crate::error::{LogError, Result, ValidationError};
use crate::layout::LayoutKind;
use crate::level::DebugLevel;
use crate::time::{ticks_to_nanoseconds, EfiTime};

/// Descriptor signature 'ALOG'
pub const LOGGER_INFO_SIGNATURE: u32 = u32::from_le_bytes(*b"ALOG");

/// Layout storing absolute addresses
pub const VERSION_ABSOLUTE: u16 = 4;

/// Layout storing offsets from the descriptor start
pub const VERSION_OFFSET: u16 = 5;

/// Shared descriptor header.
#[repr(C)]
pub struct LoggerInfo {
    signature: AtomicU32,
    version: AtomicU16,
    #[allow(dead_code)]
    reserved0: AtomicU16,
    log_buffer: AtomicU64,
    log_current: AtomicU64,
    discarded_size: AtomicU32,
    log_buffer_size: AtomicU32,
    in_permanent_ram: AtomicU8,
    at_runtime: AtomicU8,
    gone_virtual: AtomicU8,
    hdw_port_initialized: AtomicU8,
    hdw_port_disabled: AtomicU8,
    #[allow(dead_code)]
    reserved1: [AtomicU8; 3],
    timer_frequency: AtomicU64,
    ticks_at_time: AtomicU64,
    time: [AtomicU32; 4],
    hw_print_level: AtomicU32,
    #[allow(dead_code)]
    reserved2: AtomicU32,
}

/// Size of the descriptor; the arena starts this far past it.
pub const LOGGER_INFO_SIZE: usize = core::mem::size_of::<LoggerInfo>();

/// Required descriptor alignment.
pub const LOGGER_INFO_ALIGN: usize = core::mem::align_of::<LoggerInfo>();

const _: () = assert!(LOGGER_INFO_SIZE == 80);
const _: () = assert!(LOGGER_INFO_ALIGN == 8);

impl LoggerInfo {
    /// View the descriptor at `address` without checking its contents.
    ///
    /// # Safety
    /// `address` must be readable for `LOGGER_INFO_SIZE` bytes for as long as
    /// the returned reference is used.
    pub unsafe fn at<'a>(address: u64) -> core::result::Result<&'a LoggerInfo, ValidationError> {
        if address == 0 {
            return Err(ValidationError::NullPointer);
        }
        if address % LOGGER_INFO_ALIGN as u64 != 0 || address > usize::MAX as u64 {
            return Err(ValidationError::Misaligned);
        }
        Ok(&*(address as usize as *const LoggerInfo))
    }

    /// Initialize a fresh descriptor and empty arena in `region_len` bytes at
    /// `address`.
    ///
    /// The signature is stored last so a concurrent observer never sees a
    /// signed but half-initialized header.
    ///
    /// # Safety
    /// The region must be writable, not in use by anything else, and remain
    /// valid for as long as the returned reference is used.
    pub unsafe fn initialize<'a>(
        address: u64,
        region_len: usize,
        layout: LayoutKind,
        hw_print_level: DebugLevel,
    ) -> Result<&'a LoggerInfo> {
        if region_len <= LOGGER_INFO_SIZE {
            return Err(LogError::RegionTooSmall);
        }
        // Reject before touching memory
        Self::at(address)?;

        let capacity = (region_len - LOGGER_INFO_SIZE).min(u32::MAX as usize) as u32;
        let start = layout
            .accessor()
            .encode(address, 0)
            .ok_or(LogError::Invalid(ValidationError::BufferStartMismatch))?;

        let ptr = address as usize as *mut u8;
        core::ptr::write_bytes(ptr, 0, LOGGER_INFO_SIZE);
        let info = &*(ptr as *const LoggerInfo);

        info.version.store(layout.version(), Ordering::Relaxed);
        info.log_buffer.store(start, Ordering::Relaxed);
        info.log_current.store(start, Ordering::Relaxed);
        info.log_buffer_size.store(capacity, Ordering::Relaxed);
        info.hw_print_level.store(hw_print_level.bits(), Ordering::Relaxed);
        info.signature.store(LOGGER_INFO_SIGNATURE, Ordering::Release);

        Ok(info)
    }

    /// Address of this descriptor.
    #[inline]
    pub fn address(&self) -> u64 {
        self as *const Self as usize as u64
    }

    /// First arena byte.
    #[inline]
    pub fn arena_base(&self) -> *mut u8 {
        (self as *const Self as *mut u8).wrapping_add(LOGGER_INFO_SIZE)
    }

    #[inline]
    pub fn signature(&self) -> u32 {
        self.signature.load(Ordering::Acquire)
    }

    #[inline]
    pub fn version(&self) -> u16 {
        self.version.load(Ordering::Relaxed)
    }

    /// Address layout selected by the version field.
    pub fn layout(&self) -> core::result::Result<LayoutKind, ValidationError> {
        let version = self.version();
        LayoutKind::from_version(version).ok_or(ValidationError::UnknownVersion(version))
    }

    /// Arena capacity in bytes.
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.log_buffer_size.load(Ordering::Relaxed)
    }

    /// Raw arena start field (address or offset, per layout).
    #[inline]
    pub fn raw_buffer(&self) -> u64 {
        self.log_buffer.load(Ordering::Relaxed)
    }

    /// Raw write cursor field (address or offset, per layout).
    #[inline]
    pub fn raw_current(&self) -> u64 {
        self.log_current.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn cursor(&self) -> &AtomicU64 {
        &self.log_current
    }

    #[inline]
    pub(crate) fn discarded_counter(&self) -> &AtomicU32 {
        &self.discarded_size
    }

    /// Bytes that could not be recorded.
    #[inline]
    pub fn discarded_size(&self) -> u32 {
        self.discarded_size.load(Ordering::Acquire)
    }

    #[inline]
    pub fn in_permanent_ram(&self) -> bool {
        self.in_permanent_ram.load(Ordering::Acquire) != 0
    }

    pub fn set_in_permanent_ram(&self, value: bool) {
        self.in_permanent_ram.store(value as u8, Ordering::Release);
    }

    /// Set after exit-boot-services.
    #[inline]
    pub fn at_runtime(&self) -> bool {
        self.at_runtime.load(Ordering::Acquire) != 0
    }

    pub fn set_at_runtime(&self) {
        self.at_runtime.store(1, Ordering::Release);
    }

    /// Set after the virtual address change.
    #[inline]
    pub fn gone_virtual(&self) -> bool {
        self.gone_virtual.load(Ordering::Acquire) != 0
    }

    pub fn set_gone_virtual(&self) {
        self.gone_virtual.store(1, Ordering::Release);
    }

    #[inline]
    pub fn hdw_port_initialized(&self) -> bool {
        self.hdw_port_initialized.load(Ordering::Acquire) != 0
    }

    /// Returns true for exactly one caller: the one that gets to initialize
    /// the hardware port.
    pub(crate) fn claim_hdw_port_init(&self) -> bool {
        self.hdw_port_initialized
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    #[inline]
    pub fn hdw_port_disabled(&self) -> bool {
        self.hdw_port_disabled.load(Ordering::Acquire) != 0
    }

    pub fn set_hdw_port_disabled(&self, disabled: bool) {
        self.hdw_port_disabled.store(disabled as u8, Ordering::Release);
    }

    /// Mirror gate stored in the descriptor (meaningful for the offset layout).
    #[inline]
    pub fn hw_print_level(&self) -> DebugLevel {
        DebugLevel(self.hw_print_level.load(Ordering::Relaxed))
    }

    pub fn set_hw_print_level(&self, level: DebugLevel) {
        self.hw_print_level.store(level.bits(), Ordering::Relaxed);
    }

    #[inline]
    pub fn timer_frequency(&self) -> u64 {
        self.timer_frequency.load(Ordering::Relaxed)
    }

    /// Tick count at which `time()` was captured, 0 if no anchor yet.
    #[inline]
    pub fn ticks_at_time(&self) -> u64 {
        self.ticks_at_time.load(Ordering::Acquire)
    }

    pub fn time(&self) -> EfiTime {
        EfiTime::from_words([
            self.time[0].load(Ordering::Relaxed),
            self.time[1].load(Ordering::Relaxed),
            self.time[2].load(Ordering::Relaxed),
            self.time[3].load(Ordering::Relaxed),
        ])
    }

    /// Record the wall-clock anchor. Only the first call wins.
    pub fn set_time_anchor(&self, ticks: u64, time: EfiTime, frequency: u64) -> bool {
        let ticks = ticks.max(1);
        if self
            .ticks_at_time
            .compare_exchange(0, ticks, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        for (slot, word) in self.time.iter().zip(time.to_words()) {
            slot.store(word, Ordering::Relaxed);
        }
        if frequency != 0 {
            self.timer_frequency.store(frequency, Ordering::Release);
        }
        true
    }

    /// Nanoseconds since tick 0 for an entry timestamp, 0 if the frequency
    /// is unknown.
    pub fn elapsed_nanoseconds(&self, ticks: u64) -> u64 {
        ticks_to_nanoseconds(ticks, self.timer_frequency())
    }

    /// Record the timer frequency if none is set yet.
    pub fn set_timer_frequency(&self, frequency: u64) {
        let _ = self
            .timer_frequency
            .compare_exchange(0, frequency, Ordering::AcqRel, Ordering::Relaxed);
    }

    /// Copy every header field except signature, version, arena bounds and
    /// capacity. Used when the arena moves.
    pub fn copy_state_from(&self, other: &LoggerInfo) {
        self.discarded_size.store(other.discarded_size(), Ordering::Release);
        self.at_runtime.store(other.at_runtime.load(Ordering::Relaxed), Ordering::Relaxed);
        self.gone_virtual.store(other.gone_virtual.load(Ordering::Relaxed), Ordering::Relaxed);
        self.hdw_port_initialized
            .store(other.hdw_port_initialized.load(Ordering::Relaxed), Ordering::Relaxed);
        self.hdw_port_disabled
            .store(other.hdw_port_disabled.load(Ordering::Relaxed), Ordering::Relaxed);
        self.timer_frequency.store(other.timer_frequency(), Ordering::Relaxed);
        for (dst, src) in self.time.iter().zip(other.time.iter()) {
            dst.store(src.load(Ordering::Relaxed), Ordering::Relaxed);
        }
        self.ticks_at_time.store(other.ticks_at_time(), Ordering::Release);
        if other.layout() == Ok(LayoutKind::Offset) {
            self.set_hw_print_level(other.hw_print_level());
        }
    }

    /// Plain copy of every field.
    pub fn snapshot(&self) -> InfoSnapshot {
        InfoSnapshot {
            signature: self.signature(),
            version: self.version(),
            log_buffer: self.raw_buffer(),
            log_current: self.raw_current(),
            discarded_size: self.discarded_size(),
            log_buffer_size: self.capacity(),
            in_permanent_ram: self.in_permanent_ram(),
            at_runtime: self.at_runtime(),
            gone_virtual: self.gone_virtual(),
            hdw_port_initialized: self.hdw_port_initialized(),
            hdw_port_disabled: self.hdw_port_disabled(),
            timer_frequency: self.timer_frequency(),
            ticks_at_time: self.ticks_at_time(),
            time: self.time(),
            hw_print_level: self.hw_print_level(),
        }
    }
}

impl core::fmt::Debug for LoggerInfo {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LoggerInfo")
            .field("address", &format_args!("{:#x}", self.address()))
            .field("version", &self.version())
            .field("log_buffer", &format_args!("{:#x}", self.raw_buffer()))
            .field("log_current", &format_args!("{:#x}", self.raw_current()))
            .field("size", &format_args!("{:#x}", self.capacity()))
            .field("discarded", &self.discarded_size())
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// SNAPSHOT (byte-level view for tooling)
// ═══════════════════════════════════════════════════════════════════════════

/// Descriptor fields decoded from raw bytes, e.g. out of a memory image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InfoSnapshot {
    pub signature: u32,
    pub version: u16,
    pub log_buffer: u64,
    pub log_current: u64,
    pub discarded_size: u32,
    pub log_buffer_size: u32,
    pub in_permanent_ram: bool,
    pub at_runtime: bool,
    pub gone_virtual: bool,
    pub hdw_port_initialized: bool,
    pub hdw_port_disabled: bool,
    pub timer_frequency: u64,
    pub ticks_at_time: u64,
    pub time: EfiTime,
    pub hw_print_level: DebugLevel,
}

impl InfoSnapshot {
    /// Decode the first `LOGGER_INFO_SIZE` bytes of `bytes`.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < LOGGER_INFO_SIZE {
            return None;
        }
        let u16_at = |o: usize| u16::from_le_bytes([bytes[o], bytes[o + 1]]);
        let u32_at = |o: usize| {
            u32::from_le_bytes([bytes[o], bytes[o + 1], bytes[o + 2], bytes[o + 3]])
        };
        let u64_at = |o: usize| u64::from(u32_at(o)) | (u64::from(u32_at(o + 4)) << 32);

        Some(Self {
            signature: u32_at(0),
            version: u16_at(4),
            log_buffer: u64_at(8),
            log_current: u64_at(16),
            discarded_size: u32_at(24),
            log_buffer_size: u32_at(28),
            in_permanent_ram: bytes[32] != 0,
            at_runtime: bytes[33] != 0,
            gone_virtual: bytes[34] != 0,
            hdw_port_initialized: bytes[35] != 0,
            hdw_port_disabled: bytes[36] != 0,
            timer_frequency: u64_at(40),
            ticks_at_time: u64_at(48),
            time: EfiTime::from_words([u32_at(56), u32_at(60), u32_at(64), u32_at(68)]),
            hw_print_level: DebugLevel(u32_at(72)),
        })
    }

    pub fn layout(&self) -> Option<LayoutKind> {
        LayoutKind::from_version(self.version)
    }

    pub fn elapsed_nanoseconds(&self, ticks: u64) -> u64 {
        ticks_to_nanoseconds(ticks, self.timer_frequency)
    }

    /// Bytes in use, if the snapshot is self-consistent for a descriptor
    /// that lived at `descriptor_address`.
    pub fn used(&self, descriptor_address: u64) -> Option<u64> {
        if self.signature != LOGGER_INFO_SIGNATURE {
            return None;
        }
        let accessor = self.layout()?.accessor();
        if accessor.encode(descriptor_address, 0)? != self.log_buffer {
            return None;
        }
        let used = accessor.decode(descriptor_address, self.log_current)?;
        (used <= u64::from(self.log_buffer_size)).then_some(used)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(C, align(8))]
    struct Region([u8; 256]);

    fn offset_of(info: &LoggerInfo, field: *const u8) -> usize {
        field as usize - info.address() as usize
    }

    #[test]
    fn test_field_offsets() {
        let mut region = Region([0; 256]);
        let addr = region.0.as_mut_ptr() as u64;
        let info = unsafe {
            LoggerInfo::initialize(addr, 256, LayoutKind::Offset, DebugLevel::ERROR).unwrap()
        };
        assert_eq!(offset_of(info, &info.version as *const _ as *const u8), 4);
        assert_eq!(offset_of(info, &info.log_buffer as *const _ as *const u8), 8);
        assert_eq!(offset_of(info, &info.log_current as *const _ as *const u8), 16);
        assert_eq!(offset_of(info, &info.discarded_size as *const _ as *const u8), 24);
        assert_eq!(offset_of(info, &info.log_buffer_size as *const _ as *const u8), 28);
        assert_eq!(offset_of(info, &info.in_permanent_ram as *const _ as *const u8), 32);
        assert_eq!(offset_of(info, &info.hdw_port_disabled as *const _ as *const u8), 36);
        assert_eq!(offset_of(info, &info.timer_frequency as *const _ as *const u8), 40);
        assert_eq!(offset_of(info, &info.ticks_at_time as *const _ as *const u8), 48);
        assert_eq!(offset_of(info, &info.time as *const _ as *const u8), 56);
        assert_eq!(offset_of(info, &info.hw_print_level as *const _ as *const u8), 72);
    }

    #[test]
    fn test_initialize_defaults() {
        let mut region = Region([0xAA; 256]);
        let addr = region.0.as_mut_ptr() as u64;
        let info = unsafe {
            LoggerInfo::initialize(addr, 256, LayoutKind::Offset, DebugLevel::WARN).unwrap()
        };
        assert_eq!(info.signature(), LOGGER_INFO_SIGNATURE);
        assert_eq!(info.version(), VERSION_OFFSET);
        assert_eq!(info.capacity(), 256 - 80);
        assert_eq!(info.raw_buffer(), 80);
        assert_eq!(info.raw_current(), 80);
        assert_eq!(info.discarded_size(), 0);
        assert!(!info.in_permanent_ram());
        assert!(!info.hdw_port_initialized());
        assert_eq!(info.hw_print_level(), DebugLevel::WARN);

        let snap = InfoSnapshot::parse(&region.0).unwrap();
        assert_eq!(snap.used(addr), Some(0));
        assert_eq!(snap.log_buffer_size, 176);
    }

    #[test]
    fn test_absolute_layout_stores_addresses() {
        let mut region = Region([0; 256]);
        let addr = region.0.as_mut_ptr() as u64;
        let info = unsafe {
            LoggerInfo::initialize(addr, 256, LayoutKind::Absolute, DebugLevel::ERROR).unwrap()
        };
        assert_eq!(info.version(), VERSION_ABSOLUTE);
        assert_eq!(info.raw_buffer(), addr + 80);
        assert_eq!(info.arena_base() as u64, addr + 80);
    }

    #[test]
    fn test_initialize_rejects_bad_regions() {
        let mut region = Region([0; 256]);
        let addr = region.0.as_mut_ptr() as u64;
        let small =
            unsafe { LoggerInfo::initialize(addr, 80, LayoutKind::Offset, DebugLevel::NONE) };
        assert_eq!(small.unwrap_err(), LogError::RegionTooSmall);
        let null = unsafe { LoggerInfo::initialize(0, 256, LayoutKind::Offset, DebugLevel::NONE) };
        assert_eq!(null.unwrap_err(), LogError::Invalid(ValidationError::NullPointer));
        let odd =
            unsafe { LoggerInfo::initialize(addr + 4, 200, LayoutKind::Offset, DebugLevel::NONE) };
        assert_eq!(odd.unwrap_err(), LogError::Invalid(ValidationError::Misaligned));
    }

    #[test]
    fn test_time_anchor_first_wins() {
        let mut region = Region([0; 256]);
        let addr = region.0.as_mut_ptr() as u64;
        let info = unsafe {
            LoggerInfo::initialize(addr, 256, LayoutKind::Offset, DebugLevel::NONE).unwrap()
        };
        let t = EfiTime { year: 2025, month: 1, day: 2, ..EfiTime::default() };
        assert!(info.set_time_anchor(500, t, 1_000_000));
        assert!(!info.set_time_anchor(900, EfiTime::default(), 5));
        assert_eq!(info.ticks_at_time(), 500);
        assert_eq!(info.time(), t);
        assert_eq!(info.timer_frequency(), 1_000_000);
    }
}
