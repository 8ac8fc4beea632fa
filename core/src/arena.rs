//! Lock-free bump allocator over the log arena.
//!
//! Two words change after creation, both by CAS retry loops:
//!
//! ```text
//! log_current     observed ──CAS──► observed + len     (reservation)
//! discarded_size  observed ──CAS──► observed + len     (saturation)
//! ```
//!
//! Nothing here blocks, allocates or takes a lock. A full arena turns into
//! a counter increment. Space that was granted belongs to the caller alone.

use core::sync::atomic::Ordering;

use crate::entry::PreparedEntry;
use crate::error::{LogError, Result};
use crate::info::LoggerInfo;
use crate::layout::LayoutKind;
use crate::reader::EntryIter;

/// Outcome of [`LogArena::reserve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// Arena offset of the granted space
    Granted(u64),
    /// No room; the length was added to the discard counter
    Full,
}

/// A validated descriptor viewed as an allocator.
#[derive(Debug, Clone, Copy)]
pub struct LogArena<'a> {
    info: &'a LoggerInfo,
    layout: LayoutKind,
    max_address: u64,
}

impl<'a> LogArena<'a> {
    pub(crate) fn new(info: &'a LoggerInfo, layout: LayoutKind, max_address: u64) -> Self {
        Self { info, layout, max_address }
    }

    #[inline]
    pub fn info(&self) -> &'a LoggerInfo {
        self.info
    }

    #[inline]
    pub fn layout(&self) -> LayoutKind {
        self.layout
    }

    #[inline]
    pub fn capacity(&self) -> u32 {
        self.info.capacity()
    }

    /// Bytes reserved so far.
    pub fn used(&self) -> u64 {
        let used = self
            .layout
            .accessor()
            .decode(self.info.address(), self.info.raw_current())
            .unwrap_or(0);
        used.min(u64::from(self.capacity()))
    }

    pub fn remaining(&self) -> u64 {
        u64::from(self.capacity()) - self.used()
    }

    /// Reserve `len` bytes.
    pub fn reserve(&self, len: usize) -> Reservation {
        let accessor = self.layout.accessor();
        let base = self.info.address();
        let capacity = self.info.capacity();
        let limit = accessor.cursor_limit(base, capacity, self.max_address);
        let capacity = u64::from(capacity);
        let len64 = len as u64;
        let cursor = self.info.cursor();

        let mut observed = cursor.load(Ordering::Acquire);
        loop {
            let Some(used) = accessor.decode(base, observed) else { break };
            if used >= capacity || capacity - used < len64 {
                break;
            }
            let next = match observed.checked_add(len64) {
                Some(next) if next <= limit => next,
                _ => break,
            };
            match cursor.compare_exchange_weak(
                observed,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Reservation::Granted(used),
                Err(actual) => observed = actual,
            }
        }

        self.account_discarded(len);
        Reservation::Full
    }

    /// Add `len` to the discard counter. Saturates instead of wrapping.
    pub(crate) fn account_discarded(&self, len: usize) {
        let add = u32::try_from(len).unwrap_or(u32::MAX);
        let counter = self.info.discarded_counter();
        let mut observed = counter.load(Ordering::Acquire);
        loop {
            let next = observed.saturating_add(add);
            match counter.compare_exchange_weak(
                observed,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(actual) => observed = actual,
            }
        }
    }

    /// Move the cursor to the end of the arena so every later reservation
    /// takes the counted `Full` path. Returns the bytes in use at that point.
    pub(crate) fn close(&self) -> u64 {
        let accessor = self.layout.accessor();
        let base = self.info.address();
        let capacity = self.info.capacity();
        let limit = accessor.cursor_limit(base, capacity, self.max_address);
        let Some(end) = accessor.encode(base, u64::from(capacity)) else { return self.used() };
        let observed = self.info.cursor().swap(end.min(limit), Ordering::AcqRel);
        accessor
            .decode(base, observed)
            .unwrap_or(0)
            .min(u64::from(capacity))
    }

    /// Reserve, fill and stamp one entry. Returns its arena offset.
    pub fn append(&self, entry: &PreparedEntry<'_>, time_stamp: u64, phase: u16) -> Result<u64> {
        match self.reserve(entry.size()) {
            Reservation::Granted(offset) => {
                // SAFETY: the reservation grants exclusive ownership of
                // `size` bytes at `offset`, inside the arena; offsets stay
                // 8-aligned because every entry size is a multiple of 8.
                unsafe {
                    entry.stamp(self.info.arena_base().add(offset as usize), time_stamp, phase);
                }
                Ok(offset)
            }
            Reservation::Full => Err(LogError::BufferFull),
        }
    }

    /// Iterate stamped entries in arena order.
    pub fn entries(&self) -> EntryIter<'a> {
        // SAFETY: the used prefix of the arena lies within the validated region
        unsafe { EntryIter::from_raw(self.info.arena_base(), self.used() as usize) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::encode;
    use crate::level::DebugLevel;

    #[repr(C, align(8))]
    struct Region([u8; 80 + 64]);

    fn arena(region: &mut Region, layout: LayoutKind) -> LogArena<'static> {
        let addr = region.0.as_mut_ptr() as u64;
        let info = unsafe {
            LoggerInfo::initialize(addr, region.0.len(), layout, DebugLevel::NONE).unwrap()
        };
        LogArena::new(info, layout, u64::MAX)
    }

    #[test]
    fn test_two_reservations_then_full() {
        let mut region = Region([0; 144]);
        let a = arena(&mut region, LayoutKind::Offset);
        assert_eq!(a.capacity(), 64);

        let h1 = std::thread::spawn(move || a.reserve(13));
        let h2 = std::thread::spawn(move || a.reserve(13));
        assert!(matches!(h1.join().unwrap(), Reservation::Granted(_)));
        assert!(matches!(h2.join().unwrap(), Reservation::Granted(_)));
        assert_eq!(a.used(), 26);
        assert_eq!(a.info().discarded_size(), 0);

        assert_eq!(a.reserve(58), Reservation::Full);
        assert_eq!(a.used(), 26);
        assert_eq!(a.info().discarded_size(), 58);
    }

    #[test]
    fn test_exact_fit_then_full() {
        let mut region = Region([0; 144]);
        let a = arena(&mut region, LayoutKind::Absolute);
        assert_eq!(a.reserve(64), Reservation::Granted(0));
        assert_eq!(a.remaining(), 0);
        assert_eq!(a.reserve(1), Reservation::Full);
        assert_eq!(a.info().discarded_size(), 1);
    }

    #[test]
    fn test_discard_counter_saturates() {
        let mut region = Region([0; 144]);
        let a = arena(&mut region, LayoutKind::Offset);
        a.account_discarded(u32::MAX as usize - 10);
        a.account_discarded(100);
        assert_eq!(a.info().discarded_size(), u32::MAX);
    }

    #[test]
    fn test_append_and_iterate() {
        let mut region = Region([0; 144]);
        let a = arena(&mut region, LayoutKind::Offset);
        let e = encode(DebugLevel::INFO, None, b"first").unwrap();
        assert_eq!(a.append(&e, 10, 5), Ok(0));
        let e = encode(DebugLevel::WARN, None, b"second").unwrap();
        assert_eq!(a.append(&e, 20, 5), Ok(32));
        // 64 used, nothing else fits
        assert_eq!(a.append(&e, 30, 5), Err(LogError::BufferFull));
        assert_eq!(a.info().discarded_size(), 32);

        let msgs: Vec<_> = a.entries().map(|e| e.message().to_vec()).collect();
        assert_eq!(msgs, vec![b"first".to_vec(), b"second".to_vec()]);
    }

    #[test]
    fn test_absolute_cursor_limited_by_max_address() {
        let mut region = Region([0; 144]);
        let addr = region.0.as_mut_ptr() as u64;
        let info = unsafe {
            LoggerInfo::initialize(addr, 144, LayoutKind::Absolute, DebugLevel::NONE).unwrap()
        };
        // Ceiling just past the first 16 bytes
        let a = LogArena::new(info, LayoutKind::Absolute, addr + 80 + 16);
        assert_eq!(a.reserve(16), Reservation::Granted(0));
        assert_eq!(a.reserve(8), Reservation::Full);
    }

    #[test]
    fn test_close_turns_reservations_into_discards() {
        for layout in [LayoutKind::Offset, LayoutKind::Absolute] {
            let mut region = Region([0; 144]);
            let a = arena(&mut region, layout);
            assert_eq!(a.reserve(24), Reservation::Granted(0));

            assert_eq!(a.close(), 24);
            assert_eq!(a.used(), 64);
            assert_eq!(a.reserve(8), Reservation::Full);
            assert_eq!(a.info().discarded_size(), 8);
            // Still a valid descriptor for stages that have not moved on
            assert!(crate::validate::is_valid(Some(a.info()), Some(64), u64::MAX));
        }
    }
}
