//! Sequential entry reader.
//!
//! Walks an arena from offset 0 and stops at the first entry whose
//! signature is not stamped yet or whose lengths do not fit.

use core::marker::PhantomData;
use core::sync::atomic::{AtomicU32, Ordering};

use crate::entry::{EntryHeader, ENTRY_HEADER_SIZE, ENTRY_SIGNATURE};
use crate::level::DebugLevel;

/// One decoded entry.
#[derive(Debug, Clone, Copy)]
pub struct Entry<'a> {
    pub header: EntryHeader,
    /// Arena offset of the header
    pub offset: usize,
    message: &'a [u8],
}

impl<'a> Entry<'a> {
    /// Prefix and message bytes.
    #[inline]
    pub fn message(&self) -> &'a [u8] {
        self.message
    }

    #[inline]
    pub fn level(&self) -> DebugLevel {
        self.header.level
    }

    #[inline]
    pub fn phase(&self) -> u16 {
        self.header.phase
    }

    #[inline]
    pub fn time_stamp(&self) -> u64 {
        self.header.time_stamp
    }
}

/// Iterator over stamped entries.
pub struct EntryIter<'a> {
    base: *const u8,
    len: usize,
    pos: usize,
    done: bool,
    _marker: PhantomData<&'a [u8]>,
}

impl<'a> EntryIter<'a> {
    /// Iterate a byte copy of an arena.
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            base: bytes.as_ptr(),
            len: bytes.len(),
            pos: 0,
            done: false,
            _marker: PhantomData,
        }
    }

    /// Iterate a live arena.
    ///
    /// # Safety
    /// `base..base + len` must stay readable for `'a`.
    pub unsafe fn from_raw(base: *const u8, len: usize) -> Self {
        Self { base, len, pos: 0, done: false, _marker: PhantomData }
    }

    /// Offset just past the last entry returned. After a stop on a bad or
    /// unstamped entry this is that entry's offset.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    unsafe fn signature_at(&self, p: *const u8) -> u32 {
        if p as usize % 4 == 0 {
            u32::from_le(AtomicU32::from_ptr(p as *mut u32).load(Ordering::Acquire))
        } else {
            u32::from_le(core::ptr::read_unaligned(p as *const u32))
        }
    }

    fn stop(&mut self) -> Option<Entry<'a>> {
        self.done = true;
        None
    }
}

impl<'a> Iterator for EntryIter<'a> {
    type Item = Entry<'a>;

    fn next(&mut self) -> Option<Entry<'a>> {
        let left = self.len - self.pos;
        if self.done || left < ENTRY_HEADER_SIZE {
            return None;
        }
        // SAFETY: pos + ENTRY_HEADER_SIZE <= len, within the readable range
        let p = unsafe { self.base.add(self.pos) };
        if unsafe { self.signature_at(p) } != ENTRY_SIGNATURE {
            return self.stop();
        }

        // Signature seen with Acquire: the rest of the entry is complete
        let header_bytes = unsafe { core::slice::from_raw_parts(p, ENTRY_HEADER_SIZE) };
        let Some(header) = EntryHeader::decode(header_bytes) else { return self.stop() };

        let msg_offset = usize::from(header.message_offset);
        let total = header.total_size();
        if msg_offset < ENTRY_HEADER_SIZE || total > left {
            return self.stop();
        }

        let message = unsafe {
            core::slice::from_raw_parts(p.add(msg_offset), usize::from(header.message_len))
        };
        let entry = Entry { header, offset: self.pos, message };
        self.pos += total;
        Some(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::encode;

    #[repr(C, align(8))]
    struct Arena([u8; 256]);

    fn write(arena: &mut Arena, offset: usize, msg: &[u8], ts: u64) -> usize {
        let e = encode(DebugLevel::INFO, None, msg).unwrap();
        unsafe { e.stamp(arena.0.as_mut_ptr().add(offset), ts, 5) };
        offset + e.size()
    }

    #[test]
    fn test_reads_in_order() {
        let mut arena = Arena([0; 256]);
        let mut off = write(&mut arena, 0, b"one", 1);
        off = write(&mut arena, off, b"two two", 2);
        let end = write(&mut arena, off, b"three", 3);

        let entries: Vec<_> = EntryIter::new(&arena.0[..end]).collect();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1].message(), b"two two");
        assert_eq!(entries[1].offset, 32);
        assert_eq!(entries[2].time_stamp(), 3);
        assert_eq!(entries[2].phase(), 5);
    }

    #[test]
    fn test_stops_at_unstamped_entry() {
        let mut arena = Arena([0; 256]);
        let off = write(&mut arena, 0, b"done", 1);
        // Reserved but never stamped: header present, signature zero
        let end = write(&mut arena, off, b"pending", 2);
        arena.0[off..off + 4].copy_from_slice(&[0; 4]);

        let mut it = EntryIter::new(&arena.0[..end]);
        assert_eq!(it.next().unwrap().message(), b"done");
        assert!(it.next().is_none());
        assert!(it.next().is_none());
        // Left at the gap so callers can tell it from a clean end
        assert_eq!(it.position(), off);
        assert!(it.position() < end);
    }

    #[test]
    fn test_stops_at_oversized_length() {
        let mut arena = Arena([0; 256]);
        let end = write(&mut arena, 0, b"abc", 1);
        arena.0[20..22].copy_from_slice(&1000u16.to_le_bytes());
        let mut it = EntryIter::new(&arena.0[..end]);
        assert!(it.next().is_none());
        assert_eq!(it.position(), 0);
    }

    #[test]
    fn test_position_at_clean_end() {
        let mut arena = Arena([0; 256]);
        let end = write(&mut arena, 0, b"only", 1);
        let mut it = EntryIter::new(&arena.0[..end]);
        assert_eq!(it.by_ref().count(), 1);
        assert_eq!(it.position(), end);
    }
}
