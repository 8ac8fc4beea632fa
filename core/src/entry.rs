//! Log entry codec.
//!
//! # Entry layout (little-endian, 8-byte aligned)
//!
//! ```text
//! ┌──────┬─────┬─────┬───────┬────────────┬───────┬─────┬────────┬─────────────┬─────┐
//! │ ALM2 │ maj │ min │ level │ time_stamp │ phase │ len │ offset │ prefix+msg  │ pad │
//! │  4   │  1  │  1  │   4   │     8      │   2   │  2  │   2    │    len      │ 0-7 │
//! └──────┴─────┴─────┴───────┴────────────┴───────┴─────┴────────┴─────────────┴─────┘
//! ```
//!
//! The signature is written last. Until it reads `ALM2` the entry is not
//! there as far as any reader is concerned.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::error::{LogError, Result};
use crate::level::DebugLevel;

/// Entry signature 'ALM2'
pub const ENTRY_SIGNATURE: u32 = u32::from_le_bytes(*b"ALM2");

pub const ENTRY_MAJOR_VERSION: u8 = 2;
pub const ENTRY_MINOR_VERSION: u8 = 0;

/// Fixed header size
pub const ENTRY_HEADER_SIZE: usize = 24;

/// Every entry starts on this boundary
pub const ENTRY_ALIGN: usize = 8;

/// Largest prefix + message the length field can describe
pub const MAX_MESSAGE_LENGTH: usize = u16::MAX as usize;

/// Bytes an entry with `message_len` payload bytes occupies in the arena.
#[inline]
pub const fn entry_size(message_len: usize) -> usize {
    (ENTRY_HEADER_SIZE + message_len + ENTRY_ALIGN - 1) & !(ENTRY_ALIGN - 1)
}

/// Decoded entry header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryHeader {
    pub signature: u32,
    pub major_version: u8,
    pub minor_version: u8,
    pub level: DebugLevel,
    pub time_stamp: u64,
    pub phase: u16,
    pub message_len: u16,
    pub message_offset: u16,
}

impl EntryHeader {
    /// Decode the first 24 bytes of `bytes`.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let b = bytes.get(..ENTRY_HEADER_SIZE)?;
        let mut ts = [0u8; 8];
        ts.copy_from_slice(&b[10..18]);
        Some(Self {
            signature: u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            major_version: b[4],
            minor_version: b[5],
            level: DebugLevel(u32::from_le_bytes([b[6], b[7], b[8], b[9]])),
            time_stamp: u64::from_le_bytes(ts),
            phase: u16::from_le_bytes([b[18], b[19]]),
            message_len: u16::from_le_bytes([b[20], b[21]]),
            message_offset: u16::from_le_bytes([b[22], b[23]]),
        })
    }

    /// Encoded form, signature included.
    pub fn to_bytes(&self) -> [u8; ENTRY_HEADER_SIZE] {
        let mut b = [0u8; ENTRY_HEADER_SIZE];
        b[0..4].copy_from_slice(&self.signature.to_le_bytes());
        b[4] = self.major_version;
        b[5] = self.minor_version;
        b[6..10].copy_from_slice(&self.level.bits().to_le_bytes());
        b[10..18].copy_from_slice(&self.time_stamp.to_le_bytes());
        b[18..20].copy_from_slice(&self.phase.to_le_bytes());
        b[20..22].copy_from_slice(&self.message_len.to_le_bytes());
        b[22..24].copy_from_slice(&self.message_offset.to_le_bytes());
        b
    }

    #[inline]
    pub fn is_stamped(&self) -> bool {
        self.signature == ENTRY_SIGNATURE
    }

    /// Arena bytes this entry occupies.
    #[inline]
    pub fn total_size(&self) -> usize {
        let end = usize::from(self.message_offset) + usize::from(self.message_len);
        (end + ENTRY_ALIGN - 1) & !(ENTRY_ALIGN - 1)
    }
}

/// An accepted (level, prefix, message) triple, sized and ready to stamp.
#[derive(Debug, Clone, Copy)]
pub struct PreparedEntry<'m> {
    level: DebugLevel,
    prefix: &'m [u8],
    message: &'m [u8],
}

/// Check a message and size its entry. Rejects empty messages and payloads
/// the 16-bit length field cannot describe.
pub fn encode<'m>(
    level: DebugLevel,
    prefix: Option<&'m [u8]>,
    message: &'m [u8],
) -> Result<PreparedEntry<'m>> {
    if message.is_empty() {
        return Err(LogError::EmptyMessage);
    }
    let prefix = prefix.unwrap_or(&[]);
    if prefix.len() + message.len() > MAX_MESSAGE_LENGTH {
        return Err(LogError::MessageTooLong);
    }
    Ok(PreparedEntry { level, prefix, message })
}

impl<'m> PreparedEntry<'m> {
    #[inline]
    pub fn level(&self) -> DebugLevel {
        self.level
    }

    /// Prefix plus message length.
    #[inline]
    pub fn message_len(&self) -> u16 {
        // Bounded by encode()
        (self.prefix.len() + self.message.len()) as u16
    }

    /// Arena bytes to reserve.
    #[inline]
    pub fn size(&self) -> usize {
        entry_size(usize::from(self.message_len()))
    }

    pub fn prefix(&self) -> &'m [u8] {
        self.prefix
    }

    pub fn message(&self) -> &'m [u8] {
        self.message
    }

    /// Fill the reserved slot at `dst` and publish it.
    ///
    /// # Safety
    /// `dst` must be 8-byte aligned, writable for `self.size()` bytes, and
    /// exclusively owned by the caller (a granted reservation).
    pub unsafe fn stamp(&self, dst: *mut u8, time_stamp: u64, phase: u16) {
        let header = EntryHeader {
            signature: 0,
            major_version: ENTRY_MAJOR_VERSION,
            minor_version: ENTRY_MINOR_VERSION,
            level: self.level,
            time_stamp,
            phase,
            message_len: self.message_len(),
            message_offset: ENTRY_HEADER_SIZE as u16,
        }
        .to_bytes();

        // Everything but the signature
        core::ptr::copy_nonoverlapping(header.as_ptr().add(4), dst.add(4), ENTRY_HEADER_SIZE - 4);
        let body = dst.add(ENTRY_HEADER_SIZE);
        core::ptr::copy_nonoverlapping(self.prefix.as_ptr(), body, self.prefix.len());
        core::ptr::copy_nonoverlapping(
            self.message.as_ptr(),
            body.add(self.prefix.len()),
            self.message.len(),
        );
        let used = ENTRY_HEADER_SIZE + usize::from(self.message_len());
        core::ptr::write_bytes(dst.add(used), 0, self.size() - used);

        // Publish
        AtomicU32::from_ptr(dst as *mut u32).store(ENTRY_SIGNATURE.to_le(), Ordering::Release);
    }
}
