//! Descriptor validation.
//!
//! Every descriptor a stage did not just create itself is treated as
//! untrusted: it may come from an earlier stage, a hand-off slot, or memory
//! something else has scribbled on. A descriptor is only used as an arena
//! after passing all of:
//!
//! 1. pointer present and aligned
//! 2. signature 'ALOG'
//! 3. version selects a known layout
//! 4. arena start immediately follows the descriptor
//! 5. capacity equals the value cached on first observation (if any)
//! 6. write cursor within `[start, limit]`
//!
//! The caller owns the capacity cache; it records `capacity()` of the first
//! arena that passes and hands it back on every later check.

use crate::arena::LogArena;
use crate::error::ValidationError;
use crate::info::{LoggerInfo, LOGGER_INFO_SIGNATURE};

/// Validate `info` and return it as an arena.
pub fn validate<'a>(
    info: Option<&'a LoggerInfo>,
    cached_capacity: Option<u32>,
    max_address: u64,
) -> Result<LogArena<'a>, ValidationError> {
    let info = info.ok_or(ValidationError::NullPointer)?;

    if info.signature() != LOGGER_INFO_SIGNATURE {
        return Err(ValidationError::BadSignature);
    }

    let layout = info.layout()?;
    let accessor = layout.accessor();
    let base = info.address();

    let start = accessor
        .encode(base, 0)
        .ok_or(ValidationError::BufferStartMismatch)?;
    if info.raw_buffer() != start {
        return Err(ValidationError::BufferStartMismatch);
    }

    let capacity = info.capacity();
    if cached_capacity.is_some_and(|cached| cached != capacity) {
        return Err(ValidationError::CapacityChanged);
    }

    let current = info.raw_current();
    let limit = accessor.cursor_limit(base, capacity, max_address);
    if current < start || current > limit {
        return Err(ValidationError::CursorOutOfBounds);
    }

    Ok(LogArena::new(info, layout, max_address))
}

/// Boolean form of [`validate`].
#[inline]
pub fn is_valid(info: Option<&LoggerInfo>, cached_capacity: Option<u32>, max_address: u64) -> bool {
    validate(info, cached_capacity, max_address).is_ok()
}

/// Validate the descriptor at a raw address.
///
/// # Safety
/// A non-null, aligned `address` must be readable for the descriptor size,
/// and, if it validates, for the arena that follows, for `'a`.
pub unsafe fn validate_address<'a>(
    address: u64,
    cached_capacity: Option<u32>,
    max_address: u64,
) -> Result<LogArena<'a>, ValidationError> {
    let info = LoggerInfo::at(address)?;
    validate(Some(info), cached_capacity, max_address)
}
