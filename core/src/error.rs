//! Error types for log buffer operations
//!
//! Nothing here ever reaches a `write()` caller. These values flow between
//! internal steps (codec, discovery, migration) and into tests and tooling.

use core::fmt;

/// Result type for log buffer operations
pub type Result<T> = core::result::Result<T, LogError>;

/// Errors that can occur inside the logging core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogError {
    /// Message was empty
    EmptyMessage,

    /// Prefix plus message does not fit the 16-bit length field
    MessageTooLong,

    /// Arena had no room; the bytes were counted as discarded
    BufferFull,

    /// Descriptor failed validation
    Invalid(ValidationError),

    /// No descriptor could be discovered or created
    NotAvailable,

    /// Page allocation failed
    OutOfResources,

    /// Hand-off list or service registry has no free slot
    HandoffFull,

    /// Page attributes could not be made writable
    AccessDenied,

    /// Region too small to hold a descriptor and any arena
    RegionTooSmall,
}

/// Reasons a descriptor is rejected by the validator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    /// Descriptor pointer absent
    NullPointer,

    /// Descriptor address not aligned for its fields
    Misaligned,

    /// Signature is not 'ALOG'
    BadSignature,

    /// Version selects no known address layout
    UnknownVersion(u16),

    /// Arena start does not immediately follow the descriptor
    BufferStartMismatch,

    /// Write cursor outside the arena
    CursorOutOfBounds,

    /// Capacity differs from the value cached on first observation
    CapacityChanged,
}

impl From<ValidationError> for LogError {
    fn from(err: ValidationError) -> Self {
        LogError::Invalid(err)
    }
}

impl fmt::Display for LogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyMessage => write!(f, "Empty message"),
            Self::MessageTooLong => write!(f, "Message exceeds maximum entry length"),
            Self::BufferFull => write!(f, "Log buffer full"),
            Self::Invalid(err) => write!(f, "Invalid logger info: {}", err),
            Self::NotAvailable => write!(f, "Logger info not available"),
            Self::OutOfResources => write!(f, "Out of resources"),
            Self::HandoffFull => write!(f, "No free hand-off slot"),
            Self::AccessDenied => write!(f, "Log memory not writable"),
            Self::RegionTooSmall => write!(f, "Region too small for logger info"),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NullPointer => write!(f, "null descriptor"),
            Self::Misaligned => write!(f, "misaligned descriptor"),
            Self::BadSignature => write!(f, "bad signature"),
            Self::UnknownVersion(v) => write!(f, "unknown version {}", v),
            Self::BufferStartMismatch => write!(f, "log buffer does not follow descriptor"),
            Self::CursorOutOfBounds => write!(f, "write cursor out of bounds"),
            Self::CapacityChanged => write!(f, "buffer size changed"),
        }
    }
}
