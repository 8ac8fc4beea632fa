//! Stage-to-stage discovery primitives.
//!
//! Two ways a later stage finds the descriptor:
//!
//! ```text
//! HandoffList       GUID ──► LocatorSlot (u64 descriptor address)
//! ServiceRegistry   GUID ──► LoggerProtocol { logger_info slot, write fn }
//! ```
//!
//! A published slot never moves. Republishing a GUID rewrites the existing
//! slot in place, which is how migration corrects stages that already hold
//! a reference to it.
//!
//! The firmware provides the real primitives; `StaticHandoffList` and
//! `StaticServiceRegistry` are fixed-capacity implementations for platforms
//! without one, and for tests.

use core::sync::atomic::{AtomicU64, Ordering};

use spin::Once;
use uguid::{guid, Guid};

use crate::error::{LogError, Result};
use crate::level::DebugLevel;

/// Hand-off list entry naming the descriptor address.
pub const LOGGER_INFO_GUID: Guid = guid!("6b1a4f0e-3c2d-4b8e-9f71-0d5a2e8c4b13");

/// Service registry key of the logger protocol.
pub const LOGGER_PROTOCOL_GUID: Guid = guid!("a3d97e21-58f4-4c6b-b0e2-7f19c84d26a5");

/// Persisted locator variable name.
pub const LOGGER_LOCATOR_GUID: Guid = guid!("e0c5b2d8-91a7-4f36-8d4e-25b6f0a73c91");

/// Protocol signature 'LOGP'
pub const LOGGER_PROTOCOL_SIGNATURE: u32 = u32::from_le_bytes(*b"LOGP");

pub const LOGGER_PROTOCOL_VERSION: u32 = 1;

// ═══════════════════════════════════════════════════════════════════════════
// LOCATOR SLOT
// ═══════════════════════════════════════════════════════════════════════════

/// A single pointer-sized location holding a descriptor address.
#[derive(Debug, Default)]
#[repr(transparent)]
pub struct LocatorSlot(AtomicU64);

impl LocatorSlot {
    pub const fn new(address: u64) -> Self {
        Self(AtomicU64::new(address))
    }

    #[inline]
    pub fn load(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    #[inline]
    pub fn store(&self, address: u64) {
        self.0.store(address, Ordering::Release);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// HAND-OFF LIST
// ═══════════════════════════════════════════════════════════════════════════

/// Name-keyed hand-off list.
pub trait HandoffList: Sync {
    fn find(&self, id: &Guid) -> Option<&LocatorSlot>;

    /// Publish `address` under `id`, rewriting an existing slot in place.
    fn publish(&self, id: &Guid, address: u64) -> Result<&LocatorSlot>;
}

#[derive(Debug)]
struct HandoffEntry {
    id: Guid,
    slot: LocatorSlot,
}

/// Fixed-capacity hand-off list. Slots are claimed once and never freed.
pub struct StaticHandoffList<const N: usize> {
    entries: [Once<HandoffEntry>; N],
}

impl<const N: usize> StaticHandoffList<N> {
    const EMPTY: Once<HandoffEntry> = Once::new();

    pub const fn new() -> Self {
        Self { entries: [Self::EMPTY; N] }
    }

    /// Number of claimed slots.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.is_completed()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<const N: usize> Default for StaticHandoffList<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> HandoffList for StaticHandoffList<N> {
    fn find(&self, id: &Guid) -> Option<&LocatorSlot> {
        self.entries
            .iter()
            .filter_map(Once::get)
            .find(|e| e.id == *id)
            .map(|e| &e.slot)
    }

    fn publish(&self, id: &Guid, address: u64) -> Result<&LocatorSlot> {
        if let Some(slot) = self.find(id) {
            slot.store(address);
            return Ok(slot);
        }
        for cell in &self.entries {
            let mut claimed = false;
            let entry = cell.call_once(|| {
                claimed = true;
                HandoffEntry { id: *id, slot: LocatorSlot::new(address) }
            });
            if claimed {
                return Ok(&entry.slot);
            }
            // Lost a race against a publisher of the same id
            if entry.id == *id {
                entry.slot.store(address);
                return Ok(&entry.slot);
            }
        }
        Err(LogError::HandoffFull)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// SERVICE REGISTRY
// ═══════════════════════════════════════════════════════════════════════════

/// Write entry point carried by the protocol.
pub type ProtocolWriteFn = fn(DebugLevel, &[u8]);

/// Logger protocol as installed in a service registry.
#[repr(C)]
pub struct LoggerProtocol {
    pub signature: u32,
    pub version: u32,
    /// Descriptor address, rewritten in place on migration
    pub logger_info: LocatorSlot,
    write: Option<ProtocolWriteFn>,
}

impl LoggerProtocol {
    pub const fn new(info_address: u64, write: Option<ProtocolWriteFn>) -> Self {
        Self {
            signature: LOGGER_PROTOCOL_SIGNATURE,
            version: LOGGER_PROTOCOL_VERSION,
            logger_info: LocatorSlot::new(info_address),
            write,
        }
    }

    #[inline]
    pub fn info_address(&self) -> u64 {
        self.logger_info.load()
    }

    /// Forward to the installer's write function, if it has one.
    pub fn write(&self, level: DebugLevel, message: &[u8]) {
        if let Some(write) = self.write {
            write(level, message);
        }
    }
}

impl core::fmt::Debug for LoggerProtocol {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LoggerProtocol")
            .field("version", &self.version)
            .field("logger_info", &format_args!("{:#x}", self.info_address()))
            .field("write", &self.write.is_some())
            .finish()
    }
}

/// Pointer-keyed service registry.
pub trait ServiceRegistry: Sync {
    fn locate(&self, id: &Guid) -> Option<&LoggerProtocol>;

    /// Install the protocol, or rewrite the descriptor address of an
    /// already installed one.
    fn install(
        &self,
        id: &Guid,
        info_address: u64,
        write: Option<ProtocolWriteFn>,
    ) -> Result<&LoggerProtocol>;
}

/// Fixed-capacity service registry.
pub struct StaticServiceRegistry<const N: usize> {
    entries: [Once<(Guid, LoggerProtocol)>; N],
}

impl<const N: usize> StaticServiceRegistry<N> {
    const EMPTY: Once<(Guid, LoggerProtocol)> = Once::new();

    pub const fn new() -> Self {
        Self { entries: [Self::EMPTY; N] }
    }
}

impl<const N: usize> Default for StaticServiceRegistry<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> ServiceRegistry for StaticServiceRegistry<N> {
    fn locate(&self, id: &Guid) -> Option<&LoggerProtocol> {
        self.entries
            .iter()
            .filter_map(Once::get)
            .find(|(key, _)| key == id)
            .map(|(_, protocol)| protocol)
    }

    fn install(
        &self,
        id: &Guid,
        info_address: u64,
        write: Option<ProtocolWriteFn>,
    ) -> Result<&LoggerProtocol> {
        if let Some(protocol) = self.locate(id) {
            protocol.logger_info.store(info_address);
            return Ok(protocol);
        }
        for cell in &self.entries {
            let mut claimed = false;
            let (key, protocol) = cell.call_once(|| {
                claimed = true;
                (*id, LoggerProtocol::new(info_address, write))
            });
            if claimed {
                return Ok(protocol);
            }
            if key == id {
                protocol.logger_info.store(info_address);
                return Ok(protocol);
            }
        }
        Err(LogError::HandoffFull)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// LOCATOR VARIABLE
// ═══════════════════════════════════════════════════════════════════════════

/// Persisted variable recording the descriptor address for tools that
/// inspect the log after boot.
pub trait LocatorVariable: Sync {
    fn set(&self, info_address: u64) -> Result<()>;
}
