//! Boot Diagnostic Log
//!
//! Shared-memory, append-only log buffer that collects diagnostic messages
//! from the earliest boot stage through runtime. One buffer per boot,
//! shared by every stage, written without locks.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  write(level, bytes)            any firmware code, any stage    │
//! └───────────────────────────────┬─────────────────────────────────┘
//!                                 ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  StageAdapter                                                   │
//! │   Uninitialized ─► Resolving ─► Active | Unavailable            │
//! │   discovery: cached ptr → hand-off list / registry → allocate   │
//! └──────┬─────────────────────┬─────────────────────┬──────────────┘
//!        ▼                     ▼                     ▼
//! ┌─────────────┐      ┌──────────────┐      ┌───────────────┐
//! │  validate   │      │  LogArena    │      │  entry codec  │
//! │  signature  │      │  CAS cursor  │      │  header+body  │
//! │  layout     │      │  CAS discard │      │  sig last     │
//! │  capacity   │      └──────────────┘      └───────────────┘
//! └─────────────┘
//!
//! MigrationCoordinator: bootstrap arena ──copy──► permanent arena,
//!                       then rewrite every hand-off slot in place.
//! ```
//!
//! # Memory Layout
//!
//! ```text
//! ┌──────────────────┬──────────┬──────────┬─────┬────────────────┐
//! │ LoggerInfo (80B) │ entry 0  │ entry 1  │ ... │ free           │
//! └──────────────────┴──────────┴──────────┴─────┴────────────────┘
//!                    ▲ log_buffer                 ▲ log_current
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use bootlog_core::{StageAdapter, BootPhase, DebugLevel};
//!
//! let logger = StageAdapter::new(BootPhase::DxeCore, services);
//! logger.write(DebugLevel::INFO, b"PCI enumeration done\n");
//! ```

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![allow(clippy::new_without_default)]

#[macro_use]
pub mod serial;

pub mod adapter;
pub mod arena;
pub mod config;
pub mod entry;
pub mod error;
pub mod handoff;
pub mod info;
pub mod layout;
pub mod level;
pub mod memory;
pub mod migration;
pub mod reader;
pub mod sink;
pub mod stage;
pub mod time;
pub mod validate;

// ═══════════════════════════════════════════════════════════════════════════
// RE-EXPORTS
// ═══════════════════════════════════════════════════════════════════════════

pub use adapter::{AdapterState, BoundDescriptor, StageAdapter, StageServices};
pub use arena::{LogArena, Reservation};
pub use config::LoggerConfig;
pub use entry::{EntryHeader, PreparedEntry};
pub use error::{LogError, Result, ValidationError};
pub use handoff::{
    HandoffList, LocatorSlot, LocatorVariable, LoggerProtocol, ProtocolWriteFn, ServiceRegistry,
    StaticHandoffList, StaticServiceRegistry,
    LOGGER_INFO_GUID, LOGGER_LOCATOR_GUID, LOGGER_PROTOCOL_GUID,
};
pub use info::{InfoSnapshot, LoggerInfo, LOGGER_INFO_SIZE};
pub use layout::{AbsoluteLayout, AddressLayout, LayoutKind, OffsetLayout};
pub use level::DebugLevel;
pub use memory::{HeapPageAllocator, HeapStats, PageAllocator};
pub use migration::{MigrationCoordinator, MigrationOutcome};
pub use reader::{Entry, EntryIter};
pub use serial::SerialPort;
pub use sink::{HdwPortSink, NullSink};
pub use stage::{ArenaAllocation, BootPhase, Capabilities, FixedAddressUse};
pub use time::{EfiTime, TimeSource, Tsc};
pub use validate::{is_valid, validate, validate_address};
pub use uguid::Guid;
