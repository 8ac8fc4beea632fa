//! Stage adapter.
//!
//! One adapter per execution stage. It owns the stage's view of the log:
//! which descriptor it writes to, whether that descriptor is still trusted,
//! and how to reach the stage's discovery primitives.
//!
//! # State machine
//!
//! ```text
//!                 first write / get_descriptor
//! Uninitialized ───────────────────────────────► Resolving
//!                                                   │
//!                         discovery + validation ───┤
//!                                                   ▼
//!                                  Active ◄─────────┴─────────► Unavailable
//!                                    │                              ▲
//!                                    └── validation failure, ───────┘
//!                                        exit-boot-services
//! ```
//!
//! Discovery runs exactly once. A caller that arrives while it is running
//! (re-entrant diagnostics from a service, another processor) is dropped
//! instead of waiting.
//!
//! # Discovery order
//!
//! 1. descriptor cached by a prior initialization of this stage
//! 2. hand-off list, then service registry
//! 3. build-time fixed address (adopt a valid one, or create)
//! 4. page allocation (bootstrap or permanent size)
//!
//! A descriptor found in steps 1-2 must validate; if it does not the adapter
//! goes Unavailable rather than trying the next source.
//!
//! # Bindings
//!
//! The bound descriptor address and its cached capacity must be read as a
//! pair. Each (re)binding fills a fresh slot and then publishes its index,
//! so a writer never sees an address with another descriptor's capacity.

use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, AtomicUsize, Ordering};

use crate::arena::LogArena;
use crate::config::LoggerConfig;
use crate::entry;
use crate::error::{LogError, Result};
use crate::handoff::{
    HandoffList, LocatorVariable, ProtocolWriteFn, ServiceRegistry, LOGGER_INFO_GUID,
    LOGGER_PROTOCOL_GUID,
};
use crate::info::{LoggerInfo, LOGGER_INFO_SIZE};
use crate::level::DebugLevel;
use crate::memory::{pages_to_bytes, PageAllocator};
use crate::sink::{self, HdwPortSink};
use crate::stage::{ArenaAllocation, BootPhase, Capabilities, FixedAddressUse};
use crate::time::{TimeSource, Tsc};
use crate::validate::validate_address;

// ═══════════════════════════════════════════════════════════════════════════
// STAGE SERVICES
// ═══════════════════════════════════════════════════════════════════════════

/// What the surrounding stage provides. Everything is optional.
pub trait StageServices: Sync {
    fn handoff_list(&self) -> Option<&dyn HandoffList> {
        None
    }

    fn service_registry(&self) -> Option<&dyn ServiceRegistry> {
        None
    }

    fn page_allocator(&self) -> Option<&dyn PageAllocator> {
        None
    }

    fn hdw_port(&self) -> Option<&dyn HdwPortSink> {
        None
    }

    fn locator_variable(&self) -> Option<&dyn LocatorVariable> {
        None
    }

    /// Write entry point installed with the logger protocol.
    fn protocol_write(&self) -> Option<ProtocolWriteFn> {
        None
    }

    /// Clear write protection over `base..base + len`. Called once, before
    /// the first write, by stages with page fix-up.
    fn make_writable(&self, _base: u64, _len: usize) -> Result<()> {
        Ok(())
    }

    /// Give back a bootstrap region this stage did not allocate itself.
    fn release_bootstrap(&self, _address: u64, _len: usize) {}

    fn ticks(&self) -> u64 {
        Tsc.ticks()
    }

    /// Ticks per second, 0 if unknown.
    fn timer_frequency(&self) -> u64 {
        0
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// ADAPTER STATE
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AdapterState {
    Uninitialized = 0,
    Resolving = 1,
    Active = 2,
    Unavailable = 3,
}

impl AdapterState {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Uninitialized,
            1 => Self::Resolving,
            2 => Self::Active,
            _ => Self::Unavailable,
        }
    }
}

/// Rebinds an adapter can go through (initial bind included).
const MAX_BINDINGS: usize = 8;

struct Binding {
    info: AtomicU64,
    capacity: AtomicU32,
    /// Pages this adapter allocated for the region, 0 if not its own
    owned_pages: AtomicUsize,
}

impl Binding {
    const EMPTY: Binding = Binding {
        info: AtomicU64::new(0),
        capacity: AtomicU32::new(0),
        owned_pages: AtomicUsize::new(0),
    };
}

/// Copy of the current binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundDescriptor {
    pub address: u64,
    pub capacity: u32,
    pub owned_pages: usize,
}

/// Where the bound descriptor was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum Origin {
    Cached = 0,
    Handoff = 1,
    Registry = 2,
    FixedAdopted = 3,
    Created = 4,
}

const FOLLOW_NONE: u8 = 0;
const FOLLOW_HANDOFF: u8 = 1;
const FOLLOW_REGISTRY: u8 = 2;

// ═══════════════════════════════════════════════════════════════════════════
// STAGE ADAPTER
// ═══════════════════════════════════════════════════════════════════════════

/// Per-stage logger context.
pub struct StageAdapter<S> {
    phase: BootPhase,
    caps: Capabilities,
    config: LoggerConfig,
    services: S,
    prior: Option<u64>,
    state: AtomicU8,
    bindings: [Binding; MAX_BINDINGS],
    /// Index + 1 of the live binding, 0 if none
    current: AtomicUsize,
    next_binding: AtomicUsize,
    follow: AtomicU8,
    /// Held by the one caller switching to a relocated descriptor
    relocating: AtomicBool,
}

impl<S: StageServices> StageAdapter<S> {
    /// Adapter with the phase's default capabilities and configuration.
    pub const fn new(phase: BootPhase, services: S) -> Self {
        Self::with_config(phase, Capabilities::for_phase(phase), LoggerConfig::new(), services)
    }

    pub const fn with_config(
        phase: BootPhase,
        caps: Capabilities,
        config: LoggerConfig,
        services: S,
    ) -> Self {
        Self {
            phase,
            caps,
            config,
            services,
            prior: None,
            state: AtomicU8::new(AdapterState::Uninitialized as u8),
            bindings: [Binding::EMPTY; MAX_BINDINGS],
            current: AtomicUsize::new(0),
            next_binding: AtomicUsize::new(0),
            follow: AtomicU8::new(FOLLOW_NONE),
            relocating: AtomicBool::new(false),
        }
    }

    /// Start discovery from a descriptor address an earlier instance of
    /// this stage already resolved.
    pub fn with_cached_descriptor(mut self, address: u64) -> Self {
        self.prior = Some(address);
        self
    }

    #[inline]
    pub fn phase(&self) -> BootPhase {
        self.phase
    }

    #[inline]
    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    #[inline]
    pub fn config(&self) -> &LoggerConfig {
        &self.config
    }

    #[inline]
    pub fn services(&self) -> &S {
        &self.services
    }

    #[inline]
    pub fn state(&self) -> AdapterState {
        AdapterState::from_u8(self.state.load(Ordering::Acquire))
    }

    // ───────────────────────────────────────────────────────────────────────
    // Public entry points
    // ───────────────────────────────────────────────────────────────────────

    /// Record a message. Never fails, never blocks.
    pub fn write(&self, level: DebugLevel, message: &[u8]) {
        if !level.intersects(self.config.record_level) {
            return;
        }
        let Some(arena) = self.arena() else { return };

        let prefix = self.caps.prefix.map(str::as_bytes);
        let Ok(prepared) = entry::encode(level, prefix, message) else { return };

        // Full arena is accounted for inside append
        let _ = arena.append(&prepared, self.services.ticks(), self.phase as u16);

        if let Some(port) = self.services.hdw_port() {
            sink::mirror(
                &arena,
                port,
                self.config.hw_print_level,
                level,
                prepared.prefix(),
                prepared.message(),
            );
        }
    }

    /// The validated descriptor, resolving it first if needed.
    pub fn get_descriptor(&self) -> Option<&LoggerInfo> {
        self.arena().map(|arena| arena.info())
    }

    /// The validated descriptor as an arena.
    pub fn arena(&self) -> Option<LogArena<'_>> {
        match self.state() {
            AdapterState::Active => {}
            AdapterState::Uninitialized => {
                if !self.resolve() {
                    return None;
                }
            }
            AdapterState::Resolving | AdapterState::Unavailable => return None,
        }
        self.current_arena()
    }

    /// Boot services are going away.
    pub fn exit_boot_services(&self) {
        if let Some(arena) = self.arena() {
            arena.info().set_at_runtime();
        }
        if self.caps.exit_boot_services_disables {
            self.disable();
        }
    }

    /// Virtual addressing is now in effect.
    pub fn virtual_address_change(&self) {
        if let Some(arena) = self.current_arena_if_active() {
            arena.info().set_gone_virtual();
        }
        self.disable();
    }

    // ───────────────────────────────────────────────────────────────────────
    // Resolution
    // ───────────────────────────────────────────────────────────────────────

    fn resolve(&self) -> bool {
        if self
            .state
            .compare_exchange(
                AdapterState::Uninitialized as u8,
                AdapterState::Resolving as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            // Someone else got there first; only use the result if done
            return self.state() == AdapterState::Active;
        }

        let next = match self.discover() {
            Ok(()) => AdapterState::Active,
            Err(_err) => {
                bl_dbg!("discovery failed, logging unavailable");
                AdapterState::Unavailable
            }
        };
        self.state.store(next as u8, Ordering::Release);
        next == AdapterState::Active
    }

    fn discover(&self) -> Result<()> {
        let (address, origin, owned_pages) = self.find_descriptor()?;

        // SAFETY: discovery sources hand out descriptor addresses that stay
        // mapped for the rest of the boot
        let arena = unsafe { validate_address(address, None, self.config.max_address)? };

        if self.caps.page_fixup {
            let len = LOGGER_INFO_SIZE + arena.capacity() as usize;
            self.services.make_writable(address, len)?;
        }

        if matches!(origin, Origin::Created) {
            let frequency = self.services.timer_frequency();
            if frequency != 0 {
                arena.info().set_timer_frequency(frequency);
            }
        }

        self.bind(address, arena.capacity(), owned_pages)?;

        let published =
            self.caps.publish && matches!(origin, Origin::Created | Origin::FixedAdopted);
        if published {
            self.publish_location(address);
        }

        if self.caps.follow_relocation {
            let source = match origin {
                Origin::Handoff => FOLLOW_HANDOFF,
                Origin::Registry => FOLLOW_REGISTRY,
                // Track the slot this stage announced the descriptor through
                _ if published && self.caps.handoff_list => FOLLOW_HANDOFF,
                _ if published && self.caps.service_registry => FOLLOW_REGISTRY,
                _ => FOLLOW_NONE,
            };
            self.follow.store(source, Ordering::Release);
        }

        bl_dbg_hex!("descriptor bound at ", address);
        Ok(())
    }

    /// First candidate in discovery order: (address, origin, owned pages).
    fn find_descriptor(&self) -> Result<(u64, Origin, usize)> {
        if let Some(address) = self.prior {
            return Ok((address, Origin::Cached, 0));
        }

        if self.caps.handoff_list {
            if let Some(address) = self.handoff_address() {
                return Ok((address, Origin::Handoff, 0));
            }
        }

        if self.caps.service_registry {
            if let Some(address) = self.registry_address() {
                return Ok((address, Origin::Registry, 0));
            }
        }

        match (self.caps.fixed_address, self.config.fixed_address) {
            (FixedAddressUse::Adopt, Some(address)) => {
                // Only a descriptor that is already valid there is adopted
                // SAFETY: the fixed address names memory reserved for the log
                if unsafe { validate_address(address, None, self.config.max_address) }.is_ok() {
                    return Ok((address, Origin::FixedAdopted, 0));
                }
            }
            (FixedAddressUse::Create, Some(address)) => {
                // SAFETY: the fixed region is reserved for the log and sized
                // by the bootstrap page count
                unsafe {
                    LoggerInfo::initialize(
                        address,
                        self.config.bootstrap_bytes(),
                        self.caps.create_layout,
                        self.config.hw_print_level,
                    )?;
                }
                return Ok((address, Origin::Created, 0));
            }
            _ => {}
        }

        let pages = match self.caps.allocation {
            ArenaAllocation::None => return Err(LogError::NotAvailable),
            ArenaAllocation::Bootstrap => self.config.bootstrap_pages,
            ArenaAllocation::Permanent => self.config.permanent_pages,
        };
        let allocator = self.services.page_allocator().ok_or(LogError::NotAvailable)?;
        let address = allocator.allocate_pages(pages).ok_or(LogError::OutOfResources)?;

        // SAFETY: freshly allocated pages, owned by this adapter
        let created = unsafe {
            LoggerInfo::initialize(
                address,
                pages_to_bytes(pages),
                self.caps.create_layout,
                self.config.hw_print_level,
            )
        };
        let info = match created {
            Ok(info) => info,
            Err(err) => {
                unsafe { allocator.free_pages(address, pages) };
                return Err(err);
            }
        };
        if self.caps.allocation == ArenaAllocation::Permanent {
            info.set_in_permanent_ram(true);
        }
        Ok((address, Origin::Created, pages))
    }

    fn handoff_address(&self) -> Option<u64> {
        let address = self.services.handoff_list()?.find(&LOGGER_INFO_GUID)?.load();
        (address != 0).then_some(address)
    }

    fn registry_address(&self) -> Option<u64> {
        let registry = self.services.service_registry()?;
        let address = registry.locate(&LOGGER_PROTOCOL_GUID)?.info_address();
        (address != 0).then_some(address)
    }

    /// Announce `address` through every discovery primitive this stage has.
    pub(crate) fn publish_location(&self, address: u64) {
        if let Some(list) = self.services.handoff_list() {
            if list.publish(&LOGGER_INFO_GUID, address).is_err() {
                bl_dbg!("hand-off list full");
            }
        }
        if let Some(registry) = self.services.service_registry() {
            let write = self.services.protocol_write();
            if registry.install(&LOGGER_PROTOCOL_GUID, address, write).is_err() {
                bl_dbg!("service registry full");
            }
        }
        if let Some(variable) = self.services.locator_variable() {
            if variable.set(address).is_err() {
                bl_dbg!("locator variable not set");
            }
        }
    }

    // ───────────────────────────────────────────────────────────────────────
    // Bindings
    // ───────────────────────────────────────────────────────────────────────

    fn binding(&self) -> Option<&Binding> {
        let current = self.current.load(Ordering::Acquire);
        current.checked_sub(1).and_then(|idx| self.bindings.get(idx))
    }

    /// Copy of the live binding.
    pub fn bound(&self) -> Option<BoundDescriptor> {
        let b = self.binding()?;
        Some(BoundDescriptor {
            address: b.info.load(Ordering::Relaxed),
            capacity: b.capacity.load(Ordering::Relaxed),
            owned_pages: b.owned_pages.load(Ordering::Relaxed),
        })
    }

    /// Make `address` the live binding. If another rebind published first,
    /// that one stands.
    fn bind(&self, address: u64, capacity: u32, owned_pages: usize) -> Result<()> {
        let observed = self.current.load(Ordering::Acquire);
        let idx = self.next_binding.fetch_add(1, Ordering::AcqRel);
        let slot = self.bindings.get(idx).ok_or(LogError::NotAvailable)?;

        slot.info.store(address, Ordering::Relaxed);
        slot.capacity.store(capacity, Ordering::Relaxed);
        slot.owned_pages.store(owned_pages, Ordering::Relaxed);

        let _ = self
            .current
            .compare_exchange(observed, idx + 1, Ordering::AcqRel, Ordering::Acquire);
        Ok(())
    }

    /// Switch to a descriptor that replaced the current one (migration).
    pub(crate) fn rebind(&self, address: u64, capacity: u32, owned_pages: usize) -> Result<()> {
        self.bind(address, capacity, owned_pages)
    }

    fn current_arena_if_active(&self) -> Option<LogArena<'_>> {
        if self.state() != AdapterState::Active {
            return None;
        }
        self.current_arena()
    }

    /// Re-validate the bound descriptor; follow a relocated one if this
    /// stage tracks its discovery slot.
    fn current_arena(&self) -> Option<LogArena<'_>> {
        let bound = self.bound()?;

        if let Some(published) = self.followed_address() {
            if published != bound.address {
                return self.follow_to(published);
            }
        }

        // SAFETY: the address passed validation when it was bound
        let checked = unsafe {
            validate_address(bound.address, Some(bound.capacity), self.config.max_address)
        };
        match checked {
            Ok(arena) => Some(arena),
            Err(_err) => {
                bl_dbg_hex!("descriptor failed validation at ", bound.address);
                self.disable();
                None
            }
        }
    }

    fn followed_address(&self) -> Option<u64> {
        match self.follow.load(Ordering::Acquire) {
            FOLLOW_HANDOFF => self.handoff_address(),
            FOLLOW_REGISTRY => self.registry_address(),
            _ => None,
        }
    }

    /// Switch to a relocated descriptor. Only one caller switches; others
    /// arriving meanwhile are dropped, like writes during resolution.
    fn follow_to(&self, address: u64) -> Option<LogArena<'_>> {
        if self
            .relocating
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }
        let arena = self.switch_to(address);
        self.relocating.store(false, Ordering::Release);
        arena
    }

    fn switch_to(&self, address: u64) -> Option<LogArena<'_>> {
        let bound = self.bound()?;
        if bound.address == address {
            // Switched by a caller that held the gate before us
            // SAFETY: validated when it was bound
            return unsafe {
                validate_address(address, Some(bound.capacity), self.config.max_address)
            }
            .ok();
        }

        // Fresh capacity cache: this is a different descriptor
        // SAFETY: published by the stage that migrated the log
        let arena = match unsafe { validate_address(address, None, self.config.max_address) } {
            Ok(arena) => arena,
            Err(_err) => {
                bl_dbg_hex!("relocated descriptor invalid at ", address);
                self.disable();
                return None;
            }
        };

        // New region, new page attributes
        if self.caps.page_fixup {
            let len = LOGGER_INFO_SIZE + arena.capacity() as usize;
            if self.services.make_writable(address, len).is_err() {
                bl_dbg_hex!("page fixup failed at ", address);
                self.disable();
                return None;
            }
        }

        if self.bind(address, arena.capacity(), 0).is_err() {
            self.disable();
            return None;
        }
        Some(arena)
    }

    fn disable(&self) {
        self.state.store(AdapterState::Unavailable as u8, Ordering::Release);
        self.current.store(0, Ordering::Release);
    }
}
