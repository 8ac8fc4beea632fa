//! Bootstrap → permanent arena migration.
//!
//! Runs once, in the first stage that has dynamic memory:
//!
//! ```text
//!  bootstrap (small, early memory)          permanent (page allocator)
//! ┌────────┬──────────────┬──────┐         ┌────────┬──────────────┬──────────────────┐
//! │ info   │ used entries │ free │  ────►  │ info'  │ used entries │ free             │
//! └────────┴──────────────┴──────┘  copy   └────────┴──────────────┴──────────────────┘
//!                                                   ▲ cursor = start + used
//! then: rebind the adapter, rewrite every hand-off slot in place,
//!       release the bootstrap region
//! ```
//!
//! The bootstrap arena is closed (cursor moved to its end) before the copy.
//! Writers that reach it afterwards, before their stage follows the
//! rewritten slot, take the full-arena path and are counted in the
//! permanent descriptor's discarded bytes. Only the stamped prefix is
//! copied; anything past an entry still being written counts as discarded.

use core::sync::atomic::{AtomicBool, Ordering};

use crate::adapter::{StageAdapter, StageServices};
use crate::info::{LoggerInfo, LOGGER_INFO_SIZE};
use crate::memory::pages_to_bytes;
use crate::reader::EntryIter;
use crate::validate::validate;

/// What [`MigrationCoordinator::on_memory_available`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    Migrated { from: u64, to: u64, copied: u64 },
    /// Descriptor already lives in permanent memory
    AlreadyPermanent,
    /// Migration was attempted before
    AlreadyRan,
    /// Adapter has no usable descriptor
    NoDescriptor,
    /// Permanent arena could not be allocated; bootstrap keeps serving
    OutOfResources,
}

/// One-shot migration driver.
#[derive(Debug, Default)]
pub struct MigrationCoordinator {
    ran: AtomicBool,
}

impl MigrationCoordinator {
    pub const fn new() -> Self {
        Self { ran: AtomicBool::new(false) }
    }

    pub fn has_run(&self) -> bool {
        self.ran.load(Ordering::Acquire)
    }

    /// Dynamic memory just became available to `adapter`'s stage.
    pub fn on_memory_available<S: StageServices>(
        &self,
        adapter: &StageAdapter<S>,
    ) -> MigrationOutcome {
        if self.ran.swap(true, Ordering::AcqRel) {
            return MigrationOutcome::AlreadyRan;
        }

        let Some(old) = adapter.arena() else { return MigrationOutcome::NoDescriptor };
        let Some(bound) = adapter.bound() else { return MigrationOutcome::NoDescriptor };
        let old_info = old.info();
        if old_info.in_permanent_ram() {
            return MigrationOutcome::AlreadyPermanent;
        }

        let services = adapter.services();
        let Some(allocator) = services.page_allocator() else {
            return MigrationOutcome::OutOfResources;
        };
        let pages = adapter.config().permanent_pages;
        let Some(to) = allocator.allocate_pages(pages) else {
            bl_dbg!("permanent arena allocation failed, staying on bootstrap");
            return MigrationOutcome::OutOfResources;
        };

        let layout = adapter.capabilities().create_layout;
        // SAFETY: freshly allocated pages, not yet visible to anyone
        let new_info = match unsafe {
            LoggerInfo::initialize(
                to,
                pages_to_bytes(pages),
                layout,
                adapter.config().hw_print_level,
            )
        } {
            Ok(info) => info,
            Err(_) => {
                unsafe { allocator.free_pages(to, pages) };
                return MigrationOutcome::OutOfResources;
            }
        };

        let Ok(new_arena) = validate(Some(new_info), None, adapter.config().max_address) else {
            unsafe { allocator.free_pages(to, pages) };
            return MigrationOutcome::OutOfResources;
        };
        let accessor = layout.accessor();

        // From here on late writers to the bootstrap arena are counted as
        // discarded instead of vanishing
        let used = old.close();

        // Header state first, then the entries
        new_info.copy_state_from(old_info);
        let discarded_at_copy = new_info.discarded_size();

        // Only the stamped prefix is carried over; an entry still being
        // written would leave the new arena unwalkable
        // SAFETY: the first `used` bytes lie inside the validated old arena
        let mut walk = unsafe { EntryIter::from_raw(old_info.arena_base(), used as usize) };
        while walk.next().is_some() {}
        let copied = (walk.position() as u64).min(u64::from(new_info.capacity()));

        // SAFETY: both ranges lie inside validated arenas and do not overlap
        unsafe {
            core::ptr::copy_nonoverlapping(
                old_info.arena_base(),
                new_info.arena_base(),
                copied as usize,
            );
        }
        if let Some(cursor) = accessor.encode(to, copied) {
            new_info.cursor().store(cursor, Ordering::Release);
        }
        if copied < used {
            new_arena.account_discarded((used - copied) as usize);
        }
        new_info.set_in_permanent_ram(true);

        if adapter.rebind(to, new_info.capacity(), pages).is_err() {
            // Reopen the bootstrap arena where it was closed
            if let Some(cursor) = old.layout().accessor().encode(bound.address, used) {
                old_info.cursor().store(cursor, Ordering::Release);
            }
            unsafe { allocator.free_pages(to, pages) };
            return MigrationOutcome::OutOfResources;
        }
        adapter.publish_location(to);

        // Writes that hit the closed bootstrap arena before their stage
        // followed the rewritten slot
        let late = old_info.discarded_size().saturating_sub(discarded_at_copy);
        if late != 0 {
            new_arena.account_discarded(late as usize);
        }

        // Nothing bound to the bootstrap region any more
        if bound.owned_pages != 0 {
            unsafe { allocator.free_pages(bound.address, bound.owned_pages) };
        } else {
            services.release_bootstrap(bound.address, LOGGER_INFO_SIZE + bound.capacity as usize);
        }

        bl_dbg_hex!("log migrated to ", to);
        MigrationOutcome::Migrated { from: bound.address, to, copied }
    }
}
