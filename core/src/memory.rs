//! Page allocation for log arenas.
//!
//! Stages that have dynamic memory hand the adapter a [`PageAllocator`].
//! Firmware usually backs it with its own page services; [`HeapPageAllocator`]
//! carves pages out of a fixed region with `linked_list_allocator`, for
//! platforms that only have a reserved range and for tests.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  HeapPageAllocator                           │
//! │   spin::Mutex<Option<HeapState>>             │
//! │      └── linked_list_allocator::Heap         │
//! └──────────────────────────────────────────────┘
//!             │ allocate_pages(n) → 4KB-aligned, zeroed
//!             ▼
//!   descriptor + arena region
//! ```

use core::alloc::Layout;
use core::ptr::NonNull;

use spin::Mutex;

use crate::config::PAGE_SIZE;
use crate::error::{LogError, Result};

/// Source of page-granular, page-aligned memory.
pub trait PageAllocator: Sync {
    /// Allocate `pages` zeroed pages. `None` on exhaustion.
    fn allocate_pages(&self, pages: usize) -> Option<u64>;

    /// Return pages obtained from `allocate_pages`.
    ///
    /// # Safety
    /// `address` and `pages` must match an earlier allocation, and nothing
    /// may touch the memory afterwards.
    unsafe fn free_pages(&self, address: u64, pages: usize);
}

/// Round a byte count up to whole pages.
#[inline]
pub const fn bytes_to_pages(bytes: usize) -> usize {
    (bytes + PAGE_SIZE - 1) / PAGE_SIZE
}

#[inline]
pub const fn pages_to_bytes(pages: usize) -> usize {
    pages * PAGE_SIZE
}

fn page_layout(pages: usize) -> Option<Layout> {
    let size = pages.checked_mul(PAGE_SIZE)?;
    if size == 0 {
        return None;
    }
    Layout::from_size_align(size, PAGE_SIZE).ok()
}

// ═══════════════════════════════════════════════════════════════════════════
// HEAP-BACKED PAGES
// ═══════════════════════════════════════════════════════════════════════════

struct HeapState {
    heap: linked_list_allocator::Heap,
    base: u64,
    size: usize,
}

/// Page allocator over one fixed memory region.
pub struct HeapPageAllocator {
    state: Mutex<Option<HeapState>>,
}

/// Snapshot of allocator usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
    pub base: u64,
    pub size: usize,
    pub used: usize,
    pub free: usize,
}

impl HeapPageAllocator {
    /// Create new (uninitialized) allocator.
    pub const fn new() -> Self {
        Self { state: Mutex::new(None) }
    }

    /// Hand the allocator its region. Fails if already initialized.
    ///
    /// # Safety
    /// `base..base + size` must be valid, writable, unused memory that
    /// outlives the allocator.
    pub unsafe fn init(&self, base: u64, size: usize) -> Result<()> {
        if base == 0 || size < PAGE_SIZE {
            return Err(LogError::RegionTooSmall);
        }
        let mut guard = self.state.lock();
        if guard.is_some() {
            return Err(LogError::AccessDenied);
        }
        let mut heap = linked_list_allocator::Heap::empty();
        heap.init(base as usize as *mut u8, size);
        *guard = Some(HeapState { heap, base, size });

        bl_dbg_hex!("page heap at ", base);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().is_some()
    }

    pub fn stats(&self) -> Option<HeapStats> {
        self.state.lock().as_ref().map(|s| HeapStats {
            base: s.base,
            size: s.size,
            used: s.heap.used(),
            free: s.heap.free(),
        })
    }
}

impl Default for HeapPageAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl PageAllocator for HeapPageAllocator {
    fn allocate_pages(&self, pages: usize) -> Option<u64> {
        let layout = page_layout(pages)?;
        let mut guard = self.state.lock();
        let state = guard.as_mut()?;
        match state.heap.allocate_first_fit(layout) {
            Ok(ptr) => {
                // SAFETY: freshly allocated, `layout.size()` bytes
                unsafe { core::ptr::write_bytes(ptr.as_ptr(), 0, layout.size()) };
                Some(ptr.as_ptr() as usize as u64)
            }
            Err(_) => {
                bl_dbg_hex!("page heap exhausted, pages=", pages);
                None
            }
        }
    }

    unsafe fn free_pages(&self, address: u64, pages: usize) {
        let Some(layout) = page_layout(pages) else { return };
        let Some(ptr) = NonNull::new(address as usize as *mut u8) else { return };
        let mut guard = self.state.lock();
        if let Some(state) = guard.as_mut() {
            state.heap.deallocate(ptr, layout);
        }
    }
}
