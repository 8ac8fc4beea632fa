//! Common test utilities: leaked page memory, recording sink, configurable
//! stage environment.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use bootlog_core::{
    validate, DebugLevel, HandoffList, HdwPortSink, HeapPageAllocator, LayoutKind, LocatorVariable,
    LogArena, LoggerInfo, PageAllocator, ServiceRegistry, StageServices, StaticHandoffList,
    StaticServiceRegistry,
};

pub const PAGE: usize = 4096;

#[repr(C, align(4096))]
struct Page([u8; PAGE]);

/// Leak `pages` zeroed, page-aligned pages. Returns the base address.
pub fn leak_pages(pages: usize) -> u64 {
    let pages: Vec<Page> = (0..pages).map(|_| Page([0; PAGE])).collect();
    Box::leak(pages.into_boxed_slice()).as_mut_ptr() as u64
}

pub fn leak<T>(value: T) -> &'static T {
    Box::leak(Box::new(value))
}

/// Page allocator over `pages` leaked pages.
pub fn heap(pages: usize) -> &'static HeapPageAllocator {
    let heap = leak(HeapPageAllocator::new());
    unsafe { heap.init(leak_pages(pages), pages * PAGE).unwrap() };
    heap
}

/// Fresh descriptor over `pages` leaked pages.
pub fn descriptor(
    pages: usize,
    layout: LayoutKind,
    hw_print_level: DebugLevel,
) -> &'static LoggerInfo {
    let base = leak_pages(pages);
    unsafe { LoggerInfo::initialize(base, pages * PAGE, layout, hw_print_level).unwrap() }
}

pub fn arena_of(info: &LoggerInfo) -> LogArena<'_> {
    validate(Some(info), None, u64::MAX).unwrap()
}

/// Messages of every stamped entry, in arena order.
pub fn messages(info: &LoggerInfo) -> Vec<Vec<u8>> {
    arena_of(info).entries().map(|e| e.message().to_vec()).collect()
}

/// Raw bytes at `address`.
pub fn bytes_at(address: u64, len: usize) -> Vec<u8> {
    unsafe { std::slice::from_raw_parts(address as usize as *const u8, len).to_vec() }
}

// ═══════════════════════════════════════════════════════════════════════════
// RECORDERS
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Default)]
pub struct RecordingSink {
    pub fail_init: bool,
    pub inits: AtomicU32,
    pub out: Mutex<Vec<(DebugLevel, Vec<u8>)>>,
}

impl RecordingSink {
    pub fn written(&self) -> Vec<u8> {
        self.out.lock().unwrap().iter().flat_map(|(_, b)| b.clone()).collect()
    }
}

impl HdwPortSink for RecordingSink {
    fn initialize(&self) -> bool {
        self.inits.fetch_add(1, Ordering::SeqCst);
        !self.fail_init
    }

    fn write(&self, level: DebugLevel, bytes: &[u8]) {
        self.out.lock().unwrap().push((level, bytes.to_vec()));
    }
}

#[derive(Default)]
pub struct RecordingVariable {
    pub value: Mutex<Option<u64>>,
    /// Runs inside set, i.e. while a location is being published
    pub hook: Option<fn()>,
}

impl LocatorVariable for RecordingVariable {
    fn set(&self, info_address: u64) -> bootlog_core::Result<()> {
        *self.value.lock().unwrap() = Some(info_address);
        if let Some(hook) = self.hook {
            hook();
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// STAGE ENVIRONMENT
// ═══════════════════════════════════════════════════════════════════════════

pub type List = StaticHandoffList<8>;
pub type Registry = StaticServiceRegistry<4>;

/// Stage services built from shared, leaked primitives.
pub struct TestServices {
    pub list: Option<&'static List>,
    pub registry: Option<&'static Registry>,
    pub pages: Option<&'static HeapPageAllocator>,
    pub sink: Option<&'static RecordingSink>,
    pub variable: Option<&'static RecordingVariable>,
    /// Page fixups that succeed before the rest fail
    pub fixup_limit: u32,
    pub fixups: AtomicU32,
    pub released: Mutex<Vec<(u64, usize)>>,
    pub tick: AtomicU64,
    /// Runs inside make_writable, i.e. while the adapter is resolving
    pub hook: Option<fn()>,
}

impl TestServices {
    pub fn new() -> Self {
        Self {
            list: None,
            registry: None,
            pages: None,
            sink: None,
            variable: None,
            fixup_limit: u32::MAX,
            fixups: AtomicU32::new(0),
            released: Mutex::new(Vec::new()),
            tick: AtomicU64::new(1),
            hook: None,
        }
    }

    pub fn with_list(mut self, list: &'static List) -> Self {
        self.list = Some(list);
        self
    }

    pub fn with_registry(mut self, registry: &'static Registry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_pages(mut self, pages: &'static HeapPageAllocator) -> Self {
        self.pages = Some(pages);
        self
    }

    pub fn with_sink(mut self, sink: &'static RecordingSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_variable(mut self, variable: &'static RecordingVariable) -> Self {
        self.variable = Some(variable);
        self
    }

    pub fn with_failing_fixup(self) -> Self {
        self.with_fixup_limit(0)
    }

    pub fn with_fixup_limit(mut self, limit: u32) -> Self {
        self.fixup_limit = limit;
        self
    }

    pub fn with_hook(mut self, hook: fn()) -> Self {
        self.hook = Some(hook);
        self
    }
}

impl StageServices for TestServices {
    fn handoff_list(&self) -> Option<&dyn HandoffList> {
        self.list.map(|l| l as &dyn HandoffList)
    }

    fn service_registry(&self) -> Option<&dyn ServiceRegistry> {
        self.registry.map(|r| r as &dyn ServiceRegistry)
    }

    fn page_allocator(&self) -> Option<&dyn PageAllocator> {
        self.pages.map(|p| p as &dyn PageAllocator)
    }

    fn hdw_port(&self) -> Option<&dyn HdwPortSink> {
        self.sink.map(|s| s as &dyn HdwPortSink)
    }

    fn locator_variable(&self) -> Option<&dyn LocatorVariable> {
        self.variable.map(|v| v as &dyn LocatorVariable)
    }

    fn make_writable(&self, _base: u64, _len: usize) -> bootlog_core::Result<()> {
        let attempt = self.fixups.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(hook) = self.hook {
            hook();
        }
        if attempt <= self.fixup_limit {
            Ok(())
        } else {
            Err(bootlog_core::LogError::AccessDenied)
        }
    }

    fn release_bootstrap(&self, address: u64, len: usize) {
        self.released.lock().unwrap().push((address, len));
    }

    fn ticks(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::SeqCst)
    }

    fn timer_frequency(&self) -> u64 {
        1_000_000
    }
}
