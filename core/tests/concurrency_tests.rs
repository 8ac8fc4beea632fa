//! Multi-writer tests against a shared arena

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use bootlog_core::{
    entry, AdapterState, BootPhase, Capabilities, DebugLevel, HandoffList, LayoutKind,
    LoggerConfig, LoggerInfo, Reservation, StageAdapter, LOGGER_INFO_GUID, LOGGER_INFO_SIZE,
};
use common::*;

const WRITERS: usize = 8;

/// Small deterministic generator, one per thread.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.0 >> 33
    }
}

#[test]
fn test_reservations_are_disjoint_and_accounted() {
    let info = descriptor(1, LayoutKind::Offset, DebugLevel::NONE);
    let arena = arena_of(info);
    let capacity = u64::from(arena.capacity());
    let barrier = Arc::new(Barrier::new(WRITERS));

    let mut handles = Vec::new();
    for t in 0..WRITERS as u64 {
        let b = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            let mut rng = Lcg(t + 1);
            let mut granted = Vec::new();
            let mut requested = 0;
            b.wait();
            for _ in 0..200 {
                let len = 1 + rng.next() % 64;
                requested += len;
                if let Reservation::Granted(off) = arena.reserve(len as usize) {
                    granted.push((off, len));
                }
            }
            (granted, requested)
        }));
    }
    let results: Vec<(Vec<(u64, u64)>, u64)> =
        handles.into_iter().map(|h| h.join().unwrap()).collect();

    let mut regions: Vec<(u64, u64)> = results.iter().flat_map(|(g, _)| g.clone()).collect();
    regions.sort();
    for pair in regions.windows(2) {
        assert!(pair[0].0 + pair[0].1 <= pair[1].0, "overlap: {:?}", pair);
    }
    let granted: u64 = regions.iter().map(|(_, len)| len).sum();
    let requested: u64 = results.iter().map(|(_, r)| r).sum();

    assert!(granted <= capacity);
    assert_eq!(arena.used(), granted);
    assert_eq!(granted + u64::from(info.discarded_size()), requested);
}

#[test]
fn test_tiny_arena_admits_one_entry() {
    let base = leak_pages(1);
    // Room for exactly one 32-byte entry
    let info = unsafe {
        LoggerInfo::initialize(base, LOGGER_INFO_SIZE + 40, LayoutKind::Absolute, DebugLevel::NONE)
            .unwrap()
    };
    let arena = arena_of(info);
    let barrier = Arc::new(Barrier::new(WRITERS));

    let mut handles = Vec::new();
    for _ in 0..WRITERS {
        let b = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            let prepared = entry::encode(DebugLevel::INFO, None, b"8 bytes!").unwrap();
            b.wait();
            (0..16).filter(|_| arena.append(&prepared, 0, 0).is_ok()).count()
        }));
    }
    let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

    assert_eq!(granted, 1);
    assert_eq!(arena.used(), 32);
    assert_eq!(info.discarded_size(), (WRITERS as u32 * 16 - 1) * 32);
    assert_eq!(messages(info), vec![b"8 bytes!".to_vec()]);
}

#[test]
fn test_counters_never_move_backwards() {
    let info = descriptor(1, LayoutKind::Offset, DebugLevel::NONE);
    let arena = arena_of(info);
    let done = Arc::new(AtomicBool::new(false));

    let observer = {
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let (mut cursor, mut discarded) = (0, 0);
            let mut samples = 0u64;
            while !done.load(Ordering::Acquire) || samples == 0 {
                let c = info.raw_current();
                let d = info.discarded_size();
                assert!(c >= cursor, "cursor moved back: {} -> {}", cursor, c);
                assert!(d >= discarded, "discarded moved back: {} -> {}", discarded, d);
                cursor = c;
                discarded = d;
                samples += 1;
            }
        })
    };

    let writers: Vec<_> = (0..4)
        .map(|_| {
            thread::spawn(move || {
                let prepared = entry::encode(DebugLevel::WARN, None, b"counter").unwrap();
                for _ in 0..100 {
                    let _ = arena.append(&prepared, 0, 0);
                }
            })
        })
        .collect();
    for w in writers {
        w.join().unwrap();
    }
    done.store(true, Ordering::Release);
    observer.join().unwrap();

    // 4016 bytes hold 125 of the 400 entries
    assert_eq!(arena.used(), 125 * 32);
    assert_eq!(info.discarded_size(), 275 * 32);
}

#[test]
fn test_concurrent_adapter_writes_keep_per_thread_order() {
    let list = leak(List::new());
    let logger = leak(StageAdapter::with_config(
        BootPhase::DxeCore,
        Capabilities::for_phase(BootPhase::DxeCore),
        LoggerConfig::new().with_pages(1, 4),
        TestServices::new().with_list(list).with_pages(heap(8)),
    ));
    // Resolve up front; writers racing the resolution are dropped
    assert!(logger.get_descriptor().is_some());
    let barrier = Arc::new(Barrier::new(4));

    let mut handles = Vec::new();
    for t in 0..4 {
        let b = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            b.wait();
            for n in 0..50 {
                logger.write(DebugLevel::INFO, format!("t{}-{:03}", t, n).as_bytes());
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    let msgs = messages(logger.get_descriptor().unwrap());
    assert_eq!(msgs.len(), 200);

    let mut next = [0u32; 4];
    for msg in &msgs {
        let text = std::str::from_utf8(msg).unwrap();
        let (thread, seq) = text[1..].split_once('-').unwrap();
        let thread: usize = thread.parse().unwrap();
        let seq: u32 = seq.parse().unwrap();
        assert_eq!(seq, next[thread], "thread {} out of order", thread);
        next[thread] += 1;
    }
    assert_eq!(next, [50; 4]);
}

#[test]
fn test_racing_followers_share_one_relocation() {
    let old = descriptor(1, LayoutKind::Offset, DebugLevel::NONE);
    let list = leak(List::new());
    list.publish(&LOGGER_INFO_GUID, old.address()).unwrap();
    let logger = leak(StageAdapter::with_config(
        BootPhase::Pei,
        Capabilities::for_phase(BootPhase::Pei),
        LoggerConfig::new(),
        TestServices::new().with_list(list),
    ));
    logger.write(DebugLevel::INFO, b"start");

    // More relocations than binding slots would survive if every racing
    // writer took one
    for round in 0..7 {
        let new = descriptor(1, LayoutKind::Offset, DebugLevel::NONE);
        list.publish(&LOGGER_INFO_GUID, new.address()).unwrap();
        let barrier = Arc::new(Barrier::new(WRITERS));

        let mut handles = Vec::new();
        for _ in 0..WRITERS {
            let b = Arc::clone(&barrier);
            handles.push(thread::spawn(move || {
                b.wait();
                logger.write(DebugLevel::INFO, b"burst");
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        logger.write(DebugLevel::INFO, b"settled");
        assert_eq!(logger.state(), AdapterState::Active, "round {}", round);
        assert_eq!(logger.get_descriptor().unwrap().address(), new.address());
        // Writers that lost the switch are dropped, never misplaced
        assert_eq!(messages(new).last().unwrap(), b"settled");
        assert_eq!(messages(old), vec![b"start".to_vec()]);
    }
}
