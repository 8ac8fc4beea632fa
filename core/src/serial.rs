//! Serial output (COM1 @ 0x3F8)
//!
//! Two uses: the default hardware port the logger mirrors into, and the
//! crate's own diagnostics (`bl_dbg!`, feature `serial_debug`), which go
//! straight to the wire and never through the log buffer.
//! No buffering, no interrupts, pure polling.
//!
//! Port I/O only exists on bare-metal x86_64. Host builds (tests, tooling)
//! compile every function to a no-op.

use crate::level::DebugLevel;
use crate::sink::HdwPortSink;

const COM1: u16 = 0x3F8;
const COM1_LSR: u16 = COM1 + 5;
const LSR_TX_EMPTY: u8 = 0x20;

#[cfg(all(target_arch = "x86_64", not(any(test, feature = "std"))))]
mod port {
    #[inline]
    pub unsafe fn outb(port: u16, val: u8) {
        core::arch::asm!(
            "out dx, al",
            in("dx") port,
            in("al") val,
            options(nostack, preserves_flags)
        );
    }

    #[inline]
    pub unsafe fn inb(port: u16) -> u8 {
        let val: u8;
        core::arch::asm!(
            "in al, dx",
            in("dx") port,
            out("al") val,
            options(nostack, preserves_flags)
        );
        val
    }
}

#[cfg(not(all(target_arch = "x86_64", not(any(test, feature = "std")))))]
mod port {
    #[inline]
    pub unsafe fn outb(_port: u16, _val: u8) {}

    #[inline]
    pub unsafe fn inb(_port: u16) -> u8 {
        super::LSR_TX_EMPTY
    }
}

/// Write byte to COM1. Bounded wait, gives up after ~100 spins.
#[inline]
pub fn putc(b: u8) {
    unsafe {
        for _ in 0..100 {
            if port::inb(COM1_LSR) & LSR_TX_EMPTY != 0 {
                port::outb(COM1, b);
                return;
            }
            core::hint::spin_loop();
        }
    }
}

/// Write string to COM1.
pub fn puts(s: &str) {
    write_bytes(s.as_bytes());
}

/// Write raw bytes to COM1.
pub fn write_bytes(bytes: &[u8]) {
    for &b in bytes {
        putc(b);
    }
}

#[inline]
fn hex_digit(nibble: u8) -> u8 {
    if nibble < 10 { b'0' + nibble } else { b'a' + nibble - 10 }
}

/// Write u32 as hex (0x prefix).
pub fn put_hex32(val: u32) {
    puts("0x");
    for i in (0..8).rev() {
        putc(hex_digit(((val >> (i * 4)) & 0xF) as u8));
    }
}

/// Write u64 as hex.
pub fn put_hex64(val: u64) {
    puts("0x");
    for i in (0..16).rev() {
        putc(hex_digit(((val >> (i * 4)) & 0xF) as u8));
    }
}

/// Newline.
#[inline]
pub fn newline() {
    putc(b'\n');
}

// ═══════════════════════════════════════════════════════════════════════════
// HARDWARE PORT SINK
// ═══════════════════════════════════════════════════════════════════════════

/// 16550 UART on COM1 as a mirror target.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialPort;

impl HdwPortSink for SerialPort {
    /// 115200 8N1, FIFO on, interrupts off.
    fn initialize(&self) -> bool {
        unsafe {
            port::outb(COM1 + 1, 0x00); // IER: no interrupts
            port::outb(COM1 + 3, 0x80); // LCR: DLAB
            port::outb(COM1, 0x01); // DLL: 115200
            port::outb(COM1 + 1, 0x00); // DLM
            port::outb(COM1 + 3, 0x03); // LCR: 8N1
            port::outb(COM1 + 2, 0xC7); // FCR: enable + clear, 14-byte
            port::outb(COM1 + 4, 0x03); // MCR: DTR | RTS
            // Floating bus reads 0xFF: no UART behind the port
            port::inb(COM1_LSR) != 0xFF
        }
    }

    fn write(&self, _level: DebugLevel, bytes: &[u8]) {
        write_bytes(bytes);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// INTERNAL DIAGNOSTICS
// ═══════════════════════════════════════════════════════════════════════════

/// Debug line with [BOOTLOG] prefix.
#[cfg(feature = "serial_debug")]
macro_rules! bl_dbg {
    ($msg:expr) => {{
        $crate::serial::puts("[BOOTLOG] ");
        $crate::serial::puts($msg);
        $crate::serial::newline();
    }};
}

#[cfg(not(feature = "serial_debug"))]
macro_rules! bl_dbg {
    ($msg:expr) => {{
        let _ = $msg;
    }};
}

/// Debug line with hex value.
#[cfg(feature = "serial_debug")]
macro_rules! bl_dbg_hex {
    ($msg:expr, $val:expr) => {{
        $crate::serial::puts("[BOOTLOG] ");
        $crate::serial::puts($msg);
        $crate::serial::put_hex64($val as u64);
        $crate::serial::newline();
    }};
}

#[cfg(not(feature = "serial_debug"))]
macro_rules! bl_dbg_hex {
    ($msg:expr, $val:expr) => {{
        let _ = ($msg, $val);
    }};
}
