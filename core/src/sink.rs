//! Secondary mirror sink.
//!
//! Entries that pass the mirror gate are also written to a hardware port
//! (usually a UART). The port's state lives in the shared descriptor, so it
//! is initialized once per boot no matter how many stages mirror into it.

use crate::arena::LogArena;
use crate::layout::LayoutKind;
use crate::level::DebugLevel;

/// Hardware console the logger mirrors into.
pub trait HdwPortSink: Sync {
    /// One-time port setup. Returning false disables mirroring for the boot.
    fn initialize(&self) -> bool {
        true
    }

    /// Write bytes. Failures are the sink's problem.
    fn write(&self, level: DebugLevel, bytes: &[u8]);
}

/// Sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl HdwPortSink for NullSink {
    fn write(&self, _level: DebugLevel, _bytes: &[u8]) {}
}

/// Mirror one message, honouring the descriptor's port state.
///
/// The gate comes from the descriptor for the offset layout and from
/// `fallback_gate` for the absolute layout, which predates the field.
pub(crate) fn mirror(
    arena: &LogArena<'_>,
    sink: &dyn HdwPortSink,
    fallback_gate: DebugLevel,
    level: DebugLevel,
    prefix: &[u8],
    message: &[u8],
) {
    let info = arena.info();
    if info.hdw_port_disabled() {
        return;
    }
    let gate = match arena.layout() {
        LayoutKind::Offset => info.hw_print_level(),
        LayoutKind::Absolute => fallback_gate,
    };
    if !level.intersects(gate) {
        return;
    }
    if info.claim_hdw_port_init() && !sink.initialize() {
        info.set_hdw_port_disabled(true);
        bl_dbg!("hardware port init failed, mirroring off");
        return;
    }
    if !prefix.is_empty() {
        sink.write(level, prefix);
    }
    sink.write(level, message);
}
