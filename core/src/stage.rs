//! Boot phases and per-phase adapter capabilities.
//!
//! One adapter type serves every stage. What differs between stages is
//! captured in a [`Capabilities`] value:
//!
//! ```text
//! phase     discovery              create          extra
//! ───────── ────────────────────── ─────────────── ─────────────────────────
//! Sec       fixed address          fixed, v4       -
//! PeiCore   hand-off, fixed (adopt) bootstrap, v4  publish
//! Pei       hand-off               -               follow slot
//! DxeCore   hand-off               permanent, v5   publish, migration
//! Dxe       registry, hand-off     -               follow slot
//! MmCore    hand-off               -               page fix-up
//! Mm        registry               -               page fix-up, follow slot
//! Runtime   registry               -               off at exit-boot-services
//! ```

use crate::layout::LayoutKind;

/// Stage that produced an entry. Stored in every entry header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum BootPhase {
    Sec = 1,
    PeiCore = 2,
    Pei = 3,
    DxeCore = 4,
    Dxe = 5,
    Runtime = 6,
    MmCore = 7,
    Mm = 8,
}

impl BootPhase {
    pub const fn from_u16(raw: u16) -> Option<Self> {
        match raw {
            1 => Some(Self::Sec),
            2 => Some(Self::PeiCore),
            3 => Some(Self::Pei),
            4 => Some(Self::DxeCore),
            5 => Some(Self::Dxe),
            6 => Some(Self::Runtime),
            7 => Some(Self::MmCore),
            8 => Some(Self::Mm),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Sec => "SEC",
            Self::PeiCore => "PEI_CORE",
            Self::Pei => "PEI",
            Self::DxeCore => "DXE_CORE",
            Self::Dxe => "DXE",
            Self::Runtime => "RUNTIME",
            Self::MmCore => "MM_CORE",
            Self::Mm => "MM",
        }
    }

    /// Text prepended to every message of this phase.
    pub const fn prefix(self) -> Option<&'static str> {
        match self {
            Self::MmCore => Some("MM_CORE: "),
            Self::Mm => Some("MM: "),
            _ => None,
        }
    }
}

/// What to do with the build-time fixed address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixedAddressUse {
    Ignore,
    /// Use a valid descriptor already there
    Adopt,
    /// Initialize a fresh descriptor there
    Create,
}

/// Arena a stage may allocate when discovery finds nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArenaAllocation {
    None,
    Bootstrap,
    Permanent,
}

/// Per-stage adapter behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Look up the hand-off list
    pub handoff_list: bool,
    /// Look up the service registry
    pub service_registry: bool,
    pub fixed_address: FixedAddressUse,
    pub allocation: ArenaAllocation,
    /// Layout for descriptors this stage creates
    pub create_layout: LayoutKind,
    /// Make the arena writable once before first use
    pub page_fixup: bool,
    /// Publish a descriptor this stage created or adopted
    pub publish: bool,
    /// Re-read the discovery slot on each access and follow relocation
    pub follow_relocation: bool,
    /// Drop the descriptor for good at exit-boot-services
    pub exit_boot_services_disables: bool,
    pub prefix: Option<&'static str>,
}

impl Capabilities {
    const NONE: Self = Self {
        handoff_list: false,
        service_registry: false,
        fixed_address: FixedAddressUse::Ignore,
        allocation: ArenaAllocation::None,
        create_layout: LayoutKind::Offset,
        page_fixup: false,
        publish: false,
        follow_relocation: false,
        exit_boot_services_disables: false,
        prefix: None,
    };

    pub const fn for_phase(phase: BootPhase) -> Self {
        let base = Self { prefix: phase.prefix(), ..Self::NONE };
        match phase {
            BootPhase::Sec => Self {
                fixed_address: FixedAddressUse::Create,
                create_layout: LayoutKind::Absolute,
                ..base
            },
            BootPhase::PeiCore => Self {
                handoff_list: true,
                follow_relocation: true,
                fixed_address: FixedAddressUse::Adopt,
                allocation: ArenaAllocation::Bootstrap,
                create_layout: LayoutKind::Absolute,
                publish: true,
                ..base
            },
            BootPhase::Pei => Self {
                handoff_list: true,
                follow_relocation: true,
                ..base
            },
            BootPhase::DxeCore => Self {
                handoff_list: true,
                allocation: ArenaAllocation::Permanent,
                create_layout: LayoutKind::Offset,
                publish: true,
                ..base
            },
            BootPhase::Dxe => Self {
                handoff_list: true,
                service_registry: true,
                follow_relocation: true,
                ..base
            },
            BootPhase::MmCore => Self {
                handoff_list: true,
                page_fixup: true,
                follow_relocation: true,
                ..base
            },
            BootPhase::Mm => Self {
                service_registry: true,
                page_fixup: true,
                follow_relocation: true,
                ..base
            },
            BootPhase::Runtime => Self {
                service_registry: true,
                follow_relocation: true,
                exit_boot_services_disables: true,
                ..base
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_roundtrip_and_prefix() {
        for raw in 1..=8u16 {
            let phase = BootPhase::from_u16(raw).unwrap();
            assert_eq!(phase as u16, raw);
        }
        assert!(BootPhase::from_u16(0).is_none());
        assert_eq!(BootPhase::Mm.prefix(), Some("MM: "));
        assert_eq!(Capabilities::for_phase(BootPhase::MmCore).prefix, Some("MM_CORE: "));
        assert_eq!(Capabilities::for_phase(BootPhase::Dxe).prefix, None);
    }

    #[test]
    fn test_only_memory_stages_allocate() {
        let allocation = |phase| Capabilities::for_phase(phase).allocation;
        assert_eq!(allocation(BootPhase::PeiCore), ArenaAllocation::Bootstrap);
        assert_eq!(allocation(BootPhase::DxeCore), ArenaAllocation::Permanent);
        for phase in [BootPhase::Pei, BootPhase::Dxe, BootPhase::Mm, BootPhase::Runtime] {
            assert_eq!(Capabilities::for_phase(phase).allocation, ArenaAllocation::None);
        }
        assert_eq!(Capabilities::for_phase(BootPhase::Sec).create_layout, LayoutKind::Absolute);
        assert!(Capabilities::for_phase(BootPhase::Runtime).exit_boot_services_disables);
    }

    #[test]
    fn test_later_stages_follow_relocation() {
        for phase in [
            BootPhase::PeiCore,
            BootPhase::Pei,
            BootPhase::Dxe,
            BootPhase::MmCore,
            BootPhase::Mm,
            BootPhase::Runtime,
        ] {
            assert!(Capabilities::for_phase(phase).follow_relocation, "{:?}", phase);
        }
        assert!(!Capabilities::for_phase(BootPhase::DxeCore).follow_relocation);
    }
}
