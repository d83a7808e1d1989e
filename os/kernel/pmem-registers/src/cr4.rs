use crate::LoadRegisterUnsafe;
use bitfield_struct::bitfield;

/// CR4: Control Register 4, reduced to the paging-related bits.
///
/// Everything the walker does not look at is folded into reserved padding.
#[bitfield(u64)]
pub struct Cr4 {
    /// Bits 0–3: VME, PVI, TSD, DE.
    #[bits(4)]
    __low: u8,

    /// Bit 4: PSE: Page Size Extensions.
    pub pse: bool,

    /// Bit 5: PAE: Physical Address Extension. Always set in long mode.
    pub pae: bool,

    /// Bit 6: MCE: Machine-Check Enable.
    pub mce: bool,

    /// Bit 7: PGE: global pages survive CR3 reloads.
    pub pge: bool,

    /// Bits 8–11: PCE, OSFXSR, OSXMMEXCPT, UMIP.
    #[bits(4)]
    __mid: u8,

    /// Bit 12: LA57: 57-bit linear addresses (5-level paging).
    pub la57: bool,

    /// Bits 13–16: VMXE, SMXE, reserved, FSGSBASE.
    #[bits(4)]
    __virt: u8,

    /// Bit 17: PCIDE: Process-Context Identifiers.
    pub pcide: bool,

    /// Bits 18–19: OSXSAVE, reserved.
    #[bits(2)]
    __xsave: u8,

    /// Bit 20: SMEP: Supervisor Mode Execution Prevention.
    pub smep: bool,

    /// Bit 21: SMAP: Supervisor Mode Access Prevention.
    pub smap: bool,

    /// Bit 22: PKE: Protection Keys Enable.
    pub pke: bool,

    /// Bits 23–63: Reserved.
    #[bits(41)]
    __high: u64,
}

#[cfg(feature = "asm")]
impl LoadRegisterUnsafe for Cr4 {
    unsafe fn load_unsafe() -> Self {
        let cr4: u64;
        unsafe {
            core::arch::asm!("mov {}, cr4", out(reg) cr4, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(cr4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_paging_bits() {
        let cr4 = Cr4::from_bits((1 << 5) | (1 << 7) | (1 << 12));
        assert!(cr4.pae());
        assert!(cr4.pge());
        assert!(cr4.la57());
        assert!(!cr4.pcide());
        assert!(!cr4.smap());
    }
}
