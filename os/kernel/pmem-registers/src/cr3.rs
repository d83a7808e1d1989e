use crate::LoadRegisterUnsafe;
use bitfield_struct::bitfield;
use pmem_addresses::{PhysicalAddress, PhysicalPage, Size4K};

/// CR3: paging root register (IA-32e / 5-level paging).
///
/// Holds the physical frame of the top-level table (PML4 or PML5). The low
/// twelve bits are either the PWT/PCD cache bits or, with `CR4.PCIDE = 1`, the
/// current PCID; neither matters for locating the root.
#[bitfield(u64)]
pub struct Cr3 {
    /// Bits 0–2: Reserved.
    #[bits(3)]
    __reserved0: u8,

    /// Bit 3: PWT: write-through for the root table (PCID disabled).
    pub pwt: bool,

    /// Bit 4: PCD: cache disable for the root table (PCID disabled).
    pub pcd: bool,

    /// Bits 5–11: Reserved, or PCID bits with `CR4.PCIDE = 1`.
    #[bits(7)]
    __reserved1: u8,

    /// Bits 12–51: root table physical base `>> 12`.
    #[bits(40)]
    root_base_4k: u64,

    /// Bits 52–62: Reserved.
    #[bits(11)]
    __reserved2: u16,

    /// Bit 63: no-flush hint when written with PCID enabled.
    pub no_flush: bool,
}

impl Cr3 {
    /// Low twelve bits interpreted as the process-context identifier.
    #[must_use]
    pub const fn pcid(&self) -> u16 {
        (self.into_bits() & 0xFFF) as u16
    }

    /// Physical frame of the top-level paging table.
    #[must_use]
    pub const fn root_frame(&self) -> PhysicalPage<Size4K> {
        PhysicalPage::from_addr(PhysicalAddress::new(self.root_base_4k() << 12))
    }
}

#[cfg(feature = "asm")]
impl LoadRegisterUnsafe for Cr3 {
    unsafe fn load_unsafe() -> Self {
        let cr3: u64;
        unsafe {
            core::arch::asm!("mov {}, cr3", out(reg) cr3, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(cr3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_frame_ignores_pcid_and_flags() {
        let cr3 = Cr3::from_bits(0x0000_0000_0123_4000 | 0x018);
        assert_eq!(cr3.root_frame().base().as_u64(), 0x0123_4000);
        assert!(cr3.pwt());
        assert!(cr3.pcd());

        let with_pcid = Cr3::from_bits(0x8000_0000_0040_2ABC);
        assert_eq!(with_pcid.root_frame().base().as_u64(), 0x0040_2000);
        assert_eq!(with_pcid.pcid(), 0xABC);
        assert!(with_pcid.no_flush());
    }
}
