//! # Paging entries
//!
//! [`PageEntryBits`] is the common superset of all four (five) entry formats;
//! [`EntryRef`] is the physical location of one entry.

use crate::level::PagingLevel;
use crate::{ENTRY_SIZE, ENTRIES_PER_TABLE, PhysMapper};
use bitfield_struct::bitfield;
use core::sync::atomic::{AtomicU64, Ordering};
use pmem_addresses::{PageSize, PhysicalAddress, PhysicalPage, Size1G, Size2M, Size4K};

/// One 64-bit x86-64 paging entry (PML5E/PML4E/PDPTE/PDE/PTE).
///
/// | Bits  | Field | Notes |
/// |-------|-------|-------|
/// | 0     | P     | present |
/// | 1     | RW    | writable |
/// | 2     | US    | user accessible |
/// | 3     | PWT   | write-through |
/// | 4     | PCD   | cache disable |
/// | 5     | A     | accessed |
/// | 6     | D     | dirty (leaf only) |
/// | 7     | PS    | large page in PDPTE/PDE; **PAT** in a PTE |
/// | 8     | G     | global (leaf only) |
/// | 12–51 | addr  | frame / next table; bit 12 is PAT in large leaves |
/// | 63    | XD    | execute disable |
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct PageEntryBits {
    /// Present (P, bit 0).
    pub present: bool,
    /// Writable (RW, bit 1).
    pub writable: bool,
    /// User/Supervisor (US, bit 2).
    pub user: bool,
    /// Page Write-Through (PWT, bit 3).
    pub write_through: bool,
    /// Page Cache Disable (PCD, bit 4).
    pub cache_disabled: bool,
    /// Accessed (A, bit 5). Set by the CPU.
    pub accessed: bool,
    /// Dirty (D, bit 6). Set by the CPU on first write through a leaf.
    pub dirty: bool,
    /// Page Size (PS, bit 7) in PDPTE/PDE, PAT selector in a PTE.
    pub large_page: bool,
    /// Global (G, bit 8).
    pub global: bool,
    /// Available to the OS (bits 9–11).
    #[bits(3)]
    pub os_low: u8,
    /// Physical address bits 51:12.
    #[bits(40)]
    phys_51_12: u64,
    /// Available to the OS (bits 52–58).
    #[bits(7)]
    pub os_high: u8,
    /// Protection key (bits 59–62).
    #[bits(4)]
    pub protection_key: u8,
    /// Execute Disable (XD/NX, bit 63).
    pub no_execute: bool,
}

impl PageEntryBits {
    /// Frame referenced by a non-leaf entry or a 4 KiB PTE.
    #[inline]
    #[must_use]
    pub const fn frame_4k(self) -> PhysicalPage<Size4K> {
        PhysicalPage::from_addr(PhysicalAddress::new(self.phys_51_12() << 12))
    }

    /// Frame of a 2 MiB PDE leaf (PAT bit 12 masked off).
    #[inline]
    #[must_use]
    pub const fn frame_2m(self) -> PhysicalPage<Size2M> {
        PhysicalPage::from_addr(PhysicalAddress::new(self.phys_51_12() << 12))
    }

    /// Frame of a 1 GiB PDPTE leaf (PAT bit 12 masked off).
    #[inline]
    #[must_use]
    pub const fn frame_1g(self) -> PhysicalPage<Size1G> {
        PhysicalPage::from_addr(PhysicalAddress::new(self.phys_51_12() << 12))
    }

    /// Replace only the address field with `frame`; all flag bits are kept.
    #[inline]
    #[must_use]
    pub const fn with_frame_4k(self, frame: PhysicalPage<Size4K>) -> Self {
        self.with_phys_51_12(frame.base().as_u64() >> 12)
    }

    /// Base of the memory mapped by this entry when it is a leaf at `level`.
    ///
    /// Returns `None` for levels that cannot hold leaves.
    #[inline]
    #[must_use]
    pub const fn leaf_base(self, level: PagingLevel) -> Option<PhysicalAddress> {
        match level {
            PagingLevel::Pt => Some(self.frame_4k().base()),
            PagingLevel::Pd => Some(self.frame_2m().base()),
            PagingLevel::Pdpt => Some(self.frame_1g().base()),
            PagingLevel::Pml4 | PagingLevel::Pml5 => None,
        }
    }

    /// Whether this present entry terminates the walk at `level`.
    #[inline]
    #[must_use]
    pub const fn is_leaf_at(self, level: PagingLevel) -> bool {
        match level {
            PagingLevel::Pt => true,
            PagingLevel::Pd | PagingLevel::Pdpt => self.large_page(),
            PagingLevel::Pml4 | PagingLevel::Pml5 => false,
        }
    }
}

/// Physical location of a single paging entry: a table frame plus an index.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct EntryRef {
    table: PhysicalPage<Size4K>,
    index: u16,
}

impl EntryRef {
    #[inline]
    #[must_use]
    pub const fn new(table: PhysicalPage<Size4K>, index: u16) -> Self {
        debug_assert!(index < ENTRIES_PER_TABLE);
        Self { table, index }
    }

    /// Frame of the table holding this entry.
    #[inline]
    #[must_use]
    pub const fn table(self) -> PhysicalPage<Size4K> {
        self.table
    }

    #[inline]
    #[must_use]
    pub const fn index(self) -> u16 {
        self.index
    }

    /// Physical address of the entry itself.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_lossless)]
    pub const fn address(self) -> PhysicalAddress {
        PhysicalAddress::new(self.table.base().as_u64() + self.index as u64 * ENTRY_SIZE)
    }

    #[inline]
    unsafe fn atomic<M: PhysMapper>(self, mapper: &M) -> &AtomicU64 {
        debug_assert!(self.address().as_u64() < u64::MAX - Size4K::SIZE);
        unsafe { AtomicU64::from_ptr(mapper.phys_to_ptr::<u64>(self.address()).as_ptr()) }
    }

    /// Read the entry.
    ///
    /// # Safety
    /// `mapper` must map the table frame, and the frame must really hold a
    /// paging table.
    #[inline]
    #[must_use]
    pub unsafe fn load<M: PhysMapper>(self, mapper: &M) -> PageEntryBits {
        PageEntryBits::from_bits(unsafe { self.atomic(mapper) }.load(Ordering::Acquire))
    }

    /// Atomically replace the entry and return the previous value.
    ///
    /// No TLB maintenance is performed.
    ///
    /// # Safety
    /// As for [`EntryRef::load`], plus the caller owns the translation this
    /// entry provides; rewriting someone else's mapping is undefined.
    #[inline]
    pub unsafe fn swap<M: PhysMapper>(self, mapper: &M, value: PageEntryBits) -> PageEntryBits {
        PageEntryBits::from_bits(unsafe { self.atomic(mapper) }.swap(value.into_bits(), Ordering::AcqRel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_field_roundtrip_keeps_flags() {
        let e = PageEntryBits::new()
            .with_present(true)
            .with_writable(true)
            .with_no_execute(true)
            .with_global(true);
        let frame = PhysicalPage::<Size4K>::from_number(0x12345);
        let moved = e.with_frame_4k(frame);

        assert_eq!(moved.frame_4k(), frame);
        assert!(moved.present());
        assert!(moved.writable());
        assert!(moved.no_execute());
        assert!(moved.global());
        assert_eq!(moved.into_bits() & 0xFFF, e.into_bits() & 0xFFF);
    }

    #[test]
    fn large_leaf_frames_mask_pat_bit() {
        // 2 MiB leaf at 0x4000_0000 with PAT (bit 12) set.
        let pde = PageEntryBits::from_bits(0x4000_0000 | (1 << 12) | (1 << 7) | 1);
        assert!(pde.is_leaf_at(PagingLevel::Pd));
        assert_eq!(pde.frame_2m().base().as_u64(), 0x4000_0000);
        assert_eq!(
            pde.leaf_base(PagingLevel::Pd),
            Some(PhysicalAddress::new(0x4000_0000))
        );

        let pdpte = PageEntryBits::from_bits(0x8000_0000 | (1 << 12) | (1 << 7) | 1);
        assert_eq!(pdpte.frame_1g().base().as_u64(), 0x8000_0000);
    }

    #[test]
    fn pte_bit7_is_not_a_large_page() {
        // PAT set in a PTE: still a 4 KiB leaf.
        let pte = PageEntryBits::from_bits(0x5000 | (1 << 7) | 1);
        assert!(pte.is_leaf_at(PagingLevel::Pt));
        assert_eq!(pte.leaf_base(PagingLevel::Pt), Some(PhysicalAddress::new(0x5000)));
        assert!(!PageEntryBits::from_bits(0x5000 | 1).is_leaf_at(PagingLevel::Pml4));
    }

    #[test]
    fn entry_address_is_table_plus_index() {
        let r = EntryRef::new(PhysicalPage::from_number(7), 3);
        assert_eq!(r.address().as_u64(), 0x7000 + 24);
        assert_eq!(r.table().number(), 7);
    }
}
