//! # x86-64 kernel implementation
//!
//! [`X86Hardware`] implements every seam of [`RogueHardware`](crate::RogueHardware)
//! for a kernel running at CPL0 with a higher-half direct map of physical
//! memory at [`HHDM_BASE`] (or a base passed to [`X86Hardware::new`]).
//!
//! The fault-safe copy relies on the kernel's page fault handler: before it
//! panics on a kernel-mode fault, it must ask [`fixup_for_fault`] whether the
//! faulting `RIP` belongs to the copy routine and, if so, resume at the
//! returned address.

mod copy;
mod reserve;

pub use copy::fixup_for_fault;

use crate::{CopyFault, CriticalSection, FaultSafeCopy, PageReservation, PagingRoot, PagingRootSource, TlbInvalidator};
use core::ptr::NonNull;
use pmem_addresses::{PhysicalAddress, Size4K, VirtualAddress, VirtualPage};
use pmem_paging::{HhdmPhysMapper, PagingMode, PhysMapper};
use pmem_registers::{Cr3, Cr4, LoadRegisterUnsafe};

/// Default start of the higher-half direct map.
pub const HHDM_BASE: u64 = 0xffff_8880_0000_0000;

/// Machine services of an x86-64 kernel.
#[derive(Debug)]
pub struct X86Hardware {
    mapper: HhdmPhysMapper,
}

impl X86Hardware {
    /// # Safety
    /// All methods must be called at CPL0, and `hhdm_base + pa` must map every
    /// physical address holding a paging table.
    #[must_use]
    pub const unsafe fn new(hhdm_base: u64) -> Self {
        Self {
            mapper: HhdmPhysMapper::new(hhdm_base),
        }
    }
}

impl PhysMapper for X86Hardware {
    #[inline]
    unsafe fn phys_to_ptr<T>(&self, pa: PhysicalAddress) -> NonNull<T> {
        unsafe { self.mapper.phys_to_ptr(pa) }
    }
}

impl PagingRootSource for X86Hardware {
    fn paging_root(&self) -> PagingRoot {
        // SAFETY: construction guarantees CPL0.
        let (cr3, cr4) = unsafe { (Cr3::load_unsafe(), Cr4::load_unsafe()) };
        PagingRoot {
            frame: cr3.root_frame(),
            mode: PagingMode::from_cr4(cr4),
        }
    }
}

impl TlbInvalidator for X86Hardware {
    #[inline]
    fn invalidate_page(&self, page: VirtualPage<Size4K>) {
        // SAFETY: construction guarantees CPL0.
        unsafe { pmem_registers::tlb::invlpg(page) }
    }
}

impl FaultSafeCopy for X86Hardware {
    unsafe fn read_window(&self, src: VirtualAddress, dst: &mut [u8]) -> Result<(), CopyFault> {
        let remaining = unsafe { copy::copy_with_fixup(dst.as_mut_ptr(), src.as_ptr(), dst.len()) };
        copy::outcome(dst.len(), remaining)
    }

    unsafe fn write_window(&self, dst: VirtualAddress, src: &[u8]) -> Result<(), CopyFault> {
        let remaining = unsafe { copy::copy_with_fixup(dst.as_mut_ptr(), src.as_ptr(), src.len()) };
        copy::outcome(src.len(), remaining)
    }
}

impl PageReservation for X86Hardware {
    fn reserve_page(&self) -> Option<VirtualPage<Size4K>> {
        reserve::reserve()
    }

    unsafe fn release_page(&self, page: VirtualPage<Size4K>) {
        reserve::release(page);
    }
}

impl CriticalSection for X86Hardware {
    #[cfg(feature = "irq")]
    type Guard<'a> = pmem_sync::IrqGuard;
    #[cfg(not(feature = "irq"))]
    type Guard<'a> = ();

    #[inline]
    #[allow(clippy::unused_unit, clippy::semicolon_if_nothing_returned)]
    fn enter_critical(&self) -> Self::Guard<'_> {
        #[cfg(feature = "irq")]
        {
            pmem_sync::IrqGuard::new()
        }
        #[cfg(not(feature = "irq"))]
        {
            ()
        }
    }
}
