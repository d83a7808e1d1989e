//! # Physical memory access for the walker
//!
//! Code can only dereference virtual addresses. Every paging table the walker
//! visits is a *physical* frame, so it needs some way to "see" that frame from
//! the current address space. The strategy differs between a kernel (higher
//! half direct map) and the host tests (a heap buffer standing in for RAM);
//! [`PhysMapper`] hides that difference.

use core::ptr::NonNull;
use pmem_addresses::PhysicalAddress;

/// Turns a physical address into a pointer usable in the current address
/// space.
pub trait PhysMapper {
    /// Pointer to `pa` in the current address space.
    ///
    /// # Safety
    /// `pa` must be covered by the mapping, and the returned pointer must only
    /// be used for accesses the underlying memory permits.
    unsafe fn phys_to_ptr<T>(&self, pa: PhysicalAddress) -> NonNull<T>;
}

impl<M: PhysMapper + ?Sized> PhysMapper for &M {
    #[inline]
    unsafe fn phys_to_ptr<T>(&self, pa: PhysicalAddress) -> NonNull<T> {
        unsafe { (**self).phys_to_ptr(pa) }
    }
}

/// [`PhysMapper`] for kernels with a higher-half direct map: every physical
/// address `pa` is visible at `base + pa`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct HhdmPhysMapper {
    base: u64,
}

impl HhdmPhysMapper {
    #[must_use]
    pub const fn new(base: u64) -> Self {
        Self { base }
    }

    #[must_use]
    pub const fn base(&self) -> u64 {
        self.base
    }
}

impl PhysMapper for HhdmPhysMapper {
    #[inline]
    unsafe fn phys_to_ptr<T>(&self, pa: PhysicalAddress) -> NonNull<T> {
        let va = self.base.wrapping_add(pa.as_u64()) as *mut T;
        // SAFETY: the direct map never places anything at address zero.
        unsafe { NonNull::new_unchecked(va) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hhdm_offsets_by_base() {
        let m = HhdmPhysMapper::new(0xffff_8880_0000_0000);
        let p = unsafe { m.phys_to_ptr::<u8>(PhysicalAddress::new(0x1234)) };
        assert_eq!(p.as_ptr() as u64, 0xffff_8880_0000_1234);
        assert_eq!(m.base(), 0xffff_8880_0000_0000);
    }
}
