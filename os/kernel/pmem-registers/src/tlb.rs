//! # Single-page TLB invalidation

use pmem_addresses::{Size4K, VirtualPage};

/// Invalidate the TLB entry (and paging-structure caches) for one 4 KiB page
/// on the current CPU, including global entries.
///
/// # Safety
/// Must run at CPL0.
#[inline]
pub unsafe fn invlpg(page: VirtualPage<Size4K>) {
    let va = page.base().as_u64();
    unsafe {
        core::arch::asm!("invlpg [{}]", in(reg) va, options(nostack, preserves_flags));
    }
}
