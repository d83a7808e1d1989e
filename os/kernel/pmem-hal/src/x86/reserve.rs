use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, Ordering};
use pmem_addresses::{Size4K, VirtualAddress, VirtualPage};

/// One page of kernel image memory. The kernel must map its image with 4 KiB
/// pages for this to be usable as a rogue page.
#[repr(C, align(4096))]
struct PageStorage(UnsafeCell<[u8; 4096]>);

// SAFETY: the contents are only accessed through the rogue mapping while
// the page is reserved.
unsafe impl Sync for PageStorage {}

static PAGE: PageStorage = PageStorage(UnsafeCell::new([0; 4096]));
static RESERVED: AtomicBool = AtomicBool::new(false);

pub(super) fn reserve() -> Option<VirtualPage<Size4K>> {
    if RESERVED.swap(true, Ordering::AcqRel) {
        log::warn!("rogue page storage already reserved");
        return None;
    }
    Some(VirtualAddress::from_ptr(PAGE.0.get()).page())
}

pub(super) fn release(page: VirtualPage<Size4K>) {
    debug_assert_eq!(page.base(), VirtualAddress::from_ptr(PAGE.0.get()));
    RESERVED.store(false, Ordering::Release);
}
