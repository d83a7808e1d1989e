use crate::{PageOffset, PageSize};
use core::fmt;
use core::marker::PhantomData;

/// Virtual memory address in the current address space.
///
/// No canonicality is enforced at construction; see
/// [`VirtualAddress::is_canonical`].
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualAddress(u64);

/// Page-aligned virtual base for page size `S`.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualPage<S: PageSize> {
    base: u64,
    _size: PhantomData<S>,
}

impl VirtualAddress {
    #[inline]
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(v)
    }

    #[inline]
    #[must_use]
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self(ptr as u64)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// The address as a raw pointer. Dereferencing it is up to the caller.
    #[inline]
    #[must_use]
    pub const fn as_ptr<T>(self) -> *const T {
        self.0 as *const T
    }

    #[inline]
    #[must_use]
    pub const fn as_mut_ptr<T>(self) -> *mut T {
        self.0 as *mut T
    }

    #[inline]
    #[must_use]
    pub const fn page<S: PageSize>(self) -> VirtualPage<S> {
        VirtualPage::from_addr(self)
    }

    #[inline]
    #[must_use]
    pub const fn offset<S: PageSize>(self) -> PageOffset<S> {
        PageOffset::from_raw(self.0)
    }

    #[inline]
    #[must_use]
    pub const fn split<S: PageSize>(self) -> (VirtualPage<S>, PageOffset<S>) {
        (self.page::<S>(), self.offset::<S>())
    }

    /// Whether bits `63..width` are a sign extension of bit `width - 1`.
    ///
    /// `width` is 48 for 4-level paging and 57 for 5-level paging.
    #[inline]
    #[must_use]
    pub const fn is_canonical(self, width: u32) -> bool {
        debug_assert!(width > 0 && width < 64);
        let shift = 64 - width;
        #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
        let extended = (((self.0 << shift) as i64) >> shift) as u64;
        extended == self.0
    }
}

impl<S: PageSize> VirtualPage<S> {
    /// The page containing `addr` (aligns down).
    #[inline]
    #[must_use]
    pub const fn from_addr(addr: VirtualAddress) -> Self {
        Self {
            base: addr.0 & !(S::SIZE - 1),
            _size: PhantomData,
        }
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> VirtualAddress {
        VirtualAddress(self.base)
    }

    #[inline]
    #[must_use]
    pub const fn join(self, off: PageOffset<S>) -> VirtualAddress {
        VirtualAddress(self.base | off.as_u64())
    }

    #[inline]
    #[must_use]
    pub const fn contains(self, addr: VirtualAddress) -> bool {
        addr.0 & !(S::SIZE - 1) == self.base
    }
}

impl fmt::Debug for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VA(0x{:016X})", self.0)
    }
}

impl fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

impl<S: PageSize> fmt::Debug for VirtualPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtualPage<{}>(0x{:016X})", S::as_str(), self.base)
    }
}

impl<S: PageSize> fmt::Display for VirtualPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}/{}", self.base, S::as_str())
    }
}

impl From<u64> for VirtualAddress {
    #[inline]
    fn from(v: u64) -> Self {
        Self(v)
    }
}

impl<S: PageSize> From<VirtualPage<S>> for VirtualAddress {
    #[inline]
    fn from(page: VirtualPage<S>) -> Self {
        page.base()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Size1G, Size4K};

    #[test]
    fn canonical_addresses() {
        assert!(VirtualAddress::new(0x0000_7FFF_FFFF_FFFF).is_canonical(48));
        assert!(VirtualAddress::new(0xFFFF_8000_0000_0000).is_canonical(48));
        assert!(!VirtualAddress::new(0x0000_8000_0000_0000).is_canonical(48));
        assert!(VirtualAddress::new(0x0000_8000_0000_0000).is_canonical(57));
        assert!(!VirtualAddress::new(0x0100_0000_0000_0000).is_canonical(57));
    }

    #[test]
    fn page_split_roundtrip() {
        let va = VirtualAddress::new(0xFFFF_FFFF_8000_1234);
        let (page, off) = va.split::<Size4K>();
        assert_eq!(page.base().as_u64(), 0xFFFF_FFFF_8000_1000);
        assert_eq!(page.join(off), va);
        assert!(page.contains(va));

        let giant = va.page::<Size1G>();
        assert_eq!(giant.base().as_u64(), 0xFFFF_FFFF_8000_0000);
    }
}
