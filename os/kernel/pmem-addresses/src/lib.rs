//! # Physical and Virtual Address Types
//!
//! Zero-cost wrappers that keep physical and virtual addresses apart at the
//! type level. Everything in the rogue page code path talks in these types;
//! raw `u64` values only appear at the page-table and C boundaries.
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`PhysicalAddress`] | A byte address in physical RAM (or MMIO). |
//! | [`VirtualAddress`] | A byte address in the current address space. |
//! | [`PhysicalPage<S>`] | A page-aligned physical base for page size `S`. |
//! | [`VirtualPage<S>`] | A page-aligned virtual base for page size `S`. |
//! | [`PageOffset<S>`] | A byte offset inside a page of size `S`. |
//!
//! ## Page sizes
//!
//! The three x86-64 leaf sizes are modelled as marker types implementing
//! [`PageSize`]: [`Size4K`], [`Size2M`] and [`Size1G`].
//!
//! ```rust
//! # use pmem_addresses::*;
//! let pa = PhysicalAddress::new(0x0000_0001_2345_6789);
//! let (frame, off) = pa.split::<Size4K>();
//! assert_eq!(frame.base().as_u64(), 0x0000_0001_2345_6000);
//! assert_eq!(off.as_u64(), 0x789);
//! assert_eq!(frame.join(off), pa);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(clippy::inline_always)]

mod page_size;
mod physical;
mod virt;

pub use page_size::{PageSize, Size1G, Size2M, Size4K};
pub use physical::{PhysicalAddress, PhysicalPage};
pub use virt::{VirtualAddress, VirtualPage};

use core::fmt;
use core::marker::PhantomData;

/// Byte offset inside a page of size `S` (always `< S::SIZE`).
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PageOffset<S: PageSize> {
    value: u64,
    _size: PhantomData<S>,
}

impl<S: PageSize> PageOffset<S> {
    /// The zero offset (start of the page).
    pub const ZERO: Self = Self {
        value: 0,
        _size: PhantomData,
    };

    /// Builds an offset from the low `S::SHIFT` bits of `value`.
    ///
    /// Higher bits are discarded; debug builds assert that there were none.
    #[inline]
    #[must_use]
    pub fn new(value: u64) -> Self {
        debug_assert!(value < S::SIZE, "offset must be smaller than the page");
        Self::from_raw(value)
    }

    /// Extracts the in-page offset of any raw address.
    #[inline]
    #[must_use]
    pub const fn from_raw(addr: u64) -> Self {
        Self {
            value: addr & (S::SIZE - 1),
            _size: PhantomData,
        }
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.value
    }

    /// The offset as a slice index.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn as_usize(self) -> usize {
        self.value as usize
    }

    /// Bytes left in the page from this offset to its end.
    #[inline]
    #[must_use]
    pub const fn remaining(self) -> u64 {
        S::SIZE - self.value
    }
}

impl<S: PageSize> fmt::Debug for PageOffset<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PageOffset<{}>({:#X})", S::as_str(), self.value)
    }
}

impl<S: PageSize> fmt::Display for PageOffset<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#X}", self.value)
    }
}

/// Align `x` down to a multiple of `a`.
///
/// `a` must be a non-zero power of two.
///
/// ```rust
/// # use pmem_addresses::align_down;
/// assert_eq!(align_down(0x1fff, 0x1000), 0x1000);
/// assert_eq!(align_down(0x2000, 0x1000), 0x2000);
/// ```
#[inline(always)]
#[must_use]
pub const fn align_down(x: u64, a: u64) -> u64 {
    x & !(a - 1)
}

/// Align `x` up to a multiple of `a`, or `None` on overflow.
///
/// `a` must be a non-zero power of two.
///
/// ```rust
/// # use pmem_addresses::checked_align_up;
/// assert_eq!(checked_align_up(0x1001, 0x1000), Some(0x2000));
/// assert_eq!(checked_align_up(u64::MAX, 0x1000), None);
/// ```
#[inline(always)]
#[must_use]
pub const fn checked_align_up(x: u64, a: u64) -> Option<u64> {
    match x.checked_add(a - 1) {
        Some(v) => Some(v & !(a - 1)),
        None => None,
    }
}
