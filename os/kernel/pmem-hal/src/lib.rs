//! # Machine services for the rogue page
//!
//! The rogue page code never touches the hardware directly. Everything it
//! needs from the machine is one of the seams below, and [`RogueHardware`]
//! bundles them.
//!
//! | Trait | Service | x86-64 kernel |
//! |-------|---------|---------------|
//! | [`PhysMapper`] | see a physical table frame | higher-half direct map |
//! | [`PagingRootSource`] | active root frame and paging depth | `CR3`, `CR4.LA57` |
//! | [`TlbInvalidator`] | drop a cached translation | `invlpg` |
//! | [`FaultSafeCopy`] | copy through the rogue page without crashing | `rep movsb` with a fixup |
//! | [`PageReservation`] | a private virtual page | page-aligned static |
//! | [`CriticalSection`] | keep the CPU on the current task | `cli`/`sti` (feature `irq`) |
//!
//! The x86-64 implementations live in [`x86`] (feature `asm`). Host tests use
//! the simulated machine from `pmem-sim` instead.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod copy;
#[cfg(feature = "asm")]
pub mod x86;

pub use crate::copy::{CopyFault, FaultSafeCopy};
pub use pmem_paging::PhysMapper;

use pmem_addresses::{PhysicalPage, Size4K, VirtualPage};
use pmem_paging::PagingMode;

/// Root of the active paging hierarchy.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PagingRoot {
    pub frame: PhysicalPage<Size4K>,
    pub mode: PagingMode,
}

/// Reads the paging root the current CPU is using.
pub trait PagingRootSource {
    fn paging_root(&self) -> PagingRoot;
}

/// Invalidates cached translations.
pub trait TlbInvalidator {
    /// Drop any cached translation for `page` on the current CPU.
    fn invalidate_page(&self, page: VirtualPage<Size4K>);
}

/// Hands out a private, 4 KiB-mapped virtual page.
///
/// The page must be backed by a present PTE for as long as it is reserved,
/// and nobody else may touch that PTE.
pub trait PageReservation {
    /// Reserve a page, or `None` if none is available.
    fn reserve_page(&self) -> Option<VirtualPage<Size4K>>;

    /// Give a reserved page back.
    ///
    /// # Safety
    /// `page` must come from [`reserve_page`](Self::reserve_page) on the same
    /// object, and its PTE must hold the value it had when it was reserved.
    unsafe fn release_page(&self, page: VirtualPage<Size4K>);
}

/// Keeps the current CPU from being preempted or interrupted while the
/// returned guard lives.
pub trait CriticalSection {
    type Guard<'a>
    where
        Self: 'a;

    fn enter_critical(&self) -> Self::Guard<'_>;
}

/// Everything the rogue page needs from the machine.
pub trait RogueHardware:
    PhysMapper + PagingRootSource + TlbInvalidator + FaultSafeCopy + PageReservation + CriticalSection + Sync
{
}

impl<T> RogueHardware for T where
    T: PhysMapper
        + PagingRootSource
        + TlbInvalidator
        + FaultSafeCopy
        + PageReservation
        + CriticalSection
        + Sync
{
}
