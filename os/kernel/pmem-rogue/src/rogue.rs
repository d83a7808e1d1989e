//! # Rogue Page Manager
//!
//! Owns one reserved kernel page and the physical location of its own PTE.
//! Pointing the page at another frame is a single atomic store into that PTE
//! followed by `invlpg`:
//!
//! ```text
//!            rogue page VA
//!                 │
//!   PT[idx] ──────┘      before: frame of the reserved page
//!     │                  after:  frame of the requested address
//!     ▼
//!  ┌──────────┐  swap(PTE)   ┌──────────┐  invlpg   ┌────────────┐
//!  │ old PTE  │ ───────────► │ new PTE  │ ────────► │ copy bytes │
//!  └──────────┘              └──────────┘           └────────────┘
//! ```
//!
//! All three steps happen inside a [`RogueWindow`], which holds the state
//! lock and the platform critical section.
//!
//! ## States
//!
//! ```text
//!  Uninitialized ──init──► Idle(frame) ──map_rogue──► Idle(frame')
//!        ▲                   │    ▲                        │
//!        └─────cleanup───────┘    └────────────────────────┘
//!        ▲
//!        └─────cleanup───── Faulted ◄── PTE changed behind our back
//! ```

use crate::{CachePolicy, PmemError, RogueConfig, TransferError};
use pmem_addresses::{PageOffset, PhysicalAddress, PhysicalPage, Size4K, VirtualAddress, VirtualPage};
use pmem_hal::{PagingRoot, RogueHardware};
use pmem_paging::{EntryRef, PageEntryBits, PageWalker, WalkPath};
use pmem_sync::{SpinLock, SpinLockGuard};

/// Bookkeeping for an initialized rogue page.
#[derive(Copy, Clone, Debug)]
struct Active {
    page: VirtualPage<Size4K>,
    pte: EntryRef,
    /// PTE value at init, restored at cleanup.
    original: PageEntryBits,
    /// Last value this manager stored into the PTE.
    current: PageEntryBits,
    /// Tables on the walk to the rogue PTE; never valid remap targets.
    path: WalkPath,
    root: PagingRoot,
}

#[derive(Copy, Clone, Debug)]
enum RogueState {
    Uninitialized,
    Idle(Active),
    Faulted(Active),
}

/// Externally visible lifecycle stage.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RogueStatus {
    Uninitialized,
    /// Ready; the rogue page currently shows `frame`.
    Idle { frame: PhysicalPage<Size4K> },
    /// The PTE was found modified; only [`RoguePage::cleanup`] helps.
    Faulted,
}

/// A single remappable kernel page.
///
/// `const`-constructible so it can live in a `static`. Nothing touches the
/// hardware before [`init`](Self::init).
pub struct RoguePage<H> {
    hw: H,
    config: RogueConfig,
    state: SpinLock<RogueState>,
}

impl<H> RoguePage<H> {
    pub const fn new(hw: H, config: RogueConfig) -> Self {
        Self {
            hw,
            config,
            state: SpinLock::new(RogueState::Uninitialized),
        }
    }

    pub const fn hardware(&self) -> &H {
        &self.hw
    }

    pub const fn config(&self) -> &RogueConfig {
        &self.config
    }
}

impl<H: RogueHardware> RoguePage<H> {
    /// Reserve the rogue page and cache the location of its PTE.
    ///
    /// # Errors
    /// - [`PmemError::AlreadyInitialized`] without an intervening [`cleanup`](Self::cleanup).
    /// - [`PmemError::ReservationFailed`] if no page could be reserved.
    /// - [`PmemError::Unsupported`] if the page is not mapped by a present
    ///   4 KiB PTE under present tables.
    pub fn init(&self) -> Result<(), PmemError> {
        let mut state = self.state.lock();
        if !matches!(*state, RogueState::Uninitialized) {
            return Err(PmemError::AlreadyInitialized);
        }

        let root = self.hw.paging_root();
        let Some(page) = self.hw.reserve_page() else {
            log::error!("no virtual page available for the rogue mapping");
            return Err(PmemError::ReservationFailed);
        };

        let walker = PageWalker::new(&self.hw, root.frame, root.mode);
        // SAFETY: the root comes from the hardware and the mapper covers its tables.
        let location = match unsafe { walker.locate_pte(page.base()) } {
            Ok(location) if location.value.present() => location,
            Ok(_) => {
                log::error!("rogue page {page} has no present PTE");
                unsafe { self.hw.release_page(page) };
                return Err(PmemError::Unsupported);
            }
            Err(e) => {
                log::error!("cannot locate PTE of rogue page: {e}");
                unsafe { self.hw.release_page(page) };
                return Err(PmemError::Unsupported);
            }
        };

        *state = RogueState::Idle(Active {
            page,
            pte: location.entry,
            original: location.value,
            current: location.value,
            path: location.path,
            root,
        });
        log::info!(
            "rogue page at {} (PTE at {}, {:?})",
            page.base(),
            location.entry.address(),
            root.mode
        );
        Ok(())
    }

    /// Restore the original mapping and give the page back. Idempotent.
    pub fn cleanup(&self) {
        let _critical = self.hw.enter_critical();
        let mut state = self.state.lock();
        let (RogueState::Idle(active) | RogueState::Faulted(active)) = *state else {
            return;
        };
        *state = RogueState::Uninitialized;

        // SAFETY: the PTE belongs to our reserved page.
        unsafe { active.pte.swap(&self.hw, active.original) };
        self.hw.invalidate_page(active.page);
        // SAFETY: reserved in `init`, PTE restored above.
        unsafe { self.hw.release_page(active.page) };
        log::info!("rogue page at {} released", active.page.base());
    }

    /// Point the rogue page at the frame containing `paddr`.
    ///
    /// Returns the offset of `paddr` inside the rogue page.
    ///
    /// # Errors
    /// - [`PmemError::NotInitialized`] before [`init`](Self::init).
    /// - [`PmemError::InvalidAddress`] for frames above the configured limit
    ///   or frames holding the rogue page's own paging tables.
    /// - [`PmemError::Fault`] if the PTE was changed by someone else.
    pub fn map_rogue(&self, paddr: PhysicalAddress) -> Result<PageOffset<Size4K>, PmemError> {
        self.window().map(paddr)
    }

    /// Translate `va` with the paging root captured at init.
    ///
    /// # Errors
    /// [`PmemError::NotInitialized`] before [`init`](Self::init),
    /// [`PmemError::NotMapped`] for unmapped or non-canonical addresses.
    pub fn vtop(&self, va: VirtualAddress) -> Result<PhysicalAddress, PmemError> {
        let root = match *self.state.lock() {
            RogueState::Uninitialized => return Err(PmemError::NotInitialized),
            RogueState::Idle(active) | RogueState::Faulted(active) => active.root,
        };
        let walker = PageWalker::new(&self.hw, root.frame, root.mode);
        // SAFETY: the root comes from the hardware and the mapper covers its tables.
        unsafe { walker.vtop(va) }.map_err(PmemError::from)
    }

    /// Fails the way a remap would if the manager cannot take one.
    pub(crate) fn ready(&self) -> Result<(), PmemError> {
        match *self.state.lock() {
            RogueState::Uninitialized => Err(PmemError::NotInitialized),
            RogueState::Faulted(_) => Err(PmemError::Fault),
            RogueState::Idle(_) => Ok(()),
        }
    }

    #[must_use]
    pub fn status(&self) -> RogueStatus {
        match *self.state.lock() {
            RogueState::Uninitialized => RogueStatus::Uninitialized,
            RogueState::Idle(active) => RogueStatus::Idle {
                frame: active.current.frame_4k(),
            },
            RogueState::Faulted(_) => RogueStatus::Faulted,
        }
    }

    /// Virtual address of the rogue page, once initialized.
    #[must_use]
    pub fn rogue_page(&self) -> Option<VirtualPage<Size4K>> {
        match *self.state.lock() {
            RogueState::Uninitialized => None,
            RogueState::Idle(active) | RogueState::Faulted(active) => Some(active.page),
        }
    }

    /// Enter the critical section and take the state lock.
    ///
    /// Spins while another CPU holds the window.
    pub fn window(&self) -> RogueWindow<'_, H> {
        let critical = self.hw.enter_critical();
        RogueWindow {
            state: self.state.lock(),
            _critical: critical,
            hw: &self.hw,
            config: &self.config,
        }
    }
}

/// PTE value that maps `frame` with the rogue page's access rights.
///
/// Starts from the original entry so OS-defined and PAT bits survive.
fn rogue_entry(original: PageEntryBits, frame: PhysicalPage<Size4K>, policy: CachePolicy) -> PageEntryBits {
    original
        .with_frame_4k(frame)
        .with_present(true)
        .with_writable(true)
        .with_no_execute(true)
        .with_global(false)
        .with_accessed(false)
        .with_dirty(false)
        .with_write_through(policy.write_through())
        .with_cache_disabled(policy.cache_disabled())
}

/// The CPU may set A and D at any time.
fn without_hw_bits(e: PageEntryBits) -> PageEntryBits {
    e.with_accessed(false).with_dirty(false)
}

/// Exclusive access to the rogue page: state lock plus critical section.
///
/// Remapping and copying through the page are only possible while holding
/// one, so {remap, invalidate, copy} for one segment cannot interleave with
/// another. Dropping the window unlocks first, then leaves the critical
/// section.
pub struct RogueWindow<'a, H: RogueHardware + 'a> {
    state: SpinLockGuard<'a, RogueState>,
    _critical: H::Guard<'a>,
    hw: &'a H,
    config: &'a RogueConfig,
}

impl<H: RogueHardware> RogueWindow<'_, H> {
    fn active(&self) -> Result<Active, PmemError> {
        match *self.state {
            RogueState::Uninitialized => Err(PmemError::NotInitialized),
            RogueState::Faulted(_) => Err(PmemError::Fault),
            RogueState::Idle(active) => Ok(active),
        }
    }

    fn fault(&mut self, active: Active) -> PmemError {
        *self.state = RogueState::Faulted(active);
        PmemError::Fault
    }

    /// See [`RoguePage::map_rogue`].
    ///
    /// # Errors
    /// As for [`RoguePage::map_rogue`].
    pub fn map(&mut self, paddr: PhysicalAddress) -> Result<PageOffset<Size4K>, PmemError> {
        let mut active = self.active()?;
        let (frame, offset) = paddr.split::<Size4K>();

        if paddr > self.config.max_physical_address {
            log::warn!("refusing to map {paddr}: above {}", self.config.max_physical_address);
            return Err(PmemError::InvalidAddress);
        }
        if active.path.contains(frame) {
            log::warn!("refusing to map {frame}: it holds a paging table of the rogue page");
            return Err(PmemError::InvalidAddress);
        }

        let new = rogue_entry(active.original, frame, self.config.cache_policy);
        // SAFETY: the PTE belongs to our reserved page.
        let old = unsafe { active.pte.swap(self.hw, new) };
        self.hw.invalidate_page(active.page);

        if without_hw_bits(old) != without_hw_bits(active.current) {
            log::error!(
                "rogue PTE at {} modified externally ({:#x}, expected {:#x})",
                active.pte.address(),
                old.into_bits(),
                active.current.into_bits()
            );
            active.current = new;
            return Err(self.fault(active));
        }
        active.current = new;

        if self.config.verify_remap {
            let walker = PageWalker::new(self.hw, active.root.frame, active.root.mode);
            // SAFETY: the root comes from the hardware and the mapper covers its tables.
            let seen = unsafe { walker.vtop(active.page.base()) };
            if seen != Ok(frame.base()) {
                log::error!("rogue page resolves to {seen:?} after remap to {frame}");
                return Err(self.fault(active));
            }
        }

        *self.state = RogueState::Idle(active);
        log::trace!("rogue page -> {frame}");
        Ok(offset)
    }

    fn checked_target(&self, offset: PageOffset<Size4K>, len: usize) -> Result<VirtualAddress, TransferError> {
        let active = self.active().map_err(|cause| TransferError::new(0, cause))?;
        if len as u64 > offset.remaining() {
            return Err(TransferError::new(0, PmemError::InvalidAddress));
        }
        Ok(active.page.join(offset))
    }

    /// Copy from the currently mapped frame, starting at `offset`, into `dst`.
    ///
    /// # Errors
    /// [`PmemError::Fault`] with the bytes copied so far if the access
    /// faulted; [`PmemError::InvalidAddress`] if the range leaves the page.
    pub fn read(&self, offset: PageOffset<Size4K>, dst: &mut [u8]) -> Result<(), TransferError> {
        let src = self.checked_target(offset, dst.len())?;
        // SAFETY: `src..src + len` lies inside our reserved page.
        unsafe { self.hw.read_window(src, dst) }.map_err(|f| TransferError::new(f.copied, PmemError::Fault))
    }

    /// Copy `src` into the currently mapped frame, starting at `offset`.
    ///
    /// # Errors
    /// As for [`read`](Self::read).
    pub fn write(&self, offset: PageOffset<Size4K>, src: &[u8]) -> Result<(), TransferError> {
        let dst = self.checked_target(offset, src.len())?;
        // SAFETY: `dst..dst + len` lies inside our reserved page.
        unsafe { self.hw.write_window(dst, src) }.map_err(|f| TransferError::new(f.copied, PmemError::Fault))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rogue_entry_forces_access_bits() {
        // Present, global, accessed, dirty, PAT, OS bit 9, frame 0x55.
        let original = PageEntryBits::from_bits(0x55_000 | 1 | (1 << 5) | (1 << 6) | (1 << 7) | (1 << 8) | (1 << 9));
        let e = rogue_entry(original, PhysicalPage::from_number(0x1234), CachePolicy::Uncached);

        assert_eq!(e.frame_4k().number(), 0x1234);
        assert!(e.present() && e.writable() && e.no_execute());
        assert!(!e.global() && !e.accessed() && !e.dirty());
        assert!(e.cache_disabled() && e.write_through());
        assert!(e.large_page(), "PAT bit must be preserved");
        assert_eq!(e.os_low(), 1);
    }

    #[test]
    fn rogue_entry_follows_cache_policy() {
        let original = PageEntryBits::new().with_present(true).with_cache_disabled(true);
        let wb = rogue_entry(original, PhysicalPage::from_number(1), CachePolicy::WriteBack);
        assert!(!wb.cache_disabled() && !wb.write_through());
        let wt = rogue_entry(original, PhysicalPage::from_number(1), CachePolicy::WriteThrough);
        assert!(!wt.cache_disabled() && wt.write_through());
    }

    #[test]
    fn hardware_bits_are_ignored_when_comparing() {
        let e = PageEntryBits::new().with_present(true);
        assert_eq!(
            without_hw_bits(e.with_accessed(true).with_dirty(true)),
            without_hw_bits(e)
        );
        assert_ne!(without_hw_bits(e.with_writable(true)), without_hw_bits(e));
    }
}
