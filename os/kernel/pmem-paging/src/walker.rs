//! # Software page walk
//!
//! [`PageWalker`] performs the same descent as the MMU, reading each entry
//! through a [`PhysMapper`]. Two queries are offered:
//!
//! - [`PageWalker::translate`] / [`PageWalker::vtop`]: VA → PA, honoring
//!   4 KiB, 2 MiB and 1 GiB leaves.
//! - [`PageWalker::locate_pte`]: the physical location of the 4 KiB PTE that
//!   maps a VA, together with the frames of every table visited on the way.

use crate::{EntryRef, PageEntryBits, PagingLevel, PagingMode, PhysMapper, WalkError};
use core::fmt;
use pmem_addresses::{PhysicalAddress, PhysicalPage, Size4K, VirtualAddress};

/// Table frames visited by a walk, root first.
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct WalkPath {
    tables: [PhysicalPage<Size4K>; 5],
    len: u8,
}

impl WalkPath {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            tables: [PhysicalPage::from_number(0); 5],
            len: 0,
        }
    }

    /// Append a table frame. Silently ignores more than five entries.
    pub fn push(&mut self, table: PhysicalPage<Size4K>) {
        if let Some(slot) = self.tables.get_mut(usize::from(self.len)) {
            *slot = table;
            self.len += 1;
        }
    }

    #[must_use]
    pub fn as_slice(&self) -> &[PhysicalPage<Size4K>] {
        &self.tables[..usize::from(self.len)]
    }

    pub fn iter(&self) -> impl Iterator<Item = PhysicalPage<Size4K>> + '_ {
        self.as_slice().iter().copied()
    }

    #[must_use]
    #[allow(clippy::cast_lossless)]
    pub const fn len(&self) -> usize {
        self.len as usize
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether `frame` backs one of the visited tables.
    #[must_use]
    pub fn contains(&self, frame: PhysicalPage<Size4K>) -> bool {
        self.as_slice().contains(&frame)
    }
}

impl Default for WalkPath {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for WalkPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Result of a successful VA → PA walk.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Translation {
    /// The translated byte address.
    pub physical: PhysicalAddress,
    /// Level of the leaf entry (PT for 4 KiB, PD for 2 MiB, PDPT for 1 GiB).
    pub level: PagingLevel,
    /// Location of the leaf entry.
    pub entry: EntryRef,
}

/// Location and current contents of a 4 KiB PTE.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PteLocation {
    pub entry: EntryRef,
    pub value: PageEntryBits,
    /// Every table frame from the root down to and including the PT.
    pub path: WalkPath,
}

/// Walks one paging hierarchy rooted at a fixed physical frame.
#[derive(Clone, Debug)]
pub struct PageWalker<M> {
    mapper: M,
    root: PhysicalPage<Size4K>,
    mode: PagingMode,
}

impl<M: PhysMapper> PageWalker<M> {
    pub const fn new(mapper: M, root: PhysicalPage<Size4K>, mode: PagingMode) -> Self {
        Self { mapper, root, mode }
    }

    /// Walker for the hierarchy the current CPU is using (`CR3`, `CR4.LA57`).
    ///
    /// # Safety
    /// Must run at CPL0, and `mapper` must cover every paging table.
    #[cfg(feature = "asm")]
    pub unsafe fn from_current(mapper: M) -> Self {
        use pmem_registers::{Cr3, Cr4, LoadRegisterUnsafe};
        let (cr3, cr4) = unsafe { (Cr3::load_unsafe(), Cr4::load_unsafe()) };
        Self::new(mapper, cr3.root_frame(), PagingMode::from_cr4(cr4))
    }

    #[must_use]
    pub const fn root(&self) -> PhysicalPage<Size4K> {
        self.root
    }

    #[must_use]
    pub const fn mode(&self) -> PagingMode {
        self.mode
    }

    #[must_use]
    pub const fn mapper(&self) -> &M {
        &self.mapper
    }

    /// Translate `va` to the physical byte address it maps to.
    ///
    /// # Errors
    /// [`WalkError::NonCanonical`], [`WalkError::NotMapped`] or
    /// [`WalkError::Malformed`].
    ///
    /// # Safety
    /// The root and every table reachable from it must be real paging
    /// tables covered by the mapper.
    pub unsafe fn translate(&self, va: VirtualAddress) -> Result<Translation, WalkError> {
        let (level, entry, value) = unsafe { self.descend(va, |_| {}) }?;
        if !value.present() {
            return Err(WalkError::NotMapped { va, level });
        }

        let (Some(base), Some(size)) = (value.leaf_base(level), level.leaf_size()) else {
            return Err(WalkError::Malformed { va, level });
        };
        let physical = PhysicalAddress::new(base.as_u64() | (va.as_u64() & (size - 1)));
        Ok(Translation {
            physical,
            level,
            entry,
        })
    }

    /// Shorthand for [`translate`](Self::translate) returning only the address.
    ///
    /// # Errors
    /// As for [`translate`](Self::translate).
    ///
    /// # Safety
    /// As for [`translate`](Self::translate).
    pub unsafe fn vtop(&self, va: VirtualAddress) -> Result<PhysicalAddress, WalkError> {
        unsafe { self.translate(va) }.map(|t| t.physical)
    }

    /// Find the PT entry mapping `va`.
    ///
    /// The entry is returned whether or not its present bit is set; all
    /// entries above it must be present.
    ///
    /// # Errors
    /// [`WalkError::LargePage`] if a 2 MiB or 1 GiB leaf covers `va`, plus the
    /// errors of [`translate`](Self::translate).
    ///
    /// # Safety
    /// As for [`translate`](Self::translate).
    pub unsafe fn locate_pte(&self, va: VirtualAddress) -> Result<PteLocation, WalkError> {
        let mut path = WalkPath::new();
        let (level, entry, value) = unsafe { self.descend(va, |table| path.push(table)) }?;
        if level != PagingLevel::Pt {
            log::debug!("{va} sits in a {level} leaf, no PTE to locate");
            return Err(WalkError::LargePage { va, level });
        }

        Ok(PteLocation { entry, value, path })
    }

    /// Descend from the root to the first leaf entry (or the PT entry).
    ///
    /// `visit` sees every table frame before its entry is read.
    unsafe fn descend(
        &self,
        va: VirtualAddress,
        mut visit: impl FnMut(PhysicalPage<Size4K>),
    ) -> Result<(PagingLevel, EntryRef, PageEntryBits), WalkError> {
        if !va.is_canonical(self.mode.virtual_width()) {
            return Err(WalkError::NonCanonical { va });
        }

        let mut table = self.root;
        let mut level = self.mode.top_level();
        loop {
            visit(table);
            let entry = EntryRef::new(table, level.index(va));
            let value = unsafe { entry.load(&self.mapper) };

            if level == PagingLevel::Pt {
                return Ok((level, entry, value));
            }
            if !value.present() {
                return Err(WalkError::NotMapped { va, level });
            }
            if value.is_leaf_at(level) {
                return Ok((level, entry, value));
            }
            if value.large_page() {
                return Err(WalkError::Malformed { va, level });
            }

            let Some(next) = level.next() else {
                return Err(WalkError::Malformed { va, level });
            };
            table = value.frame_4k();
            level = next;
        }
    }
}
