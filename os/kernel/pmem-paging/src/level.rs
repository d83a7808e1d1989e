use core::fmt;
use pmem_addresses::{PageSize, Size1G, Size2M, Size4K, VirtualAddress};

/// One level of the x86-64 paging hierarchy, root-most first.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum PagingLevel {
    Pml5,
    Pml4,
    Pdpt,
    Pd,
    Pt,
}

impl PagingLevel {
    /// Lowest virtual address bit indexed by this level.
    #[inline]
    #[must_use]
    pub const fn shift(self) -> u32 {
        match self {
            Self::Pml5 => 48,
            Self::Pml4 => 39,
            Self::Pdpt => 30,
            Self::Pd => 21,
            Self::Pt => 12,
        }
    }

    /// 9-bit table index of `va` at this level.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn index(self, va: VirtualAddress) -> u16 {
        ((va.as_u64() >> self.shift()) & 0x1ff) as u16
    }

    /// Size of the memory a leaf at this level maps, if leaves may occur here.
    #[inline]
    #[must_use]
    pub const fn leaf_size(self) -> Option<u64> {
        match self {
            Self::Pt => Some(Size4K::SIZE),
            Self::Pd => Some(Size2M::SIZE),
            Self::Pdpt => Some(Size1G::SIZE),
            Self::Pml4 | Self::Pml5 => None,
        }
    }

    /// The level below, or `None` for the PT.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Pml5 => Some(Self::Pml4),
            Self::Pml4 => Some(Self::Pdpt),
            Self::Pdpt => Some(Self::Pd),
            Self::Pd => Some(Self::Pt),
            Self::Pt => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pml5 => "PML5",
            Self::Pml4 => "PML4",
            Self::Pdpt => "PDPT",
            Self::Pd => "PD",
            Self::Pt => "PT",
        }
    }
}

impl fmt::Display for PagingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_follow_bit_layout() {
        // PML4=1, PDPT=2, PD=3, PT=4, offset=0x567
        let va = VirtualAddress::new((1 << 39) | (2 << 30) | (3 << 21) | (4 << 12) | 0x567);
        assert_eq!(PagingLevel::Pml4.index(va), 1);
        assert_eq!(PagingLevel::Pdpt.index(va), 2);
        assert_eq!(PagingLevel::Pd.index(va), 3);
        assert_eq!(PagingLevel::Pt.index(va), 4);
        assert_eq!(PagingLevel::Pml5.index(va), 0);
    }

    #[test]
    fn levels_descend_to_pt() {
        let mut level = PagingLevel::Pml5;
        let mut seen = 1;
        while let Some(next) = level.next() {
            assert!(next > level);
            level = next;
            seen += 1;
        }
        assert_eq!(level, PagingLevel::Pt);
        assert_eq!(seen, 5);
        assert_eq!(PagingLevel::Pd.leaf_size(), Some(2 * 1024 * 1024));
        assert_eq!(PagingLevel::Pml4.leaf_size(), None);
    }
}
