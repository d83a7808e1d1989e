use crate::PagingLevel;
use pmem_registers::cr4::Cr4;

/// Depth of the active paging hierarchy.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum PagingMode {
    /// PML4 root, 48-bit virtual addresses.
    #[default]
    FourLevel,
    /// PML5 root, 57-bit virtual addresses (`CR4.LA57 = 1`).
    FiveLevel,
}

impl PagingMode {
    #[inline]
    #[must_use]
    pub const fn from_la57(la57: bool) -> Self {
        if la57 { Self::FiveLevel } else { Self::FourLevel }
    }

    #[inline]
    #[must_use]
    pub const fn from_cr4(cr4: Cr4) -> Self {
        Self::from_la57(cr4.la57())
    }

    /// The level whose table `CR3` points at.
    #[inline]
    #[must_use]
    pub const fn top_level(self) -> PagingLevel {
        match self {
            Self::FourLevel => PagingLevel::Pml4,
            Self::FiveLevel => PagingLevel::Pml5,
        }
    }

    /// Number of significant virtual address bits.
    #[inline]
    #[must_use]
    pub const fn virtual_width(self) -> u32 {
        match self {
            Self::FourLevel => 48,
            Self::FiveLevel => 57,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn la57_selects_five_levels() {
        assert_eq!(PagingMode::from_cr4(Cr4::new().with_la57(true)), PagingMode::FiveLevel);
        assert_eq!(PagingMode::from_cr4(Cr4::new()), PagingMode::FourLevel);
        assert_eq!(PagingMode::FiveLevel.top_level(), PagingLevel::Pml5);
        assert_eq!(PagingMode::FourLevel.virtual_width(), 48);
    }
}
