use crate::PagingLevel;
use pmem_addresses::VirtualAddress;

/// Reasons a software page walk stops short of a translation.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum WalkError {
    /// The address is not sign-extended for the active paging mode.
    #[error("{va} is not canonical for the active paging mode")]
    NonCanonical { va: VirtualAddress },
    /// The entry at `level` is not present.
    #[error("{va} is not mapped ({level} entry not present)")]
    NotMapped { va: VirtualAddress, level: PagingLevel },
    /// A 2 MiB or 1 GiB leaf was hit where a page table was expected.
    #[error("{va} is covered by a large page at {level}")]
    LargePage { va: VirtualAddress, level: PagingLevel },
    /// The entry has bits set that cannot occur at `level` (e.g. `PS` in a PML4E).
    #[error("malformed {level} entry while walking {va}")]
    Malformed { va: VirtualAddress, level: PagingLevel },
}
