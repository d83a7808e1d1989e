use pmem_addresses::PhysicalAddress;
use pmem_paging::MAX_PHYSICAL_ADDRESS_BITS;

/// Memory type the rogue page uses for its target frame.
///
/// Selected through the PTE's `PWT`/`PCD` bits; the PAT index bit of the
/// original entry is left alone.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum CachePolicy {
    /// `PCD=1 PWT=1`: strong uncacheable. Safe for MMIO and avoids aliasing
    /// with cacheable mappings of the same frame.
    #[default]
    Uncached,
    /// `PCD=0 PWT=1`.
    WriteThrough,
    /// `PCD=0 PWT=0`.
    WriteBack,
}

impl CachePolicy {
    #[must_use]
    pub const fn write_through(self) -> bool {
        matches!(self, Self::Uncached | Self::WriteThrough)
    }

    #[must_use]
    pub const fn cache_disabled(self) -> bool {
        matches!(self, Self::Uncached)
    }
}

/// Tunables of a [`RoguePage`](crate::RoguePage).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RogueConfig {
    pub cache_policy: CachePolicy,
    /// Re-walk the tables after every remap and check the rogue page
    /// resolves to the new frame.
    pub verify_remap: bool,
    /// Highest physical address the rogue page may be pointed at.
    pub max_physical_address: PhysicalAddress,
}

impl RogueConfig {
    pub const DEFAULT: Self = Self {
        cache_policy: CachePolicy::Uncached,
        verify_remap: false,
        max_physical_address: PhysicalAddress::new((1 << MAX_PHYSICAL_ADDRESS_BITS) - 1),
    };

    #[must_use]
    pub const fn new() -> Self {
        Self::DEFAULT
    }

    #[must_use]
    pub const fn with_cache_policy(mut self, cache_policy: CachePolicy) -> Self {
        self.cache_policy = cache_policy;
        self
    }

    #[must_use]
    pub const fn with_verify_remap(mut self, verify_remap: bool) -> Self {
        self.verify_remap = verify_remap;
        self
    }

    #[must_use]
    pub const fn with_max_physical_address(mut self, max: PhysicalAddress) -> Self {
        self.max_physical_address = max;
        self
    }
}

impl Default for RogueConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_uncached_52_bit() {
        let c = RogueConfig::default();
        assert_eq!(c.cache_policy, CachePolicy::Uncached);
        assert!(!c.verify_remap);
        assert_eq!(c.max_physical_address.as_u64(), 0x000F_FFFF_FFFF_FFFF);
    }

    #[test]
    fn cache_bits() {
        assert!(CachePolicy::Uncached.cache_disabled() && CachePolicy::Uncached.write_through());
        assert!(!CachePolicy::WriteThrough.cache_disabled() && CachePolicy::WriteThrough.write_through());
        assert!(!CachePolicy::WriteBack.cache_disabled() && !CachePolicy::WriteBack.write_through());
    }
}
