use core::ptr::NonNull;
use core::sync::atomic::{AtomicU64, Ordering};
use pmem_addresses::PhysicalAddress;

/// Reference content of the byte at physical address `pa` right after
/// [`Ram::new`].
#[must_use]
pub const fn pattern_byte(pa: u64) -> u8 {
    let x = pa ^ (pa >> 7) ^ (pa >> 13) ^ (pa >> 21);
    (x.wrapping_mul(0x9E37_79B9) >> 8) as u8
}

/// Simulated physical memory `[0, size)`.
///
/// Stored as 64-bit atomics so paging entries can be loaded and swapped in
/// place; byte accesses go through the containing word.
pub struct Ram {
    words: Box<[AtomicU64]>,
}

impl Ram {
    /// `bytes` of RAM (rounded up to whole pages), filled with [`pattern_byte`].
    #[must_use]
    pub fn new(bytes: u64) -> Self {
        let bytes = bytes.div_ceil(4096) * 4096;
        let words = (0..bytes / 8)
            .map(|w| {
                let base = w * 8;
                let mut v = 0u64;
                for i in 0..8 {
                    v |= u64::from(pattern_byte(base + i)) << (i * 8);
                }
                AtomicU64::new(v)
            })
            .collect();
        Self { words }
    }

    #[must_use]
    pub fn size(&self) -> u64 {
        self.words.len() as u64 * 8
    }

    /// Whether `[pa, pa + len)` lies inside RAM.
    #[must_use]
    pub fn contains(&self, pa: PhysicalAddress, len: u64) -> bool {
        pa.as_u64().checked_add(len).is_some_and(|end| end <= self.size())
    }

    fn word(&self, pa: u64) -> &AtomicU64 {
        assert!(pa < self.size(), "physical address {pa:#x} outside simulated RAM");
        &self.words[(pa / 8) as usize]
    }

    #[must_use]
    pub fn read_u64(&self, pa: PhysicalAddress) -> u64 {
        assert_eq!(pa.as_u64() % 8, 0, "unaligned word access");
        self.word(pa.as_u64()).load(Ordering::Acquire)
    }

    pub fn write_u64(&self, pa: PhysicalAddress, value: u64) {
        assert_eq!(pa.as_u64() % 8, 0, "unaligned word access");
        self.word(pa.as_u64()).store(value, Ordering::Release);
    }

    #[must_use]
    pub fn read_byte(&self, pa: u64) -> u8 {
        (self.word(pa).load(Ordering::Relaxed) >> ((pa % 8) * 8)) as u8
    }

    pub fn write_byte(&self, pa: u64, value: u8) {
        let shift = (pa % 8) * 8;
        let _ = self
            .word(pa)
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |w| {
                Some((w & !(0xff << shift)) | (u64::from(value) << shift))
            });
    }

    /// Copy RAM starting at `pa` into `buf`.
    pub fn read(&self, pa: PhysicalAddress, buf: &mut [u8]) {
        for (i, b) in buf.iter_mut().enumerate() {
            *b = self.read_byte(pa.as_u64() + i as u64);
        }
    }

    /// Copy `data` into RAM starting at `pa`.
    pub fn write(&self, pa: PhysicalAddress, data: &[u8]) {
        for (i, b) in data.iter().enumerate() {
            self.write_byte(pa.as_u64() + i as u64, *b);
        }
    }

    /// Zero a whole 4 KiB frame.
    pub fn zero_frame(&self, base: PhysicalAddress) {
        for off in (0..4096).step_by(8) {
            self.write_u64(PhysicalAddress::new(base.as_u64() + off), 0);
        }
    }

    pub(crate) fn ptr(&self, pa: PhysicalAddress) -> NonNull<u8> {
        assert!(pa.as_u64() < self.size(), "physical address {pa} outside simulated RAM");
        let base = self.words.as_ptr().cast::<u8>().cast_mut();
        // SAFETY: bounds checked above; the words live as long as `self`.
        unsafe { NonNull::new_unchecked(base.add(pa.as_u64() as usize)) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_pattern() {
        let ram = Ram::new(8192);
        let mut buf = [0u8; 32];
        ram.read(PhysicalAddress::new(0x1000), &mut buf);
        for (i, b) in buf.iter().enumerate() {
            assert_eq!(*b, pattern_byte(0x1000 + i as u64));
        }
    }

    #[test]
    fn pattern_differs_between_pages() {
        let a: Vec<u8> = (0..64).map(|i| pattern_byte(0x1000 + i)).collect();
        let b: Vec<u8> = (0..64).map(|i| pattern_byte(0x2000 + i)).collect();
        assert_ne!(a, b);
    }

    #[test]
    fn byte_writes_do_not_disturb_neighbours() {
        let ram = Ram::new(4096);
        let before = ram.read_byte(9);
        ram.write_byte(10, 0xAB);
        assert_eq!(ram.read_byte(10), 0xAB);
        assert_eq!(ram.read_byte(9), before);
    }

    #[test]
    fn bounds() {
        let ram = Ram::new(5000);
        assert_eq!(ram.size(), 8192);
        assert!(ram.contains(PhysicalAddress::new(0x1000), 0x1000));
        assert!(!ram.contains(PhysicalAddress::new(0x1001), 0x1000));
        assert!(!ram.contains(PhysicalAddress::new(u64::MAX), 2));
    }
}
