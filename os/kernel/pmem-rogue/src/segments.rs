use core::iter::FusedIterator;
use pmem_addresses::{PageOffset, PhysicalAddress, PhysicalPage, Size4K};

/// Part of a request that falls into one 4 KiB frame.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Segment {
    pub start: PhysicalAddress,
    pub len: usize,
}

impl Segment {
    #[must_use]
    pub const fn frame(&self) -> PhysicalPage<Size4K> {
        self.start.page()
    }

    #[must_use]
    pub const fn offset(&self) -> PageOffset<Size4K> {
        self.start.offset()
    }
}

/// Splits `[start, start + len)` into page-bounded [`Segment`]s, lowest first.
///
/// Single pass: not `Clone`, and cannot be rewound.
#[derive(Debug)]
pub struct Segments {
    next: u64,
    end: u64,
}

impl Segments {
    /// `None` if the range leaves the 64-bit address space.
    #[must_use]
    pub fn new(start: PhysicalAddress, len: usize) -> Option<Self> {
        let end = start.as_u64().checked_add(len as u64)?;
        Some(Self {
            next: start.as_u64(),
            end,
        })
    }

    /// Bytes not yet handed out.
    #[must_use]
    pub const fn remaining_bytes(&self) -> u64 {
        self.end - self.next
    }
}

impl Iterator for Segments {
    type Item = Segment;

    #[allow(clippy::cast_possible_truncation)]
    fn next(&mut self) -> Option<Segment> {
        if self.next >= self.end {
            return None;
        }
        let room = PageOffset::<Size4K>::from_raw(self.next).remaining();
        let len = room.min(self.end - self.next);
        let segment = Segment {
            start: PhysicalAddress::new(self.next),
            len: len as usize,
        };
        self.next += len;
        Some(segment)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = if self.next >= self.end {
            0
        } else {
            let first = PhysicalAddress::new(self.next).page::<Size4K>().number();
            let last = PhysicalAddress::new(self.end - 1).page::<Size4K>().number();
            usize::try_from(last - first + 1).unwrap_or(usize::MAX)
        };
        (n, Some(n))
    }
}

impl ExactSizeIterator for Segments {}
impl FusedIterator for Segments {}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(start: u64, len: usize) -> Vec<(u64, usize)> {
        Segments::new(PhysicalAddress::new(start), len)
            .unwrap()
            .map(|s| (s.start.as_u64(), s.len))
            .collect()
    }

    #[test]
    fn aligned_request_gives_whole_pages() {
        assert_eq!(split(0x2000, 0x3000), [(0x2000, 0x1000), (0x3000, 0x1000), (0x4000, 0x1000)]);
    }

    #[test]
    fn unaligned_request_has_partial_ends() {
        assert_eq!(
            split(0x1ff0, 0x1020),
            [(0x1ff0, 0x10), (0x2000, 0x1000), (0x3000, 0x10)]
        );
    }

    #[test]
    fn small_request_inside_one_page() {
        let segs = split(0x1004, 16);
        assert_eq!(segs, [(0x1004, 16)]);
        let s = Segments::new(PhysicalAddress::new(0x1004), 16).unwrap().next().unwrap();
        assert_eq!(s.frame().number(), 1);
        assert_eq!(s.offset().as_u64(), 4);
    }

    #[test]
    fn empty_and_overflowing_ranges() {
        assert!(split(0x1000, 0).is_empty());
        assert!(Segments::new(PhysicalAddress::new(u64::MAX - 4), 16).is_none());
    }

    #[test]
    fn exact_size_and_fused() {
        let mut s = Segments::new(PhysicalAddress::new(0xff8), 0x1010).unwrap();
        assert_eq!(s.len(), 3);
        assert_eq!(s.remaining_bytes(), 0x1010);
        s.next();
        assert_eq!(s.len(), 2);
        s.by_ref().for_each(drop);
        assert!(s.next().is_none());
        assert!(s.next().is_none());
        assert_eq!(s.len(), 0);
    }
}
