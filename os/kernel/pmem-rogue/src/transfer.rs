//! # I/O Transfer Engine
//!
//! A request is walked page by page. Each [`Segment`] gets its own
//! [`RogueWindow`](crate::RogueWindow), so other requests can interleave
//! *between* segments but never inside one.

use crate::{PmemError, RoguePage, Segments, TransferError};
use core::sync::atomic::{AtomicBool, Ordering};
use pmem_addresses::PhysicalAddress;
use pmem_hal::RogueHardware;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Direction {
    /// Physical memory to the caller's buffer.
    Read,
    /// The caller's buffer to physical memory.
    Write,
}

#[derive(Debug)]
enum IoBuffer<'a> {
    Read(&'a mut [u8]),
    Write(&'a [u8]),
}

/// A physical read or write of `buffer.len()` bytes starting at `start`.
#[derive(Debug)]
pub struct TransferRequest<'a> {
    start: PhysicalAddress,
    buffer: IoBuffer<'a>,
    cancel: Option<&'a AtomicBool>,
}

impl<'a> TransferRequest<'a> {
    /// Fill `into` from physical memory at `start`.
    #[must_use]
    pub const fn read(start: PhysicalAddress, into: &'a mut [u8]) -> Self {
        Self {
            start,
            buffer: IoBuffer::Read(into),
            cancel: None,
        }
    }

    /// Store `from` into physical memory at `start`.
    #[must_use]
    pub const fn write(start: PhysicalAddress, from: &'a [u8]) -> Self {
        Self {
            start,
            buffer: IoBuffer::Write(from),
            cancel: None,
        }
    }

    /// Stop before the next segment once `flag` is set.
    #[must_use]
    pub const fn with_cancel(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    #[must_use]
    pub const fn direction(&self) -> Direction {
        match self.buffer {
            IoBuffer::Read(_) => Direction::Read,
            IoBuffer::Write(_) => Direction::Write,
        }
    }

    #[must_use]
    pub const fn start(&self) -> PhysicalAddress {
        self.start
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        match &self.buffer {
            IoBuffer::Read(b) => b.len(),
            IoBuffer::Write(b) => b.len(),
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<H: RogueHardware> RoguePage<H> {
    /// Move the bytes of `request` through the rogue page.
    ///
    /// Returns the number of bytes transferred, which is the full length on
    /// success. An empty request moves nothing but still needs an
    /// initialized, unfaulted manager.
    ///
    /// # Errors
    /// [`TransferError`] carrying the bytes moved before the first failing
    /// segment. Its cause is [`PmemError::NotInitialized`] before `init`,
    /// [`PmemError::InvalidAddress`] for ranges that
    /// overflow the address space or hit a rejected frame,
    /// [`PmemError::Fault`] for faulting copies, [`PmemError::Cancelled`] if
    /// the cancellation flag was seen, or whatever the remap reported.
    pub fn readwrite_rogue(&self, request: TransferRequest<'_>) -> Result<usize, TransferError> {
        let len = request.len();
        let TransferRequest {
            start,
            mut buffer,
            cancel,
        } = request;
        if len == 0 {
            return self.ready().map(|()| 0).map_err(|cause| TransferError::new(0, cause));
        }
        let Some(segments) = Segments::new(start, len) else {
            log::warn!("transfer of {len} bytes at {start} overflows the address space");
            return Err(TransferError::new(0, PmemError::InvalidAddress));
        };

        let mut done = 0usize;
        for segment in segments {
            if cancel.is_some_and(|flag| flag.load(Ordering::Acquire)) {
                log::debug!("transfer at {start} cancelled after {done} bytes");
                return Err(TransferError::new(done, PmemError::Cancelled));
            }

            let chunk = done..done + segment.len;
            let result = {
                let mut window = self.window();
                match window.map(segment.start) {
                    Ok(offset) => match &mut buffer {
                        IoBuffer::Read(dst) => window.read(offset, &mut dst[chunk]),
                        IoBuffer::Write(src) => window.write(offset, &src[chunk]),
                    },
                    Err(cause) => Err(TransferError::new(0, cause)),
                }
            };

            if let Err(e) = result {
                let err = TransferError::new(done + e.transferred, e.cause);
                log::warn!("transfer at {start} stopped at {}: {}", segment.start, e.cause);
                return Err(err);
            }
            log::trace!("segment {} ({} bytes) done", segment.start, segment.len);
            done += segment.len;
        }

        Ok(done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_accessors() {
        let mut buf = [0u8; 32];
        let r = TransferRequest::read(PhysicalAddress::new(0x1000), &mut buf);
        assert_eq!(r.direction(), Direction::Read);
        assert_eq!(r.len(), 32);
        assert_eq!(r.start().as_u64(), 0x1000);

        let flag = AtomicBool::new(false);
        let w = TransferRequest::write(PhysicalAddress::new(0x2000), &[]).with_cancel(&flag);
        assert_eq!(w.direction(), Direction::Write);
        assert!(w.is_empty());
    }
}
