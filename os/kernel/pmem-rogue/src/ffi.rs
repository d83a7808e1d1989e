//! # C entry points
//!
//! The device-file handler of the driver talks to one global [`RoguePage`]
//! through these functions. Every function returns a [`PmemStatus`]; `0`
//! means success.
//!
//! | Function | Purpose |
//! |----------|---------|
//! | [`pmem_pte_init`] | reserve the rogue page, locate its PTE |
//! | [`pmem_pte_cleanup`] | restore and release it |
//! | [`pmem_pte_vtop`] | virtual to physical translation |
//! | [`pmem_pte_map_rogue`] | point the rogue page at a physical address |
//! | [`pmem_readwrite_rogue`] | move a [`PmemIo`] request |
//! | [`pmem_copy_fixup`] | page fault handler hook |

use crate::{PmemError, RogueConfig, RoguePage, TransferRequest};
use pmem_addresses::{PhysicalAddress, VirtualAddress};
use pmem_hal::RogueHardware;
use pmem_hal::x86::{HHDM_BASE, X86Hardware, fixup_for_fault};

// SAFETY: these entry points are only called from kernel context, and the
// kernel maps all physical memory at `HHDM_BASE`.
static ROGUE: RoguePage<X86Hardware> = RoguePage::new(unsafe { X86Hardware::new(HHDM_BASE) }, RogueConfig::DEFAULT);

/// Result code of every entry point.
#[repr(i32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PmemStatus {
    Success = 0,
    NotInitialized = 1,
    AlreadyInitialized = 2,
    Unsupported = 3,
    NotMapped = 4,
    InvalidAddress = 5,
    Fault = 6,
    PartialTransfer = 7,
    Cancelled = 8,
    ReservationFailed = 9,
}

impl From<PmemError> for PmemStatus {
    fn from(e: PmemError) -> Self {
        match e {
            PmemError::NotInitialized => Self::NotInitialized,
            PmemError::AlreadyInitialized => Self::AlreadyInitialized,
            PmemError::Unsupported => Self::Unsupported,
            PmemError::NotMapped => Self::NotMapped,
            PmemError::InvalidAddress => Self::InvalidAddress,
            PmemError::Fault => Self::Fault,
            PmemError::PartialTransfer => Self::PartialTransfer,
            PmemError::Cancelled => Self::Cancelled,
            PmemError::ReservationFailed => Self::ReservationFailed,
        }
    }
}

impl<T> From<Result<T, PmemError>> for PmemStatus {
    fn from(r: Result<T, PmemError>) -> Self {
        r.map_or_else(Self::from, |_| Self::Success)
    }
}

/// [`PmemIo::direction`]: physical memory to `buffer`.
pub const PMEM_IO_READ: u32 = 0;
/// [`PmemIo::direction`]: `buffer` to physical memory.
pub const PMEM_IO_WRITE: u32 = 1;

/// One read or write request, updated in place.
#[repr(C)]
#[derive(Debug)]
pub struct PmemIo {
    /// [`PMEM_IO_READ`] or [`PMEM_IO_WRITE`].
    pub direction: u32,
    /// Physical address of the next byte; advanced by the bytes moved.
    pub offset: u64,
    pub buffer: *mut u8,
    pub length: usize,
    /// Bytes moved by the last call, also on failure.
    pub transferred: usize,
}

#[unsafe(no_mangle)]
pub extern "C" fn pmem_pte_init() -> PmemStatus {
    ROGUE.init().into()
}

#[unsafe(no_mangle)]
pub extern "C" fn pmem_pte_cleanup() -> PmemStatus {
    ROGUE.cleanup();
    PmemStatus::Success
}

/// # Safety
/// `paddr` must be null or valid for a `u64` write.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pmem_pte_vtop(vaddr: u64, paddr: *mut u64) -> PmemStatus {
    let Some(out) = (unsafe { paddr.as_mut() }) else {
        return PmemStatus::InvalidAddress;
    };
    match ROGUE.vtop(VirtualAddress::new(vaddr)) {
        Ok(pa) => {
            *out = pa.as_u64();
            PmemStatus::Success
        }
        Err(e) => e.into(),
    }
}

/// Map the frame of `paddr`; the in-page offset goes to `offset` if non-null.
///
/// # Safety
/// `offset` must be null or valid for a `u64` write.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pmem_pte_map_rogue(paddr: u64, offset: *mut u64) -> PmemStatus {
    match ROGUE.map_rogue(PhysicalAddress::new(paddr)) {
        Ok(off) => {
            if let Some(out) = unsafe { offset.as_mut() } {
                *out = off.as_u64();
            }
            PmemStatus::Success
        }
        Err(e) => e.into(),
    }
}

/// # Safety
/// `io` must point to a valid [`PmemIo`] whose `buffer` is valid for
/// `length` bytes in the requested direction.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pmem_readwrite_rogue(io: *mut PmemIo) -> PmemStatus {
    let Some(io) = (unsafe { io.as_mut() }) else {
        return PmemStatus::InvalidAddress;
    };
    // SAFETY: forwarded from the caller.
    unsafe { readwrite_io(&ROGUE, io) }
}

/// Run `io` against `rogue` and update it in place.
///
/// # Safety
/// As for [`pmem_readwrite_rogue`].
unsafe fn readwrite_io<H: RogueHardware>(rogue: &RoguePage<H>, io: &mut PmemIo) -> PmemStatus {
    io.transferred = 0;
    if io.buffer.is_null() && io.length != 0 {
        return PmemStatus::InvalidAddress;
    }

    let start = PhysicalAddress::new(io.offset);
    let request = match (io.direction, io.length) {
        (PMEM_IO_READ | PMEM_IO_WRITE, 0) => TransferRequest::read(start, &mut []),
        (PMEM_IO_READ, len) => TransferRequest::read(start, unsafe { core::slice::from_raw_parts_mut(io.buffer, len) }),
        (PMEM_IO_WRITE, len) => TransferRequest::write(start, unsafe { core::slice::from_raw_parts(io.buffer, len) }),
        (other, _) => {
            log::warn!("unknown transfer direction {other}");
            return PmemStatus::InvalidAddress;
        }
    };

    let (moved, status) = match rogue.readwrite_rogue(request) {
        Ok(n) => (n, PmemStatus::Success),
        Err(e) => (e.transferred, e.kind().into()),
    };
    io.transferred = moved;
    io.offset += moved as u64;
    status
}

/// Resume address for a kernel page fault at `rip`, or `0` if the fault did
/// not happen inside the rogue page copy routine.
#[unsafe(no_mangle)]
pub extern "C" fn pmem_copy_fixup(rip: u64) -> u64 {
    fixup_for_fault(rip).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pmem_paging::PagingMode;
    use pmem_sim::Machine;

    #[test]
    fn status_codes_are_stable() {
        assert_eq!(PmemStatus::Success as i32, 0);
        assert_eq!(PmemStatus::from(PmemError::Fault) as i32, 6);
        assert_eq!(PmemStatus::from(PmemError::ReservationFailed) as i32, 9);
        assert_eq!(PmemStatus::from(Ok::<(), PmemError>(())), PmemStatus::Success);
        assert_eq!(
            PmemStatus::from(Err::<(), _>(PmemError::NotInitialized)),
            PmemStatus::NotInitialized
        );
    }

    #[test]
    fn null_pointers_are_rejected() {
        assert_eq!(unsafe { pmem_pte_vtop(0, core::ptr::null_mut()) }, PmemStatus::InvalidAddress);
        assert_eq!(unsafe { pmem_readwrite_rogue(core::ptr::null_mut()) }, PmemStatus::InvalidAddress);
    }

    fn io(direction: u32, offset: u64, buffer: &mut [u8]) -> PmemIo {
        PmemIo {
            direction,
            offset,
            buffer: buffer.as_mut_ptr(),
            length: buffer.len(),
            transferred: 7,
        }
    }

    fn sim() -> RoguePage<Machine> {
        let r = RoguePage::new(Machine::new(1 << 20, PagingMode::FourLevel), RogueConfig::DEFAULT);
        r.init().unwrap();
        r
    }

    #[test]
    fn empty_io_needs_an_initialized_page() {
        let r = RoguePage::new(Machine::new(1 << 20, PagingMode::FourLevel), RogueConfig::DEFAULT);
        let mut empty = io(PMEM_IO_READ, 0x1000, &mut []);
        empty.buffer = core::ptr::null_mut();
        assert_eq!(unsafe { readwrite_io(&r, &mut empty) }, PmemStatus::NotInitialized);
        assert_eq!(empty.transferred, 0);

        r.init().unwrap();
        assert_eq!(unsafe { readwrite_io(&r, &mut empty) }, PmemStatus::Success);
        assert_eq!((empty.offset, empty.transferred), (0x1000, 0));
    }

    #[test]
    fn io_is_advanced_by_the_bytes_moved() {
        let r = sim();
        let mut buf = vec![0u8; 0x1800];
        let mut req = io(PMEM_IO_READ, 0x2800, &mut buf);
        assert_eq!(unsafe { readwrite_io(&r, &mut req) }, PmemStatus::Success);
        assert_eq!((req.offset, req.transferred), (0x4000, 0x1800));
        assert_eq!(buf, r.hardware().read_phys(PhysicalAddress::new(0x2800), 0x1800));
    }

    #[test]
    fn partial_failure_still_updates_io() {
        let r = sim();
        r.hardware().poison(pmem_addresses::PhysicalPage::from_number(4));
        let mut buf = vec![0u8; 3 * 4096];
        let mut req = io(PMEM_IO_READ, 0x2800, &mut buf);

        assert_eq!(unsafe { readwrite_io(&r, &mut req) }, PmemStatus::Fault);
        assert_eq!(req.transferred, 0x1800);
        assert_eq!(req.offset, 0x4000);

        // Resuming from the updated offset hits the same frame again.
        let mut rest = io(PMEM_IO_READ, req.offset, &mut buf[0x1800..]);
        assert_eq!(unsafe { readwrite_io(&r, &mut rest) }, PmemStatus::Fault);
        assert_eq!((rest.offset, rest.transferred), (0x4000, 0));
    }

    #[test]
    fn writes_and_unknown_directions() {
        let r = sim();
        let mut payload = *b"rogue";
        let mut req = io(PMEM_IO_WRITE, 0x3ffe, &mut payload);
        assert_eq!(unsafe { readwrite_io(&r, &mut req) }, PmemStatus::Success);
        assert_eq!(r.hardware().read_phys(PhysicalAddress::new(0x3ffe), 5), b"rogue");

        let mut bad = io(7, 0x1000, &mut payload);
        assert_eq!(unsafe { readwrite_io(&r, &mut bad) }, PmemStatus::InvalidAddress);
        assert_eq!((bad.offset, bad.transferred), (0x1000, 0));
    }
}
