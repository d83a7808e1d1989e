use pmem_addresses::VirtualAddress;

/// A copy through the rogue page hit a fault.
///
/// `copied` bytes were transferred before the faulting access.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
#[error("memory fault after {copied} bytes")]
pub struct CopyFault {
    pub copied: usize,
}

/// Byte copies that turn a hardware fault into an error instead of a crash.
///
/// The rogue page may point at a frame that does not decode (a hole in the
/// physical address space, a device that aborts reads), so a plain
/// `memcpy` is not an option.
pub trait FaultSafeCopy {
    /// Copy `dst.len()` bytes starting at `src` into `dst`.
    ///
    /// # Errors
    /// [`CopyFault`] with the number of bytes that made it into `dst`.
    ///
    /// # Safety
    /// `src .. src + dst.len()` must lie inside one mapped virtual page the
    /// caller owns.
    unsafe fn read_window(&self, src: VirtualAddress, dst: &mut [u8]) -> Result<(), CopyFault>;

    /// Copy `src` to the memory starting at `dst`.
    ///
    /// # Errors
    /// [`CopyFault`] with the number of bytes written before the fault.
    ///
    /// # Safety
    /// As for [`read_window`](Self::read_window).
    unsafe fn write_window(&self, dst: VirtualAddress, src: &[u8]) -> Result<(), CopyFault>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_reports_progress() {
        let f = CopyFault { copied: 12 };
        assert_eq!(f.to_string(), "memory fault after 12 bytes");
    }
}
