//! `rep movsb` with a recoverable fault point.
//!
//! ```text
//!  copy_with_fixup:
//!        mov  rcx, rdx
//!  pmem_copy_fault_ip:        ◄── a fault here is recoverable
//!        rep  movsb
//!  pmem_copy_fixup_ip:        ◄── handler resumes here
//!        mov  rax, rcx        ; bytes not copied
//!        ret
//! ```
//!
//! `rep movsb` keeps `RCX` up to date after every byte, so resuming at the
//! fixup label after a fault yields exactly how many bytes were left.

use crate::CopyFault;

#[allow(non_upper_case_globals)]
unsafe extern "C" {
    safe static pmem_copy_fault_ip: u8;
    safe static pmem_copy_fixup_ip: u8;
}

/// Copies `len` bytes from `src` to `dst` and returns how many were *not*
/// copied (zero on success).
#[unsafe(naked)]
pub(super) unsafe extern "sysv64" fn copy_with_fixup(dst: *mut u8, src: *const u8, len: usize) -> usize {
    core::arch::naked_asm!(
        "mov rcx, rdx",
        ".globl pmem_copy_fault_ip",
        "pmem_copy_fault_ip:",
        "rep movsb",
        ".globl pmem_copy_fixup_ip",
        "pmem_copy_fixup_ip:",
        "mov rax, rcx",
        "ret",
    );
}

pub(super) const fn outcome(len: usize, remaining: usize) -> Result<(), CopyFault> {
    if remaining == 0 {
        Ok(())
    } else {
        Err(CopyFault {
            copied: len.saturating_sub(remaining),
        })
    }
}

/// Resume address for a kernel-mode fault at `rip`, if the fault happened
/// inside the rogue page copy routine.
#[must_use]
pub fn fixup_for_fault(rip: u64) -> Option<u64> {
    let fault_ip = (&raw const pmem_copy_fault_ip).addr() as u64;
    if rip == fault_ip {
        Some((&raw const pmem_copy_fixup_ip).addr() as u64)
    } else {
        None
    }
}
