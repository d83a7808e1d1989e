//! Interrupt masking for short kernel critical sections (x86-64).

/// Bit 9 of `RFLAGS`.
const RFLAGS_IF: u64 = 1 << 9;

/// Current `RFLAGS` value.
#[inline]
#[must_use]
pub fn rflags() -> u64 {
    let r: u64;
    unsafe { core::arch::asm!("pushfq; pop {}", out(reg) r, options(preserves_flags)) }
    r
}

/// RAII guard: disables interrupts on creation, restores the previous `IF`
/// state on drop.
///
/// Only valid where `cli`/`sti` are permitted (CPL0).
///
/// ```no_run
/// use pmem_sync::IrqGuard;
///
/// {
///     let _irq = IrqGuard::new();
///     // no interrupt can preempt this CPU here
/// }
/// ```
pub struct IrqGuard {
    were_enabled: bool,
}

impl IrqGuard {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        let were_enabled = rflags() & RFLAGS_IF != 0;
        if were_enabled {
            unsafe { core::arch::asm!("cli", options(nomem, nostack, preserves_flags)) }
        }
        Self { were_enabled }
    }

    /// Whether interrupts were enabled before this guard masked them.
    #[inline]
    #[must_use]
    pub const fn were_enabled(&self) -> bool {
        self.were_enabled
    }
}

impl Default for IrqGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for IrqGuard {
    fn drop(&mut self) {
        if self.were_enabled {
            unsafe { core::arch::asm!("sti", options(nomem, nostack, preserves_flags)) }
        }
    }
}
