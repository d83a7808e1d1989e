//! # Typed x86-64 Control Registers
//!
//! Only what the page walker needs: [`Cr3`] for the paging root and [`Cr4`]
//! for the paging shape (4- vs 5-level), plus the single-page TLB
//! invalidation instruction in [`tlb`].
//!
//! The bit layouts are always available so they can be decoded from values
//! captured elsewhere (tests, crash dumps). Reading the live registers needs
//! the `asm` feature and CPL0.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

#[cfg(feature = "cr3")]
pub mod cr3;

#[cfg(feature = "cr4")]
pub mod cr4;

#[cfg(feature = "asm")]
pub mod tlb;

#[cfg(feature = "cr3")]
pub use cr3::Cr3;
#[cfg(feature = "cr4")]
pub use cr4::Cr4;

pub trait LoadRegisterUnsafe {
    /// # Safety
    /// The caller must uphold the implementation-specific safety requirements.
    /// Control registers are privileged and require kernel mode (Ring 0).
    unsafe fn load_unsafe() -> Self;
}
