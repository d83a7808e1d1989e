//! # Synchronization primitives for the rogue page
//!
//! - [`SpinLock`]: test-and-test-and-set lock with an RAII guard. The rogue
//!   page state lives behind one of these.
//! - [`irq::IrqGuard`] (feature `irq`, x86-64 only): disables interrupts for
//!   the lifetime of the guard so an interrupt handler on the same CPU cannot
//!   spin on a lock its own CPU already holds.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

#[cfg(feature = "irq")]
pub mod irq;
mod spin_lock;

#[cfg(feature = "irq")]
pub use irq::IrqGuard;
pub use spin_lock::{SpinLock, SpinLockGuard};
