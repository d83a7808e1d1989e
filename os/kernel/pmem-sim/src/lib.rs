//! # Simulated x86-64 machine
//!
//! A host-side stand-in for everything the rogue page touches:
//!
//! - [`Ram`]: a flat block of "physical" memory starting at address zero,
//!   filled with a position-dependent byte pattern ([`pattern_byte`]).
//! - [`Machine`]: paging tables built inside that RAM, a TLB that keeps
//!   serving stale translations until told otherwise, poisoned frames that
//!   fault on access, and an [`Event`] log of everything observable.
//!
//! [`Machine`] implements every `pmem-hal` seam, so the rogue page runs on it
//! unchanged.
//!
//! ```rust
//! use pmem_sim::{Machine, flags};
//! use pmem_addresses::{PhysicalAddress, VirtualAddress};
//! use pmem_paging::PagingMode;
//!
//! let m = Machine::new(1 << 20, PagingMode::FourLevel);
//! let va = VirtualAddress::new(0xffff_9000_0000_0000);
//! m.map_4k(va, PhysicalAddress::new(0x3000), flags::P | flags::RW);
//! assert_eq!(m.reference_translate(va), Some(PhysicalAddress::new(0x3000)));
//! ```

#![allow(unsafe_code, clippy::cast_possible_truncation, clippy::missing_panics_doc)]

mod event;
mod machine;
mod ram;

pub use crate::event::{Access, Event};
pub use crate::machine::{CriticalGuard, Machine, ReservationMode, ROGUE_WINDOW_BASE};
pub use crate::ram::{Ram, pattern_byte};

/// Raw entry flag bits for building tables.
pub mod flags {
    pub const P: u64 = 1;
    pub const RW: u64 = 1 << 1;
    pub const US: u64 = 1 << 2;
    pub const PWT: u64 = 1 << 3;
    pub const PCD: u64 = 1 << 4;
    pub const A: u64 = 1 << 5;
    pub const D: u64 = 1 << 6;
    pub const PS: u64 = 1 << 7;
    pub const G: u64 = 1 << 8;
    pub const NX: u64 = 1 << 63;
}
