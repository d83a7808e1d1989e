//! # Software Page-Table Walker
//!
//! Mirrors the x86-64 hardware walk in software so the rogue page code can
//! (a) translate virtual to physical addresses without asking the OS and
//! (b) find the *physical* location of a page's own PTE so it can be edited
//! directly.
//!
//! ## x86-64 Virtual Address → Physical Address Walk
//!
//! ```text
//! 4-level: | 47‒39 | 38‒30 | 29‒21 | 20‒12 | 11‒0   |
//!          |  PML4 |  PDPT |   PD  |   PT  | Offset |
//!
//! 5-level: | 56‒48 | 47‒39 | 38‒30 | 29‒21 | 20‒12 | 11‒0   |
//!          |  PML5 |  PML4 |  PDPT |   PD  |   PT  | Offset |
//! ```
//!
//! Every table holds 512 eight-byte entries. A walk stops early at a *leaf*:
//!
//! ```text
//!  (PML5) → PML4 → PDPT → PD → PT → 4 KiB frame
//!                    │      └────────► PS=1 → 2 MiB frame
//!                    └───────────────► PS=1 → 1 GiB frame
//! ```
//!
//! The two hierarchy depths are a closed set ([`PagingMode`]) selected once,
//! typically from `CR4.LA57`, and never re-evaluated during a walk.
//!
//! ## Reaching physical tables
//!
//! Tables live in physical memory. The walker reaches them through a
//! [`PhysMapper`], usually a higher-half direct map ([`HhdmPhysMapper`]).
//! Entries are read with acquire loads so a concurrent rewrite of a PTE is
//! observed either entirely or not at all.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code, clippy::inline_always)]

mod entry;
mod error;
mod level;
mod mapper;
mod mode;
mod walker;

pub use crate::entry::{EntryRef, PageEntryBits};
pub use crate::error::WalkError;
pub use crate::level::PagingLevel;
pub use crate::mapper::{HhdmPhysMapper, PhysMapper};
pub use crate::mode::PagingMode;
pub use crate::walker::{PageWalker, PteLocation, Translation, WalkPath};

pub use pmem_addresses as addresses;

/// Architectural upper bound of `MAXPHYADDR` on x86-64.
pub const MAX_PHYSICAL_ADDRESS_BITS: u32 = 52;

/// Entries per paging table.
pub const ENTRIES_PER_TABLE: u16 = 512;

/// Size of one paging entry in bytes.
pub const ENTRY_SIZE: u64 = 8;
