//! # Rogue page physical memory access
//!
//! Reads and writes arbitrary physical memory without going through the
//! operating system's physical mapping services. One private kernel page,
//! the *rogue page*, is pointed at the target frame by rewriting its own PTE
//! in place; the bytes are then copied through it.
//!
//! ```text
//!  TransferRequest ──► Segments ──► RogueWindow ──► map (PTE swap + invlpg)
//!                      (per page)   (lock + CLI)  └► read / write (fault safe)
//! ```
//!
//! - [`RoguePage`]: lifecycle (`init`/`cleanup`), [`RoguePage::map_rogue`],
//!   [`RoguePage::vtop`] and [`RoguePage::readwrite_rogue`].
//! - [`RogueWindow`]: exclusive access for a single remap-and-copy.
//! - [`Segments`]: page-sized pieces of a request.
//! - `ffi` (feature `ffi`): C entry points over a global instance.
//!
//! The hardware is reached only through [`pmem_hal::RogueHardware`], so the
//! whole crate runs against the simulated machine in tests:
//!
//! ```rust
//! use pmem_addresses::PhysicalAddress;
//! use pmem_paging::PagingMode;
//! use pmem_rogue::{RogueConfig, RoguePage, TransferRequest};
//! use pmem_sim::Machine;
//!
//! let rogue = RoguePage::new(Machine::new(1 << 20, PagingMode::FourLevel), RogueConfig::DEFAULT);
//! rogue.init().unwrap();
//!
//! let mut buf = [0u8; 16];
//! let n = rogue.readwrite_rogue(TransferRequest::read(PhysicalAddress::new(0x1000), &mut buf)).unwrap();
//! assert_eq!(n, 16);
//! assert_eq!(buf.to_vec(), rogue.hardware().read_phys(PhysicalAddress::new(0x1000), 16));
//! rogue.cleanup();
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod config;
mod error;
#[cfg(feature = "ffi")]
pub mod ffi;
mod rogue;
mod segments;
mod transfer;

pub use crate::config::{CachePolicy, RogueConfig};
pub use crate::error::{PmemError, TransferError};
pub use crate::rogue::{RoguePage, RogueStatus, RogueWindow};
pub use crate::segments::{Segment, Segments};
pub use crate::transfer::{Direction, TransferRequest};
