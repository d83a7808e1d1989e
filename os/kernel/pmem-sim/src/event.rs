use pmem_addresses::{PhysicalPage, Size4K, VirtualPage};
use std::thread::ThreadId;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Access {
    Read,
    Write,
}

/// Something the simulated machine observed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Event {
    /// A page was reserved.
    Reserve(VirtualPage<Size4K>),
    /// A reserved page was given back. `restored` tells whether its PTE held
    /// the value it was handed out with.
    Release {
        page: VirtualPage<Size4K>,
        restored: bool,
    },
    /// `invlpg` for a page, whether or not the TLB honored it.
    Invalidate(VirtualPage<Size4K>),
    /// A copy through a virtual page completed.
    Copy {
        page: VirtualPage<Size4K>,
        frame: PhysicalPage<Size4K>,
        len: usize,
        access: Access,
        thread: ThreadId,
    },
    /// The translation used for a copy did not match the live page tables
    /// at some point during the copy.
    Torn {
        page: VirtualPage<Size4K>,
        used: PhysicalPage<Size4K>,
        live: Option<PhysicalPage<Size4K>>,
    },
    /// A copy touched a poisoned frame, a frame outside RAM or an unmapped page.
    Fault {
        page: VirtualPage<Size4K>,
        frame: Option<PhysicalPage<Size4K>>,
    },
}
