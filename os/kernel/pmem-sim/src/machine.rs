use crate::event::{Access, Event};
use crate::flags;
use crate::ram::Ram;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use pmem_addresses::{
    PageSize, PhysicalAddress, PhysicalPage, Size1G, Size2M, Size4K, VirtualAddress, VirtualPage,
};
use pmem_hal::{
    CopyFault, CriticalSection, FaultSafeCopy, PageReservation, PagingRoot, PagingRootSource,
    PhysMapper, TlbInvalidator,
};
use pmem_paging::{EntryRef, PageEntryBits, PageWalker, PagingLevel, PagingMode};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

/// Where [`Machine::reserve_page`] places its pages.
pub const ROGUE_WINDOW_BASE: u64 = 0xffff_c000_0000_0000;

/// How [`Machine::reserve_page`] behaves.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum ReservationMode {
    /// Map a fresh frame with a 4 KiB PTE.
    #[default]
    Normal,
    /// Hand out a page inside a 2 MiB mapping.
    LargePage,
    /// Hand out a page whose PTE is not present.
    Unbacked,
    /// Refuse every reservation.
    Exhausted,
}

#[derive(Copy, Clone, Debug)]
struct Mapping {
    pa: u64,
    size: u64,
}

#[derive(Copy, Clone, Debug)]
struct Reservation {
    page: VirtualPage<Size4K>,
    pte: Option<u64>,
}

/// A simulated single-address-space machine.
pub struct Machine {
    ram: Ram,
    mode: PagingMode,
    root: PhysicalPage<Size4K>,
    /// Next frame handed out for tables and backing pages, allocated downwards.
    next_frame: Mutex<u64>,
    reference: Mutex<BTreeMap<u64, Mapping>>,
    tlb: Mutex<HashMap<VirtualPage<Size4K>, PhysicalPage<Size4K>>>,
    ignore_invalidation: AtomicBool,
    /// Frame written into the next invalidated page's PTE.
    redirect: Mutex<Option<PhysicalPage<Size4K>>>,
    poisoned: Mutex<HashSet<PhysicalPage<Size4K>>>,
    events: Mutex<Vec<Event>>,
    reservation_mode: Mutex<ReservationMode>,
    reserved: Mutex<Option<Reservation>>,
    critical_entered: AtomicUsize,
    critical_depth: AtomicUsize,
}

fn locked<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl Machine {
    /// A machine with `ram_bytes` of RAM and an empty root table in the top frame.
    #[must_use]
    pub fn new(ram_bytes: u64, mode: PagingMode) -> Self {
        let ram = Ram::new(ram_bytes);
        let top = ram.size() / Size4K::SIZE - 1;
        let root = PhysicalPage::from_number(top);
        ram.zero_frame(root.base());
        log::trace!("simulated machine: {} KiB RAM, root {root}", ram.size() / 1024);
        Self {
            ram,
            mode,
            root,
            next_frame: Mutex::new(top - 1),
            reference: Mutex::new(BTreeMap::new()),
            tlb: Mutex::new(HashMap::new()),
            ignore_invalidation: AtomicBool::new(false),
            redirect: Mutex::new(None),
            poisoned: Mutex::new(HashSet::new()),
            events: Mutex::new(Vec::new()),
            reservation_mode: Mutex::new(ReservationMode::Normal),
            reserved: Mutex::new(None),
            critical_entered: AtomicUsize::new(0),
            critical_depth: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub const fn ram(&self) -> &Ram {
        &self.ram
    }

    #[must_use]
    pub const fn root(&self) -> PhysicalPage<Size4K> {
        self.root
    }

    #[must_use]
    pub const fn mode(&self) -> PagingMode {
        self.mode
    }

    /// A walker over this machine's tables.
    #[must_use]
    pub const fn walker(&self) -> PageWalker<&Self> {
        PageWalker::new(self, self.root, self.mode)
    }

    /// Take one zeroed frame from the top of RAM.
    pub fn alloc_frame(&self) -> PhysicalPage<Size4K> {
        let mut next = locked(&self.next_frame);
        let frame = PhysicalPage::from_number(*next);
        *next = next.checked_sub(1).expect("simulated RAM exhausted");
        self.ram.zero_frame(frame.base());
        frame
    }

    /// Lowest frame handed out by [`alloc_frame`](Self::alloc_frame) so far;
    /// everything below is untouched pattern memory.
    #[must_use]
    pub fn data_limit(&self) -> PhysicalAddress {
        PhysicalPage::<Size4K>::from_number(*locked(&self.next_frame) + 1).base()
    }

    pub fn map_4k(&self, va: VirtualAddress, pa: PhysicalAddress, leaf_flags: u64) {
        self.map_leaf(va, pa, leaf_flags, PagingLevel::Pt, Size4K::SIZE);
    }

    pub fn map_2m(&self, va: VirtualAddress, pa: PhysicalAddress, leaf_flags: u64) {
        self.map_leaf(va, pa, leaf_flags | flags::PS, PagingLevel::Pd, Size2M::SIZE);
    }

    pub fn map_1g(&self, va: VirtualAddress, pa: PhysicalAddress, leaf_flags: u64) {
        self.map_leaf(va, pa, leaf_flags | flags::PS, PagingLevel::Pdpt, Size1G::SIZE);
    }

    fn map_leaf(&self, va: VirtualAddress, pa: PhysicalAddress, bits: u64, leaf: PagingLevel, size: u64) {
        assert_eq!(va.as_u64() % size, 0, "unaligned virtual address {va}");
        assert_eq!(pa.as_u64() % size, 0, "unaligned physical address {pa}");
        let entry = self.entry_for(va, leaf);
        self.ram.write_u64(entry.address(), pa.as_u64() | bits);
        locked(&self.reference).insert(va.as_u64(), Mapping { pa: pa.as_u64(), size });
    }

    /// Entry for `va` at `leaf`, creating intermediate tables on the way.
    fn entry_for(&self, va: VirtualAddress, leaf: PagingLevel) -> EntryRef {
        let mut table = self.root;
        let mut level = self.mode.top_level();
        while level != leaf {
            let entry = EntryRef::new(table, level.index(va));
            let value = PageEntryBits::from_bits(self.ram.read_u64(entry.address()));
            table = if value.present() {
                assert!(!value.large_page(), "{va} already covered by a {level} leaf");
                value.frame_4k()
            } else {
                let next = self.alloc_frame();
                self.ram
                    .write_u64(entry.address(), next.base().as_u64() | flags::P | flags::RW);
                next
            };
            level = level.next().expect("leaf level below PT");
        }
        EntryRef::new(table, leaf.index(va))
    }

    /// Set the raw value of the PTE for `va`.
    pub fn set_pte(&self, va: VirtualAddress, value: u64) {
        let entry = self.entry_for(va, PagingLevel::Pt);
        self.ram.write_u64(entry.address(), value);
    }

    /// Raw value of the PTE for `va`, if all levels above it are present.
    #[must_use]
    pub fn pte(&self, va: VirtualAddress) -> Option<u64> {
        // SAFETY: every table reachable from the root lives in simulated RAM.
        unsafe { self.walker().locate_pte(va) }
            .ok()
            .map(|loc| loc.value.into_bits())
    }

    /// Translation recorded by the `map_*` calls, independent of the tables.
    #[must_use]
    pub fn reference_translate(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        let reference = locked(&self.reference);
        let (base, m) = reference.range(..=va.as_u64()).next_back()?;
        let off = va.as_u64() - base;
        (off < m.size).then(|| PhysicalAddress::new(m.pa + off))
    }

    /// Reference read straight from RAM.
    #[must_use]
    pub fn read_phys(&self, pa: PhysicalAddress, len: usize) -> Vec<u8> {
        let mut buf = vec![0; len];
        self.ram.read(pa, &mut buf);
        buf
    }

    pub fn write_phys(&self, pa: PhysicalAddress, data: &[u8]) {
        self.ram.write(pa, data);
    }

    /// Make every access to `frame` fault.
    pub fn poison(&self, frame: PhysicalPage<Size4K>) {
        locked(&self.poisoned).insert(frame);
    }

    /// Make `invlpg` a no-op, so the TLB keeps serving stale translations.
    pub fn ignore_invalidation(&self, ignore: bool) {
        self.ignore_invalidation.store(ignore, Ordering::Relaxed);
    }

    /// On the next invalidation, point the invalidated page's PTE at `frame`
    /// as if another CPU had rewritten it right after the remap.
    pub fn redirect_next_invalidation(&self, frame: PhysicalPage<Size4K>) {
        *locked(&self.redirect) = Some(frame);
    }

    pub fn set_reservation_mode(&self, mode: ReservationMode) {
        *locked(&self.reservation_mode) = mode;
    }

    /// Currently reserved page, if any.
    #[must_use]
    pub fn reserved_page(&self) -> Option<VirtualPage<Size4K>> {
        locked(&self.reserved).map(|r| r.page)
    }

    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        locked(&self.events).clone()
    }

    pub fn clear_events(&self) {
        locked(&self.events).clear();
    }

    /// Frames of all completed copies, in order.
    #[must_use]
    pub fn copied_frames(&self) -> Vec<PhysicalPage<Size4K>> {
        locked(&self.events)
            .iter()
            .filter_map(|e| match e {
                Event::Copy { frame, .. } => Some(*frame),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn invalidations(&self) -> usize {
        locked(&self.events)
            .iter()
            .filter(|e| matches!(e, Event::Invalidate(_)))
            .count()
    }

    #[must_use]
    pub fn torn_copies(&self) -> usize {
        locked(&self.events)
            .iter()
            .filter(|e| matches!(e, Event::Torn { .. }))
            .count()
    }

    /// Number of critical sections entered so far.
    #[must_use]
    pub fn critical_sections(&self) -> usize {
        self.critical_entered.load(Ordering::Relaxed)
    }

    /// Critical sections currently open.
    #[must_use]
    pub fn critical_depth(&self) -> usize {
        self.critical_depth.load(Ordering::Relaxed)
    }

    fn record(&self, event: Event) {
        locked(&self.events).push(event);
    }

    /// Live translation of `page`, bypassing the TLB.
    fn live_frame(&self, page: VirtualPage<Size4K>) -> Option<PhysicalPage<Size4K>> {
        // SAFETY: every table reachable from the root lives in simulated RAM.
        unsafe { self.walker().translate(page.base()) }
            .ok()
            .map(|t| t.physical.page())
    }

    /// Translation through the TLB, filling it on a miss.
    fn tlb_frame(&self, page: VirtualPage<Size4K>) -> Option<PhysicalPage<Size4K>> {
        let mut tlb = locked(&self.tlb);
        if let Some(frame) = tlb.get(&page) {
            return Some(*frame);
        }
        let frame = self.live_frame(page)?;
        tlb.insert(page, frame);
        Some(frame)
    }

    /// Resolve the frame for a copy of `len` bytes at `va`, or report a fault.
    fn access_frame(&self, va: VirtualAddress, len: usize) -> Result<(VirtualPage<Size4K>, PhysicalAddress), CopyFault> {
        let (page, offset) = va.split::<Size4K>();
        assert!(offset.remaining() >= len as u64, "copy crosses a page boundary");

        let frame = self.tlb_frame(page);
        let usable = frame.filter(|f| {
            self.ram.contains(f.base(), Size4K::SIZE) && !locked(&self.poisoned).contains(f)
        });
        match usable {
            Some(frame) => Ok((page, frame.join(offset))),
            None => {
                self.record(Event::Fault { page, frame });
                Err(CopyFault { copied: 0 })
            }
        }
    }

    fn check_torn(&self, page: VirtualPage<Size4K>, used: PhysicalPage<Size4K>) {
        let live = self.live_frame(page);
        if live != Some(used) && !self.ignore_invalidation.load(Ordering::Relaxed) {
            self.record(Event::Torn { page, used, live });
        }
    }

    fn finish_copy(&self, page: VirtualPage<Size4K>, pa: PhysicalAddress, len: usize, access: Access) {
        let frame = pa.page();
        self.check_torn(page, frame);
        self.record(Event::Copy {
            page,
            frame,
            len,
            access,
            thread: std::thread::current().id(),
        });
    }
}

impl PhysMapper for Machine {
    unsafe fn phys_to_ptr<T>(&self, pa: PhysicalAddress) -> NonNull<T> {
        self.ram.ptr(pa).cast()
    }
}

impl PagingRootSource for Machine {
    fn paging_root(&self) -> PagingRoot {
        PagingRoot {
            frame: self.root,
            mode: self.mode,
        }
    }
}

impl TlbInvalidator for Machine {
    fn invalidate_page(&self, page: VirtualPage<Size4K>) {
        let redirect = locked(&self.redirect).take();
        if let (Some(frame), Some(raw)) = (redirect, self.pte(page.base())) {
            let moved = PageEntryBits::from_bits(raw).with_frame_4k(frame);
            self.set_pte(page.base(), moved.into_bits());
        }
        if !self.ignore_invalidation.load(Ordering::Relaxed) {
            locked(&self.tlb).remove(&page);
        }
        self.record(Event::Invalidate(page));
    }
}

impl FaultSafeCopy for Machine {
    unsafe fn read_window(&self, src: VirtualAddress, dst: &mut [u8]) -> Result<(), CopyFault> {
        let (page, pa) = self.access_frame(src, dst.len())?;
        self.check_torn(page, pa.page());
        self.ram.read(pa, dst);
        self.finish_copy(page, pa, dst.len(), Access::Read);
        Ok(())
    }

    unsafe fn write_window(&self, dst: VirtualAddress, src: &[u8]) -> Result<(), CopyFault> {
        let (page, pa) = self.access_frame(dst, src.len())?;
        self.check_torn(page, pa.page());
        self.ram.write(pa, src);
        self.finish_copy(page, pa, src.len(), Access::Write);
        Ok(())
    }
}

impl PageReservation for Machine {
    fn reserve_page(&self) -> Option<VirtualPage<Size4K>> {
        let mut reserved = locked(&self.reserved);
        if reserved.is_some() {
            return None;
        }

        let va = VirtualAddress::new(ROGUE_WINDOW_BASE);
        let leaf = flags::P | flags::RW | flags::G | flags::NX;
        let pte = match *locked(&self.reservation_mode) {
            ReservationMode::Exhausted => return None,
            ReservationMode::Normal => {
                let backing = self.alloc_frame();
                self.map_4k(va, backing.base(), leaf);
                self.pte(va)
            }
            ReservationMode::Unbacked => {
                self.set_pte(va, 0);
                Some(0)
            }
            ReservationMode::LargePage => {
                self.map_2m(va, PhysicalAddress::zero(), leaf);
                None
            }
        };

        let page = va.page();
        *reserved = Some(Reservation { page, pte });
        self.record(Event::Reserve(page));
        Some(page)
    }

    unsafe fn release_page(&self, page: VirtualPage<Size4K>) {
        let mut reserved = locked(&self.reserved);
        let Some(r) = reserved.take() else {
            panic!("release of {page} without a reservation");
        };
        assert_eq!(r.page, page, "released page was not reserved");

        let restored = self.pte(page.base()) == r.pte;
        if r.pte.is_some() {
            self.set_pte(page.base(), 0);
        }
        locked(&self.tlb).remove(&page);
        locked(&self.reference).remove(&page.base().as_u64());
        self.record(Event::Release { page, restored });
    }
}

/// Open simulated critical section; see [`Machine::critical_depth`].
pub struct CriticalGuard<'a> {
    machine: &'a Machine,
}

impl Drop for CriticalGuard<'_> {
    fn drop(&mut self) {
        self.machine.critical_depth.fetch_sub(1, Ordering::Relaxed);
    }
}

impl CriticalSection for Machine {
    type Guard<'a> = CriticalGuard<'a>;

    fn enter_critical(&self) -> CriticalGuard<'_> {
        self.critical_entered.fetch_add(1, Ordering::Relaxed);
        self.critical_depth.fetch_add(1, Ordering::Relaxed);
        CriticalGuard { machine: self }
    }
}
