use pmem_addresses::{PhysicalAddress, PhysicalPage, Size4K, VirtualAddress};
use pmem_paging::{PagingLevel, PagingMode, WalkError};
use pmem_sim::{Machine, flags};

const KERNEL: u64 = 0xffff_9000_0000_0000;

fn machine(mode: PagingMode) -> Machine {
    let m = Machine::new(8 << 20, mode);
    // A few scattered 4 KiB pages, one 2 MiB page and one 1 GiB page.
    for (i, frame) in [3u64, 17, 4, 250].iter().enumerate() {
        m.map_4k(
            VirtualAddress::new(KERNEL + (i as u64) * 0x1000),
            PhysicalPage::<Size4K>::from_number(*frame).base(),
            flags::P | flags::RW,
        );
    }
    m.map_4k(
        VirtualAddress::new(KERNEL + 0x7f_f000),
        PhysicalAddress::new(0x9000),
        flags::P | flags::NX,
    );
    m.map_2m(
        VirtualAddress::new(KERNEL + 0x4000_0000),
        PhysicalAddress::new(0x0020_0000),
        flags::P | flags::RW,
    );
    m.map_1g(
        VirtualAddress::new(KERNEL + 0x80_0000_0000),
        PhysicalAddress::new(0x4000_0000),
        flags::P | flags::RW,
    );
    m
}

fn probes() -> Vec<VirtualAddress> {
    let mut v: Vec<u64> = (0..4).map(|i| KERNEL + i * 0x1000 + 0x123).collect();
    v.extend([
        KERNEL + 0x7f_ffff,
        KERNEL + 0x4000_0000,
        KERNEL + 0x4010_1234,
        KERNEL + 0x80_0000_0000,
        KERNEL + 0x80_3fff_fff8,
    ]);
    v.into_iter().map(VirtualAddress::new).collect()
}

#[test]
fn vtop_matches_reference_four_level() {
    let m = machine(PagingMode::FourLevel);
    let w = m.walker();
    for va in probes() {
        let expected = m.reference_translate(va).expect("probe is mapped");
        assert_eq!(unsafe { w.vtop(va) }, Ok(expected), "translating {va}");
    }
}

#[test]
fn vtop_matches_reference_five_level() {
    let m = machine(PagingMode::FiveLevel);
    let w = m.walker();
    assert_eq!(w.mode(), PagingMode::FiveLevel);
    for va in probes() {
        let expected = m.reference_translate(va).expect("probe is mapped");
        assert_eq!(unsafe { w.vtop(va) }, Ok(expected), "translating {va}");
    }
}

#[test]
fn unmapped_addresses_fail() {
    let m = machine(PagingMode::FourLevel);
    let w = m.walker();

    let hole = VirtualAddress::new(KERNEL + 0x10_0000);
    assert!(m.reference_translate(hole).is_none());
    assert!(matches!(
        unsafe { w.vtop(hole) },
        Err(WalkError::NotMapped { level: PagingLevel::Pt, .. })
    ));

    let far = VirtualAddress::new(0x0000_1000_0000_0000);
    assert!(matches!(
        unsafe { w.vtop(far) },
        Err(WalkError::NotMapped { level: PagingLevel::Pml4, .. })
    ));
}

#[test]
fn locate_pte_points_at_live_entry() {
    let m = machine(PagingMode::FourLevel);
    let w = m.walker();
    let va = VirtualAddress::new(KERNEL + 0x2000);

    let loc = unsafe { w.locate_pte(va) }.unwrap();
    assert_eq!(loc.value.frame_4k().number(), 4);
    assert_eq!(loc.path.len(), 4);
    assert_eq!(loc.path.as_slice()[0], m.root());
    assert_eq!(loc.path.as_slice()[3], loc.entry.table());

    // Rewriting the located entry changes the translation.
    let moved = loc.value.with_frame_4k(PhysicalPage::from_number(42));
    let old = unsafe { loc.entry.swap(&m, moved) };
    assert_eq!(old, loc.value);
    assert_eq!(unsafe { w.vtop(va) }.unwrap().as_u64(), 42 * 0x1000);
}

#[test]
fn locate_pte_in_large_pages_is_refused() {
    let m = machine(PagingMode::FourLevel);
    let w = m.walker();
    let err = unsafe { w.locate_pte(VirtualAddress::new(KERNEL + 0x4000_1000)) }.unwrap_err();
    assert!(matches!(err, WalkError::LargePage { level: PagingLevel::Pd, .. }));

    let err = unsafe { w.locate_pte(VirtualAddress::new(KERNEL + 0x80_0000_1000)) }.unwrap_err();
    assert!(matches!(err, WalkError::LargePage { level: PagingLevel::Pdpt, .. }));
}

#[test]
fn walk_path_frames_are_tables() {
    let m = machine(PagingMode::FiveLevel);
    let loc = unsafe { m.walker().locate_pte(VirtualAddress::new(KERNEL)) }.unwrap();
    assert_eq!(loc.path.len(), 5);
    for table in loc.path.iter() {
        assert!(table.base() >= m.data_limit(), "{table} is not a table frame");
    }
}
