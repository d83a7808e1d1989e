use pmem_addresses::{PhysicalAddress, PhysicalPage};
use pmem_paging::PagingMode;
use pmem_rogue::{PmemError, RogueConfig, RoguePage, TransferRequest};
use pmem_sim::{Event, Machine};
use std::sync::atomic::AtomicBool;

fn rogue() -> RoguePage<Machine> {
    let r = RoguePage::new(Machine::new(4 << 20, PagingMode::FourLevel), RogueConfig::DEFAULT);
    r.init().expect("init");
    r.hardware().clear_events();
    r
}

fn read(r: &RoguePage<Machine>, pa: u64, len: usize) -> Result<Vec<u8>, pmem_rogue::TransferError> {
    let mut buf = vec![0; len];
    r.readwrite_rogue(TransferRequest::read(PhysicalAddress::new(pa), &mut buf))
        .map(|n| {
            assert_eq!(n, len);
            buf
        })
}

#[test]
fn k_pages_take_k_ascending_remaps() {
    let r = rogue();
    let m = r.hardware();
    let entered = m.critical_sections();

    let data = read(&r, 0x2_0000, 4 * 4096).unwrap();
    assert_eq!(data, m.read_phys(PhysicalAddress::new(0x2_0000), 4 * 4096));

    let frames: Vec<u64> = m.copied_frames().into_iter().map(PhysicalPage::number).collect();
    assert_eq!(frames, [0x20, 0x21, 0x22, 0x23]);
    assert_eq!(m.invalidations(), 4);
    assert_eq!(m.critical_sections() - entered, 4);
    assert_eq!(m.critical_depth(), 0);
}

#[test]
fn unaligned_ranges_match_reference() {
    let r = rogue();
    let m = r.hardware();
    for (pa, len) in [(0x1ff0u64, 0x20usize), (0x3001, 1), (0x4abc, 3 * 4096 + 17), (0x7000, 4096)] {
        assert_eq!(
            read(&r, pa, len).unwrap(),
            m.read_phys(PhysicalAddress::new(pa), len),
            "{pa:#x}+{len:#x}"
        );
    }
}

#[test]
fn writes_reach_physical_memory() {
    let r = rogue();
    let m = r.hardware();
    let payload: Vec<u8> = (0..0x30u8).collect();

    let n = r
        .readwrite_rogue(TransferRequest::write(PhysicalAddress::new(0x5ff0), &payload))
        .unwrap();
    assert_eq!(n, payload.len());
    assert_eq!(m.read_phys(PhysicalAddress::new(0x5ff0), payload.len()), payload);
    assert_eq!(read(&r, 0x5ff0, payload.len()).unwrap(), payload);
    // Neighbours are untouched.
    assert_eq!(
        m.read_phys(PhysicalAddress::new(0x5fe0), 0x10),
        (0..0x10).map(|i| pmem_sim::pattern_byte(0x5fe0 + i)).collect::<Vec<_>>()
    );
}

#[test]
fn poisoned_frame_stops_with_exact_count() {
    let r = rogue();
    let m = r.hardware();
    m.poison(PhysicalPage::from_number(0x12));

    let mut buf = vec![0u8; 3 * 4096];
    let err = r
        .readwrite_rogue(TransferRequest::read(PhysicalAddress::new(0x1_0800), &mut buf))
        .unwrap_err();
    assert_eq!(err.transferred, 0x800 + 0x1000);
    assert_eq!(err.kind(), PmemError::Fault);
    assert_eq!(&buf[..0x1800], m.read_phys(PhysicalAddress::new(0x1_0800), 0x1800));
    assert!(buf[0x1800..].iter().all(|b| *b == 0));
    assert!(matches!(m.events().last(), Some(Event::Fault { .. })));

    // The manager itself is fine.
    assert!(read(&r, 0x1_0000, 16).is_ok());
}

#[test]
fn fault_in_first_segment_moves_nothing() {
    let r = rogue();
    r.hardware().poison(PhysicalPage::from_number(0x40));
    let err = read(&r, 0x4_0010, 64).unwrap_err();
    assert_eq!((err.transferred, err.kind()), (0, PmemError::Fault));
}

#[test]
fn zero_length_is_a_no_op() {
    let r = rogue();
    assert_eq!(r.readwrite_rogue(TransferRequest::read(PhysicalAddress::new(0x1000), &mut [])), Ok(0));
    assert_eq!(r.readwrite_rogue(TransferRequest::write(PhysicalAddress::new(u64::MAX), &[])), Ok(0));
    assert!(r.hardware().events().is_empty());
}

#[test]
fn zero_length_still_needs_init() {
    let fresh = RoguePage::new(Machine::new(1 << 20, PagingMode::FourLevel), RogueConfig::DEFAULT);
    let err = fresh
        .readwrite_rogue(TransferRequest::read(PhysicalAddress::new(0x1000), &mut []))
        .unwrap_err();
    assert_eq!((err.transferred, err.kind()), (0, PmemError::NotInitialized));

    let r = rogue();
    r.cleanup();
    let err = r
        .readwrite_rogue(TransferRequest::write(PhysicalAddress::new(0x1000), &[]))
        .unwrap_err();
    assert_eq!((err.transferred, err.kind()), (0, PmemError::NotInitialized));

    r.init().unwrap();
    assert_eq!(r.readwrite_rogue(TransferRequest::read(PhysicalAddress::new(0x1000), &mut [])), Ok(0));
}

#[test]
fn overflowing_range_is_rejected_up_front() {
    let r = rogue();
    let err = read(&r, u64::MAX - 8, 32).unwrap_err();
    assert_eq!((err.transferred, err.kind()), (0, PmemError::InvalidAddress));
    assert!(r.hardware().events().is_empty());
}

#[test]
fn rejected_frame_mid_request_is_partial() {
    let r = rogue();
    let root = r.hardware().root().base().as_u64();
    // Start one page below the root table.
    let err = read(&r, root - 4096, 2 * 4096).unwrap_err();
    assert_eq!(err.transferred, 4096);
    assert_eq!(err.cause, PmemError::InvalidAddress);
    assert_eq!(err.kind(), PmemError::PartialTransfer);
}

#[test]
fn cancellation_stops_before_next_segment() {
    let r = rogue();
    let cancel = AtomicBool::new(true);
    let mut buf = [0u8; 8192];
    let err = r
        .readwrite_rogue(TransferRequest::read(PhysicalAddress::new(0x1000), &mut buf).with_cancel(&cancel))
        .unwrap_err();
    assert_eq!((err.transferred, err.kind()), (0, PmemError::Cancelled));
    assert!(r.hardware().copied_frames().is_empty());

    let idle = AtomicBool::new(false);
    let n = r
        .readwrite_rogue(TransferRequest::read(PhysicalAddress::new(0x1000), &mut buf).with_cancel(&idle))
        .unwrap();
    assert_eq!(n, 8192);
}
