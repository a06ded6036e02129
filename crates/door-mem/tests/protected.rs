use door_mem::{GuestMemory, MemoryError, ProtectedMemory, STACK_SEGMENT};
use door_types::{FarPtr, Segment};

#[test]
fn stack_segment_exists_from_the_start() {
    let mem = ProtectedMemory::new();
    assert!(mem.has_segment(STACK_SEGMENT));
    assert_eq!(mem.segment_len(STACK_SEGMENT), Some(0x10000));
    assert_eq!(mem.read_u16(STACK_SEGMENT, 0xFFFE).unwrap(), 0);
}

#[test]
fn typed_accesses_are_little_endian() {
    let mut mem = ProtectedMemory::new();
    mem.write_u32(STACK_SEGMENT, 0x10, 0x1122_3344).unwrap();
    assert_eq!(mem.read_u32(STACK_SEGMENT, 0x10).unwrap(), 0x1122_3344);
    assert_eq!(
        mem.read_bytes(STACK_SEGMENT, 0x10, 4).unwrap(),
        [0x44, 0x33, 0x22, 0x11]
    );
    assert_eq!(mem.read_u16(STACK_SEGMENT, 0x10).unwrap(), 0x3344);
    assert_eq!(mem.read_u8(STACK_SEGMENT, 0x13).unwrap(), 0x11);

    mem.write_u16(STACK_SEGMENT, 0x20, 0xBEEF).unwrap();
    assert_eq!(
        mem.read_bytes(STACK_SEGMENT, 0x20, 2).unwrap(),
        [0xEF, 0xBE]
    );
}

#[test]
fn far_ptr_round_trips_through_guest_memory() {
    let mut mem = ProtectedMemory::new();
    let p = FarPtr::new(0x1000, 0x0042);
    mem.write_far_ptr(STACK_SEGMENT, 0x100, p).unwrap();
    assert_eq!(mem.read_far_ptr(STACK_SEGMENT, 0x100).unwrap(), p);
    // Wire format is (offset_lo, offset_hi, seg_lo, seg_hi).
    assert_eq!(
        mem.read_bytes(STACK_SEGMENT, 0x100, 4).unwrap(),
        [0x42, 0x00, 0x00, 0x10]
    );
}

#[test]
fn unmapped_segment_access_is_an_error() {
    let mut mem = ProtectedMemory::new();
    assert_eq!(
        mem.read_u8(0x0123, 0).unwrap_err(),
        MemoryError::SegmentNotMapped { segment: 0x0123 }
    );
    assert_eq!(
        mem.write_u8(0x0123, 0, 1).unwrap_err(),
        MemoryError::SegmentNotMapped { segment: 0x0123 }
    );
}

#[test]
fn access_past_segment_end_is_an_error() {
    let mut mem = ProtectedMemory::new();
    let seg = Segment::data(0x0002, vec![0u8; 0x20]).unwrap();
    mem.add_segment(seg).unwrap();
    assert_eq!(mem.read_u8(0x0002, 0x1F).unwrap(), 0);
    assert!(matches!(
        mem.read_u16(0x0002, 0x1F).unwrap_err(),
        MemoryError::AddressOutOfRange { segment: 0x0002, .. }
    ));
    assert!(matches!(
        mem.write_bytes(0x0002, 0x1E, &[1, 2, 3]).unwrap_err(),
        MemoryError::AddressOutOfRange { .. }
    ));
}

#[test]
fn duplicate_segment_ordinal_is_rejected() {
    let mut mem = ProtectedMemory::new();
    mem.allocate_segment(0x0005).unwrap();
    assert_eq!(
        mem.allocate_segment(0x0005).unwrap_err(),
        MemoryError::SegmentExists { segment: 0x0005 }
    );
    let seg = Segment::data(0x0005, vec![0u8; 4]).unwrap();
    assert_eq!(
        mem.add_segment(seg).unwrap_err(),
        MemoryError::SegmentExists { segment: 0x0005 }
    );
}

#[test]
fn oversize_segment_descriptors_are_rejected() {
    // `Segment`'s fields are public, so a descriptor can bypass the
    // constructor's length check; the memory core re-checks.
    let mut mem = ProtectedMemory::new();
    let oversize = Segment {
        ordinal: 0x0004,
        data: vec![0; 0x10001],
        flags: door_types::SegmentFlags::DATA,
        relocations: Vec::new(),
    };
    assert_eq!(
        mem.add_segment(oversize).unwrap_err(),
        MemoryError::SegmentTooLarge {
            segment: 0x0004,
            len: 0x10001
        }
    );
}

#[test]
fn fill_writes_the_requested_span_only() {
    let mut mem = ProtectedMemory::new();
    mem.fill(STACK_SEGMENT, 0x40, 8, 0xAA).unwrap();
    assert_eq!(mem.read_u8(STACK_SEGMENT, 0x3F).unwrap(), 0);
    assert_eq!(mem.read_bytes(STACK_SEGMENT, 0x40, 8).unwrap(), [0xAA; 8]);
    assert_eq!(mem.read_u8(STACK_SEGMENT, 0x48).unwrap(), 0);
}

#[test]
fn cstring_reads_stop_at_the_first_nul() {
    let mut mem = ProtectedMemory::new();
    mem.write_bytes(STACK_SEGMENT, 0x200, b"HELLO\0WORLD\0")
        .unwrap();
    assert_eq!(
        mem.read_cstring(STACK_SEGMENT, 0x200, true).unwrap(),
        b"HELLO"
    );
    assert_eq!(
        mem.read_cstring(STACK_SEGMENT, 0x200, false).unwrap(),
        b"HELLO\0"
    );
    assert_eq!(
        mem.read_cstring(STACK_SEGMENT, 0x206, true).unwrap(),
        b"WORLD"
    );
}

#[test]
fn cstring_without_terminator_is_malformed() {
    let mut mem = ProtectedMemory::new();
    let seg = Segment::data(0x0003, b"NO TERMINATOR".to_vec()).unwrap();
    mem.add_segment(seg).unwrap();
    assert_eq!(
        mem.read_cstring(0x0003, 0, true).unwrap_err(),
        MemoryError::MalformedCString {
            segment: 0x0003,
            offset: 0
        }
    );
}

#[test]
fn real_mode_style_segments_number_from_0x2000() {
    let mut mem = ProtectedMemory::new();
    let a = mem.allocate_real_mode_segment().unwrap();
    let b = mem.allocate_real_mode_segment().unwrap();
    assert_eq!(a, 0x2000);
    assert_eq!(b, 0x2001);
    assert!(mem.has_segment(a));
    mem.write_u16(a, 0, 0x1234).unwrap();
    assert_eq!(mem.read_u16(a, 0).unwrap(), 0x1234);
}
