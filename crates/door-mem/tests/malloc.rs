use door_mem::{GuestMemory, MemoryError, ProtectedMemory, HEAP_BASE_SEGMENT};
use door_types::FarPtr;

#[test]
fn heap_segments_appear_on_demand_from_0x1000() {
    let mut mem = ProtectedMemory::new();
    assert!(!mem.has_segment(HEAP_BASE_SEGMENT));
    let p = mem.malloc(0x20).unwrap();
    assert_eq!(p.segment, HEAP_BASE_SEGMENT);
    assert!(mem.has_segment(HEAP_BASE_SEGMENT));
}

#[test]
fn malloc_returns_zeroed_memory() {
    let mut mem = ProtectedMemory::new();
    let p = mem.malloc(0x40).unwrap();
    mem.fill(p.segment, p.offset, 0x40, 0xFF).unwrap();
    mem.free(p).unwrap();
    // Reuse of the same block must still read as zero.
    let q = mem.malloc(0x40).unwrap();
    assert_eq!(q, p);
    assert_eq!(mem.read_bytes(q.segment, q.offset, 0x40).unwrap(), [0; 64]);
}

#[test]
fn allocations_never_overlap() {
    let mut mem = ProtectedMemory::new();
    let mut ptrs: Vec<(FarPtr, u16)> = Vec::new();
    for size in [1u16, 2, 7, 32, 63, 128] {
        let p = mem.malloc(size).unwrap();
        mem.fill(p.segment, p.offset, size as usize, 0xEE).unwrap();
        ptrs.push((p, size));
    }
    // Every region still holds its fill pattern: no later allocation
    // clobbered an earlier one.
    for (p, size) in ptrs {
        let bytes = mem.read_bytes(p.segment, p.offset, size as usize).unwrap();
        assert!(bytes.iter().all(|&b| b == 0xEE), "{p} was overwritten");
    }
}

#[test]
fn malloc_zero_is_valid_and_distinct() {
    let mut mem = ProtectedMemory::new();
    let a = mem.malloc(0).unwrap();
    let b = mem.malloc(0).unwrap();
    assert!(!a.is_null());
    assert!(!b.is_null());
    assert_ne!(a, b);
    mem.free(a).unwrap();
    mem.free(b).unwrap();
}

#[test]
fn free_restores_capacity_for_reuse() {
    let mut mem = ProtectedMemory::new();
    // Fill most of the first heap segment, then free and re-fill.
    let big = mem.malloc(0xFFFE).unwrap();
    mem.free(big).unwrap();
    let again = mem.malloc(0xFFFE).unwrap();
    assert_eq!(big, again);
}

#[test]
fn malloc_spills_into_a_second_heap_segment() {
    let mut mem = ProtectedMemory::new();
    let a = mem.malloc(0xFFFF).unwrap();
    let b = mem.malloc(0xFFFF).unwrap();
    assert_eq!(a.segment, HEAP_BASE_SEGMENT);
    assert_eq!(b.segment, HEAP_BASE_SEGMENT + 1);
    // A small request after the spill still lands in the first segment
    // once space is returned there.
    mem.free(a).unwrap();
    let c = mem.malloc(0x10).unwrap();
    assert_eq!(c.segment, HEAP_BASE_SEGMENT);
}

#[test]
fn free_of_unmapped_segment_is_ignored() {
    let mut mem = ProtectedMemory::new();
    // Logged, not fatal: host APIs free junk pointers in the wild.
    mem.free(FarPtr::new(0x4242, 0x10)).unwrap();
}

#[test]
fn double_free_is_reported() {
    let mut mem = ProtectedMemory::new();
    let p = mem.malloc(0x10).unwrap();
    mem.free(p).unwrap();
    assert_eq!(mem.free(p).unwrap_err(), MemoryError::BadFree { ptr: p });
}

#[test]
fn free_null_is_reported() {
    let mut mem = ProtectedMemory::new();
    let err = mem.free(FarPtr::NULL).unwrap_err();
    assert_eq!(err, MemoryError::BadFree { ptr: FarPtr::NULL });
}
