//! Guest memory for 16-bit door modules.
//!
//! Two interchangeable implementations sit behind the [`GuestMemory`]
//! contract:
//!
//! - [`ProtectedMemory`] keeps an independent buffer of up to 64 KiB per
//!   segment ordinal, the way the legacy host loader isolated modules.
//! - [`RealModeMemory`] is a single 1 MiB image with `segment * 16 + offset`
//!   addressing.
//!
//! Both carry the pieces the rest of the core leans on: free-list heap
//! allocation, the named-variable directory host-API shims allocate scratch
//! state through, big memory blocks, and the per-code-segment cache of
//! decoded instructions the CPU fetches from.

mod alloc;
mod error;
mod protected;
mod real;
mod variables;

pub use error::MemoryError;
pub use protected::ProtectedMemory;
pub use real::RealModeMemory;

use door_types::{FarPtr, Segment};
use door_x86::Instruction;

/// First ordinal used for lazily created heap segments.
pub const HEAP_BASE_SEGMENT: u16 = 0x1000;
/// First ordinal used for lazily created real-mode-style segments.
pub const REAL_MODE_BASE_SEGMENT: u16 = 0x2000;
/// Pseudo-segment carried by big-memory-block handles. Never backed by a
/// buffer.
pub const BIG_BLOCK_SEGMENT: u16 = 0xFFFF;
/// The always-present stack segment.
pub const STACK_SEGMENT: u16 = 0;

/// The memory contract shared by the CPU, the host-API layer and the
/// loader. All multi-byte accesses are little-endian.
///
/// In-range accesses are total; out-of-range inputs mean the caller skipped
/// an allocation step and surface as [`MemoryError`] values that are fatal
/// to the guest. Allocation failure is recoverable and reported through
/// [`MemoryError::OutOfMemory`].
pub trait GuestMemory {
    /// Borrow `len` bytes at `seg:off`. The slice never crosses the end of
    /// the segment.
    fn read_bytes(&self, segment: u16, offset: u16, len: usize) -> Result<&[u8], MemoryError>;

    /// Copy `src` into `seg:off..`. The whole of `src` must fit.
    fn write_bytes(&mut self, segment: u16, offset: u16, src: &[u8]) -> Result<(), MemoryError>;

    fn fill(&mut self, segment: u16, offset: u16, len: usize, value: u8)
        -> Result<(), MemoryError>;

    fn read_u8(&self, segment: u16, offset: u16) -> Result<u8, MemoryError> {
        Ok(self.read_bytes(segment, offset, 1)?[0])
    }

    fn read_u16(&self, segment: u16, offset: u16) -> Result<u16, MemoryError> {
        let b = self.read_bytes(segment, offset, 2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn read_u32(&self, segment: u16, offset: u16) -> Result<u32, MemoryError> {
        let b = self.read_bytes(segment, offset, 4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn write_u8(&mut self, segment: u16, offset: u16, value: u8) -> Result<(), MemoryError> {
        self.write_bytes(segment, offset, &[value])
    }

    fn write_u16(&mut self, segment: u16, offset: u16, value: u16) -> Result<(), MemoryError> {
        self.write_bytes(segment, offset, &value.to_le_bytes())
    }

    fn write_u32(&mut self, segment: u16, offset: u16, value: u32) -> Result<(), MemoryError> {
        self.write_bytes(segment, offset, &value.to_le_bytes())
    }

    fn read_far_ptr(&self, segment: u16, offset: u16) -> Result<FarPtr, MemoryError> {
        let b = self.read_bytes(segment, offset, FarPtr::SIZE)?;
        Ok(FarPtr::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn write_far_ptr(&mut self, segment: u16, offset: u16, ptr: FarPtr) -> Result<(), MemoryError> {
        self.write_bytes(segment, offset, &ptr.to_le_bytes())
    }

    /// The bytes up to and including the first NUL in the segment,
    /// excluding the NUL iff `strip_null`. A string running off the end of
    /// its segment is [`MemoryError::MalformedCString`].
    fn read_cstring(
        &self,
        segment: u16,
        offset: u16,
        strip_null: bool,
    ) -> Result<&[u8], MemoryError> {
        let seg_len = self
            .segment_len(segment)
            .ok_or(MemoryError::SegmentNotMapped { segment })?;
        if offset as usize >= seg_len {
            return Err(MemoryError::AddressOutOfRange {
                segment,
                offset,
                len: 1,
            });
        }
        let bytes = self.read_bytes(segment, offset, seg_len - offset as usize)?;
        match bytes.iter().position(|&b| b == 0) {
            Some(nul) => Ok(&bytes[..nul + usize::from(!strip_null)]),
            None => Err(MemoryError::MalformedCString { segment, offset }),
        }
    }

    /// Allocate `size` zeroed bytes from a heap. `malloc(0)` returns a
    /// valid, distinct, non-null pointer.
    fn malloc(&mut self, size: u16) -> Result<FarPtr, MemoryError>;

    /// Release an allocation. A pointer into a segment this memory has
    /// never heard of is logged and ignored; a stale or double-freed
    /// pointer within a known heap segment is [`MemoryError::BadFree`].
    fn free(&mut self, ptr: FarPtr) -> Result<(), MemoryError>;

    /// Allocate a named scratch region on behalf of a host API. With
    /// `declare_pointer`, a companion 4-byte region named `*name` is
    /// allocated and seeded with the far pointer of `name`. Re-allocating
    /// an existing name warns and returns the existing pointer.
    fn allocate_variable(
        &mut self,
        name: &str,
        size: u16,
        declare_pointer: bool,
    ) -> Result<FarPtr, MemoryError>;

    fn variable_pointer(&self, name: &str) -> Option<FarPtr>;

    /// Allocate `quantity` elements of `size` bytes each and return a
    /// handle-bearing pseudo-pointer `(0xFFFF, handle)`.
    fn allocate_big_block(&mut self, quantity: u16, size: u16) -> Result<FarPtr, MemoryError>;

    /// Resolve one element of a big memory block to its real pointer.
    fn big_block_element(&self, ptr: FarPtr, index: u16) -> Result<FarPtr, MemoryError>;

    /// Install a loader-provided segment. Code segments are linearly
    /// decoded into the instruction cache as they are added.
    fn add_segment(&mut self, segment: Segment) -> Result<(), MemoryError>;

    /// Create an empty zeroed 64 KiB data segment at `ordinal`.
    fn allocate_segment(&mut self, ordinal: u16) -> Result<(), MemoryError>;

    /// Reserve the next free real-mode-style segment (numbered upward from
    /// [`REAL_MODE_BASE_SEGMENT`]) and return its ordinal.
    fn allocate_real_mode_segment(&mut self) -> Result<u16, MemoryError>;

    /// Whether a segment has been registered at `ordinal` (added,
    /// allocated, or created by the heap).
    fn has_segment(&self, ordinal: u16) -> bool;

    fn segment_len(&self, ordinal: u16) -> Option<usize>;

    /// Fetch the cached decoded instruction whose start IP is `ip`.
    fn instruction_at(&self, segment: u16, ip: u16) -> Result<Instruction, MemoryError>;

    /// Re-decode a single instruction at `ip` (bounded window) and replace
    /// the cache entry. Used when linear decoding misaligned over embedded
    /// data.
    fn recompile(&mut self, segment: u16, ip: u16) -> Result<Instruction, MemoryError>;
}
