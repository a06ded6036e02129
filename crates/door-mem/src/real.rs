use crate::alloc::HeapAllocator;
use crate::variables::VariableDirectory;
use crate::{GuestMemory, MemoryError, HEAP_BASE_SEGMENT, REAL_MODE_BASE_SEGMENT};
use door_types::{FarPtr, Segment};
use door_x86::Instruction;
use std::collections::HashMap;
use tracing::warn;

/// 1 MiB of addressable real-mode memory.
const MEM_LEN: usize = 1 << 20;
const SEGMENT_LEN: usize = 1 << 16;
/// Stride between handed-out real-mode segments: 64 KiB = 0x1000 paragraphs.
const REAL_MODE_STRIDE: u16 = 0x1000;

/// The real-mode (flat) memory model: one 1 MiB image where `(seg, off)`
/// resolves to physical address `seg * 16 + off`.
///
/// A single heap allocator covers the 64 KiB at `0x1000:0000`. Added
/// segments are copied into place at `ordinal * 16`; their decoded
/// instruction caches work exactly as in the protected model.
#[derive(Debug)]
pub struct RealModeMemory {
    data: Vec<u8>,
    heap: HeapAllocator,
    /// Lengths of segments registered via `add_segment`/`allocate_segment`,
    /// for duplicate detection and `recompile` windows.
    added: HashMap<u16, usize>,
    code_caches: HashMap<u16, HashMap<u16, Instruction>>,
    next_real_mode: u16,
    vars: VariableDirectory,
}

impl Default for RealModeMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl RealModeMemory {
    pub fn new() -> Self {
        // The stack segment and the heap window exist from the start,
        // matching the protected model.
        let mut added = HashMap::new();
        added.insert(crate::STACK_SEGMENT, SEGMENT_LEN);
        added.insert(HEAP_BASE_SEGMENT, SEGMENT_LEN);
        Self {
            data: vec![0; MEM_LEN],
            heap: HeapAllocator::new(0, SEGMENT_LEN),
            added,
            code_caches: HashMap::new(),
            next_real_mode: REAL_MODE_BASE_SEGMENT,
            vars: VariableDirectory::default(),
        }
    }

    fn span(
        segment: u16,
        offset: u16,
        len: usize,
    ) -> Result<std::ops::Range<usize>, MemoryError> {
        let start = segment as usize * 16 + offset as usize;
        let end = start + len;
        if end > MEM_LEN {
            return Err(MemoryError::AddressOutOfRange {
                segment,
                offset,
                len,
            });
        }
        Ok(start..end)
    }
}

impl GuestMemory for RealModeMemory {
    fn read_bytes(&self, segment: u16, offset: u16, len: usize) -> Result<&[u8], MemoryError> {
        Ok(&self.data[Self::span(segment, offset, len)?])
    }

    fn write_bytes(&mut self, segment: u16, offset: u16, src: &[u8]) -> Result<(), MemoryError> {
        let span = Self::span(segment, offset, src.len())?;
        self.data[span].copy_from_slice(src);
        Ok(())
    }

    fn fill(
        &mut self,
        segment: u16,
        offset: u16,
        len: usize,
        value: u8,
    ) -> Result<(), MemoryError> {
        let span = Self::span(segment, offset, len)?;
        self.data[span].fill(value);
        Ok(())
    }

    fn malloc(&mut self, size: u16) -> Result<FarPtr, MemoryError> {
        let offset = self.heap.alloc(size).ok_or(MemoryError::OutOfMemory {
            requested: size as usize,
        })?;
        self.fill(HEAP_BASE_SEGMENT, offset, size as usize, 0)?;
        Ok(FarPtr::new(HEAP_BASE_SEGMENT, offset))
    }

    fn free(&mut self, ptr: FarPtr) -> Result<(), MemoryError> {
        if ptr.segment != HEAP_BASE_SEGMENT {
            warn!(%ptr, "free of pointer outside the heap segment ignored");
            return Ok(());
        }
        match self.heap.free(ptr.offset) {
            Some(_) => Ok(()),
            None => Err(MemoryError::BadFree { ptr }),
        }
    }

    fn allocate_variable(
        &mut self,
        name: &str,
        size: u16,
        declare_pointer: bool,
    ) -> Result<FarPtr, MemoryError> {
        if let Some(existing) = self.vars.get(name) {
            warn!(name, %existing, "variable already allocated, returning existing pointer");
            return Ok(existing);
        }
        let ptr = self.malloc(size)?;
        self.vars.insert(name, ptr);
        if declare_pointer {
            let pointer = self.malloc(FarPtr::SIZE as u16)?;
            self.write_far_ptr(pointer.segment, pointer.offset, ptr)?;
            self.vars.insert(&format!("*{name}"), pointer);
        }
        Ok(ptr)
    }

    fn variable_pointer(&self, name: &str) -> Option<FarPtr> {
        self.vars.get(name)
    }

    fn allocate_big_block(&mut self, quantity: u16, size: u16) -> Result<FarPtr, MemoryError> {
        let handle = self.vars.big_block_count();
        let mut elements = Vec::with_capacity(quantity as usize);
        for index in 0..quantity {
            let name = format!("bigblk:{handle}:{index}");
            elements.push(self.allocate_variable(&name, size, false)?);
        }
        Ok(self.vars.push_big_block(elements))
    }

    fn big_block_element(&self, ptr: FarPtr, index: u16) -> Result<FarPtr, MemoryError> {
        self.vars.big_block_element(ptr, index)
    }

    fn add_segment(&mut self, segment: Segment) -> Result<(), MemoryError> {
        // `Segment::new` enforces this, but the fields are public.
        if segment.data.len() > SEGMENT_LEN {
            return Err(MemoryError::SegmentTooLarge {
                segment: segment.ordinal,
                len: segment.data.len(),
            });
        }
        if self.added.contains_key(&segment.ordinal) {
            return Err(MemoryError::SegmentExists {
                segment: segment.ordinal,
            });
        }
        self.write_bytes(segment.ordinal, 0, &segment.data)?;
        self.added.insert(segment.ordinal, segment.data.len());
        if segment.is_code() {
            self.code_caches.insert(
                segment.ordinal,
                door_x86::decode_segment(&segment.data).into_iter().collect(),
            );
        }
        Ok(())
    }

    fn allocate_segment(&mut self, ordinal: u16) -> Result<(), MemoryError> {
        if self.added.contains_key(&ordinal) {
            return Err(MemoryError::SegmentExists { segment: ordinal });
        }
        self.fill(ordinal, 0, SEGMENT_LEN.min(MEM_LEN - ordinal as usize * 16), 0)?;
        self.added.insert(ordinal, SEGMENT_LEN);
        Ok(())
    }

    fn allocate_real_mode_segment(&mut self) -> Result<u16, MemoryError> {
        let ordinal = self.next_real_mode;
        if ordinal as usize * 16 + SEGMENT_LEN > MEM_LEN {
            return Err(MemoryError::OutOfMemory {
                requested: SEGMENT_LEN,
            });
        }
        self.next_real_mode += REAL_MODE_STRIDE;
        self.added.insert(ordinal, SEGMENT_LEN);
        Ok(ordinal)
    }

    fn has_segment(&self, ordinal: u16) -> bool {
        // Registered segments only; the raw address space is always
        // backed, but callers asking this question mean the former.
        self.added.contains_key(&ordinal)
    }

    fn segment_len(&self, ordinal: u16) -> Option<usize> {
        let base = ordinal as usize * 16;
        (base < MEM_LEN).then(|| SEGMENT_LEN.min(MEM_LEN - base))
    }

    fn instruction_at(&self, segment: u16, ip: u16) -> Result<Instruction, MemoryError> {
        let cache = self
            .code_caches
            .get(&segment)
            .ok_or(MemoryError::NotCodeSegment { segment })?;
        cache
            .get(&ip)
            .copied()
            .ok_or(MemoryError::NotInstructionBoundary {
                segment,
                offset: ip,
            })
    }

    fn recompile(&mut self, segment: u16, ip: u16) -> Result<Instruction, MemoryError> {
        if !self.code_caches.contains_key(&segment) {
            return Err(MemoryError::NotCodeSegment { segment });
        }
        let len = self
            .added
            .get(&segment)
            .copied()
            .or_else(|| self.segment_len(segment))
            .unwrap_or(0);
        let image = self.read_bytes(segment, 0, len)?;
        let instruction = door_x86::decode_at(image, ip).ok_or(MemoryError::AddressOutOfRange {
            segment,
            offset: ip,
            len: 1,
        })?;
        self.code_caches
            .entry(segment)
            .or_default()
            .insert(ip, instruction);
        Ok(instruction)
    }
}
