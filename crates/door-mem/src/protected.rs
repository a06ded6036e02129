use crate::alloc::HeapAllocator;
use crate::variables::VariableDirectory;
use crate::{
    GuestMemory, MemoryError, BIG_BLOCK_SEGMENT, HEAP_BASE_SEGMENT, REAL_MODE_BASE_SEGMENT,
    STACK_SEGMENT,
};
use door_types::{FarPtr, Segment};
use door_x86::Instruction;
use std::collections::HashMap;
use tracing::warn;

const SEGMENT_LEN: usize = 1 << 16;

#[derive(Debug)]
struct SegmentEntry {
    data: Vec<u8>,
    /// Present iff this is a code segment. Keyed by instruction start IP.
    code_cache: Option<HashMap<u16, Instruction>>,
    /// Present iff this is a heap segment created by `malloc`.
    heap: Option<HeapAllocator>,
}

impl SegmentEntry {
    fn zeroed() -> Self {
        Self {
            data: vec![0; SEGMENT_LEN],
            code_cache: None,
            heap: None,
        }
    }
}

/// The protected (segmented) memory model: a sparse table of segment
/// ordinals, each owning an independent buffer of at most 64 KiB.
///
/// Segment [`STACK_SEGMENT`] always exists. Heap segments appear on demand
/// from [`HEAP_BASE_SEGMENT`] upward as `malloc` outgrows the existing
/// ones; real-mode-style segments are numbered from
/// [`REAL_MODE_BASE_SEGMENT`]; ordinal `0xFFFF` is reserved for big-block
/// pseudo-pointers and is never mapped.
///
/// One execution context owns the whole structure. Diagnostic tooling (a
/// debugger UI walking segments) reads through `&self`; the exclusivity
/// the original achieved with a concurrent dictionary falls out of the
/// borrow rules here.
#[derive(Debug)]
pub struct ProtectedMemory {
    segments: HashMap<u16, SegmentEntry>,
    /// Heap segment ordinals in creation order; `malloc` walks these
    /// first-fit before creating a new one.
    heap_segments: Vec<u16>,
    next_heap: u16,
    next_real_mode: u16,
    vars: VariableDirectory,
}

impl Default for ProtectedMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtectedMemory {
    pub fn new() -> Self {
        let mut segments = HashMap::new();
        segments.insert(STACK_SEGMENT, SegmentEntry::zeroed());
        Self {
            segments,
            heap_segments: Vec::new(),
            next_heap: HEAP_BASE_SEGMENT,
            next_real_mode: REAL_MODE_BASE_SEGMENT,
            vars: VariableDirectory::default(),
        }
    }

    fn entry(&self, segment: u16) -> Result<&SegmentEntry, MemoryError> {
        self.segments
            .get(&segment)
            .ok_or(MemoryError::SegmentNotMapped { segment })
    }

    fn entry_mut(&mut self, segment: u16) -> Result<&mut SegmentEntry, MemoryError> {
        self.segments
            .get_mut(&segment)
            .ok_or(MemoryError::SegmentNotMapped { segment })
    }

    fn span(
        data_len: usize,
        segment: u16,
        offset: u16,
        len: usize,
    ) -> Result<std::ops::Range<usize>, MemoryError> {
        let start = offset as usize;
        let end = start
            .checked_add(len)
            .filter(|&end| end <= data_len)
            .ok_or(MemoryError::AddressOutOfRange {
                segment,
                offset,
                len,
            })?;
        Ok(start..end)
    }

    fn insert_segment(&mut self, ordinal: u16, entry: SegmentEntry) -> Result<(), MemoryError> {
        if ordinal == BIG_BLOCK_SEGMENT || self.segments.contains_key(&ordinal) {
            return Err(MemoryError::SegmentExists { segment: ordinal });
        }
        self.segments.insert(ordinal, entry);
        Ok(())
    }

    /// Create the next heap segment and return its ordinal.
    fn grow_heap(&mut self) -> Result<u16, MemoryError> {
        while self.segments.contains_key(&self.next_heap) {
            self.next_heap += 1;
        }
        let ordinal = self.next_heap;
        if ordinal >= REAL_MODE_BASE_SEGMENT {
            return Err(MemoryError::OutOfMemory {
                requested: SEGMENT_LEN,
            });
        }
        let mut entry = SegmentEntry::zeroed();
        entry.heap = Some(HeapAllocator::new(0, SEGMENT_LEN));
        self.segments.insert(ordinal, entry);
        self.heap_segments.push(ordinal);
        self.next_heap += 1;
        Ok(ordinal)
    }
}

impl GuestMemory for ProtectedMemory {
    fn read_bytes(&self, segment: u16, offset: u16, len: usize) -> Result<&[u8], MemoryError> {
        let entry = self.entry(segment)?;
        let span = Self::span(entry.data.len(), segment, offset, len)?;
        Ok(&entry.data[span])
    }

    fn write_bytes(&mut self, segment: u16, offset: u16, src: &[u8]) -> Result<(), MemoryError> {
        let entry = self.entry_mut(segment)?;
        let span = Self::span(entry.data.len(), segment, offset, src.len())?;
        entry.data[span].copy_from_slice(src);
        Ok(())
    }

    fn fill(
        &mut self,
        segment: u16,
        offset: u16,
        len: usize,
        value: u8,
    ) -> Result<(), MemoryError> {
        let entry = self.entry_mut(segment)?;
        let span = Self::span(entry.data.len(), segment, offset, len)?;
        entry.data[span].fill(value);
        Ok(())
    }

    fn malloc(&mut self, size: u16) -> Result<FarPtr, MemoryError> {
        for i in 0..=self.heap_segments.len() {
            let ordinal = match self.heap_segments.get(i) {
                Some(&ordinal) => ordinal,
                None => self.grow_heap()?,
            };
            let entry = self.segments.get_mut(&ordinal).expect("heap segment");
            let heap = entry.heap.as_mut().expect("heap allocator");
            if let Some(offset) = heap.alloc(size) {
                let span = offset as usize..offset as usize + size as usize;
                entry.data[span].fill(0);
                return Ok(FarPtr::new(ordinal, offset));
            }
        }
        // A fresh 64 KiB segment can satisfy any u16-sized request, so the
        // loop only falls through when `grow_heap` itself failed.
        Err(MemoryError::OutOfMemory {
            requested: size as usize,
        })
    }

    fn free(&mut self, ptr: FarPtr) -> Result<(), MemoryError> {
        let Some(entry) = self.segments.get_mut(&ptr.segment) else {
            warn!(%ptr, "free of pointer into unmapped segment ignored");
            return Ok(());
        };
        match entry.heap.as_mut() {
            Some(heap) => {
                if heap.free(ptr.offset).is_some() {
                    Ok(())
                } else {
                    Err(MemoryError::BadFree { ptr })
                }
            }
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
        let code_cache = segment
            .is_code()
            .then(|| door_x86::decode_segment(&segment.data).into_iter().collect());
        self.insert_segment(
            segment.ordinal,
            SegmentEntry {
                data: segment.data,
                code_cache,
                heap: None,
            },
        )
    }

    fn allocate_segment(&mut self, ordinal: u16) -> Result<(), MemoryError> {
        self.insert_segment(ordinal, SegmentEntry::zeroed())
    }

    fn allocate_real_mode_segment(&mut self) -> Result<u16, MemoryError> {
        while self.segments.contains_key(&self.next_real_mode) {
            self.next_real_mode += 1;
        }
        let ordinal = self.next_real_mode;
        if ordinal == BIG_BLOCK_SEGMENT {
            return Err(MemoryError::OutOfMemory {
                requested: SEGMENT_LEN,
            });
        }
        self.segments.insert(ordinal, SegmentEntry::zeroed());
        self.next_real_mode += 1;
        Ok(ordinal)
    }

    fn has_segment(&self, ordinal: u16) -> bool {
        self.segments.contains_key(&ordinal)
    }

    fn segment_len(&self, ordinal: u16) -> Option<usize> {
        self.segments.get(&ordinal).map(|e| e.data.len())
    }

    fn instruction_at(&self, segment: u16, ip: u16) -> Result<Instruction, MemoryError> {
        let cache = self
            .entry(segment)?
            .code_cache
            .as_ref()
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
        let entry = self.entry_mut(segment)?;
        if entry.code_cache.is_none() {
            return Err(MemoryError::NotCodeSegment { segment });
        }
        let instruction =
            door_x86::decode_at(&entry.data, ip).ok_or(MemoryError::AddressOutOfRange {
                segment,
                offset: ip,
                len: 1,
            })?;
        entry
            .code_cache
            .as_mut()
            .expect("checked above")
            .insert(ip, instruction);
        Ok(instruction)
    }
}
