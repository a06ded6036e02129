use crate::{MemoryError, BIG_BLOCK_SEGMENT};
use door_types::FarPtr;
use std::collections::HashMap;

/// Named scratch allocations made on behalf of the host-API layer, plus the
/// big-memory-block table. Names are opaque identifiers owned by the host
/// API; the directory outlives every allocation placed in it for the
/// guest's lifetime.
#[derive(Debug, Default)]
pub(crate) struct VariableDirectory {
    vars: HashMap<String, FarPtr>,
    big_blocks: Vec<Vec<FarPtr>>,
}

impl VariableDirectory {
    pub(crate) fn get(&self, name: &str) -> Option<FarPtr> {
        self.vars.get(name).copied()
    }

    pub(crate) fn insert(&mut self, name: &str, ptr: FarPtr) {
        self.vars.insert(name.to_owned(), ptr);
    }

    pub(crate) fn big_block_count(&self) -> usize {
        self.big_blocks.len()
    }

    pub(crate) fn push_big_block(&mut self, elements: Vec<FarPtr>) -> FarPtr {
        let handle = self.big_blocks.len() as u16;
        self.big_blocks.push(elements);
        FarPtr::new(BIG_BLOCK_SEGMENT, handle)
    }

    pub(crate) fn big_block_element(&self, ptr: FarPtr, index: u16) -> Result<FarPtr, MemoryError> {
        if ptr.segment != BIG_BLOCK_SEGMENT {
            return Err(MemoryError::InvalidBigBlock { ptr, index });
        }
        self.big_blocks
            .get(ptr.offset as usize)
            .and_then(|block| block.get(index as usize))
            .copied()
            .ok_or(MemoryError::InvalidBigBlock { ptr, index })
    }
}
