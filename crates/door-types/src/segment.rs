use crate::FarPtr;
use bitflags::bitflags;
use thiserror::Error;

/// Largest buffer a single 16-bit segment can back.
pub const MAX_SEGMENT_LEN: usize = 65536;

bitflags! {
    /// Flags carried on a loader-provided segment descriptor.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SegmentFlags: u16 {
        /// Executable: the memory core decodes it into its instruction cache.
        const CODE = 1 << 0;
        const DATA = 1 << 1;
    }
}

/// One relocation the NE loader has already resolved against the import
/// table. Carried opaquely; the core never applies relocations itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relocation {
    pub offset_in_segment: u16,
    pub target: FarPtr,
}

#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("segment {ordinal:#06X} image is {len} bytes, limit is {MAX_SEGMENT_LEN}")]
    TooLarge { ordinal: u16, len: usize },
}

/// A code or data segment as handed over by the module loader: raw bytes
/// (at most 64 KiB), the ordinal the module addresses it by, and any
/// already-resolved relocation records.
#[derive(Debug, Clone)]
pub struct Segment {
    pub ordinal: u16,
    pub data: Vec<u8>,
    pub flags: SegmentFlags,
    pub relocations: Vec<Relocation>,
}

impl Segment {
    pub fn new(ordinal: u16, data: Vec<u8>, flags: SegmentFlags) -> Result<Self, SegmentError> {
        if data.len() > MAX_SEGMENT_LEN {
            return Err(SegmentError::TooLarge {
                ordinal,
                len: data.len(),
            });
        }
        Ok(Self {
            ordinal,
            data,
            flags,
            relocations: Vec::new(),
        })
    }

    pub fn code(ordinal: u16, data: Vec<u8>) -> Result<Self, SegmentError> {
        Self::new(ordinal, data, SegmentFlags::CODE)
    }

    pub fn data(ordinal: u16, data: Vec<u8>) -> Result<Self, SegmentError> {
        Self::new(ordinal, data, SegmentFlags::DATA)
    }

    pub fn is_code(&self) -> bool {
        self.flags.contains(SegmentFlags::CODE)
    }
}
