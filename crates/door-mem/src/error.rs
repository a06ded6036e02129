use door_types::FarPtr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MemoryError {
    #[error("segment {segment:#06x} is not mapped")]
    SegmentNotMapped { segment: u16 },

    #[error("{len}-byte access at {segment:#06x}:{offset:#06x} runs past the segment")]
    AddressOutOfRange {
        segment: u16,
        offset: u16,
        len: usize,
    },

    #[error("no NUL terminator between {segment:#06x}:{offset:#06x} and the end of the segment")]
    MalformedCString { segment: u16, offset: u16 },

    #[error("allocator exhausted ({requested} bytes requested)")]
    OutOfMemory { requested: usize },

    #[error("free of {ptr} which is not a live allocation")]
    BadFree { ptr: FarPtr },

    #[error("segment ordinal {segment:#06x} is already in use")]
    SegmentExists { segment: u16 },

    #[error("segment {segment:#06x} image is {len} bytes, limit is 65536")]
    SegmentTooLarge { segment: u16, len: usize },

    #[error("segment {segment:#06x} is not a code segment")]
    NotCodeSegment { segment: u16 },

    #[error("{segment:#06x}:{offset:#06x} is not a cached instruction boundary")]
    NotInstructionBoundary { segment: u16, offset: u16 },

    #[error("big memory block reference {ptr}[{index}] is invalid")]
    InvalidBigBlock { ptr: FarPtr, index: u16 },
}
