//! Shared leaf types for the door-module emulator core.
//!
//! Everything here is plain data passed across the CPU / memory / loader
//! seams: segmented far pointers and the segment descriptors an external NE
//! loader hands to the memory core.

mod far_ptr;
mod segment;

pub use far_ptr::FarPtr;
pub use segment::{Relocation, Segment, SegmentError, SegmentFlags};
