use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

bitflags! {
    /// Key attribute mask as stored in the legacy key definitions. Only
    /// `DUPLICATES`, `MODIFIABLE` and `SEGMENTED` drive behavior here; the
    /// rest are carried for round-tripping.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct KeyAttributes: u16 {
        const DUPLICATES = 0x0001;
        const MODIFIABLE = 0x0002;
        const OLD_STYLE_BINARY = 0x0004;
        const NUL_ALL_SEGMENTS = 0x0008;
        const SEGMENTED = 0x0010;
        const NUMBERED_ACS = 0x0020;
        const DESCENDING = 0x0040;
    }
}

/// Key data types a Worldgroup module actually declares. Anything else is
/// carried opaquely and compared as raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyDataType {
    String,
    Integer,
    Float,
    Zstring,
    UnsignedBinary,
    AutoInc,
    Other(u8),
}

impl KeyDataType {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => KeyDataType::String,
            1 => KeyDataType::Integer,
            2 => KeyDataType::Float,
            11 => KeyDataType::Zstring,
            14 => KeyDataType::UnsignedBinary,
            15 => KeyDataType::AutoInc,
            other => KeyDataType::Other(other),
        }
    }

    pub fn to_raw(self) -> u8 {
        match self {
            KeyDataType::String => 0,
            KeyDataType::Integer => 1,
            KeyDataType::Float => 2,
            KeyDataType::Zstring => 11,
            KeyDataType::UnsignedBinary => 14,
            KeyDataType::AutoInc => 15,
            KeyDataType::Other(other) => other,
        }
    }

    pub fn is_string(self) -> bool {
        matches!(self, KeyDataType::String | KeyDataType::Zstring)
    }

    /// 2- and 4-byte numeric keys order as little-endian unsigned values.
    /// Signed ordering for `Integer` would be "correct" but the original
    /// engine never did it; modules depend on the unsigned order.
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            KeyDataType::Integer | KeyDataType::UnsignedBinary | KeyDataType::AutoInc
        )
    }
}

/// One segment of a key definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySegment {
    /// Byte offset of the segment inside the record.
    pub offset: u16,
    pub length: u16,
    pub data_type: KeyDataType,
    pub attributes: KeyAttributes,
}

/// A key: one or more ordered segments. The key bytes of a record are the
/// concatenation of its segments' slices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyDef {
    pub number: u16,
    pub segments: Vec<KeySegment>,
}

impl KeyDef {
    pub fn total_length(&self) -> u16 {
        self.segments.iter().map(|s| s.length).sum()
    }

    pub fn primary_offset(&self) -> u16 {
        self.segments[0].offset
    }

    pub fn data_type(&self) -> KeyDataType {
        self.segments[0].data_type
    }

    pub fn allows_duplicates(&self) -> bool {
        self.segments[0].attributes.contains(KeyAttributes::DUPLICATES)
    }

    /// Extract the key bytes of `record`. Slices that run past the end of
    /// a short record are truncated.
    pub fn extract(&self, record: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.total_length() as usize);
        for segment in &self.segments {
            let start = (segment.offset as usize).min(record.len());
            let end = (start + segment.length as usize).min(record.len());
            out.extend_from_slice(&record[start..end]);
        }
        out
    }
}

fn strip_trailing_nuls(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|&b| b != 0)
        .map_or(0, |last| last + 1);
    &bytes[..end]
}

fn compare_le_unsigned(a: &[u8], b: &[u8]) -> Ordering {
    for i in (0..a.len().max(b.len())).rev() {
        let av = a.get(i).copied().unwrap_or(0);
        let bv = b.get(i).copied().unwrap_or(0);
        match av.cmp(&bv) {
            Ordering::Equal => {}
            other => return other,
        }
    }
    Ordering::Equal
}

/// Ordering of two key values of the same declared type. Strings compare
/// byte-wise with trailing NULs stripped; numeric keys as little-endian
/// unsigned integers; anything else as raw bytes.
pub fn compare_keys(data_type: KeyDataType, a: &[u8], b: &[u8]) -> Ordering {
    if data_type.is_string() {
        strip_trailing_nuls(a).cmp(strip_trailing_nuls(b))
    } else if data_type.is_numeric() {
        compare_le_unsigned(a, b)
    } else {
        a.cmp(b)
    }
}

/// In-place increment of a little-endian unsigned key, wrapping modulo
/// 2^(8·len).
pub(crate) fn increment_le(key: &mut [u8]) {
    for byte in key.iter_mut() {
        let (value, carry) = byte.overflowing_add(1);
        *byte = value;
        if !carry {
            break;
        }
    }
}

/// In-place decrement, wrapping the same way.
pub(crate) fn decrement_le(key: &mut [u8]) {
    for byte in key.iter_mut() {
        let (value, borrow) = byte.overflowing_sub(1);
        *byte = value;
        if !borrow {
            break;
        }
    }
}
