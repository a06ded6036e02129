use crate::error::BtrieveError;
use crate::key::{KeyAttributes, KeyDataType, KeyDef, KeySegment};
use serde::{Deserialize, Serialize};
use tracing::warn;

// Fixed header offsets of the legacy on-disk format.
const OFF_PAGE_LENGTH: usize = 0x08;
const OFF_KEY_COUNT: usize = 0x14;
const OFF_RECORD_LENGTH: usize = 0x16;
const OFF_PHYSICAL_RECORD_LENGTH: usize = 0x18;
const OFF_RECORD_COUNT: usize = 0x1C;
const OFF_LOG_KEY: usize = 0x10C;
const OFF_KEY_DEFINITIONS: usize = 0x110;
const KEY_DEFINITION_LEN: usize = 0x1E;

// Offsets inside one key definition.
const KD_NUMBER: usize = 0x02;
const KD_ATTRIBUTES: usize = 0x08;
const KD_OFFSET: usize = 0x14;
const KD_LENGTH: usize = 0x16;
const KD_DATA_TYPE: usize = 0x1C;

/// One live record. `offset` is the stable identifier cursor positions
/// refer to, dense from 1, not a byte offset into any page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub offset: u32,
    pub data: Vec<u8>,
}

/// The fully deserialized state of one ISAM file: metadata, key
/// definitions and records sorted by offset. This is exactly what the
/// structured mirror persists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BtrieveFile {
    pub record_length: u16,
    pub physical_record_length: u16,
    pub page_length: u16,
    pub page_count: u16,
    pub log_key_present: bool,
    pub keys: Vec<KeyDef>,
    records: Vec<Record>,
}

fn read_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

impl BtrieveFile {
    /// Parse a legacy `.DAT` image.
    pub fn parse(data: &[u8]) -> Result<Self, BtrieveError> {
        let malformed = |reason: String| BtrieveError::MalformedFile { reason };
        if data.len() < 0x200 {
            return Err(malformed(format!(
                "{} bytes is too short for a header page",
                data.len()
            )));
        }

        let page_length = read_u16(data, OFF_PAGE_LENGTH);
        if page_length < 0x200 || data.len() < page_length as usize {
            return Err(malformed(format!("implausible page length {page_length}")));
        }
        if data.len() % page_length as usize != 0 {
            warn!(
                len = data.len(),
                page_length, "file length is not a whole number of pages"
            );
        }
        let page_count = (data.len() / page_length as usize - 1) as u16;

        let key_count = read_u16(data, OFF_KEY_COUNT);
        let record_length = read_u16(data, OFF_RECORD_LENGTH);
        let physical_record_length = read_u16(data, OFF_PHYSICAL_RECORD_LENGTH);
        let record_count = read_u16(data, OFF_RECORD_COUNT);
        let log_key_present = data[OFF_LOG_KEY] == 1;

        if physical_record_length < record_length || physical_record_length == 0 {
            return Err(malformed(format!(
                "physical record length {physical_record_length} < record length {record_length}"
            )));
        }

        let keys = Self::parse_keys(data, key_count)?;
        let records = Self::parse_pages(
            data,
            page_length,
            page_count,
            physical_record_length,
            record_length,
            record_count,
        );

        Ok(Self {
            record_length,
            physical_record_length,
            page_length,
            page_count,
            log_key_present,
            keys,
            records,
        })
    }

    /// Key definitions sit at 0x110, one per 0x1E bytes. A definition
    /// whose attributes carry `SEGMENTED` extends the key before it
    /// instead of starting a new one.
    fn parse_keys(data: &[u8], key_count: u16) -> Result<Vec<KeyDef>, BtrieveError> {
        let mut keys: Vec<KeyDef> = Vec::with_capacity(key_count as usize);
        let mut pos = OFF_KEY_DEFINITIONS;
        while keys.len() < key_count as usize || Self::continuation_follows(data, pos) {
            if pos + KEY_DEFINITION_LEN > data.len() {
                return Err(BtrieveError::MalformedFile {
                    reason: format!(
                        "header ends inside key definitions ({} of {key_count} keys)",
                        keys.len()
                    ),
                });
            }
            let def = &data[pos..pos + KEY_DEFINITION_LEN];
            pos += KEY_DEFINITION_LEN;

            let number = read_u16(def, KD_NUMBER);
            let attributes = KeyAttributes::from_bits_truncate(read_u16(def, KD_ATTRIBUTES));
            let segment = KeySegment {
                offset: read_u16(def, KD_OFFSET),
                length: read_u16(def, KD_LENGTH),
                data_type: KeyDataType::from_raw(def[KD_DATA_TYPE]),
                attributes,
            };

            match keys.last_mut() {
                Some(last) if attributes.contains(KeyAttributes::SEGMENTED) => {
                    last.segments.push(segment);
                }
                _ => keys.push(KeyDef {
                    number,
                    segments: vec![segment],
                }),
            }
        }
        Ok(keys)
    }

    fn continuation_follows(data: &[u8], pos: usize) -> bool {
        pos + KEY_DEFINITION_LEN <= data.len()
            && KeyAttributes::from_bits_truncate(read_u16(data, pos + KD_ATTRIBUTES))
                .contains(KeyAttributes::SEGMENTED)
    }

    fn parse_pages(
        data: &[u8],
        page_length: u16,
        page_count: u16,
        physical_record_length: u16,
        record_length: u16,
        record_count: u16,
    ) -> Vec<Record> {
        let mut records = Vec::with_capacity(record_count as usize);
        let slot_len = physical_record_length as usize;

        for page in 1..=page_count as usize {
            let base = page * page_length as usize;
            if base + page_length as usize > data.len() {
                break;
            }
            let page_data = &data[base..base + page_length as usize];

            // Key pages and key-constraint pages carry no records.
            if read_u32(page_data, 8) == 0xFFFF_FFFF {
                continue;
            }
            if page_data[6] == 0xAC {
                continue;
            }
            if page_data[5] & 0x80 == 0 {
                warn!(page, "skipping page without the data-page marker");
                continue;
            }

            let mut slot = 6;
            while slot + slot_len <= page_data.len() && records.len() < record_count as usize {
                let raw = &page_data[slot..slot + slot_len];
                slot += slot_len;
                // An emptied slot is all-ones in its first dword.
                if raw[..4] == [0xFF; 4] {
                    continue;
                }
                records.push(Record {
                    offset: records.len() as u32 + 1,
                    data: raw[..record_length as usize].to_vec(),
                });
            }
        }
        records
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn record(&self, offset: u32) -> Option<&Record> {
        self.records
            .binary_search_by_key(&offset, |r| r.offset)
            .ok()
            .map(|i| &self.records[i])
    }

    pub fn first_offset(&self) -> Option<u32> {
        self.records.first().map(|r| r.offset)
    }

    pub fn last_offset(&self) -> Option<u32> {
        self.records.last().map(|r| r.offset)
    }

    /// Smallest record offset strictly greater than `offset`.
    pub fn next_offset_after(&self, offset: u32) -> Option<u32> {
        let idx = self.records.partition_point(|r| r.offset <= offset);
        self.records.get(idx).map(|r| r.offset)
    }

    /// Largest record offset strictly less than `offset`.
    pub fn prev_offset_before(&self, offset: u32) -> Option<u32> {
        let idx = self.records.partition_point(|r| r.offset < offset);
        idx.checked_sub(1).map(|i| self.records[i].offset)
    }

    fn normalize(&self, data: &[u8]) -> Vec<u8> {
        let mut out = data.to_vec();
        out.resize(self.record_length as usize, 0);
        out
    }

    /// Append a record at `max_offset + 1` (1 for an empty file). A length
    /// mismatch warns and inserts anyway, padded or truncated.
    pub fn insert(&mut self, data: &[u8]) -> u32 {
        if data.len() != self.record_length as usize {
            warn!(
                got = data.len(),
                expected = self.record_length,
                "inserting record with mismatched length"
            );
        }
        let offset = self.last_offset().map_or(1, |o| o + 1);
        let data = self.normalize(data);
        self.records.push(Record { offset, data });
        offset
    }

    /// Overwrite the record at `offset`. Returns whether such a record
    /// existed. Unlike insert, a length mismatch here is fatal.
    pub fn update(&mut self, offset: u32, data: &[u8]) -> Result<bool, BtrieveError> {
        if data.len() != self.record_length as usize {
            return Err(BtrieveError::MalformedRecord {
                expected: self.record_length as usize,
                actual: data.len(),
            });
        }
        match self.records.binary_search_by_key(&offset, |r| r.offset) {
            Ok(idx) => {
                self.records[idx].data = data.to_vec();
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    /// Remove the record at `offset`; false when there is none.
    pub fn remove(&mut self, offset: u32) -> bool {
        match self.records.binary_search_by_key(&offset, |r| r.offset) {
            Ok(idx) => {
                self.records.remove(idx);
                true
            }
            Err(_) => false,
        }
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Construct an in-memory file (tests and tooling).
    pub fn from_parts(
        record_length: u16,
        physical_record_length: u16,
        page_length: u16,
        page_count: u16,
        keys: Vec<KeyDef>,
    ) -> Self {
        Self {
            record_length,
            physical_record_length,
            page_length,
            page_count,
            log_key_present: false,
            keys,
            records: Vec::new(),
        }
    }
}
