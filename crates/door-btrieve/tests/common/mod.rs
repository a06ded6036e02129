#![allow(dead_code)]

//! Builds legacy-format `.DAT` images in memory so parser tests do not
//! depend on binary fixtures checked into the tree.

pub const PAGE_LENGTH: u16 = 512;

pub struct RawKeyDef {
    pub number: u16,
    pub attributes: u16,
    pub offset: u16,
    pub length: u16,
    pub data_type: u8,
}

pub enum Page {
    /// Marker dword 0xFFFFFFFF at offset 8.
    Key,
    /// Marker byte 0xAC at offset 6.
    Constraint,
    /// MSB of byte 5 set; slots of physical length from offset 6.
    /// `None` slots are written as deleted (leading 0xFFFFFFFF).
    Data(Vec<Option<Vec<u8>>>),
    /// A page with no marker at all (skipped with a warning).
    Unmarked,
}

pub struct DatBuilder {
    pub record_length: u16,
    pub physical_record_length: u16,
    pub keys: Vec<RawKeyDef>,
    pub key_count: u16,
    pub pages: Vec<Page>,
    pub record_count: u16,
}

fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

impl DatBuilder {
    pub fn build(&self) -> Vec<u8> {
        let page = PAGE_LENGTH as usize;
        let mut image = vec![0u8; page * (1 + self.pages.len())];

        // Header page.
        put_u16(&mut image, 0x08, PAGE_LENGTH);
        put_u16(&mut image, 0x14, self.key_count);
        put_u16(&mut image, 0x16, self.record_length);
        put_u16(&mut image, 0x18, self.physical_record_length);
        put_u16(&mut image, 0x1C, self.record_count);
        let mut pos = 0x110;
        for key in &self.keys {
            put_u16(&mut image, pos + 0x02, key.number);
            put_u16(&mut image, pos + 0x08, key.attributes);
            put_u16(&mut image, pos + 0x14, key.offset);
            put_u16(&mut image, pos + 0x16, key.length);
            image[pos + 0x1C] = key.data_type;
            pos += 0x1E;
        }

        for (index, layout) in self.pages.iter().enumerate() {
            let base = page * (index + 1);
            match layout {
                Page::Key => {
                    image[base + 8..base + 12].copy_from_slice(&[0xFF; 4]);
                }
                Page::Constraint => {
                    image[base + 6] = 0xAC;
                }
                Page::Unmarked => {}
                Page::Data(slots) => {
                    image[base + 5] = 0x80;
                    let phys = self.physical_record_length as usize;
                    let mut slot = base + 6;
                    for entry in slots {
                        match entry {
                            Some(data) => {
                                image[slot..slot + data.len()].copy_from_slice(data);
                            }
                            None => {
                                image[slot..slot + 4].copy_from_slice(&[0xFF; 4]);
                            }
                        }
                        slot += phys;
                    }
                }
            }
        }
        image
    }
}

/// The reference fixture: 512-byte pages, five pages in the file, three
/// keys (Zstring/32 at 2 with duplicates, Integer/4 at 34 modifiable,
/// Zstring/32 at 38 with both), 70-byte records in 86-byte slots.
pub fn reference_builder(records: Vec<Option<Vec<u8>>>) -> DatBuilder {
    let record_count = records.iter().flatten().count() as u16;
    DatBuilder {
        record_length: 70,
        physical_record_length: 86,
        key_count: 3,
        keys: vec![
            RawKeyDef {
                number: 0,
                attributes: 0x0001, // duplicates
                offset: 2,
                length: 32,
                data_type: 11, // zstring
            },
            RawKeyDef {
                number: 1,
                attributes: 0x0002, // modifiable
                offset: 34,
                length: 4,
                data_type: 1, // integer
            },
            RawKeyDef {
                number: 2,
                attributes: 0x0003, // duplicates | modifiable
                offset: 38,
                length: 32,
                data_type: 11,
            },
        ],
        pages: vec![
            Page::Key,
            Page::Constraint,
            Page::Data(records),
            Page::Key,
        ],
        record_count,
    }
}

/// A 70-byte record in the reference layout: Zstring key at 2, u32 key at
/// 34, Zstring key at 38.
pub fn reference_record(name: &str, number: u32, alias: &str) -> Vec<u8> {
    let mut record = vec![0u8; 70];
    record[2..2 + name.len()].copy_from_slice(name.as_bytes());
    record[34..38].copy_from_slice(&number.to_le_bytes());
    record[38..38 + alias.len()].copy_from_slice(alias.as_bytes());
    record
}

pub fn reference_image(records: &[(&str, u32, &str)]) -> Vec<u8> {
    let slots = records
        .iter()
        .map(|(name, number, alias)| Some(reference_record(name, *number, alias)))
        .collect();
    reference_builder(slots).build()
}
