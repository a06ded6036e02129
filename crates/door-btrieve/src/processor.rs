use crate::error::BtrieveError;
use crate::file::BtrieveFile;
use crate::key::{compare_keys, decrement_le, increment_le, KeyDataType, KeyDef};
use crate::{mirror, sqlite};
use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Behavior switches for quirks of the legacy engine.
#[derive(Debug, Clone, Copy)]
pub struct BtrieveConfig {
    /// The legacy engine restricted `GetGreater`/`GetLess` scans (and
    /// their or-equal forms) to records beyond the current cursor, which
    /// makes a less-than scan miss everything behind the cursor. On by
    /// default for module compatibility; turn off for the sane scan over
    /// the whole live set.
    pub legacy_scan_window: bool,
}

impl Default for BtrieveConfig {
    fn default() -> Self {
        Self {
            legacy_scan_window: true,
        }
    }
}

/// Classic operation codes as passed by the host-API shims.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum OperationCode {
    Open = 0,
    Close = 1,
    Insert = 2,
    Update = 3,
    Delete = 4,
    GetEqual = 5,
    GetNext = 6,
    GetPrevious = 7,
    GetGreater = 8,
    GetGreaterOrEqual = 9,
    GetLess = 10,
    GetLessOrEqual = 11,
    GetFirst = 12,
    GetLast = 13,
    StepNext = 24,
    StepFirst = 33,
    StepLast = 34,
    StepPrevious = 35,
}

impl TryFrom<u16> for OperationCode {
    type Error = BtrieveError;

    fn try_from(code: u16) -> Result<Self, BtrieveError> {
        use OperationCode::*;
        Ok(match code {
            0 => Open,
            1 => Close,
            2 => Insert,
            3 => Update,
            4 => Delete,
            5 => GetEqual,
            6 => GetNext,
            7 => GetPrevious,
            8 => GetGreater,
            9 => GetGreaterOrEqual,
            10 => GetLess,
            11 => GetLessOrEqual,
            12 => GetFirst,
            13 => GetLast,
            24 => StepNext,
            33 => StepFirst,
            34 => StepLast,
            35 => StepPrevious,
            _ => return Err(BtrieveError::UnsupportedOperation { code }),
        })
    }
}

/// The last established key query, reused by continuations.
#[derive(Debug, Clone)]
struct PreviousQuery {
    key_number: u16,
    key_offset: u16,
    key_length: u16,
    data_type: KeyDataType,
    key: Vec<u8>,
}

/// Cursor over one ISAM file: a single `position` (current record offset)
/// plus the stored previous query. One processor per open file per guest
/// context; never shared across threads.
#[derive(Debug)]
pub struct BtrieveProcessor {
    file: BtrieveFile,
    mirror_path: PathBuf,
    position: u32,
    previous_query: Option<PreviousQuery>,
    config: BtrieveConfig,
}

impl BtrieveProcessor {
    pub fn open(dir: &Path, file_name: &str) -> Result<Self, BtrieveError> {
        Self::open_with_config(dir, file_name, BtrieveConfig::default())
    }

    /// Open `dir/file_name`, preferring the structured `.EMU` mirror. A
    /// missing database is recreated from a `.VIR` virgin copy when one
    /// exists; the first conversion from the legacy format also writes
    /// the SQLite inspection mirror.
    pub fn open_with_config(
        dir: &Path,
        file_name: &str,
        config: BtrieveConfig,
    ) -> Result<Self, BtrieveError> {
        let dat_path = dir.join(file_name);
        let emu_path = dat_path.with_extension("EMU");

        let file = if emu_path.exists() {
            mirror::load(&emu_path)?
        } else {
            if !dat_path.exists() {
                let vir_path = dat_path.with_extension("VIR");
                if !vir_path.exists() {
                    return Err(BtrieveError::FileNotFound { path: dat_path });
                }
                info!(path = %dat_path.display(), "creating fresh database from virgin copy");
                fs::copy(&vir_path, &dat_path)?;
            }
            let data = fs::read(&dat_path)?;
            let file = BtrieveFile::parse(&data)?;
            mirror::save(&file, &emu_path)?;
            sqlite::write_mirror(&file, &dat_path.with_extension("DB"))?;
            file
        };

        Ok(Self::with_file(file, emu_path, config))
    }

    /// Wrap an already-loaded file. The mirror is flushed to `mirror_path`
    /// after every mutation.
    pub fn with_file(file: BtrieveFile, mirror_path: PathBuf, config: BtrieveConfig) -> Self {
        let position = file.first_offset().unwrap_or(0);
        Self {
            file,
            mirror_path,
            position,
            previous_query: None,
            config,
        }
    }

    pub fn file(&self) -> &BtrieveFile {
        &self.file
    }

    pub fn position(&self) -> u32 {
        self.position
    }

    pub fn current_record(&self) -> Option<&[u8]> {
        self.record_at(self.position)
    }

    /// The record bytes stored under `offset`, if it is live.
    pub fn record_at(&self, offset: u32) -> Option<&[u8]> {
        self.file.record(offset).map(|r| r.data.as_slice())
    }

    pub fn record_count(&self) -> usize {
        self.file.record_count()
    }

    pub fn key(&self, number: u16) -> Result<&KeyDef, BtrieveError> {
        self.file
            .keys
            .iter()
            .find(|k| k.number == number)
            .ok_or(BtrieveError::InvalidKey { number })
    }

    // --- step operations ---------------------------------------------

    pub fn step_first(&mut self) -> bool {
        match self.file.first_offset() {
            Some(offset) => {
                self.position = offset;
                true
            }
            None => false,
        }
    }

    pub fn step_next(&mut self) -> bool {
        match self.file.next_offset_after(self.position) {
            Some(offset) => {
                self.position = offset;
                true
            }
            None => false,
        }
    }

    pub fn step_previous(&mut self) -> bool {
        match self.file.prev_offset_before(self.position) {
            Some(offset) => {
                self.position = offset;
                true
            }
            None => false,
        }
    }

    pub fn step_last(&mut self) -> bool {
        match self.file.last_offset() {
            Some(offset) => {
                self.position = offset;
                true
            }
            None => false,
        }
    }

    // --- keyed queries -----------------------------------------------

    /// Record the query a continuation will reuse. A caller key longer
    /// than the defined key widens the stored length: some modules pass
    /// their whole struct key even when the declared ISAM key is shorter.
    fn build_query(&mut self, key_number: u16, key: &[u8]) -> Result<(), BtrieveError> {
        let keydef = self.key(key_number)?;
        let mut key_length = keydef.total_length();
        if key.len() > key_length as usize {
            warn!(
                given = key.len(),
                defined = key_length,
                "caller key longer than the defined key; widening the stored query"
            );
            key_length = key.len() as u16;
        }
        self.previous_query = Some(PreviousQuery {
            key_number,
            key_offset: keydef.primary_offset(),
            key_length,
            data_type: keydef.data_type(),
            key: key.to_vec(),
        });
        Ok(())
    }

    /// The record's key bytes as the stored query sees them: the defined
    /// (possibly multi-segment) key, or a widened contiguous slice when
    /// the query was widened.
    fn record_key(&self, query: &PreviousQuery, record: &[u8]) -> Vec<u8> {
        if let Ok(keydef) = self.key(query.key_number) {
            if query.key_length == keydef.total_length() {
                return keydef.extract(record);
            }
        }
        let start = (query.key_offset as usize).min(record.len());
        let end = (start + query.key_length as usize).min(record.len());
        record[start..end].to_vec()
    }

    /// Ascending-offset scan for the first record matching the stored
    /// query exactly.
    fn scan_equal(&mut self) -> bool {
        let Some(query) = self.previous_query.clone() else {
            return false;
        };
        let found = self.file.records().iter().find_map(|r| {
            (compare_keys(query.data_type, &self.record_key(&query, &r.data), &query.key)
                == Ordering::Equal)
                .then_some(r.offset)
        });
        match found {
            Some(offset) => {
                self.position = offset;
                true
            }
            None => false,
        }
    }

    pub fn get_equal(
        &mut self,
        key_number: u16,
        key: &[u8],
        new_query: bool,
    ) -> Result<bool, BtrieveError> {
        if new_query {
            self.build_query(key_number, key)?;
        }
        Ok(self.scan_equal())
    }

    fn extreme_by_key(&mut self, key_number: u16, want: Ordering) -> Result<bool, BtrieveError> {
        let keydef = self.key(key_number)?.clone();
        let data_type = keydef.data_type();
        let mut best: Option<(Vec<u8>, u32)> = None;
        for record in self.file.records() {
            let key = keydef.extract(&record.data);
            let better = match &best {
                None => true,
                Some((best_key, _)) => compare_keys(data_type, &key, best_key) == want,
            };
            if better {
                best = Some((key, record.offset));
            }
        }
        let Some((key, offset)) = best else {
            return Ok(false);
        };
        self.position = offset;
        self.previous_query = Some(PreviousQuery {
            key_number,
            key_offset: keydef.primary_offset(),
            key_length: keydef.total_length(),
            data_type,
            key,
        });
        Ok(true)
    }

    /// Record with the smallest key value under the key's ordering.
    pub fn get_key_first(&mut self, key_number: u16) -> Result<bool, BtrieveError> {
        self.extreme_by_key(key_number, Ordering::Less)
    }

    pub fn get_key_last(&mut self, key_number: u16) -> Result<bool, BtrieveError> {
        self.extreme_by_key(key_number, Ordering::Greater)
    }

    /// Continue the stored query forward. String keys look for the next
    /// record (beyond the cursor) with the same key; numeric keys
    /// increment the stored key modulo its width and rescan.
    pub fn get_key_next(&mut self, key_number: u16) -> Result<bool, BtrieveError> {
        self.key(key_number)?;
        let Some(mut query) = self.previous_query.clone() else {
            return Ok(false);
        };
        if query.data_type.is_string() {
            let found = self
                .file
                .records()
                .iter()
                .filter(|r| r.offset > self.position)
                .find_map(|r| {
                    (compare_keys(query.data_type, &self.record_key(&query, &r.data), &query.key)
                        == Ordering::Equal)
                        .then_some(r.offset)
                });
            match found {
                Some(offset) => {
                    self.position = offset;
                    Ok(true)
                }
                None => Ok(false),
            }
        } else {
            increment_le(&mut query.key);
            self.previous_query = Some(query);
            Ok(self.scan_equal())
        }
    }

    /// Mirror image of [`Self::get_key_next`].
    pub fn get_key_previous(&mut self, key_number: u16) -> Result<bool, BtrieveError> {
        self.key(key_number)?;
        let Some(mut query) = self.previous_query.clone() else {
            return Ok(false);
        };
        if query.data_type.is_string() {
            let found = self
                .file
                .records()
                .iter()
                .rev()
                .filter(|r| r.offset < self.position)
                .find_map(|r| {
                    (compare_keys(query.data_type, &self.record_key(&query, &r.data), &query.key)
                        == Ordering::Equal)
                        .then_some(r.offset)
                });
            match found {
                Some(offset) => {
                    self.position = offset;
                    Ok(true)
                }
                None => Ok(false),
            }
        } else {
            decrement_le(&mut query.key);
            self.previous_query = Some(query);
            Ok(self.scan_equal())
        }
    }

    fn keyed_relative(
        &mut self,
        key_number: u16,
        key: &[u8],
        new_query: bool,
        accept: fn(Ordering) -> bool,
    ) -> Result<bool, BtrieveError> {
        if new_query {
            self.build_query(key_number, key)?;
        }
        let Some(query) = self.previous_query.clone() else {
            return Ok(false);
        };
        // Bug-compatible cursor window: only offsets beyond the cursor
        // are considered, even for less-than scans.
        let floor = if self.config.legacy_scan_window {
            self.position
        } else {
            0
        };
        let found = self
            .file
            .records()
            .iter()
            .filter(|r| r.offset > floor)
            .find_map(|r| {
                accept(compare_keys(
                    query.data_type,
                    &self.record_key(&query, &r.data),
                    &query.key,
                ))
                .then_some(r.offset)
            });
        match found {
            Some(offset) => {
                self.position = offset;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn get_key_greater(
        &mut self,
        key_number: u16,
        key: &[u8],
        new_query: bool,
    ) -> Result<bool, BtrieveError> {
        self.keyed_relative(key_number, key, new_query, |o| o == Ordering::Greater)
    }

    pub fn get_key_greater_or_equal(
        &mut self,
        key_number: u16,
        key: &[u8],
        new_query: bool,
    ) -> Result<bool, BtrieveError> {
        self.keyed_relative(key_number, key, new_query, |o| o != Ordering::Less)
    }

    pub fn get_key_less(
        &mut self,
        key_number: u16,
        key: &[u8],
        new_query: bool,
    ) -> Result<bool, BtrieveError> {
        self.keyed_relative(key_number, key, new_query, |o| o == Ordering::Less)
    }

    pub fn get_key_less_or_equal(
        &mut self,
        key_number: u16,
        key: &[u8],
        new_query: bool,
    ) -> Result<bool, BtrieveError> {
        self.keyed_relative(key_number, key, new_query, |o| o != Ordering::Greater)
    }

    // --- mutations ----------------------------------------------------

    fn flush(&self) -> Result<(), BtrieveError> {
        mirror::save(&self.file, &self.mirror_path)
    }

    pub fn insert(&mut self, data: &[u8]) -> Result<u32, BtrieveError> {
        let offset = self.file.insert(data);
        self.flush()?;
        Ok(offset)
    }

    pub fn update(&mut self, offset: u32, data: &[u8]) -> Result<bool, BtrieveError> {
        let updated = self.file.update(offset, data)?;
        self.flush()?;
        Ok(updated)
    }

    /// Remove the record at the cursor. The cursor itself is left where
    /// it was, so a following `step_next` advances past the gap.
    pub fn delete(&mut self) -> Result<bool, BtrieveError> {
        let removed = self.file.remove(self.position);
        self.flush()?;
        Ok(removed)
    }

    pub fn delete_all(&mut self) -> Result<(), BtrieveError> {
        self.file.clear();
        self.flush()
    }

    // --- op-code dispatch --------------------------------------------

    /// Dispatch a classic operation code the way the host-API shims feed
    /// them in: `buffer` is the key for queries and the record image for
    /// Insert/Update. Returns the legacy 1/0 success word.
    pub fn perform(
        &mut self,
        op: OperationCode,
        key_number: u16,
        buffer: &[u8],
        new_query: bool,
    ) -> Result<u16, BtrieveError> {
        use OperationCode::*;
        let ok = match op {
            Open | Close => true,
            Insert => {
                self.insert(buffer)?;
                true
            }
            Update => {
                let position = self.position;
                self.update(position, buffer)?
            }
            Delete => self.delete()?,
            GetEqual => self.get_equal(key_number, buffer, new_query)?,
            GetNext => self.get_key_next(key_number)?,
            GetPrevious => self.get_key_previous(key_number)?,
            GetGreater => self.get_key_greater(key_number, buffer, new_query)?,
            GetGreaterOrEqual => self.get_key_greater_or_equal(key_number, buffer, new_query)?,
            GetLess => self.get_key_less(key_number, buffer, new_query)?,
            GetLessOrEqual => self.get_key_less_or_equal(key_number, buffer, new_query)?,
            GetFirst => self.get_key_first(key_number)?,
            GetLast => self.get_key_last(key_number)?,
            StepFirst => self.step_first(),
            StepNext => self.step_next(),
            StepPrevious => self.step_previous(),
            StepLast => self.step_last(),
        };
        Ok(ok as u16)
    }
}
