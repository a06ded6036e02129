use crate::error::BtrieveError;
use crate::file::BtrieveFile;
use rusqlite::{params, Connection};
use std::path::Path;

/// Write the auxiliary SQLite mirror: `metadata_t`, `keys_t` (one row per
/// key segment) and `data_t` with one BLOB column per key so the file can
/// be inspected with stock tooling. Inspection-only; nothing reads it
/// back.
pub fn write_mirror(file: &BtrieveFile, path: &Path) -> Result<(), BtrieveError> {
    let mut conn = Connection::open(path)?;

    let key_columns: String = (0..file.keys.len())
        .map(|i| format!(", key_{i} BLOB"))
        .collect();
    conn.execute_batch(&format!(
        "DROP TABLE IF EXISTS metadata_t;
         DROP TABLE IF EXISTS keys_t;
         DROP TABLE IF EXISTS data_t;
         CREATE TABLE metadata_t (
             record_length INTEGER NOT NULL,
             physical_record_length INTEGER NOT NULL,
             page_length INTEGER NOT NULL
         );
         CREATE TABLE keys_t (
             id INTEGER NOT NULL,
             attributes INTEGER NOT NULL,
             data_type INTEGER NOT NULL,
             offset INTEGER NOT NULL,
             length INTEGER NOT NULL
         );
         CREATE TABLE data_t (id INTEGER PRIMARY KEY, data BLOB{key_columns});"
    ))?;

    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO metadata_t (record_length, physical_record_length, page_length)
         VALUES (?1, ?2, ?3)",
        params![
            file.record_length,
            file.physical_record_length,
            file.page_length
        ],
    )?;

    {
        let mut key_stmt = tx.prepare(
            "INSERT INTO keys_t (id, attributes, data_type, offset, length)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for key in &file.keys {
            for segment in &key.segments {
                key_stmt.execute(params![
                    key.number,
                    segment.attributes.bits(),
                    segment.data_type.to_raw(),
                    segment.offset,
                    segment.length
                ])?;
            }
        }

        let placeholders: String = (0..file.keys.len())
            .map(|i| format!(", ?{}", i + 3))
            .collect();
        let columns: String = (0..file.keys.len())
            .map(|i| format!(", key_{i}"))
            .collect();
        let mut data_stmt = tx.prepare(&format!(
            "INSERT INTO data_t (id, data{columns}) VALUES (?1, ?2{placeholders})"
        ))?;
        for record in file.records() {
            let mut values: Vec<rusqlite::types::Value> = Vec::with_capacity(file.keys.len() + 2);
            values.push((record.offset as i64).into());
            values.push(record.data.clone().into());
            for key in &file.keys {
                values.push(key.extract(&record.data).into());
            }
            data_stmt.execute(rusqlite::params_from_iter(values))?;
        }
    }
    tx.commit()?;
    Ok(())
}
