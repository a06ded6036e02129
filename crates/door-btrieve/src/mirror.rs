use crate::error::BtrieveError;
use crate::file::BtrieveFile;
use std::fs;
use std::io::Write;
use std::path::Path;

/// Persist the structured mirror. Written on first conversion from the
/// legacy format and after every mutation, so a crash never loses more
/// than the in-flight operation.
pub fn save(file: &BtrieveFile, path: &Path) -> Result<(), BtrieveError> {
    let json = serde_json::to_vec(file)?;
    fs::write(path, json)?;
    Ok(())
}

pub fn load(path: &Path) -> Result<BtrieveFile, BtrieveError> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Debug utility: dump every record as ASCII `"<len>,"` followed by the
/// raw bytes and CRLF, with a trailing 0x1A end-of-file marker.
pub fn write_recovery_dump(file: &BtrieveFile, path: &Path) -> Result<(), BtrieveError> {
    let mut out = fs::File::create(path)?;
    for record in file.records() {
        write!(out, "{},", record.data.len())?;
        out.write_all(&record.data)?;
        out.write_all(b"\r\n")?;
    }
    out.write_all(&[0x1A])?;
    Ok(())
}
