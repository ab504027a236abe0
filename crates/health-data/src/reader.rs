//! Delimited roster export discovery and loading.
//!
//! Turns a CSV (or other single-character-delimited) export into
//! header-keyed [`RawRecord`]s. No interpretation of cell values happens
//! here; that is the normalizer's job.

use std::path::{Path, PathBuf};

use health_core::error::{CoreError, Result};
use health_core::models::RawRecord;
use tracing::{debug, warn};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

// ── Public API ────────────────────────────────────────────────────────────────

/// Find all `.csv` files recursively under `dir`, sorted by path.
pub fn find_csv_files(dir: &Path) -> Vec<PathBuf> {
    if !dir.exists() {
        warn!("Roster directory does not exist: {}", dir.display());
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry.file_type().is_file()
                && entry
                    .path()
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case("csv"))
                    .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect();

    files.sort();
    files
}

/// Read every record of the file at `path`.
pub fn read_records_from_path(path: &Path, delimiter: char) -> Result<Vec<RawRecord>> {
    let bytes = std::fs::read(path).map_err(|source| CoreError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    let records = read_records_from_bytes(&bytes, delimiter)?;
    debug!("Read {} records from {}", records.len(), path.display());
    Ok(records)
}

/// Read every record of an in-memory export.
pub fn read_records_from_str(text: &str, delimiter: char) -> Result<Vec<RawRecord>> {
    read_records_from_bytes(text.as_bytes(), delimiter)
}

/// Read every record of raw export bytes.
///
/// * A leading UTF-8 byte-order mark is dropped.
/// * Header names are trimmed.
/// * Short rows read their missing cells as empty; surplus cells are ignored.
/// * Invalid UTF-8 is replaced rather than rejected.
/// * Blank lines are skipped and yield no record, so record positions can
///   trail file line numbers.
pub fn read_records_from_bytes(bytes: &[u8], delimiter: char) -> Result<Vec<RawRecord>> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .delimiter(delimiter_byte(delimiter)?)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .byte_headers()
        .map_err(|e| CoreError::CsvRead(e.to_string()))?
        .iter()
        .map(|h| String::from_utf8_lossy(h).trim().to_string())
        .collect();

    let mut records = Vec::new();
    for result in reader.byte_records() {
        let row = result.map_err(|e| CoreError::CsvRead(e.to_string()))?;
        let record: RawRecord = headers
            .iter()
            .enumerate()
            .map(|(i, header)| {
                let cell = row.get(i).unwrap_or_default();
                (header.as_str(), String::from_utf8_lossy(cell).into_owned())
            })
            .collect();
        records.push(record);
    }

    Ok(records)
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// The csv reader only supports single-byte delimiters.
pub(crate) fn delimiter_byte(delimiter: char) -> Result<u8> {
    if delimiter.is_ascii() && !matches!(delimiter, '"' | '\n' | '\r') {
        Ok(delimiter as u8)
    } else {
        Err(CoreError::Config(format!(
            "delimiter must be a single ASCII character other than a quote or newline, got {delimiter:?}"
        )))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
