//! Upload-level checks wrapped around parsing and frame generation.
//!
//! Size limits apply before any decoding, decoding happens before parsing,
//! and the empty-input checks that [`generate`] relies on happen here.

use std::{fs, path::Path};

use anyhow::{Context, Result, anyhow};
use encoding_rs::{Encoding, UTF_8};
use log::{debug, info};
use uuid::Uuid;

use crate::{
    csv_parser::{DEFAULT_DELIMITER, parse_with_delimiter, row_has_content},
    error::IngestError,
    frame::{CsvResult, generate},
};

pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';
pub const DEFAULT_MAX_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct IngestOptions {
    pub delimiter: u8,
    /// `None` disables the size check.
    pub max_bytes: Option<u64>,
    pub encoding: &'static Encoding,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER,
            max_bytes: Some(DEFAULT_MAX_BYTES),
            encoding: UTF_8,
        }
    }
}

impl IngestOptions {
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: Option<u64>) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn with_encoding(mut self, encoding: &'static Encoding) -> Self {
        self.encoding = encoding;
        self
    }
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_DELIMITER,
    })
}

pub fn check_size(size: u64, limit: Option<u64>) -> Result<(), IngestError> {
    match limit {
        Some(limit) if size > limit => Err(IngestError::Oversize { size, limit }),
        _ => Ok(()),
    }
}

/// Decodes `bytes`, honouring and stripping a byte order mark.
pub fn decode_upload(bytes: &[u8], encoding: &'static Encoding) -> Result<String, IngestError> {
    let (text, used, had_errors) = encoding.decode(bytes);
    if had_errors {
        return Err(IngestError::Decode {
            encoding: used.name().to_string(),
        });
    }
    if used != encoding {
        debug!("Byte order mark switched decoding to {}", used.name());
    }
    Ok(text.into_owned())
}

/// Splits parsed rows into header and data and generates the frame.
pub fn ingest_rows(rows: Vec<Vec<String>>, table_id: Uuid) -> Result<CsvResult, IngestError> {
    let mut rows = rows.into_iter();
    let header = rows.next().ok_or(IngestError::EmptyFile)?;
    if !row_has_content(&header) {
        return Err(IngestError::EmptyFile);
    }
    let data = rows.filter(|row| row_has_content(row)).collect::<Vec<_>>();
    if data.is_empty() {
        return Err(IngestError::NoDataRows);
    }
    debug!(
        "Ingesting {} data row(s) under {} header(s)",
        data.len(),
        header.len()
    );
    Ok(generate(&header, &data, table_id))
}

pub fn ingest_csv(text: &str, table_id: Uuid, delimiter: u8) -> Result<CsvResult, IngestError> {
    if text.is_empty() {
        return Err(IngestError::EmptyFile);
    }
    ingest_rows(parse_with_delimiter(text, delimiter), table_id)
}

pub fn ingest_bytes(
    bytes: &[u8],
    table_id: Uuid,
    options: &IngestOptions,
) -> Result<CsvResult, IngestError> {
    check_size(bytes.len() as u64, options.max_bytes)?;
    let text = decode_upload(bytes, options.encoding)?;
    ingest_csv(&text, table_id, options.delimiter)
}

/// Reads and ingests a file. The size limit is checked against file
/// metadata before the contents are read.
pub fn ingest_path(path: &Path, table_id: Uuid, options: &IngestOptions) -> Result<CsvResult> {
    let metadata = fs::metadata(path).with_context(|| format!("Reading metadata for {path:?}"))?;
    check_size(metadata.len(), options.max_bytes)?;
    let bytes = fs::read(path).with_context(|| format!("Opening input file {path:?}"))?;
    let result = ingest_bytes(&bytes, table_id, options)
        .with_context(|| format!("Ingesting {path:?}"))?;
    info!(
        "Ingested {path:?}: {} row(s), {} field(s)",
        result.data_frame.row_count(),
        result.fields.len()
    );
    Ok(result)
}
