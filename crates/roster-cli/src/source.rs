//! CSV intake: tokenizes an upload into raw rows and its manifest.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use csv::ReaderBuilder;
use tracing::{debug, trace};

use roster_model::{RawRow, SourceFormat, UploadManifest};
use roster_store::content_checksum;

use crate::logging::redact_value;

const CANDIDATE_DELIMITERS: [u8; 4] = [b',', b';', b'\t', b'|'];
const UTF8_BOM: char = '\u{feff}';

/// A tokenized upload ready for batch creation.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub manifest: UploadManifest,
    pub rows: Vec<RawRow>,
}

/// Reads a CSV upload.
///
/// Rows are numbered from 1, the header line excluded. Values are kept as
/// written; trimming belongs to the mapping's transforms. When `delimiter`
/// is `None` the most frequent candidate in the header line is used.
pub fn read_csv(path: &Path, delimiter: Option<u8>) -> Result<SourceFile> {
    let bytes =
        fs::read(path).with_context(|| format!("failed to read upload {}", path.display()))?;
    let original_filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let format = detect_format(path)?;
    if format != SourceFormat::Csv {
        bail!("{original_filename}: only CSV uploads can be read here");
    }
    let text = std::str::from_utf8(&bytes)
        .with_context(|| format!("{original_filename} is not UTF-8 encoded"))?;
    let delimiter = delimiter.unwrap_or_else(|| sniff_delimiter(text));

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .from_reader(text.as_bytes());
    let headers: Vec<String> = reader
        .headers()
        .with_context(|| format!("failed to read the header line of {original_filename}"))?
        .iter()
        .enumerate()
        .map(|(position, header)| {
            if position == 0 {
                header.trim_start_matches(UTF8_BOM).to_string()
            } else {
                header.to_string()
            }
        })
        .collect();
    check_headers(&headers)?;

    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let row_index = u32::try_from(idx + 1).context("upload has too many rows")?;
        let record = record.with_context(|| format!("{original_filename}: bad row {row_index}"))?;
        let values: BTreeMap<String, String> = headers
            .iter()
            .cloned()
            .zip(record.iter().map(ToString::to_string))
            .collect();
        trace!(
            row_index,
            values = redact_value(&record.iter().collect::<Vec<_>>().join("|")),
            "row read"
        );
        rows.push(RawRow::new(row_index, values)?);
    }
    debug!(
        file = %original_filename,
        headers = headers.len(),
        rows = rows.len(),
        delimiter = %char::from(delimiter),
        "upload tokenized"
    );

    Ok(SourceFile {
        manifest: UploadManifest {
            original_filename,
            format,
            checksum_sha256: content_checksum(&bytes),
            mime_type: Some("text/csv".to_string()),
            encoding: Some("utf-8".to_string()),
            delimiter: Some(char::from(delimiter)),
            sheet_name: None,
            headers,
            row_count: rows.len(),
        },
        rows,
    })
}

fn detect_format(path: &Path) -> Result<SourceFormat> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("csv");
    extension
        .parse::<SourceFormat>()
        .map_err(anyhow::Error::msg)
        .with_context(|| format!("unsupported file type '.{extension}'"))
}

/// Picks the candidate delimiter that occurs most often in the first line.
/// Ties go to the earlier candidate, so a single-column file reads as CSV.
pub fn sniff_delimiter(text: &str) -> u8 {
    let first_line = text.lines().next().unwrap_or_default();
    let mut best = (CANDIDATE_DELIMITERS[0], 0usize);
    for candidate in CANDIDATE_DELIMITERS {
        let count = first_line.bytes().filter(|b| *b == candidate).count();
        if count > best.1 {
            best = (candidate, count);
        }
    }
    best.0
}

fn check_headers(headers: &[String]) -> Result<()> {
    if headers.iter().all(|h| h.trim().is_empty()) {
        bail!("the upload has no header line");
    }
    let mut seen = HashSet::new();
    for header in headers {
        if !seen.insert(header.trim()) {
            bail!("column '{header}' appears more than once");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_prefers_most_frequent() {
        assert_eq!(sniff_delimiter("Nom;Prénom;Mail\nA;B;C"), b';');
        assert_eq!(sniff_delimiter("a\tb\tc,d"), b'\t');
        assert_eq!(sniff_delimiter("Matricule"), b',');
    }

    #[test]
    fn test_duplicate_headers_are_rejected() {
        let headers = vec!["Mail".to_string(), "Nom".to_string(), "Mail ".to_string()];
        assert!(check_headers(&headers).is_err());
        assert!(check_headers(&["".to_string()]).is_err());
    }
}
