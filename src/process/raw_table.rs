//! Raw year-extract parsing.
//!
//! The portal exports a UTF-16 encoded, tab-separated table: a title
//! line first, the header row at line index 1 with an unlabeled leading
//! week column, then one row per reporting week with one column per
//! county-name variant.

use anyhow::{bail, Context, Result};
use csv::ReaderBuilder;
use std::fs;
use std::path::Path;

/// One raw per-year extract, immutable once read.
#[derive(Debug)]
pub struct YearExtract {
    /// Column names as the file claims them; index 0 is the unlabeled
    /// week column (usually empty).
    pub headers: Vec<String>,
    /// One row per reporting week, one field per header.
    pub rows: Vec<Vec<String>>,
}

impl YearExtract {
    pub fn read(path: &Path) -> Result<Self> {
        let bytes =
            fs::read(path).with_context(|| format!("reading extract `{}`", path.display()))?;
        let text = decode_utf16(&bytes)
            .with_context(|| format!("decoding extract `{}`", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing extract `{}`", path.display()))
    }

    /// Parse the decoded text: drop the title line, treat the next line
    /// as headers, the rest as data.
    pub fn parse(text: &str) -> Result<Self> {
        let body = match text.split_once('\n') {
            Some((_title, rest)) => rest,
            None => bail!("extract has no header row"),
        };

        let mut reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .flexible(true)
            .from_reader(body.as_bytes());

        let headers: Vec<String> = reader
            .headers()
            .context("reading header row")?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        if headers.len() < 2 {
            bail!("extract has no county columns");
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.context("reading data row")?;
            let mut row: Vec<String> = record.iter().map(|f| f.trim().to_string()).collect();
            // flexible parsing may drop trailing empty fields
            row.resize(headers.len(), String::new());
            rows.push(row);
        }

        Ok(YearExtract { headers, rows })
    }
}

/// Decode UTF-16 bytes, honoring a BOM when present and defaulting to
/// little-endian (what the portal exports).
fn decode_utf16(bytes: &[u8]) -> Result<String> {
    let (bytes, big_endian) = match bytes {
        [0xFF, 0xFE, rest @ ..] => (rest, false),
        [0xFE, 0xFF, rest @ ..] => (rest, true),
        rest => (rest, false),
    };
    if bytes.len() % 2 != 0 {
        bail!("odd byte count in UTF-16 stream");
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| {
            if big_endian {
                u16::from_be_bytes([pair[0], pair[1]])
            } else {
                u16::from_le_bytes([pair[0], pair[1]])
            }
        })
        .collect();
    String::from_utf16(&units).context("invalid UTF-16 data")
}

#[cfg(test)]
pub(crate) fn encode_utf16le(text: &str) -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xFE];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    bytes
}
