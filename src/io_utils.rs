//! CSV plumbing shared by the delimited-text reader and the output writer.
//!
//! - **Delimiter resolution**: `.tsv` → tab, everything else → comma, with a
//!   manual override.
//! - **Encoding**: inputs are decoded through `encoding_rs` (UTF-8 unless a
//!   label is given); outputs are always UTF-8 prefixed with a BOM so
//!   spreadsheet tools detect the encoding.
//! - **stdout**: the `-` path convention routes output to standard out.

use std::{
    fs::File,
    io::{BufReader, Read, Write},
    path::Path,
};

use anyhow::{Result, anyhow};
use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8};

use crate::error::{MergeError, MergeResult};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';
pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

fn extension_delimiter(path: &Path) -> Option<u8> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => Some(DEFAULT_TSV_DELIMITER),
        Some(ext) if ext.eq_ignore_ascii_case("csv") => Some(DEFAULT_CSV_DELIMITER),
        _ => None,
    }
}

pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided
        .or_else(|| extension_delimiter(path))
        .unwrap_or(DEFAULT_CSV_DELIMITER)
}

pub fn resolve_output_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided
        .or_else(|| extension_delimiter(path))
        .unwrap_or(DEFAULT_CSV_DELIMITER)
}

pub fn open_csv_reader_from_path(
    path: &Path,
    delimiter: u8,
) -> MergeResult<csv::Reader<BufReader<File>>> {
    let file = File::open(path).map_err(|err| MergeError::read(path, err))?;
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true);
    Ok(builder.from_reader(BufReader::new(file)))
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Option<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        None
    } else {
        Some(text.into_owned())
    }
}

pub fn decode_record(
    record: &csv::ByteRecord,
    encoding: &'static Encoding,
) -> Option<Vec<String>> {
    record
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect()
}

pub fn reader_headers<R>(
    reader: &mut csv::Reader<R>,
    encoding: &'static Encoding,
    path: &Path,
) -> MergeResult<Vec<String>>
where
    R: Read,
{
    let headers = reader
        .byte_headers()
        .map_err(|err| MergeError::read(path, err))?
        .clone();
    let mut decoded = decode_record(&headers, encoding)
        .ok_or_else(|| MergeError::read(path, format!("headers are not valid {}", encoding.name())))?;
    if let Some(first) = decoded.first_mut() {
        *first = first.trim_start_matches('\u{feff}').to_string();
    }
    Ok(decoded)
}

/// Wraps `writer` in a CSV writer after emitting the UTF-8 byte-order mark.
pub fn open_csv_writer<W: Write>(mut writer: W, delimiter: u8) -> MergeResult<csv::Writer<W>> {
    writer.write_all(UTF8_BOM)?;
    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Necessary)
        .double_quote(true);
    Ok(builder.from_writer(writer))
}
