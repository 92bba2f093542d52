//! Loading one input file into a generic [`Table`].
//!
//! Delimited text goes through the `csv` crate, workbooks through `calamine`
//! (first worksheet, first row as header). The reader does no typing beyond
//! what the container format already knows; interpretation is left to
//! [`crate::normalize`].

use std::path::{Path, PathBuf};

use calamine::{Data, Reader, Sheets, open_workbook_auto};
use encoding_rs::{Encoding, UTF_8};
use log::debug;

use crate::{
    cell::Cell,
    error::{MergeError, MergeResult},
    io_utils,
    normalize::excel_serial_to_datetime,
};

/// One input file: ordered headers and rows of raw cells, in file order.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub source: PathBuf,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

pub trait TableReader: Send + Sync {
    fn read(&self, path: &Path) -> MergeResult<Table>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceFormat {
    Delimited,
    Workbook,
}

fn detect_format(path: &Path) -> Option<SourceFormat> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "csv" | "tsv" | "txt" => Some(SourceFormat::Delimited),
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Some(SourceFormat::Workbook),
        _ => None,
    }
}

/// Default reader for MAESTRO extracts on disk.
#[derive(Debug, Clone)]
pub struct FileTableReader {
    delimiter: Option<u8>,
    encoding: &'static Encoding,
}

impl Default for FileTableReader {
    fn default() -> Self {
        Self {
            delimiter: None,
            encoding: UTF_8,
        }
    }
}

impl FileTableReader {
    pub fn new(delimiter: Option<u8>, encoding: &'static Encoding) -> Self {
        Self {
            delimiter,
            encoding,
        }
    }

    fn read_delimited(&self, path: &Path) -> MergeResult<Table> {
        let delimiter = io_utils::resolve_input_delimiter(path, self.delimiter);
        let mut reader = io_utils::open_csv_reader_from_path(path, delimiter)?;
        let raw_headers = io_utils::reader_headers(&mut reader, self.encoding, path)?;
        let (headers, keep) = retain_named_columns(raw_headers);

        let mut rows = Vec::new();
        for (row_idx, record) in reader.byte_records().enumerate() {
            let record = record
                .map_err(|err| MergeError::read(path, format!("row {}: {err}", row_idx + 2)))?;
            let decoded = io_utils::decode_record(&record, self.encoding).ok_or_else(|| {
                MergeError::read(
                    path,
                    format!("row {} is not valid {}", row_idx + 2, self.encoding.name()),
                )
            })?;
            let row = keep
                .iter()
                .map(|&idx| {
                    decoded
                        .get(idx)
                        .map(|value| Cell::text(value.as_str()))
                        .unwrap_or_default()
                })
                .collect();
            rows.push(row);
        }

        Ok(Table {
            source: path.to_path_buf(),
            headers,
            rows,
        })
    }

    fn read_workbook(&self, path: &Path) -> MergeResult<Table> {
        let mut workbook: Sheets<_> =
            open_workbook_auto(path).map_err(|err| MergeError::read(path, err))?;
        let sheet_names = workbook.sheet_names().to_vec();
        let Some(sheet_name) = sheet_names.first() else {
            return Err(MergeError::read(path, "workbook contains no sheets"));
        };
        if sheet_names.len() > 1 {
            debug!(
                "{:?}: reading sheet '{sheet_name}' (first of {})",
                path,
                sheet_names.len()
            );
        }
        let range = workbook
            .worksheet_range(sheet_name)
            .map_err(|err| MergeError::read(path, err))?;

        let mut sheet_rows = range.rows();
        let Some(header_row) = sheet_rows.next() else {
            return Ok(Table {
                source: path.to_path_buf(),
                ..Table::default()
            });
        };
        let raw_headers = header_row
            .iter()
            .map(|cell| workbook_cell(cell).display().trim().to_string())
            .collect::<Vec<_>>();
        let (headers, keep) = retain_named_columns(raw_headers);

        let rows = sheet_rows
            .map(|row| {
                keep.iter()
                    .map(|&idx| row.get(idx).map(workbook_cell).unwrap_or_default())
                    .collect()
            })
            .collect();

        Ok(Table {
            source: path.to_path_buf(),
            headers,
            rows,
        })
    }
}

impl TableReader for FileTableReader {
    fn read(&self, path: &Path) -> MergeResult<Table> {
        let table = match detect_format(path) {
            Some(SourceFormat::Delimited) => self.read_delimited(path)?,
            Some(SourceFormat::Workbook) => self.read_workbook(path)?,
            None => {
                return Err(MergeError::UnsupportedFormat {
                    path: path.to_path_buf(),
                });
            }
        };
        debug!(
            "Read {} row(s) x {} column(s) from {:?}",
            table.row_count(),
            table.headers.len(),
            path
        );
        Ok(table)
    }
}

/// Drops columns whose header is blank; returns the kept headers and the
/// source positions they came from.
fn retain_named_columns(headers: Vec<String>) -> (Vec<String>, Vec<usize>) {
    headers
        .into_iter()
        .enumerate()
        .filter(|(_, name)| !name.trim().is_empty())
        .map(|(idx, name)| (name, idx))
        .unzip()
}

fn workbook_cell(cell: &Data) -> Cell {
    match cell {
        Data::Empty => Cell::Empty,
        Data::String(s) => Cell::text(s.clone()),
        Data::Float(n) => Cell::Number(*n),
        Data::Int(n) => Cell::Number(*n as f64),
        Data::Bool(b) => Cell::text(if *b { "TRUE" } else { "FALSE" }),
        Data::Error(_) => Cell::Empty,
        Data::DateTime(dt) => excel_serial_to_datetime(dt.as_f64())
            .map(Cell::Date)
            .unwrap_or(Cell::Number(dt.as_f64())),
        Data::DateTimeIso(s) => Cell::text(s.clone()),
        Data::DurationIso(s) => Cell::text(s.clone()),
    }
}
