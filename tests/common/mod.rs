#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use rust_xlsxwriter::Workbook;
use tempfile::{TempDir, tempdir};

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn join(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        self.write_bytes(name, contents.as_bytes())
    }

    pub fn write_bytes(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents).expect("write temp file contents");
        path
    }

    /// Writes a comma-separated extract from a header and row slices.
    pub fn write_extract(&self, name: &str, headers: &[&str], rows: &[&[&str]]) -> PathBuf {
        let mut contents = headers.join(",");
        contents.push('\n');
        for row in rows {
            contents.push_str(&row.join(","));
            contents.push('\n');
        }
        self.write(name, &contents)
    }

    /// Writes a single-sheet workbook. Cells that parse as numbers are stored
    /// as numbers, everything else as strings, empty cells are left blank.
    pub fn write_workbook(&self, name: &str, headers: &[&str], rows: &[&[&str]]) -> PathBuf {
        let path = self.join(name);
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        for (col, header) in headers.iter().enumerate() {
            sheet
                .write_string(0, col as u16, *header)
                .expect("write header");
        }
        for (row_idx, row) in rows.iter().enumerate() {
            let row_num = row_idx as u32 + 1;
            for (col, value) in row.iter().enumerate() {
                if value.is_empty() {
                    continue;
                }
                match value.parse::<f64>() {
                    Ok(number) => sheet.write_number(row_num, col as u16, number),
                    Err(_) => sheet.write_string(row_num, col as u16, *value),
                }
                .expect("write cell");
            }
        }
        workbook.save(&path).expect("save workbook");
        path
    }
}

/// Reads a merged output file, stripping the byte-order mark.
pub fn read_output(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
    let bytes = std::fs::read(path).expect("read output");
    assert!(bytes.starts_with(b"\xEF\xBB\xBF"), "output must start with a BOM");
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(&bytes[3..]);
    let headers = reader
        .headers()
        .expect("headers")
        .iter()
        .map(str::to_string)
        .collect();
    let rows = reader
        .records()
        .map(|record| record.expect("record").iter().map(str::to_string).collect())
        .collect();
    (headers, rows)
}
