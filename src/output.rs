use std::{
    fs::{self, File},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};

use log::debug;

use crate::{
    error::{MergeError, MergeResult},
    io_utils,
    merged::MergedTable,
};

/// Streams `table` as BOM-prefixed UTF-8 delimited text into `writer`.
pub fn write_table<W: Write>(table: &MergedTable, writer: W, delimiter: u8) -> MergeResult<()> {
    let mut csv_writer = io_utils::open_csv_writer(writer, delimiter)?;
    csv_writer
        .write_record(table.headers())
        .map_err(io::Error::from)?;
    for row in table.rows() {
        csv_writer
            .write_record(table.display_row(row))
            .map_err(io::Error::from)?;
    }
    csv_writer.flush()?;
    Ok(())
}

fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    path.with_file_name(format!(".{name}.partial"))
}

/// Writes `table` to `path` (or stdout for `-`). File output is staged next
/// to the destination and renamed into place only once fully written.
pub fn write_merged_table(table: &MergedTable, path: &Path, delimiter: u8) -> MergeResult<()> {
    if io_utils::is_dash(path) {
        let stdout = io::stdout();
        return write_table(table, stdout.lock(), delimiter);
    }

    let staging = staging_path(path);
    let written = File::create(&staging)
        .map_err(MergeError::from)
        .and_then(|file| write_table(table, BufWriter::new(file), delimiter))
        .and_then(|()| fs::rename(&staging, path).map_err(MergeError::from));
    if written.is_err() {
        debug!("Discarding partial output {:?}", staging);
        let _ = fs::remove_file(&staging);
    }
    written
}
