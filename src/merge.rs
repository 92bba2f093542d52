//! Merge orchestration.
//!
//! ## Phases
//!
//! 1. **Read** every input on a bounded worker pool; results are consumed in
//!    argument order so stream positions never depend on thread timing.
//! 2. **Concatenate** the tables into one record stream, checking that every
//!    table carries the key column before any record is built.
//! 3. **Date** each record with the latest of its lifecycle dates.
//! 4. **Seed** one base row per key from the general (ungrouped) columns.
//! 5. **Overlay** each field group with the columns of its own winner.
//! 6. **Total**: recompute the derived total from the final values.
//!
//! Cancellation is honoured between files and between groups; a cancelled
//! merge returns [`MergeError::Cancelled`] and never a partial table.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    thread,
};

use log::{debug, info};

use crate::{
    cell::Cell,
    context::MergeContext,
    dating::assign_row_dates,
    error::{MergeError, MergeResult},
    layout::{BaseSelection, MergeLayout},
    merged::{MergedRow, MergedTable},
    normalize::{is_empty, normalize_header, normalize_text},
    reader::{Table, TableReader},
    record::{ColumnCatalog, ColumnId, Record},
    resolve::{has_content, resolve_by, resolve_group},
    total::recompute_total,
};

const READ_SHARE: f64 = 35.0;
const CONCAT_DONE: f64 = 40.0;
const BASE_DONE: f64 = 60.0;
const GROUPS_DONE: f64 = 95.0;

/// Reads `paths` with `reader` and merges them under `layout`.
pub fn merge_files(
    paths: &[PathBuf],
    reader: &dyn TableReader,
    layout: &MergeLayout,
    context: &MergeContext<'_>,
) -> MergeResult<MergedTable> {
    layout.validate()?;
    let tables = read_all(paths, reader, context)?;
    merge_tables(tables, layout, context)
}

fn effective_jobs(requested: usize, files: usize) -> usize {
    let available = if requested == 0 {
        thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    } else {
        requested
    };
    available.clamp(1, files.max(1))
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Reads every path, at most `context.jobs` at a time, and returns the tables
/// in argument order. The first failure in argument order wins.
pub fn read_all(
    paths: &[PathBuf],
    reader: &dyn TableReader,
    context: &MergeContext<'_>,
) -> MergeResult<Vec<Table>> {
    let total = paths.len();
    let jobs = effective_jobs(context.jobs, total);
    let next = AtomicUsize::new(0);
    let completed = AtomicUsize::new(0);
    let failed = AtomicBool::new(false);
    debug!("Reading {total} file(s) with {jobs} worker(s)");

    let mut slots: Vec<Option<MergeResult<Table>>> = (0..total).map(|_| None).collect();
    thread::scope(|scope| {
        let mut handles = Vec::with_capacity(jobs);
        for _ in 0..jobs {
            handles.push(scope.spawn(|| {
                let mut produced = Vec::new();
                loop {
                    if context.cancel.is_cancelled() || failed.load(Ordering::SeqCst) {
                        break;
                    }
                    let idx = next.fetch_add(1, Ordering::SeqCst);
                    let Some(path) = paths.get(idx) else {
                        break;
                    };
                    let done = completed.load(Ordering::SeqCst);
                    context.report(
                        done as f64 / total as f64 * READ_SHARE,
                        &format!("Reading {}", file_label(path)),
                    );
                    let result = reader.read(path);
                    if result.is_err() {
                        failed.store(true, Ordering::SeqCst);
                    }
                    completed.fetch_add(1, Ordering::SeqCst);
                    produced.push((idx, result));
                }
                produced
            }));
        }
        for handle in handles {
            let produced = handle
                .join()
                .unwrap_or_else(|payload| std::panic::resume_unwind(payload));
            for (idx, result) in produced {
                slots[idx] = Some(result);
            }
        }
    });

    let mut tables = Vec::with_capacity(total);
    let mut incomplete = false;
    for slot in slots {
        match slot {
            Some(Ok(table)) => tables.push(table),
            Some(Err(err)) => return Err(err),
            None => incomplete = true,
        }
    }
    if incomplete || context.cancel.is_cancelled() {
        return Err(MergeError::Cancelled);
    }
    Ok(tables)
}

fn ensure_not_cancelled(context: &MergeContext<'_>) -> MergeResult<()> {
    if context.cancel.is_cancelled() {
        Err(MergeError::Cancelled)
    } else {
        Ok(())
    }
}

fn check_key_columns(tables: &[Table], key_column: &str) -> MergeResult<()> {
    let key = normalize_header(key_column);
    for table in tables {
        if !table.headers.iter().any(|h| normalize_header(h) == key) {
            return Err(MergeError::MissingKeyColumn {
                path: table.source.clone(),
                column: key_column.to_string(),
            });
        }
    }
    Ok(())
}

/// The concatenated record stream plus the column catalog it refers to.
#[derive(Debug, Clone)]
pub struct RecordStream {
    pub columns: ColumnCatalog,
    pub records: Vec<Record>,
    pub key_column: ColumnId,
    /// Rows skipped because their key was blank.
    pub dropped: usize,
}

/// Concatenates `tables` in order, assigning each row its stream position.
pub fn concatenate(
    tables: Vec<Table>,
    key_column: &str,
    context: &MergeContext<'_>,
) -> MergeResult<RecordStream> {
    check_key_columns(&tables, key_column)?;

    let mut columns = ColumnCatalog::new();
    for table in &tables {
        for header in &table.headers {
            columns.intern(header);
        }
    }
    // Every table carries the key, so it is only missing when there are no tables.
    let key_id = match columns.find(key_column) {
        Some(id) => id,
        None => columns.intern(key_column),
    };

    let mut records = Vec::with_capacity(tables.iter().map(Table::row_count).sum());
    let mut position = 0usize;
    let mut dropped = 0usize;
    for table in tables {
        ensure_not_cancelled(context)?;
        let ids = table
            .headers
            .iter()
            .map(|header| columns.intern(header))
            .collect::<Vec<_>>();
        let mut duplicates = HashSet::new();
        for (idx, id) in ids.iter().enumerate() {
            if ids[..idx].contains(id) {
                duplicates.insert(table.headers[idx].as_str());
            }
        }
        if !duplicates.is_empty() {
            debug!(
                "{:?}: repeated column(s) {:?}; the first non-empty value is kept",
                table.source, duplicates
            );
        }

        for row in table.rows {
            let stream_order = position;
            position += 1;
            let mut cells = vec![Cell::Empty; columns.len()];
            for (cell, &id) in row.into_iter().zip(&ids) {
                if is_empty(&cells[id]) {
                    cells[id] = cell;
                }
            }
            let Some(key) = normalize_text(&cells[key_id]) else {
                dropped += 1;
                continue;
            };
            records.push(Record {
                key,
                cells,
                row_date: None,
                stream_order,
            });
        }
    }

    if dropped > 0 {
        debug!("Dropped {dropped} row(s) without a usable {key_column}");
    }
    Ok(RecordStream {
        columns,
        records,
        key_column: key_id,
        dropped,
    })
}

/// General columns that make a record eligible as a base row.
fn base_content_columns(
    layout: &MergeLayout,
    columns: &ColumnCatalog,
    key_column: ColumnId,
    date_columns: &[ColumnId],
) -> Vec<ColumnId> {
    let grouped = columns
        .resolve_present(&layout.grouped_columns().collect::<Vec<_>>())
        .into_iter()
        .collect::<HashSet<_>>();
    (0..columns.len())
        .filter(|id| *id != key_column && !date_columns.contains(id) && !grouped.contains(id))
        .collect()
}

fn build_base(
    stream: &RecordStream,
    layout: &MergeLayout,
    date_columns: &[ColumnId],
) -> MergedTable {
    let latest = resolve_by(&stream.records, |_| true);
    let content = match layout.base_selection {
        BaseSelection::Latest => None,
        BaseSelection::Content => {
            let general =
                base_content_columns(layout, &stream.columns, stream.key_column, date_columns);
            Some(resolve_by(&stream.records, |record| {
                has_content(record, &general)
            }))
        }
    };

    let mut table = MergedTable::new(stream.columns.clone());
    for record in &stream.records {
        if table.position(&record.key).is_some() {
            continue;
        }
        let key = record.key.as_str();
        let seed = content
            .as_ref()
            .and_then(|winners| winners.get(key))
            .or_else(|| latest.get(key))
            .copied()
            .unwrap_or(record);
        table.push_row(MergedRow::new(record.key.clone(), seed.cells.clone()));
    }
    table
}

/// Merges already-read tables: one output row per key, each field group taken
/// from its own freshest contributing record.
pub fn merge_tables(
    tables: Vec<Table>,
    layout: &MergeLayout,
    context: &MergeContext<'_>,
) -> MergeResult<MergedTable> {
    layout.validate()?;
    let file_count = tables.len();
    if tables.is_empty() {
        ensure_not_cancelled(context)?;
        let mut table = MergedTable::new(ColumnCatalog::new());
        recompute_total(&mut table, &layout.total);
        debug!("No input tables; emitting only {}", layout.total.column);
        context.report(100.0, "Done");
        return Ok(table);
    }
    context.report(READ_SHARE, &format!("Concatenating {file_count} file(s)"));
    let mut stream = concatenate(tables, &layout.key_column, context)?;

    let date_columns = stream.columns.resolve_present(&layout.date_columns);
    let unreadable_dates = assign_row_dates(&mut stream.records, &date_columns);
    if unreadable_dates > 0 {
        debug!("{unreadable_dates} date cell(s) could not be read and were ignored");
    }
    context.report(
        CONCAT_DONE,
        &format!("Consolidating {} record(s) by {}", stream.records.len(), layout.key_column),
    );

    ensure_not_cancelled(context)?;
    let mut table = build_base(&stream, layout, &date_columns);
    context.report(BASE_DONE, &format!("{} base row(s) seeded", table.len()));

    let step = (GROUPS_DONE - BASE_DONE) / layout.groups.len().max(1) as f64;
    for (idx, group) in layout.groups.iter().enumerate() {
        ensure_not_cancelled(context)?;
        let ids = stream.columns.resolve_present(&group.columns);
        if ids.is_empty() {
            debug!("Group {} has no columns in the inputs", group.name);
        } else {
            let winners = resolve_group(&stream.records, &ids);
            let mut staged = Vec::with_capacity(winners.len());
            for (key, winner) in &winners {
                if let Some(position) = table.position(key) {
                    let values = ids
                        .iter()
                        .map(|&id| (id, winner.cell(id).clone()))
                        .collect::<Vec<_>>();
                    staged.push((position, values));
                }
            }
            for (position, values) in staged {
                let row = table.row_at_mut(position);
                for (id, value) in values {
                    row.set(id, value);
                }
            }
            debug!("Group {}: {} key(s) overlaid", group.name, winners.len());
        }
        context.report(
            BASE_DONE + step * (idx + 1) as f64,
            &format!("Applied {}", group.name),
        );
    }

    context.report(GROUPS_DONE, &format!("Recomputing {}", layout.total.column));
    recompute_total(&mut table, &layout.total);

    info!(
        "Merged {} record(s) from {file_count} file(s) into {} row(s)",
        stream.records.len(),
        table.len()
    );
    context.report(100.0, "Done");
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::FieldGroup;

    fn table(name: &str, headers: &[&str], rows: &[&[&str]]) -> Table {
        Table {
            source: PathBuf::from(name),
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: rows
                .iter()
                .map(|row| row.iter().map(|value| Cell::text(*value)).collect())
                .collect(),
        }
    }

    fn small_layout() -> MergeLayout {
        MergeLayout {
            groups: vec![FieldGroup::new("G", &["G_STATUS", "G_AMOUNT"])],
            ..MergeLayout::default()
        }
    }

    #[test]
    fn no_tables_yield_an_empty_table_with_only_the_total() {
        let merged =
            merge_tables(Vec::new(), &MergeLayout::default(), &MergeContext::default()).unwrap();
        assert!(merged.is_empty());
        assert_eq!(merged.headers(), ["INGRESO_TOTAL"]);

        let stream = concatenate(Vec::new(), "LINEA", &MergeContext::default()).unwrap();
        assert!(stream.records.is_empty());
        assert_eq!(stream.columns.name(stream.key_column), "LINEA");
    }

    #[test]
    fn repeated_header_keeps_first_value_with_content() {
        let tables = vec![table(
            "a.csv",
            &["LINEA", "NOMBRE", "nombre", " Nombre"],
            &[&["1", "nan", "ANA", "BETO"]],
        )];
        let stream = concatenate(tables, "LINEA", &MergeContext::default()).unwrap();
        let nombre = stream.columns.find("NOMBRE").unwrap();
        assert_eq!(stream.columns.len(), 2);
        assert_eq!(stream.records[0].cell(nombre), &Cell::Text("ANA".into()));
    }

    #[test]
    fn blank_keys_are_dropped_and_positions_still_advance() {
        let tables = vec![table(
            "a.csv",
            &["LINEA", "X"],
            &[&["1", "a"], &["", "b"], &["nan", "c"], &["2", "d"]],
        )];
        let stream = concatenate(tables, "LINEA", &MergeContext::default()).unwrap();
        assert_eq!(stream.dropped, 2);
        assert_eq!(stream.records.len(), 2);
        assert_eq!(stream.records[1].stream_order, 3);
    }

    #[test]
    fn key_check_happens_before_anything_is_built() {
        let tables = vec![
            table("good.csv", &["linea "], &[&["1"]]),
            table("bad.csv", &["ID"], &[&["1"]]),
        ];
        let err = merge_tables(tables, &small_layout(), &MergeContext::default()).unwrap_err();
        match err {
            MergeError::MissingKeyColumn { path, column } => {
                assert_eq!(path, PathBuf::from("bad.csv"));
                assert_eq!(column, "LINEA");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn overlay_copies_whole_group_from_winner() {
        let tables = vec![table(
            "a.csv",
            &["LINEA", "FECHA_ALTA", "G_STATUS", "G_AMOUNT"],
            &[
                &["1", "2024-01-01", "OK", "10"],
                &["1", "2024-02-01", "RECHAZADO", ""],
            ],
        )];
        let merged = merge_tables(tables, &small_layout(), &MergeContext::default()).unwrap();
        assert_eq!(
            merged.value("1", "G_STATUS"),
            Some(&Cell::Text("RECHAZADO".into()))
        );
        assert_eq!(merged.value("1", "G_AMOUNT"), Some(&Cell::Empty));
    }

    #[test]
    fn latest_selection_takes_freshest_row_unconditionally() {
        let tables = vec![table(
            "a.csv",
            &["LINEA", "FECHA_ALTA", "NOMBRE"],
            &[&["1", "2024-01-01", "ANA"], &["1", "2024-02-01", ""]],
        )];
        let mut layout = small_layout();
        layout.base_selection = BaseSelection::Latest;
        let merged = merge_tables(tables.clone(), &layout, &MergeContext::default()).unwrap();
        assert_eq!(merged.value("1", "NOMBRE"), Some(&Cell::Empty));

        layout.base_selection = BaseSelection::Content;
        let merged = merge_tables(tables, &layout, &MergeContext::default()).unwrap();
        assert_eq!(merged.value("1", "NOMBRE"), Some(&Cell::Text("ANA".into())));
    }

    #[test]
    fn cancelled_context_returns_no_table() {
        let context = MergeContext::default();
        context.cancel.cancel();
        let tables = vec![table("a.csv", &["LINEA"], &[&["1"]])];
        assert!(matches!(
            merge_tables(tables, &small_layout(), &context),
            Err(MergeError::Cancelled)
        ));
    }

    #[test]
    fn worker_count_is_bounded_by_files() {
        assert_eq!(effective_jobs(8, 3), 3);
        assert_eq!(effective_jobs(2, 10), 2);
        assert_eq!(effective_jobs(4, 0), 1);
        assert!(effective_jobs(0, 4) >= 1);
    }
}
