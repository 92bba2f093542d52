//! Per-group "freshest wins" resolution.
//!
//! For one set of columns, every record that carries something in at least
//! one of them competes; per key the winner is the record with the greatest
//! [`Record::freshness`]. Records that are blank across the whole group never
//! compete, so they cannot erase what an older row reported.

use std::collections::HashMap;

use crate::{
    normalize::is_empty,
    record::{ColumnId, Record},
};

/// True when at least one of `columns` is non-empty on `record`.
pub fn has_content(record: &Record, columns: &[ColumnId]) -> bool {
    columns.iter().any(|&id| !is_empty(record.cell(id)))
}

/// Picks, per key, the freshest record among those that pass `eligible`.
pub fn resolve_by<'a, F>(records: &'a [Record], mut eligible: F) -> HashMap<&'a str, &'a Record>
where
    F: FnMut(&Record) -> bool,
{
    let mut winners: HashMap<&'a str, &'a Record> = HashMap::new();
    for record in records.iter().filter(|record| eligible(*record)) {
        winners
            .entry(record.key.as_str())
            .and_modify(|current| {
                if record.freshness() > current.freshness() {
                    *current = record;
                }
            })
            .or_insert(record);
    }
    winners
}

/// Resolves one field group: key → the record authoritative for `columns`.
pub fn resolve_group<'a>(
    records: &'a [Record],
    columns: &[ColumnId],
) -> HashMap<&'a str, &'a Record> {
    resolve_by(records, |record| has_content(record, columns))
}
