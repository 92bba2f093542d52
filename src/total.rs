use log::debug;

use crate::{
    cell::Cell,
    layout::TotalSpec,
    merged::MergedTable,
    normalize::{is_empty, normalize_number},
};

/// Rewrites the total column from the final merged values.
///
/// Null or unreadable summands contribute 0, and summand columns that no
/// input carried are skipped entirely. Returns the number of non-empty
/// summand cells that could not be read as numbers.
pub fn recompute_total(table: &mut MergedTable, spec: &TotalSpec) -> usize {
    let summands = table.columns().resolve_present(&spec.summands);
    let total_id = table.ensure_column(&spec.column);
    let summands = summands
        .into_iter()
        .filter(|&id| id != total_id)
        .collect::<Vec<_>>();

    let mut unreadable = 0usize;
    for row in table.rows_mut() {
        let mut total = 0.0;
        for &id in &summands {
            let cell = row.cell(id);
            match normalize_number(cell) {
                Some(value) => total += value,
                None if !is_empty(cell) => unreadable += 1,
                None => {}
            }
        }
        row.set(total_id, Cell::Number(total));
    }

    if unreadable > 0 {
        debug!(
            "{unreadable} summand cell(s) treated as 0 while computing {}",
            spec.column
        );
    }
    unreadable
}
