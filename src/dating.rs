use chrono::NaiveDateTime;

use crate::{
    normalize::{is_empty, normalize_date},
    record::{ColumnId, Record},
};

/// Latest lifecycle date a record reports across `date_columns`.
///
/// The maximum is taken regardless of column priority, so an activation
/// date on a stale copy of the row is not shadowed by its capture date.
pub fn row_date(record: &Record, date_columns: &[ColumnId]) -> Option<NaiveDateTime> {
    date_columns
        .iter()
        .filter_map(|&id| normalize_date(record.cell(id)))
        .max()
}

/// Stamps every record with its row date and returns how many non-empty
/// date cells could not be read.
pub fn assign_row_dates(records: &mut [Record], date_columns: &[ColumnId]) -> usize {
    let mut unreadable = 0usize;
    for record in records.iter_mut() {
        unreadable += date_columns
            .iter()
            .map(|&id| record.cell(id))
            .filter(|cell| !is_empty(cell) && normalize_date(cell).is_none())
            .count();
        record.row_date = row_date(record, date_columns);
    }
    unreadable
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Cell;
    use chrono::NaiveDate;

    fn record(cells: Vec<Cell>) -> Record {
        Record {
            key: "7771234567".into(),
            cells,
            row_date: None,
            stream_order: 0,
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn takes_maximum_over_mixed_representations() {
        let rec = record(vec![
            Cell::Text("2024-01-10".into()),
            Cell::Number(45327.0),
            Cell::Text("basura".into()),
        ]);
        assert_eq!(row_date(&rec, &[0, 1, 2]), Some(day(2024, 2, 5)));
    }

    #[test]
    fn priority_order_does_not_change_result() {
        let rec = record(vec![
            Cell::Text("2024-03-01".into()),
            Cell::Text("2023-12-31".into()),
        ]);
        assert_eq!(row_date(&rec, &[0, 1]), row_date(&rec, &[1, 0]));
    }

    #[test]
    fn absent_or_empty_columns_yield_none() {
        let rec = record(vec![Cell::Empty]);
        assert_eq!(row_date(&rec, &[0, 5]), None);
        assert_eq!(row_date(&rec, &[]), None);
    }

    #[test]
    fn assign_counts_unreadable_cells() {
        let mut records = vec![
            record(vec![Cell::Text("ayer".into()), Cell::Text("2024-01-10".into())]),
            record(vec![Cell::Text("nan".into()), Cell::Empty]),
        ];
        let unreadable = assign_row_dates(&mut records, &[0, 1]);
        assert_eq!(unreadable, 1);
        assert_eq!(records[0].row_date, Some(day(2024, 1, 10)));
        assert_eq!(records[1].row_date, None);
    }
}
