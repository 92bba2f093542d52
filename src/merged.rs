use std::collections::HashMap;

use crate::{
    cell::Cell,
    record::{ColumnCatalog, ColumnId},
};

static EMPTY_CELL: Cell = Cell::Empty;

#[derive(Debug, Clone, PartialEq)]
pub struct MergedRow {
    pub key: String,
    cells: Vec<Cell>,
}

impl MergedRow {
    pub(crate) fn new(key: String, cells: Vec<Cell>) -> Self {
        Self { key, cells }
    }

    pub fn cell(&self, id: ColumnId) -> &Cell {
        self.cells.get(id).unwrap_or(&EMPTY_CELL)
    }

    pub(crate) fn set(&mut self, id: ColumnId, value: Cell) {
        if self.cells.len() <= id {
            self.cells.resize(id + 1, Cell::Empty);
        }
        self.cells[id] = value;
    }
}

/// The unified output: one row per key, columns in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct MergedTable {
    columns: ColumnCatalog,
    rows: Vec<MergedRow>,
    index: HashMap<String, usize>,
}

impl MergedTable {
    pub(crate) fn new(columns: ColumnCatalog) -> Self {
        Self {
            columns,
            rows: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Appends a row for a key that has not been seen yet; returns its index.
    pub(crate) fn push_row(&mut self, row: MergedRow) -> usize {
        if let Some(&existing) = self.index.get(&row.key) {
            return existing;
        }
        let position = self.rows.len();
        self.index.insert(row.key.clone(), position);
        self.rows.push(row);
        position
    }

    pub(crate) fn position(&self, key: &str) -> Option<usize> {
        self.index.get(key).copied()
    }

    pub(crate) fn row_at_mut(&mut self, position: usize) -> &mut MergedRow {
        &mut self.rows[position]
    }

    pub(crate) fn rows_mut(&mut self) -> &mut [MergedRow] {
        &mut self.rows
    }

    pub(crate) fn ensure_column(&mut self, name: &str) -> ColumnId {
        self.columns.intern(name)
    }

    pub fn columns(&self) -> &ColumnCatalog {
        &self.columns
    }

    pub fn headers(&self) -> &[String] {
        self.columns.names()
    }

    pub fn rows(&self) -> &[MergedRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, key: &str) -> Option<&MergedRow> {
        self.position(key).map(|idx| &self.rows[idx])
    }

    /// Looks up one cell by key and (case/space-insensitive) column name.
    pub fn value(&self, key: &str, column: &str) -> Option<&Cell> {
        let id = self.columns.find(column)?;
        self.row(key).map(|row| row.cell(id))
    }

    /// Rendered cells of one row in header order.
    pub fn display_row(&self, row: &MergedRow) -> Vec<String> {
        (0..self.columns.len())
            .map(|id| row.cell(id).display())
            .collect()
    }
}
