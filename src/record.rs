use std::collections::HashMap;

use chrono::NaiveDateTime;

use crate::{cell::Cell, normalize::normalize_header};

pub type ColumnId = usize;

static EMPTY_CELL: Cell = Cell::Empty;

/// Ordered union of every column seen across the inputs.
///
/// Columns are identified by their normalized name and displayed with the
/// first spelling encountered, so `MONTO_REC_ PP2` in one file and
/// `monto_rec_pp2` in another land in the same column.
#[derive(Debug, Clone, Default)]
pub struct ColumnCatalog {
    names: Vec<String>,
    lookup: HashMap<String, ColumnId>,
}

impl ColumnCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, name: &str) -> ColumnId {
        let normalized = normalize_header(name);
        if let Some(&id) = self.lookup.get(&normalized) {
            return id;
        }
        let id = self.names.len();
        self.names.push(name.trim().to_string());
        self.lookup.insert(normalized, id);
        id
    }

    pub fn find(&self, name: &str) -> Option<ColumnId> {
        self.lookup.get(&normalize_header(name)).copied()
    }

    pub fn name(&self, id: ColumnId) -> &str {
        &self.names[id]
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Resolves `names` to the ids present in the catalog, skipping unknown
    /// columns and repeated ids.
    pub fn resolve_present<'a, I>(&self, names: I) -> Vec<ColumnId>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut ids = Vec::new();
        for name in names {
            if let Some(id) = self.find(name)
                && !ids.contains(&id)
            {
                ids.push(id);
            }
        }
        ids
    }
}

/// One source row after ingestion.
#[derive(Debug, Clone)]
pub struct Record {
    pub key: String,
    pub cells: Vec<Cell>,
    pub row_date: Option<NaiveDateTime>,
    pub stream_order: usize,
}

impl Record {
    /// Typed accessor; columns the source file never had read as empty.
    pub fn cell(&self, id: ColumnId) -> &Cell {
        self.cells.get(id).unwrap_or(&EMPTY_CELL)
    }

    /// Ordering used by every resolution: later row date wins, missing dates
    /// sort first, ties go to the later position in the input stream.
    pub fn freshness(&self) -> (Option<NaiveDateTime>, usize) {
        (self.row_date, self.stream_order)
    }
}
