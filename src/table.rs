use std::collections::HashSet;
use std::fmt;

use polars::prelude::AnyValue;
use rayon::prelude::*;
use tracing::{debug, trace};

use crate::domain::{SortError, SortResult};
use crate::names::{SortKey, sort_names};

/// A single spreadsheet value. Only `Text` cells take part in name sorting.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    /// A typed value carried as is: dates, durations and the exact
    /// numeric types of parquet and arrow files.
    Native(AnyValue<'static>),
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Text(s) => write!(f, "{s}"),
            CellValue::Int(i) => write!(f, "{i}"),
            CellValue::Float(v) => write!(f, "{v}"),
            CellValue::Bool(b) => write!(f, "{b}"),
            CellValue::Native(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

/// Header plus rows, as exchanged with the spreadsheet reader and writer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TabularData {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

/// Identifies a column by its header name, independent of where it is shown.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef(String);

impl ColumnRef {
    pub fn new(name: impl Into<String>) -> Self {
        ColumnRef(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableModel {
    columns: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

impl TableModel {
    pub fn load(data: TabularData) -> SortResult<Self> {
        let expected = data.columns.len();
        if let Some((row, cells)) = data
            .rows
            .iter()
            .enumerate()
            .find(|(_, cells)| cells.len() != expected)
        {
            return Err(SortError::MalformedTable {
                row: row + 1,
                found: cells.len(),
                expected,
            });
        }
        if let Some(name) = first_duplicate(&data.columns) {
            return Err(SortError::DuplicateColumn(name.to_string()));
        }
        debug!(
            "Loaded table with {} columns and {} rows",
            data.columns.len(),
            data.rows.len()
        );
        Ok(Self {
            columns: data.columns,
            rows: data.rows,
        })
    }

    /// Header row followed by the data rows, rendered as display text.
    pub fn project(&self) -> Vec<Vec<String>> {
        let mut out = Vec::with_capacity(self.rows.len() + 1);
        out.push(self.columns.clone());
        out.extend(
            self.rows
                .iter()
                .map(|row| row.iter().map(|c| c.to_string()).collect()),
        );
        out
    }

    /// Sorts the names of every text cell in `column`, leaving all other cells alone.
    pub fn apply_sort(&mut self, column: &ColumnRef, key: SortKey) -> SortResult<()> {
        let idx = self
            .column_index(column)
            .ok_or_else(|| SortError::InvalidColumn(column.name().to_string()))?;

        self.rows.par_iter_mut().for_each(|row| {
            if let CellValue::Text(cell) = &mut row[idx] {
                *cell = sort_names(cell, key);
            }
        });
        trace!("Sorted column {} ({}) by {}", column, idx, key.label());
        Ok(())
    }

    pub fn export(&self) -> TabularData {
        TabularData {
            columns: self.columns.clone(),
            rows: self.rows.clone(),
        }
    }

    pub fn column_index(&self, column: &ColumnRef) -> Option<usize> {
        self.columns.iter().position(|c| c == column.name())
    }

    pub fn column_ref(&self, idx: usize) -> Option<ColumnRef> {
        self.columns.get(idx).map(|c| ColumnRef::new(c.as_str()))
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&CellValue> {
        self.rows.get(row).and_then(|r| r.get(column))
    }
}

fn first_duplicate(columns: &[String]) -> Option<&str> {
    let mut seen = HashSet::with_capacity(columns.len());
    columns
        .iter()
        .map(String::as_str)
        .find(|name| !seen.insert(*name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> TabularData {
        TabularData {
            columns: vec!["id".into(), "authors".into(), "editors".into()],
            rows: vec![
                vec![
                    CellValue::Int(1),
                    "Bob Smith, Alice Jones".into(),
                    "Zed Young, Amy Abel".into(),
                ],
                vec![CellValue::Int(2), CellValue::Float(3.5), "Carl Brown".into()],
                vec![CellValue::Int(3), CellValue::Empty, CellValue::Bool(true)],
            ],
        }
    }

    #[test]
    fn export_returns_what_was_loaded() {
        let table = TableModel::load(sample()).unwrap();
        assert_eq!(table.export(), sample());
    }

    #[test]
    fn load_rejects_ragged_rows() {
        let mut data = sample();
        data.rows[1].pop();
        match TableModel::load(data) {
            Err(SortError::MalformedTable {
                row,
                found,
                expected,
            }) => {
                assert_eq!((row, found, expected), (2, 2, 3));
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn load_rejects_duplicate_headers() {
        let data = TabularData {
            columns: vec!["authors".into(), "authors".into()],
            rows: vec![vec!["b B, a A".into(), "d D, c C".into()]],
        };
        assert!(matches!(
            TableModel::load(data),
            Err(SortError::DuplicateColumn(name)) if name == "authors"
        ));
    }

    #[test]
    fn native_cells_are_shown_but_not_sorted() {
        let data = TabularData {
            columns: vec!["published".into()],
            rows: vec![vec![CellValue::Native(AnyValue::Date(19797))]],
        };
        let mut table = TableModel::load(data.clone()).unwrap();
        table
            .apply_sort(&ColumnRef::new("published"), SortKey::ByLastName)
            .unwrap();
        assert_eq!(table.export(), data);
        assert_eq!(table.project()[1], vec!["2024-03-15"]);
    }

    #[test]
    fn project_puts_header_first() {
        let table = TableModel::load(sample()).unwrap();
        let projected = table.project();
        assert_eq!(projected.len(), 4);
        assert_eq!(projected[0], vec!["id", "authors", "editors"]);
        assert_eq!(projected[2], vec!["2", "3.5", "Carl Brown"]);
        assert_eq!(projected[3], vec!["3", "", "true"]);
    }

    #[test]
    fn apply_sort_only_touches_the_named_column() {
        let mut table = TableModel::load(sample()).unwrap();
        table
            .apply_sort(&ColumnRef::new("authors"), SortKey::ByLastName)
            .unwrap();

        let after = table.export();
        let before = sample();
        assert_eq!(after.columns, before.columns);
        assert_eq!(after.rows.len(), before.rows.len());
        assert_eq!(after.rows[0][1], CellValue::from("Alice Jones, Bob Smith"));
        for (a, b) in after.rows.iter().zip(before.rows.iter()) {
            assert_eq!(a[0], b[0]);
            assert_eq!(a[2], b[2]);
        }
    }

    #[test]
    fn apply_sort_leaves_non_text_cells() {
        let mut table = TableModel::load(sample()).unwrap();
        table
            .apply_sort(&ColumnRef::new("editors"), SortKey::ByFirstName)
            .unwrap();
        assert_eq!(table.cell(0, 2), Some(&CellValue::from("Amy Abel, Zed Young")));
        assert_eq!(table.cell(2, 2), Some(&CellValue::Bool(true)));

        table
            .apply_sort(&ColumnRef::new("id"), SortKey::ByFirstName)
            .unwrap();
        assert_eq!(table.cell(1, 0), Some(&CellValue::Int(2)));
    }

    #[test]
    fn apply_sort_on_unknown_column_fails() {
        let mut table = TableModel::load(sample()).unwrap();
        let result = table.apply_sort(&ColumnRef::new("missing"), SortKey::ByLastName);
        assert!(matches!(result, Err(SortError::InvalidColumn(name)) if name == "missing"));
        assert_eq!(table.export(), sample());
    }

    #[test]
    fn column_lookup_by_name() {
        let table = TableModel::load(sample()).unwrap();
        assert_eq!(table.column_index(&ColumnRef::new("editors")), Some(2));
        assert_eq!(table.column_ref(1), Some(ColumnRef::new("authors")));
        assert_eq!(table.column_ref(7), None);
        assert_eq!(table.row_count(), 3);
    }
}
