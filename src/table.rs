//! A loosely typed, column-named table of optional string cells.
//!
//! This is the shape every input file takes before it is joined and turned
//! into typed [`Tract`](crate::tract::Tract) records. A `None` cell is an
//! explicit null: absent in the source, or filled in by a left join.

use crate::error::{AnalysisError, Result};

/// Raw cell values treated as null on load.
const NULL_MARKERS: &[&str] = &["", "NULL", "NA", "N/A", "NAN"];

/// Normalizes a raw cell: trims whitespace and maps null markers to `None`.
pub fn cell(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if NULL_MARKERS
        .iter()
        .any(|m| trimmed.eq_ignore_ascii_case(m))
    {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    name: String,
    columns: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    /// Builds a table from string literals. Cells go through [`cell`].
    pub fn from_records(name: &str, columns: &[&str], records: &[&[&str]]) -> Self {
        let mut table = Self::new(name, columns.iter().map(|c| c.to_string()).collect());
        for record in records {
            table.push_row(record.iter().map(|v| cell(v)).collect());
        }
        table
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Option<String>>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Appends a row, padding short rows with nulls and truncating long ones
    /// so every row matches the header width.
    pub fn push_row(&mut self, mut row: Vec<Option<String>>) {
        row.resize(self.columns.len(), None);
        self.rows.push(row);
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Position of `column`, or a [`AnalysisError::Schema`] naming it.
    pub fn column_index(&self, column: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| AnalysisError::schema(&self.name, column))
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .and_then(|c| c.as_deref())
    }

    /// Value of `column` in `row`, failing only when the column is absent.
    pub fn value(&self, row: usize, column: &str) -> Result<Option<&str>> {
        let col = self.column_index(column)?;
        Ok(self.get(row, col))
    }
}
