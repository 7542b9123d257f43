//! Tabular query results

use serde::Serialize;

use crate::{ColumnType, Error, Result, Value};

/// A named, typed column
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub name: String,
    pub data_type: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// An ordered set of named columns and the rows under them
///
/// A failed query yields [`Table::empty`], never an absent result, so every
/// consumer handles exactly one shape. `truncated` is set when a row cap cut
/// the result short.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Table {
    columns: Vec<Column>,
    rows: Vec<Vec<Value>>,
    truncated: bool,
}

impl Table {
    /// The explicit empty result (no columns, no rows)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a table, checking every row has one cell per column
    pub fn new(columns: Vec<Column>, rows: Vec<Vec<Value>>) -> Result<Self> {
        if let Some((idx, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != columns.len())
        {
            return Err(Error::InvalidTable(format!(
                "row {} has {} cells, expected {}",
                idx,
                row.len(),
                columns.len()
            )));
        }

        Ok(Self {
            columns,
            rows,
            truncated: false,
        })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Zero rows is a valid, renderable state
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn with_truncated(mut self, truncated: bool) -> Self {
        self.truncated = truncated;
        self
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| Error::ColumnNotFound(name.to_string()))
    }

    pub fn column(&self, name: &str) -> Result<&Column> {
        self.column_index(name).map(|idx| &self.columns[idx])
    }

    /// Iterate the cells of one column
    pub fn column_values<'a>(
        &'a self,
        name: &str,
    ) -> Result<impl Iterator<Item = &'a Value> + use<'a>> {
        let idx = self.column_index(name)?;
        Ok(self.rows.iter().map(move |row| &row[idx]))
    }

    /// Cell at (`row`, `column`), if both exist
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column).ok()?;
        self.rows.get(row).map(|r| &r[idx])
    }

    /// Same schema, only the rows matching `predicate`, in order
    pub fn select_rows<F>(&self, mut predicate: F) -> Table
    where
        F: FnMut(&[Value]) -> bool,
    {
        Table {
            columns: self.columns.clone(),
            rows: self
                .rows
                .iter()
                .filter(|row| predicate(row))
                .cloned()
                .collect(),
            truncated: self.truncated,
        }
    }

    /// Keep at most `max_rows` rows; returns whether anything was cut
    pub fn truncate_to(&mut self, max_rows: usize) -> bool {
        if self.rows.len() > max_rows {
            self.rows.truncate(max_rows);
            self.truncated = true;
        }
        self.truncated
    }
}
