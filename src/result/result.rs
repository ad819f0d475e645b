use std::collections::HashMap;

use crate::core::{Row, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl QueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Values of one column, in row order.
    pub fn column(&self, column: &str) -> Option<Vec<&Value>> {
        let index = self.column_index(column)?;
        Some(self.rows.iter().filter_map(|row| row.get(index)).collect())
    }

    /// Rows keyed by column name.
    pub fn db_rows(&self) -> Vec<DbRow> {
        self.rows
            .iter()
            .map(|row| DbRow {
                values: self.columns.iter().cloned().zip(row.iter().cloned()).collect(),
            })
            .collect()
    }
}

/// A result row addressable by column name.
#[derive(Debug, Clone, PartialEq)]
pub struct DbRow {
    values: HashMap<String, Value>,
}

impl DbRow {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
