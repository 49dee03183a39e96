//! In-memory table cache.
//!
//! Mirrors every table of the column store as a [`TableFrame`] for fast
//! slicing and series extraction. The cache and the store apply the same
//! merge semantics, so replaying the store at load time reproduces the cache.

use crate::catalog::TableMeta;
use crate::error::{AnemosError, Result};
use crate::series::{Series, SeriesMeta};
use crate::storage::frame::TableFrame;
use std::collections::HashMap;

/// Result of merging rows into a cached table.
#[derive(Debug, Clone)]
pub struct CacheUpdate {
    /// First row index whose content may have changed.
    pub first_position: usize,
    /// The table as it was before the merge.
    pub previous: TableFrame,
}

/// Per-table column cache keyed by table code.
#[derive(Debug, Default)]
pub struct TableCache {
    tables: HashMap<String, TableFrame>,
}

impl TableCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the rows of `table`, replacing any cached copy.
    pub fn load(&mut self, table: &TableMeta, frame: TableFrame) -> Result<()> {
        if frame.column_count() != table.variables.len() {
            return Err(AnemosError::Schema(format!(
                "table `{}` has {} variables but {} columns were loaded",
                table.code,
                table.variables.len(),
                frame.column_count()
            )));
        }
        self.tables.insert(table.code.clone(), frame.sorted_unique());
        Ok(())
    }

    /// Returns true if `code` is cached.
    pub fn contains(&self, code: &str) -> bool {
        self.tables.contains_key(code)
    }

    /// The cached frame of a table.
    pub fn frame(&self, code: &str) -> Result<&TableFrame> {
        self.tables
            .get(code)
            .ok_or_else(|| AnemosError::table_not_found(code))
    }

    /// Rows `first..=last` of a table; `None` returns the whole table.
    pub fn slice(&self, code: &str, range: Option<(usize, usize)>) -> Result<TableFrame> {
        let frame = self.frame(code)?;
        match range {
            None => Ok(frame.clone()),
            Some((first, last)) => frame.slice(first, last),
        }
    }

    /// Merges `rows` into a table with last-write-wins for non-missing values.
    pub fn update(&mut self, code: &str, rows: &TableFrame) -> Result<CacheUpdate> {
        let current = self.frame(code)?;
        let rows = rows.sorted_unique();
        let Some(first_new) = rows.first_timestamp() else {
            return Ok(CacheUpdate {
                first_position: current.len(),
                previous: current.clone(),
            });
        };

        let first_position = current.position_at_or_after(first_new);
        let merged = current.merge(&rows)?;
        let previous = self
            .tables
            .insert(code.to_string(), merged)
            .ok_or_else(|| AnemosError::table_not_found(code))?;
        Ok(CacheUpdate {
            first_position,
            previous,
        })
    }

    /// Puts back a frame saved by [`update`](Self::update).
    pub fn restore(&mut self, code: &str, frame: TableFrame) {
        self.tables.insert(code.to_string(), frame);
    }

    /// Extracts one variable of `table` as a series.
    pub fn get_column(&self, table: &TableMeta, variable_index: usize) -> Result<Series> {
        let frame = self.frame(&table.code)?;
        let (variable, column) = table
            .variables
            .get(variable_index)
            .zip(frame.column(variable_index))
            .ok_or_else(|| AnemosError::NotFound {
                kind: "variable",
                code: format!("{}[{}]", table.code, variable_index),
            })?;
        Ok(Series::from_shared(
            SeriesMeta::for_variable(table, variable),
            frame.timestamps().clone(),
            column.clone(),
        ))
    }

    /// Drops a table from the cache.
    pub fn remove(&mut self, code: &str) -> Option<TableFrame> {
        self.tables.remove(code)
    }
}
