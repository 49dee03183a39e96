//! Columnar store: durable, per-table, append-only column files.
//!
//! # Architecture
//!
//! ```text
//! ColumnStore
//!   ├── DatabaseLayout      paths under the database root
//!   └── code → ColumnFile   one open .acol file per table
//! ```
//!
//! Table updates follow the tail-replace protocol: the rows from the first
//! affected position to the end are deleted and the merged tail is appended
//! in one chunk, so untouched history is never rewritten.
//!
//! # Example
//!
//! ```rust,ignore
//! use alopex_anemos::storage::{ColumnStore, DatabaseLayout, TableFrame};
//!
//! let mut store = ColumnStore::new(DatabaseLayout::new(root), &EngineConfig::default());
//! store.create_table(&meta, &frame)?;
//! store.replace_tail(&meta.code, first_position, &merged_tail)?;
//! let rows = store.read_all(&meta.code)?;
//! ```

pub mod file;
pub mod frame;
pub mod layout;

pub use file::ColumnFile;
pub use frame::{is_missing, Row, TableFrame, Timestamp, MISSING};
pub use layout::DatabaseLayout;

use crate::catalog::TableMeta;
use crate::config::{EngineConfig, SyncMode};
use crate::error::{AnemosError, Result};
use std::collections::HashMap;
use std::fs;
use tracing::{debug, warn};

/// Owns the column files of every table under one database root.
#[derive(Debug)]
pub struct ColumnStore {
    layout: DatabaseLayout,
    sync_mode: SyncMode,
    compaction_threshold: usize,
    files: HashMap<String, ColumnFile>,
}

impl ColumnStore {
    /// Creates a store with no open tables.
    pub fn new(layout: DatabaseLayout, config: &EngineConfig) -> Self {
        Self {
            layout,
            sync_mode: config.sync_mode,
            compaction_threshold: config.compaction_threshold,
            files: HashMap::new(),
        }
    }

    /// The database layout.
    pub fn layout(&self) -> &DatabaseLayout {
        &self.layout
    }

    /// Returns true if the table has an open column file.
    pub fn contains(&self, code: &str) -> bool {
        self.files.contains_key(code)
    }

    /// Allocates a column file sized to the table's variables and writes `rows`.
    pub fn create_table(&mut self, table: &TableMeta, rows: &TableFrame) -> Result<()> {
        let column_count = table.variables.len();
        if rows.column_count() != column_count {
            return Err(AnemosError::Schema(format!(
                "table `{}` has {} variables but rows have {} values",
                table.code,
                column_count,
                rows.column_count()
            )));
        }
        if self.files.contains_key(&table.code) {
            return Err(AnemosError::Schema(format!(
                "table `{}` already exists",
                table.code
            )));
        }

        fs::create_dir_all(self.layout.table_dir(&table.code)?)?;
        let mut file = ColumnFile::create(
            self.layout.table_data_path(&table.code)?,
            column_count,
            self.sync_mode,
        )?;
        file.append(rows)?;
        self.files.insert(table.code.clone(), file);
        Ok(())
    }

    /// Opens the existing column file of `table`.
    pub fn open_table(&mut self, table: &TableMeta) -> Result<()> {
        let file = ColumnFile::open(self.layout.table_data_path(&table.code)?, self.sync_mode)?;
        if file.column_count() != table.variables.len() {
            return Err(AnemosError::Schema(format!(
                "table `{}` has {} variables but its column file has {} columns",
                table.code,
                table.variables.len(),
                file.column_count()
            )));
        }
        self.files.insert(table.code.clone(), file);
        Ok(())
    }

    /// Appends rows that sort after every stored row.
    pub fn append_rows(&mut self, code: &str, rows: &TableFrame) -> Result<()> {
        let threshold = self.compaction_threshold;
        let file = self.file_mut(code)?;
        file.append(rows)?;
        if file.chunk_count() > threshold {
            debug!(
                "Compacting `{}` ({} chunks > {})",
                code,
                file.chunk_count(),
                threshold
            );
            file.compact()?;
        }
        Ok(())
    }

    /// Removes rows `first..=last`.
    pub fn delete_range(&mut self, code: &str, first: usize, last: usize) -> Result<()> {
        self.file_mut(code)?.delete_range(first, last)
    }

    /// Reads every stored row of a table.
    pub fn read_all(&self, code: &str) -> Result<TableFrame> {
        self.file(code)?.read_all()
    }

    /// Number of stored rows.
    pub fn row_count(&self, code: &str) -> Result<usize> {
        Ok(self.file(code)?.row_count())
    }

    /// Deletes rows from `first` to the end, then appends `tail`.
    pub fn replace_tail(&mut self, code: &str, first: usize, tail: &TableFrame) -> Result<()> {
        let rows = self.row_count(code)?;
        if first < rows {
            self.delete_range(code, first, rows - 1)?;
        }
        self.append_rows(code, tail)
    }

    /// Replaces the whole content of a table.
    pub fn rewrite_table(&mut self, code: &str, rows: &TableFrame) -> Result<()> {
        self.file_mut(code)?.rewrite(rows)
    }

    /// Releases all storage of a table, including its directory.
    ///
    /// The directory is first renamed out of the way, so a failure before
    /// that point leaves the table open and intact.
    pub fn remove_table(&mut self, code: &str) -> Result<()> {
        self.file(code)?;
        let dir = self.layout.table_dir(code)?;
        let removal = self.layout.removal_dir(code)?;
        if removal.is_dir() {
            fs::remove_dir_all(&removal)?;
        }
        if dir.exists() {
            fs::rename(&dir, &removal)?;
        }
        self.files.remove(code);
        if removal.exists() {
            if let Err(err) = fs::remove_dir_all(&removal) {
                warn!(
                    "Table `{}` removed but {} was left behind: {}",
                    code,
                    removal.display(),
                    err
                );
            }
        }
        Ok(())
    }

    fn file(&self, code: &str) -> Result<&ColumnFile> {
        self.files
            .get(code)
            .ok_or_else(|| AnemosError::table_not_found(code))
    }

    fn file_mut(&mut self, code: &str) -> Result<&mut ColumnFile> {
        self.files
            .get_mut(code)
            .ok_or_else(|| AnemosError::table_not_found(code))
    }
}
