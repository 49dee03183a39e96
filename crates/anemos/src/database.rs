//! The owned database: catalog, column store and table cache kept in step.
//!
//! # Architecture
//!
//! ```text
//! Database
//!   ├── Catalog            table descriptors + vocabularies
//!   ├── ColumnStore        <root>/<code>/data.acol per table
//!   ├── TableCache         one TableFrame per table
//!   └── TransformRegistry  derived variable implementations
//! ```
//!
//! Mutations are not thread-safe on their own; [`Engine`](crate::engine::Engine)
//! runs them as coordinated writes. Each mutation either completes on all
//! three components or leaves them as they were.
//!
//! # Example
//!
//! ```rust,ignore
//! use alopex_anemos::database::Database;
//!
//! let mut db = Database::create(seed, "/data/stations", EngineConfig::default())?;
//! db.create_table(meta, rows)?;
//! db.update_table("T1", more_rows)?;
//! let answer = db.request(&request);
//! ```

use crate::cache::TableCache;
use crate::catalog::{Catalog, CatalogDescriptor, CatalogSeed, TableMeta};
use crate::config::EngineConfig;
use crate::error::{AnemosError, Result};
use crate::query::{self, Answer, Request};
use crate::storage::layout::{read_json, validate_table_code, write_json_atomic};
use crate::storage::{ColumnStore, DatabaseLayout, Row, TableFrame};
use crate::transform::TransformRegistry;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::{debug, error, info};

/// A table-level mutation.
#[derive(Debug, Clone)]
pub enum WriteAction {
    /// Create a table from a descriptor and initial rows.
    CreateTable {
        /// Table descriptor.
        meta: TableMeta,
        /// Initial rows.
        rows: Vec<Row>,
    },
    /// Merge rows into a table.
    UpdateTable {
        /// Table code.
        code: String,
        /// Rows to merge.
        rows: Vec<Row>,
    },
    /// Remove a table and its storage.
    RemoveTable {
        /// Table code.
        code: String,
    },
}

/// Required top-level fields of a table descriptor.
const REQUIRED_TABLE_FIELDS: [&str; 4] = ["code", "latitude", "longitude", "elevation"];

/// A database rooted at one directory.
#[derive(Debug)]
pub struct Database {
    layout: DatabaseLayout,
    config: EngineConfig,
    catalog: Catalog,
    store: ColumnStore,
    cache: TableCache,
    transforms: TransformRegistry,
}

impl Database {
    /// Creates an empty database under `root`.
    ///
    /// Fails with a schema error if `root` already holds a database.
    pub fn create(seed: CatalogSeed, root: impl AsRef<Path>, config: EngineConfig) -> Result<Self> {
        let layout = DatabaseLayout::new(root);
        fs::create_dir_all(layout.root())?;
        let catalog_path = layout.catalog_path();
        if catalog_path.exists() {
            return Err(AnemosError::Schema(format!(
                "a database already exists at {}",
                layout.root().display()
            )));
        }

        let catalog = Catalog::new(seed);
        write_json_atomic(&catalog_path, &catalog.descriptor(Vec::new()), config.sync_mode)?;
        info!("Created database at {}", layout.root().display());

        Ok(Self {
            store: ColumnStore::new(layout.clone(), &config),
            layout,
            config,
            catalog,
            cache: TableCache::new(),
            transforms: TransformRegistry::with_defaults(),
        })
    }

    /// Loads a database created by [`create`](Self::create).
    pub fn load(root: impl AsRef<Path>, config: EngineConfig) -> Result<Self> {
        let layout = DatabaseLayout::new(root);
        let descriptor: CatalogDescriptor = read_json(&layout.catalog_path())?;
        let mut catalog = Catalog::new(descriptor.seed);
        let mut store = ColumnStore::new(layout.clone(), &config);
        let mut cache = TableCache::new();

        for code in &descriptor.tables {
            let value: Value = read_json(&layout.table_meta_path(code)?)?;
            let meta = TableMeta::from_value(value)?;
            if &meta.code != code {
                return Err(AnemosError::Schema(format!(
                    "descriptor in `{}` names table `{}`",
                    code, meta.code
                )));
            }
            store.open_table(&meta)?;
            cache.load(&meta, store.read_all(code)?)?;
            debug!("Loaded table `{}` ({} rows)", code, store.row_count(code)?);
            catalog.insert_table(meta);
        }
        info!(
            "Loaded database at {} with {} tables",
            layout.root().display(),
            descriptor.tables.len()
        );

        Ok(Self {
            layout,
            config,
            catalog,
            store,
            cache,
            transforms: TransformRegistry::with_defaults(),
        })
    }

    /// The catalog.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// The table cache.
    pub fn cache(&self) -> &TableCache {
        &self.cache
    }

    /// The column store.
    pub fn store(&self) -> &ColumnStore {
        &self.store
    }

    /// The transform registry.
    pub fn transforms(&self) -> &TransformRegistry {
        &self.transforms
    }

    /// Mutable access for registering additional transforms.
    pub fn transforms_mut(&mut self) -> &mut TransformRegistry {
        &mut self.transforms
    }

    /// The configuration the database was opened with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Answers a request against the current state.
    pub fn request(&self, request: &Request) -> Answer {
        query::handle(self, request)
    }

    /// Applies one mutation.
    pub fn apply(&mut self, action: WriteAction) -> Result<()> {
        match action {
            WriteAction::CreateTable { meta, rows } => self.create_table(meta, rows),
            WriteAction::UpdateTable { code, rows } => self.update_table(&code, rows),
            WriteAction::RemoveTable { code } => self.remove_table(&code),
        }
    }

    /// Creates a table from a JSON descriptor, checking required fields.
    pub fn create_table_from_value(&mut self, descriptor: Value, rows: Vec<Row>) -> Result<()> {
        let missing: Vec<&str> = REQUIRED_TABLE_FIELDS
            .iter()
            .copied()
            .filter(|field| descriptor.get(field).map_or(true, Value::is_null))
            .collect();
        if !missing.is_empty() {
            return Err(AnemosError::Schema(format!(
                "table descriptor is missing {}",
                missing.join(", ")
            )));
        }
        self.create_table(TableMeta::from_value(descriptor)?, rows)
    }

    /// Creates a table with its initial rows.
    ///
    /// Rows are sorted by timestamp; for duplicate timestamps the first row wins.
    pub fn create_table(&mut self, meta: TableMeta, rows: Vec<Row>) -> Result<()> {
        meta.validate()?;
        validate_table_code(&meta.code)?;
        if self.catalog.contains(&meta.code) {
            return Err(AnemosError::Schema(format!(
                "table `{}` already exists",
                meta.code
            )));
        }
        let frame = TableFrame::from_rows(&rows, meta.variables.len())?.sorted_unique();

        self.store.create_table(&meta, &frame)?;
        let persisted = write_json_atomic(
            &self.layout.table_meta_path(&meta.code)?,
            &meta,
            self.config.sync_mode,
        )
        .and_then(|()| {
            let mut codes = self.catalog.table_codes();
            codes.push(meta.code.clone());
            codes.sort();
            self.write_descriptor(codes)
        });
        if let Err(err) = persisted {
            if let Err(cleanup) = self.store.remove_table(&meta.code) {
                error!(
                    "Failed to roll back table `{}` after {}: {}",
                    meta.code, err, cleanup
                );
            }
            return Err(err);
        }

        self.cache.load(&meta, frame)?;
        info!(
            "Created table `{}` with {} variables and {} rows",
            meta.code,
            meta.variables.len(),
            self.store.row_count(&meta.code)?
        );
        self.catalog.insert_table(meta);
        Ok(())
    }

    /// Merges rows into a table.
    ///
    /// For each timestamp the latest non-missing value wins; timestamps not
    /// supplied keep their values. Only the affected tail of the column file
    /// is rewritten.
    pub fn update_table(&mut self, code: &str, rows: Vec<Row>) -> Result<()> {
        let meta = self.catalog.table(code)?;
        let frame = TableFrame::from_rows(&rows, meta.variables.len())?;
        if frame.is_empty() {
            return Ok(());
        }

        let update = self.cache.update(code, &frame)?;
        let tail = self.cache.frame(code)?.tail(update.first_position);
        debug!(
            "Updating `{}`: {} rows from position {}",
            code,
            tail.len(),
            update.first_position
        );
        if let Err(err) = self.store.replace_tail(code, update.first_position, &tail) {
            if let Err(rollback) = self.store.rewrite_table(code, &update.previous) {
                error!(
                    "Failed to restore column file of `{}` after {}: {}",
                    code, err, rollback
                );
            }
            self.cache.restore(code, update.previous);
            return Err(err);
        }
        Ok(())
    }

    /// Removes a table, its descriptor and its column file.
    pub fn remove_table(&mut self, code: &str) -> Result<()> {
        self.catalog.table(code)?;
        let codes = self
            .catalog
            .table_codes()
            .into_iter()
            .filter(|c| c != code)
            .collect();
        self.write_descriptor(codes)?;
        if let Err(err) = self.store.remove_table(code) {
            if let Err(restore) = self.write_descriptor(self.catalog.table_codes()) {
                error!(
                    "Failed to restore descriptor after removing `{}` failed: {}",
                    code, restore
                );
            }
            return Err(err);
        }
        self.cache.remove(code);
        self.catalog.remove_table(code);
        info!("Removed table `{}`", code);
        Ok(())
    }

    /// Every stored row of a table, as persisted.
    pub fn read_all(&self, code: &str) -> Result<Vec<Row>> {
        Ok(self.store.read_all(code)?.to_rows())
    }

    fn write_descriptor(&self, codes: Vec<String>) -> Result<()> {
        write_json_atomic(
            &self.layout.catalog_path(),
            &self.catalog.descriptor(codes),
            self.config.sync_mode,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::VariableMeta;
    use crate::config::SyncMode;
    use crate::storage::MISSING;
    use serde_json::json;
    use tempfile::TempDir;

    fn config() -> EngineConfig {
        EngineConfig::default().with_sync_mode(SyncMode::None)
    }

    fn meta() -> TableMeta {
        TableMeta::new("T1", "Station", 40.0, -3.0, 650.0)
            .with_variable(VariableMeta::new("v0", "vels", "mean", 80.0))
    }

    fn rows(points: &[(i64, f64)]) -> Vec<Row> {
        points.iter().map(|&(t, v)| Row::new(t, vec![v])).collect()
    }

    #[test]
    fn test_create_twice_fails() {
        let dir = TempDir::new().unwrap();
        Database::create(CatalogSeed::default(), dir.path(), config()).unwrap();
        assert!(Database::create(CatalogSeed::default(), dir.path(), config()).is_err());
    }

    #[test]
    fn test_update_merges_and_persists() {
        let dir = TempDir::new().unwrap();
        let mut db = Database::create(CatalogSeed::default(), dir.path(), config()).unwrap();
        db.create_table(meta(), rows(&[(0, 1.0), (60, 2.0), (120, 3.0)]))
            .unwrap();
        db.update_table("T1", rows(&[(120, 30.0), (180, 4.0), (60, MISSING)]))
            .unwrap();

        let expected = rows(&[(0, 1.0), (60, 2.0), (120, 30.0), (180, 4.0)]);
        assert_eq!(db.read_all("T1").unwrap(), expected);
        assert_eq!(db.cache().frame("T1").unwrap().to_rows(), expected);

        let reloaded = Database::load(dir.path(), config()).unwrap();
        assert_eq!(reloaded.read_all("T1").unwrap(), expected);
        assert_eq!(reloaded.catalog().table_codes(), vec!["T1".to_string()]);
    }

    #[test]
    fn test_required_fields() {
        let dir = TempDir::new().unwrap();
        let mut db = Database::create(CatalogSeed::default(), dir.path(), config()).unwrap();
        let err = db
            .create_table_from_value(json!({"code": "T1", "latitude": 1.0}), Vec::new())
            .unwrap_err();
        assert!(matches!(err, AnemosError::Schema(ref m) if m.contains("longitude")));
        assert!(!db.catalog().contains("T1"));
    }

    #[test]
    fn test_duplicate_and_mismatched_rows() {
        let dir = TempDir::new().unwrap();
        let mut db = Database::create(CatalogSeed::default(), dir.path(), config()).unwrap();
        db.create_table(meta(), Vec::new()).unwrap();
        assert!(db.create_table(meta(), Vec::new()).is_err());
        let wide = vec![Row::new(0, vec![1.0, 2.0])];
        assert!(matches!(
            db.update_table("T1", wide),
            Err(AnemosError::Schema(_))
        ));
        assert!(db.update_table("T9", Vec::new()).is_err());
    }

    #[test]
    fn test_remove_table() {
        let dir = TempDir::new().unwrap();
        let mut db = Database::create(CatalogSeed::default(), dir.path(), config()).unwrap();
        db.create_table(meta(), rows(&[(0, 1.0)])).unwrap();
        db.apply(WriteAction::RemoveTable {
            code: "T1".to_string(),
        })
        .unwrap();
        assert!(!db.catalog().contains("T1"));
        assert!(!dir.path().join("T1").exists());
        assert!(Database::load(dir.path(), config())
            .unwrap()
            .catalog()
            .table_codes()
            .is_empty());
    }

    #[test]
    fn test_failed_remove_leaves_table_listed() {
        let dir = TempDir::new().unwrap();
        let mut db = Database::create(CatalogSeed::default(), dir.path(), config()).unwrap();
        db.create_table(meta(), rows(&[(0, 1.0), (60, 2.0)])).unwrap();
        let blocker = dir.path().join(".T1.removing");
        std::fs::write(&blocker, b"").unwrap();

        assert!(db.remove_table("T1").is_err());
        assert!(db.catalog().contains("T1"));
        assert_eq!(db.read_all("T1").unwrap(), rows(&[(0, 1.0), (60, 2.0)]));
        assert_eq!(db.cache().frame("T1").unwrap().len(), 2);
        drop(db);

        let mut reloaded = Database::load(dir.path(), config()).unwrap();
        assert_eq!(reloaded.catalog().table_codes(), vec!["T1".to_string()]);
        std::fs::remove_file(&blocker).unwrap();
        reloaded.remove_table("T1").unwrap();
        assert!(!reloaded.catalog().contains("T1"));
    }
}
