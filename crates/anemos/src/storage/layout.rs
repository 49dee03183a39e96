//! On-disk layout of a database root.
//!
//! ```text
//! <root>/metadata.json          catalog descriptor (vocabularies + table codes)
//! <root>/<code>/metadata.json   table descriptor
//! <root>/<code>/data.acol       column file
//! <root>/.<code>.removing       table directory while it is being deleted
//! ```

use crate::config::SyncMode;
use crate::error::{AnemosError, Result};
use crate::storage::file::{sync_dir, sync_file};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Descriptor file name, used at the root and in every table directory.
pub const METADATA_FILE: &str = "metadata.json";

/// Column file name inside a table directory.
pub const DATA_FILE: &str = "data.acol";

/// Provides filesystem paths for a database root.
///
/// # Examples
/// ```rust,ignore
/// use alopex_anemos::storage::DatabaseLayout;
///
/// let layout = DatabaseLayout::new("/data/stations");
/// let path = layout.table_data_path("T1")?;
/// ```
#[derive(Debug, Clone)]
pub struct DatabaseLayout {
    root: PathBuf,
}

impl DatabaseLayout {
    /// Creates a layout rooted at `root`.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// The database root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the catalog descriptor.
    pub fn catalog_path(&self) -> PathBuf {
        self.root.join(METADATA_FILE)
    }

    /// Directory holding one table.
    pub fn table_dir(&self, code: &str) -> Result<PathBuf> {
        validate_table_code(code)?;
        Ok(self.root.join(code))
    }

    /// Where a table directory is moved before it is deleted.
    pub fn removal_dir(&self, code: &str) -> Result<PathBuf> {
        validate_table_code(code)?;
        Ok(self.root.join(format!(".{}.removing", code)))
    }

    /// Path of a table descriptor.
    pub fn table_meta_path(&self, code: &str) -> Result<PathBuf> {
        Ok(self.table_dir(code)?.join(METADATA_FILE))
    }

    /// Path of a table column file.
    pub fn table_data_path(&self, code: &str) -> Result<PathBuf> {
        Ok(self.table_dir(code)?.join(DATA_FILE))
    }
}

/// Checks that a table code can be used as a single directory name.
pub fn validate_table_code(code: &str) -> Result<()> {
    let invalid = code.is_empty()
        || code == "."
        || code == ".."
        || code.contains(&['/', '\\', '\0'][..]);
    if invalid {
        return Err(AnemosError::Schema(format!("invalid table code `{}`", code)));
    }
    Ok(())
}

/// Writes `value` as JSON through a temp file and rename.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T, sync_mode: SyncMode) -> Result<()> {
    let tmp_path = path.with_extension("json.tmp");
    {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush()?;
        sync_file(writer.get_ref(), sync_mode)?;
    }
    fs::rename(&tmp_path, path)?;
    if let Some(dir) = path.parent() {
        sync_dir(dir, sync_mode)?;
    }
    Ok(())
}

/// Reads a JSON descriptor.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}
