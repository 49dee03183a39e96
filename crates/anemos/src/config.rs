//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Default number of write worker threads.
pub const DEFAULT_WORKER_THREADS: usize = 2;

/// Default chunk count that triggers a column file compaction.
pub const DEFAULT_COMPACTION_THRESHOLD: usize = 64;

/// Sync mode for column file durability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Fsync after each write (default, highest durability).
    #[default]
    Fsync,
    /// Use fdatasync (skip metadata update, faster).
    Fdatasync,
    /// No sync (fastest, lowest durability - for testing only).
    None,
}

/// Configuration for an [`Engine`](crate::Engine).
///
/// # Examples
/// ```rust,ignore
/// use alopex_anemos::config::{EngineConfig, SyncMode};
///
/// let config = EngineConfig::default()
///     .with_worker_threads(4)
///     .with_sync_mode(SyncMode::Fdatasync);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of threads executing queued write actions.
    pub worker_threads: usize,
    /// Capacity of the write queue; `None` means unbounded.
    pub queue_capacity: Option<usize>,
    /// Durability of column file writes.
    pub sync_mode: SyncMode,
    /// Chunk count above which a column file is rewritten as one chunk.
    pub compaction_threshold: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_threads: DEFAULT_WORKER_THREADS,
            queue_capacity: None,
            sync_mode: SyncMode::default(),
            compaction_threshold: DEFAULT_COMPACTION_THRESHOLD,
        }
    }
}

impl EngineConfig {
    /// Sets the number of write worker threads (at least one is always spawned).
    pub fn with_worker_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads;
        self
    }

    /// Bounds the write queue to `capacity` pending actions.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    /// Sets the sync mode for column file writes.
    pub fn with_sync_mode(mut self, sync_mode: SyncMode) -> Self {
        self.sync_mode = sync_mode;
        self
    }

    /// Sets the compaction threshold.
    pub fn with_compaction_threshold(mut self, threshold: usize) -> Self {
        self.compaction_threshold = threshold;
        self
    }

    pub(crate) fn effective_workers(&self) -> usize {
        self.worker_threads.max(1)
    }
}
