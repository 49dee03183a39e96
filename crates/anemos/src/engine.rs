//! Thread-safe database handle.
//!
//! # Architecture
//!
//! ```text
//!  request()  ──▶ Coordinator::begin_read ──▶ RwLock::read  ──▶ query::handle
//!  submit()   ──▶ Coordinator::reserve_write
//!                   └─▶ WorkerPool job ──▶ begin_write ──▶ RwLock::write ──▶ Database::apply
//! ```
//!
//! Reads run on the caller's thread; writes run on the worker pool in the
//! order they were submitted. The coordinator guarantees that a write never
//! overlaps a read, so the inner lock is never contended.

use crate::catalog::{CatalogSeed, TableMeta};
use crate::config::EngineConfig;
use crate::coordinator::pool::{PendingWrite, WorkerPool};
use crate::coordinator::Coordinator;
use crate::database::{Database, WriteAction};
use crate::error::{AnemosError, Result};
use crate::query::{self, Answer, Request};
use crate::storage::Row;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;
use tracing::{debug, warn};

#[derive(Debug)]
struct Shared {
    coordinator: Coordinator,
    database: RwLock<Database>,
}

impl Shared {
    fn database(&self) -> RwLockReadGuard<'_, Database> {
        self.database.read().unwrap_or_else(|err| err.into_inner())
    }

    fn database_mut(&self) -> RwLockWriteGuard<'_, Database> {
        self.database.write().unwrap_or_else(|err| err.into_inner())
    }
}

/// A database shared between reader threads and a pool of write workers.
///
/// # Example
///
/// ```rust,ignore
/// use alopex_anemos::{Engine, EngineConfig};
///
/// let engine = Engine::load_database("/data/stations", EngineConfig::default())?;
/// let answer = engine.request_json(r#"{"type": "metaData", "name": "tableCodes"}"#);
/// engine.update_table("T1", rows)?;
/// ```
#[derive(Debug)]
pub struct Engine {
    shared: Arc<Shared>,
    pool: WorkerPool,
    // Keeps queue order equal to ticket order across submitting threads.
    submit_order: Mutex<()>,
}

impl Engine {
    /// Creates a new database under `root` and starts its workers.
    pub fn create_database(
        seed: CatalogSeed,
        root: impl AsRef<Path>,
        config: EngineConfig,
    ) -> Result<Self> {
        let database = Database::create(seed, root, config)?;
        Self::start(database)
    }

    /// Loads an existing database and starts its workers.
    pub fn load_database(root: impl AsRef<Path>, config: EngineConfig) -> Result<Self> {
        let database = Database::load(root, config)?;
        Self::start(database)
    }

    /// Wraps an opened database.
    pub fn start(database: Database) -> Result<Self> {
        let config = database.config().clone();
        let pool = WorkerPool::new(config.effective_workers(), config.queue_capacity)?;
        Ok(Self {
            shared: Arc::new(Shared {
                coordinator: Coordinator::new(),
                database: RwLock::new(database),
            }),
            pool,
            submit_order: Mutex::new(()),
        })
    }

    /// The read/write coordinator.
    pub fn coordinator(&self) -> &Coordinator {
        &self.shared.coordinator
    }

    /// Number of write workers.
    pub fn workers(&self) -> usize {
        self.pool.size()
    }

    /// Answers a request once reads are admitted.
    pub fn request(&self, request: &Request) -> Answer {
        self.read(|db| query::handle(db, request))
    }

    /// Parses and answers a JSON request.
    ///
    /// Malformed JSON is reported as an `invalidRequest` answer.
    pub fn request_json(&self, json: &str) -> Answer {
        let started = Instant::now();
        match serde_json::from_str::<Request>(json) {
            Ok(request) => self.request(&request),
            Err(err) => {
                debug!(error = %err, "Rejected request");
                Answer::failure(
                    &AnemosError::InvalidRequest(err.to_string()),
                    started.elapsed().as_secs_f64(),
                )
            }
        }
    }

    /// Runs `f` against the database as an admitted read.
    pub fn read<T>(&self, f: impl FnOnce(&Database) -> T) -> T {
        let _read = self.shared.coordinator.begin_read();
        f(&self.shared.database())
    }

    /// Queues a write action behind every previously submitted one.
    pub fn submit(&self, action: WriteAction) -> PendingWrite {
        let (sender, pending) = PendingWrite::channel();
        let _order = self
            .submit_order
            .lock()
            .unwrap_or_else(|err| err.into_inner());
        let ticket = self.shared.coordinator.reserve_write();
        let shared = Arc::clone(&self.shared);
        let reply = sender.clone();

        let queued = self.pool.execute(move || {
            let outcome = shared.coordinator.begin_write(ticket).and_then(|_write| {
                let mut database = shared.database_mut();
                database.apply(action)
            });
            if let Err(err) = &outcome {
                warn!(error = %err, "Write action failed");
            }
            let _ = reply.send(outcome);
        });
        if let Err(err) = queued {
            self.shared.coordinator.abandon_write(ticket);
            let _ = sender.send(Err(err));
        }
        pending
    }

    /// Creates a table and waits for completion.
    pub fn create_table(&self, meta: TableMeta, rows: Vec<Row>) -> Result<()> {
        self.submit(WriteAction::CreateTable { meta, rows }).wait()
    }

    /// Merges rows into a table and waits for completion.
    pub fn update_table(&self, code: &str, rows: Vec<Row>) -> Result<()> {
        self.submit(WriteAction::UpdateTable {
            code: code.to_string(),
            rows,
        })
        .wait()
    }

    /// Removes a table and waits for completion.
    pub fn remove_table(&self, code: &str) -> Result<()> {
        self.submit(WriteAction::RemoveTable {
            code: code.to_string(),
        })
        .wait()
    }

    /// Every stored row of a table.
    pub fn read_all(&self, code: &str) -> Result<Vec<Row>> {
        self.read(|db| db.read_all(code))
    }

    /// Stops accepting writes and waits for queued ones to finish.
    pub fn shutdown(&mut self) {
        self.pool.shutdown();
    }
}
