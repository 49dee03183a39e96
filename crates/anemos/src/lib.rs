//! Anemos - Alopex Meteorological Time Series Engine
//!
//! This crate stores station tables of timestamped meteorological
//! measurements and answers structured queries over them.
//!
//! # Components
//!
//! - [`ColumnStore`]: one append-friendly column file per table
//! - [`TableCache`]: in-memory mirror of every table for fast extraction
//! - [`Catalog`]: table descriptors and global vocabularies
//! - [`Coordinator`]: drains reads before each write, writes in FIFO order
//! - [`query`]: request pipeline (selection, gap fill, resampling, computations)
//! - [`TransformRegistry`]: derived variables such as turbine power
//!
//! # Example
//!
//! ```rust,ignore
//! use alopex_anemos::{CatalogSeed, Engine, EngineConfig, Row, TableMeta, VariableMeta};
//!
//! let engine = Engine::create_database(CatalogSeed::default(), "/data/stations", EngineConfig::default())?;
//!
//! let meta = TableMeta::new("T1", "Mast 1", 40.1, -3.2, 650.0)
//!     .with_variable(VariableMeta::new("v80", "vels", "mean", 80.0));
//! engine.create_table(meta, vec![Row::new(1_600_000_000, vec![7.4])])?;
//!
//! let answer = engine.request_json(r#"{
//!     "type": "data",
//!     "table": {"code": "T1"},
//!     "resampling": {"interval": {"type": "fixed", "code": "H"}, "statistic": {"name": "mean"}}
//! }"#);
//! println!("{}", answer.to_json()?);
//! ```

#![deny(missing_docs)]

pub mod cache;
pub mod catalog;
pub mod compute;
pub mod config;
pub mod coordinator;
pub mod database;
pub mod engine;
pub mod error;
pub mod query;
pub mod series;
pub mod storage;
pub mod transform;

pub use cache::TableCache;
pub use catalog::{Catalog, CatalogSeed, TableMeta, VariableMeta};
pub use compute::{ComputationResult, ComputationSpec};
pub use config::{EngineConfig, SyncMode};
pub use coordinator::{Coordinator, Phase};
pub use database::{Database, WriteAction};
pub use engine::Engine;
pub use error::{AnemosError, Result};
pub use query::{Answer, AnswerResult, DataRequest, Request};
pub use series::{Series, SeriesMeta};
pub use storage::{ColumnStore, Row, TableFrame, Timestamp, MISSING};
pub use transform::{Transform, TransformRegistry};
