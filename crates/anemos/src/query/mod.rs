//! Query layer: request objects in, answer objects out.
//!
//! # Architecture
//!
//! ```text
//! Request ─┬─ data ─────▶ pipeline ─▶ Series list / ComputationResult
//!          └─ metaData ─▶ metadata ─▶ JSON
//!                                        │
//!                    Answer { result, interval, computationTime, error }
//! ```
//!
//! Failures inside the query layer are reported through the answer's error
//! channel; [`handle`] never returns an `Err`.
//!
//! # Example
//!
//! ```rust,ignore
//! use alopex_anemos::query::{handle, Request};
//!
//! let request: Request = serde_json::from_str(json)?;
//! let answer = handle(&database, &request);
//! if let Some(error) = &answer.error {
//!     eprintln!("{}: {}", error.kind, error.message);
//! }
//! ```

pub mod answer;
pub mod fill;
pub mod interval;
pub mod metadata;
pub mod pipeline;
pub mod reducer;
pub mod request;
pub mod resample;
pub mod time;

pub use answer::{Answer, AnswerResult, ErrorPayload};
pub use interval::{Interval, IntervalCode};
pub use reducer::{Reducer, StatisticSpec};
pub use request::{DataRequest, IntervalSpec, MetaDataQuery, Request, ResamplingSpec};
pub use time::{TimeBound, TimeBounds, TimeSpec};

use crate::database::Database;
use std::time::Instant;
use tracing::debug;

/// Answers `request` against a database snapshot.
pub fn handle(db: &Database, request: &Request) -> Answer {
    let started = Instant::now();
    let outcome = match request {
        Request::Data(data) => pipeline::run(db, data),
        Request::MetaData(query) => {
            metadata::answer(db.catalog(), query).map(|value| (AnswerResult::MetaData(value), None))
        }
    };
    let elapsed = started.elapsed().as_secs_f64();
    match outcome {
        Ok((result, interval)) => Answer::success(result, interval, elapsed),
        Err(err) => {
            debug!(error = %err, "Request failed");
            Answer::failure(&err, elapsed)
        }
    }
}
