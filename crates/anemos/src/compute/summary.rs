//! Standard per-series summary.

use crate::compute::{ComputationResult, SeriesResult};
use crate::query::reducer::Reducer;
use crate::series::Series;
use crate::storage::frame::Timestamp;
use serde::Serialize;

/// Descriptive statistics of one series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    /// First timestamp.
    pub start: Option<Timestamp>,
    /// Last timestamp.
    pub end: Option<Timestamp>,
    /// Minimum valid value.
    pub min: f64,
    /// Maximum valid value.
    pub max: f64,
    /// Mean of valid values.
    pub mean: f64,
    /// Sample standard deviation.
    pub stdev: f64,
    /// Share of valid samples.
    pub fraction: f64,
}

impl Summary {
    /// Summarizes `series`.
    pub fn of(series: &Series) -> Self {
        let values = series.values();
        Self {
            start: series.first_timestamp(),
            end: series.last_timestamp(),
            min: Reducer::Min.reduce(values),
            max: Reducer::Max.reduce(values),
            mean: Reducer::Mean.reduce(values),
            stdev: Reducer::Std.reduce(values),
            fraction: Reducer::Fraction.reduce(values),
        }
    }
}

/// One summary per series.
pub fn standard_summary(series: &[Series]) -> ComputationResult {
    ComputationResult::Summary(
        series
            .iter()
            .map(|s| SeriesResult::new(s.meta.clone(), Summary::of(s)))
            .collect(),
    )
}
