//! Computation library: pure functions from series to summary results.
//!
//! # Example
//!
//! ```rust,ignore
//! use alopex_anemos::compute::{compute, ComputationSpec, HistogramParams};
//!
//! let spec = ComputationSpec::Histogram(HistogramParams { bins: 2, ..Default::default() });
//! let result = compute(&spec, &series)?;
//! ```
//!
//! Every computation returns [`ComputationResult::Empty`] for an empty input.

pub mod cycle;
pub mod expr;
pub mod histogram;
pub mod summary;
pub mod windrose;

pub use histogram::{HistogramBin, HistogramParams};
pub use summary::Summary;
pub use windrose::{WindRose, WindRoseParams};

use crate::error::Result;
use crate::query::reducer::{Reducer, StatisticSpec};
use crate::series::{Series, SeriesMeta};
use crate::storage::frame::{Timestamp, MISSING};
use serde::{Deserialize, Serialize};

/// A computation as written in a request, tagged by `name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "camelCase")]
pub enum ComputationSpec {
    /// Row-wise reduction across series on a shared time index.
    Aggregated {
        /// Reducer applied to each row.
        statistic: StatisticSpec,
    },
    /// Per-series histogram.
    Histogram(HistogramParams),
    /// Per-series cumulative histogram.
    CumulativeDistribution(HistogramParams),
    /// Joint direction/velocity histogram per sensor.
    WindRose(WindRoseParams),
    /// Statistic per calendar month.
    AnnualCycle {
        /// Reducer applied per month.
        statistic: StatisticSpec,
    },
    /// Statistic per hour of day.
    DailyCycle {
        /// Reducer applied per hour.
        statistic: StatisticSpec,
    },
    /// Statistic per (month, hour) pair.
    AnnualDailyCycle {
        /// Reducer applied per pair.
        statistic: StatisticSpec,
    },
    /// Descriptive statistics per series.
    StandardSummary,
    /// Elementwise arithmetic in `x`.
    GenericExpression {
        /// Expression text.
        expression: String,
    },
}

/// A result attached to the metadata of the series it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesResult<T> {
    /// Metadata of the source series.
    pub meta_data: SeriesMeta,
    /// Computed data.
    pub data: T,
}

impl<T> SeriesResult<T> {
    /// Pairs `data` with `meta_data`.
    pub fn new(meta_data: SeriesMeta, data: T) -> Self {
        Self { meta_data, data }
    }
}

/// Output of an `aggregated` computation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Aggregated {
    /// Always `aggregated`.
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// `(timestamp, value)` per row of the shared index.
    pub data: Vec<(Timestamp, f64)>,
}

/// Output of a computation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ComputationResult {
    /// `aggregated`.
    Aggregated(Aggregated),
    /// `histogram` and `cumulativeDistribution`.
    Histogram(Vec<SeriesResult<Vec<HistogramBin>>>),
    /// `windRose`.
    WindRose(Vec<SeriesResult<WindRose>>),
    /// `annualCycle` and `dailyCycle`: `(month or hour, value)`.
    Cycle(Vec<SeriesResult<Vec<(u32, f64)>>>),
    /// `annualDailyCycle`: `((month, hour), value)`.
    AnnualDailyCycle(Vec<SeriesResult<Vec<((u32, u32), f64)>>>),
    /// `standardSummary`.
    Summary(Vec<SeriesResult<Summary>>),
    /// `genericExpression`.
    Expression(Vec<Series>),
    /// No input series.
    Empty,
}

/// Runs `spec` over `series`.
pub fn compute(spec: &ComputationSpec, series: &[Series]) -> Result<ComputationResult> {
    if series.is_empty() {
        return Ok(ComputationResult::Empty);
    }
    match spec {
        ComputationSpec::Aggregated { statistic } => aggregated(statistic, series),
        ComputationSpec::Histogram(params) => histogram::histogram(params, series),
        ComputationSpec::CumulativeDistribution(params) => {
            histogram::cumulative_distribution(params, series)
        }
        ComputationSpec::WindRose(params) => windrose::wind_rose(params, series),
        ComputationSpec::AnnualCycle { statistic } => cycle::annual_cycle(statistic, series),
        ComputationSpec::DailyCycle { statistic } => cycle::daily_cycle(statistic, series),
        ComputationSpec::AnnualDailyCycle { statistic } => {
            cycle::annual_daily_cycle(statistic, series)
        }
        ComputationSpec::StandardSummary => Ok(summary::standard_summary(series)),
        ComputationSpec::GenericExpression { expression } => {
            expr::generic_expression(expression, series)
        }
    }
}

/// Reduces across series at every timestamp any of them has.
pub fn aggregated(statistic: &StatisticSpec, series: &[Series]) -> Result<ComputationResult> {
    let reducer = Reducer::from_spec(statistic)?;
    let mut index: Vec<Timestamp> = series
        .iter()
        .flat_map(|s| s.timestamps().iter().copied())
        .collect();
    index.sort_unstable();
    index.dedup();

    let mut rows = vec![vec![MISSING; series.len()]; index.len()];
    for (column, s) in series.iter().enumerate() {
        let mut row = 0;
        for (timestamp, value) in s.iter() {
            while index[row] < timestamp {
                row += 1;
            }
            rows[row][column] = value;
        }
    }

    let data = index
        .into_iter()
        .zip(rows.iter())
        .map(|(timestamp, row)| (timestamp, reducer.reduce(row)))
        .collect();
    Ok(ComputationResult::Aggregated(Aggregated {
        kind: "aggregated",
        data,
    }))
}
