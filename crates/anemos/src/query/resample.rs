//! Bucketed resampling of a series.

use crate::error::{AnemosError, Result};
use crate::query::fill::MAX_GRID_POINTS;
use crate::query::interval::Interval;
use crate::query::reducer::Reducer;
use crate::query::time::TimeBounds;
use crate::series::Series;
use crate::storage::frame::{Timestamp, MISSING};

/// Resampling parameters resolved from a request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resampler {
    /// Bucket interval.
    pub interval: Interval,
    /// Bucket statistic.
    pub reducer: Reducer,
    /// Minimum share of valid samples per bucket, in 0..=1.
    pub minimum_fraction: Option<f64>,
}

impl Resampler {
    /// Groups `series` into interval buckets and reduces each bucket.
    ///
    /// Buckets start at `origin` (aligned to the interval) or at the aligned
    /// first sample, and run through the bucket holding the last sample.
    pub fn apply(&self, series: &Series, origin: Option<Timestamp>) -> Result<Series> {
        let (Some(first), Some(last)) = (series.first_timestamp(), series.last_timestamp()) else {
            return Ok(series.clone());
        };
        if self.interval.is_complete() {
            return Ok(series.clone());
        }

        let timestamps = series.timestamps();
        let values = series.values();
        let mut bucket = self
            .interval
            .origin(origin.map_or(first, |origin| origin.min(first)))?;
        let mut labels = Vec::new();
        let mut reduced = Vec::new();
        let mut start = timestamps.partition_point(|&ts| ts < bucket);
        let span = TimeBounds::new(bucket, last).duration()?;
        let (from, interval) = (bucket, self.interval);
        let too_many = move || {
            AnemosError::Range(format!(
                "resampling {} to {} by {:?} exceeds {} buckets",
                from, last, interval, MAX_GRID_POINTS
            ))
        };
        if span / self.interval.nominal_seconds().max(1) >= MAX_GRID_POINTS as i64 {
            return Err(too_many());
        }
        while bucket <= last {
            if labels.len() == MAX_GRID_POINTS {
                return Err(too_many());
            }
            let next = self.interval.advance(bucket, 1)?;
            if next <= bucket {
                return Err(AnemosError::Range(format!(
                    "interval {:?} does not advance from {}",
                    self.interval, bucket
                )));
            }
            let end = start + timestamps[start..].partition_point(|&ts| ts < next);
            labels.push(bucket);
            reduced.push(self.reduce_bucket(&values[start..end]));
            start = end;
            bucket = next;
        }
        Ok(Series::from_shared(series.meta.clone(), labels.into(), reduced.into()))
    }

    fn reduce_bucket(&self, values: &[f64]) -> f64 {
        if let Some(minimum) = self.minimum_fraction {
            if !self.reducer.is_fraction() && Reducer::Fraction.reduce(values) < minimum {
                return MISSING;
            }
        }
        self.reducer.reduce(values)
    }
}
