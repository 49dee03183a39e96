//! Annual, daily and annual-daily cycles.

use crate::compute::{ComputationResult, SeriesResult};
use crate::error::Result;
use crate::query::reducer::{Reducer, StatisticSpec};
use crate::query::time::to_datetime;
use crate::series::Series;
use crate::storage::frame::MISSING;
use chrono::{Datelike, Timelike};
use std::collections::BTreeMap;

/// Groups valid values by a calendar key in `0..slots`; absent keys reduce to missing.
fn cycle<F>(series: &Series, reducer: Reducer, slots: u32, offset: u32, key: F) -> Result<Vec<(u32, f64)>>
where
    F: Fn(chrono::NaiveDateTime) -> u32,
{
    let mut groups: Vec<Vec<f64>> = vec![Vec::new(); slots as usize];
    for (timestamp, value) in series.iter().filter(|(_, v)| v.is_finite()) {
        let slot = key(to_datetime(timestamp)?) - offset;
        groups[slot as usize].push(value);
    }
    Ok(groups
        .iter()
        .enumerate()
        .map(|(slot, values)| {
            let value = if values.is_empty() {
                MISSING
            } else {
                reducer.reduce(values)
            };
            (slot as u32 + offset, value)
        })
        .collect())
}

/// Twelve `(month, value)` entries per series.
pub fn annual_cycle(statistic: &StatisticSpec, series: &[Series]) -> Result<ComputationResult> {
    let reducer = Reducer::from_spec(statistic)?;
    let results = series
        .iter()
        .map(|s| Ok(SeriesResult::new(s.meta.clone(), cycle(s, reducer, 12, 1, |dt| dt.month())?)))
        .collect::<Result<Vec<_>>>()?;
    Ok(ComputationResult::Cycle(results))
}

/// Twenty-four `(hour, value)` entries per series.
pub fn daily_cycle(statistic: &StatisticSpec, series: &[Series]) -> Result<ComputationResult> {
    let reducer = Reducer::from_spec(statistic)?;
    let results = series
        .iter()
        .map(|s| Ok(SeriesResult::new(s.meta.clone(), cycle(s, reducer, 24, 0, |dt| dt.hour())?)))
        .collect::<Result<Vec<_>>>()?;
    Ok(ComputationResult::Cycle(results))
}

/// `((month, hour), value)` entries for the pairs that have data, in key order.
pub fn annual_daily_cycle(statistic: &StatisticSpec, series: &[Series]) -> Result<ComputationResult> {
    let reducer = Reducer::from_spec(statistic)?;
    let results = series
        .iter()
        .map(|s| {
            let mut groups: BTreeMap<(u32, u32), Vec<f64>> = BTreeMap::new();
            for (timestamp, value) in s.iter().filter(|(_, v)| v.is_finite()) {
                let datetime = to_datetime(timestamp)?;
                groups
                    .entry((datetime.month(), datetime.hour()))
                    .or_default()
                    .push(value);
            }
            let data = groups
                .into_iter()
                .map(|(key, values)| (key, reducer.reduce(&values)))
                .collect();
            Ok(SeriesResult::new(s.meta.clone(), data))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(ComputationResult::AnnualDailyCycle(results))
}
