//! The data request pipeline.
//!
//! ```text
//! tables ─▶ variables ─▶ extract ─▶ transforms ─▶ bounds ─▶ interval ─▶ round
//!        ─▶ gap fill ─▶ time of year ─▶ resample ─▶ compute
//! ```
//!
//! Every stage is pure over the database snapshot. Series that end up empty
//! after filtering are dropped rather than reported.

use crate::cache::TableCache;
use crate::catalog::filter::{select_tables, VariableSelection};
use crate::catalog::TableMeta;
use crate::compute::compute;
use crate::database::Database;
use crate::error::{AnemosError, Result};
use crate::query::answer::AnswerResult;
use crate::query::fill::{gap_fill, native_period};
use crate::query::interval::{adaptive, Interval};
use crate::query::reducer::Reducer;
use crate::query::request::{DataRequest, IntervalSpec, ResamplingSpec};
use crate::query::resample::Resampler;
use crate::query::time::{TimeBounds, TimeSpec};
use crate::series::Series;
use tracing::debug;

/// Runs a data request, returning the result and the resolved interval.
pub fn run(db: &Database, request: &DataRequest) -> Result<(AnswerResult, Option<Interval>)> {
    let catalog = db.catalog();
    let reducer = request
        .resampling
        .as_ref()
        .map(resampling_reducer)
        .transpose()?;

    let tables = select_tables(catalog, request.table.as_ref());
    let selection = VariableSelection::split(request.variable.as_ref(), catalog);
    let mut series = extract(db.cache(), &tables, &selection)?;
    if !selection.transforms.is_empty() {
        series.extend(db.transforms().evaluate(
            catalog,
            db.cache(),
            &tables,
            &selection,
            request.transform.as_ref(),
        )?);
    }

    let bounds = resolve_bounds(&series, request.time.as_ref())?;
    let interval = resolve_interval(&series, bounds, request.resampling.as_ref())?;
    let bounds = match (bounds, interval) {
        (Some(bounds), Some(interval)) => Some(interval.round_bounds(bounds)?),
        _ => bounds,
    };
    debug!(
        "Resolved {} series, bounds {:?}, interval {:?}",
        series.len(),
        bounds,
        interval
    );

    let time_of_year = request
        .time
        .as_ref()
        .map(TimeSpec::time_of_year)
        .unwrap_or_default();
    let resampler = match (request.resampling.as_ref(), reducer, interval) {
        (Some(resampling), Some(reducer), Some(interval)) => Some(Resampler {
            interval,
            reducer,
            minimum_fraction: resampling.minimum_fraction,
        }),
        _ => None,
    };

    let fill_interval = interval.unwrap_or(Interval::COMPLETE);
    let mut processed = Vec::with_capacity(series.len());
    for s in &series {
        let filled = gap_fill(s, bounds, fill_interval)?;
        let filtered = time_of_year.apply(&filled);
        let resampled = match &resampler {
            Some(resampler) => resampler.apply(&filtered, bounds.map(|b| b.lower))?,
            None => filtered,
        };
        if !resampled.is_empty() {
            processed.push(resampled.with_extent());
        }
    }

    let result = match &request.computation {
        Some(spec) => AnswerResult::Computed(compute(spec, &processed)?),
        None => AnswerResult::Series(processed),
    };
    Ok((result, interval))
}

fn resampling_reducer(resampling: &ResamplingSpec) -> Result<Reducer> {
    if let Some(fraction) = resampling.minimum_fraction {
        if !(0.0..=1.0).contains(&fraction) {
            return Err(AnemosError::InvalidRequest(format!(
                "minimumFraction {} outside 0-1",
                fraction
            )));
        }
    }
    Reducer::from_spec(&resampling.statistic)
}

/// Native series of the selected variables with at least one row.
fn extract(cache: &TableCache, tables: &[&TableMeta], selection: &VariableSelection) -> Result<Vec<Series>> {
    let mut series = Vec::new();
    for table in tables {
        if cache.frame(&table.code)?.is_empty() {
            continue;
        }
        for index in selection.native_indices(table) {
            series.push(cache.get_column(table, index)?);
        }
    }
    Ok(series)
}

/// Data extent, overridden per side by explicit request bounds.
fn resolve_bounds(series: &[Series], time: Option<&TimeSpec>) -> Result<Option<TimeBounds>> {
    let first = series.iter().filter_map(Series::first_timestamp).min();
    let last = series.iter().filter_map(Series::last_timestamp).max();
    let (Some(first), Some(last)) = (first, last) else {
        return Ok(None);
    };

    let mut bounds = TimeBounds::new(first, last);
    if let Some(time) = time {
        if let Some(lower) = &time.lower_bound {
            bounds.lower = lower.resolve()?;
        }
        if let Some(upper) = &time.upper_bound {
            bounds.upper = upper.resolve()?;
        }
    }
    bounds.validate()?;
    Ok(Some(bounds))
}

fn resolve_interval(
    series: &[Series],
    bounds: Option<TimeBounds>,
    resampling: Option<&ResamplingSpec>,
) -> Result<Option<Interval>> {
    let Some(bounds) = bounds else {
        return Ok(None);
    };
    let interval = match resampling.map(|r| &r.interval) {
        None => Interval::COMPLETE,
        Some(IntervalSpec::Fixed { units, code }) => {
            let interval = Interval::new(*units, *code);
            interval.validate()?;
            interval
        }
        Some(IntervalSpec::Adaptive { point_count }) => {
            let coarsest = series
                .iter()
                .filter_map(|s| native_period(s.timestamps()))
                .max();
            adaptive(bounds, *point_count, coarsest)?
        }
    };
    Ok(Some(interval))
}
