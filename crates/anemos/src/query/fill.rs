//! Native sampling period detection and gap filling.

use crate::error::{AnemosError, Result};
use crate::query::interval::Interval;
use crate::query::time::TimeBounds;
use crate::series::Series;
use crate::storage::frame::{Timestamp, MISSING};

/// Median of consecutive timestamp deltas, truncated to whole seconds.
///
/// Undefined for fewer than two samples.
pub fn native_period(timestamps: &[Timestamp]) -> Option<i64> {
    if timestamps.len() < 2 {
        return None;
    }
    let mut deltas: Vec<i64> = timestamps
        .windows(2)
        .map(|w| w[1].saturating_sub(w[0]))
        .collect();
    deltas.sort_unstable();
    let mid = deltas.len() / 2;
    let median = if deltas.len() % 2 == 1 {
        deltas[mid]
    } else {
        deltas[mid - 1] + (deltas[mid] - deltas[mid - 1]) / 2
    };
    (median > 0).then_some(median)
}

/// Upper limit on the points a regular grid may hold.
pub const MAX_GRID_POINTS: usize = 10_000_000;

/// Reindexes `series` onto a uniform grid at its native period.
///
/// The series is first restricted to `bounds`. Unless the interval is
/// `Complete`, the grid is extended outward by whole periods toward the
/// bounds; a grid point landing exactly on the upper bound is dropped unless
/// it is the last sample. Absent grid points become missing markers and
/// samples off the grid are dropped.
pub fn gap_fill(series: &Series, bounds: Option<TimeBounds>, interval: Interval) -> Result<Series> {
    let Some(bounds) = bounds else {
        return Ok(series.clone());
    };
    let window = series.between(bounds.lower, bounds.upper);
    let (Some(period), Some(first), Some(last)) = (
        native_period(series.timestamps()),
        window.first_timestamp(),
        window.last_timestamp(),
    ) else {
        return Ok(window);
    };

    let mut start = first;
    let mut end = last;
    if !interval.is_complete() {
        let before = TimeBounds::new(bounds.lower, first).duration()?;
        let after = TimeBounds::new(last, bounds.upper).duration()?;
        start -= before / period * period;
        end += after / period * period;
        if end == bounds.upper && end > last {
            end -= period;
        }
    }

    let steps = usize::try_from(TimeBounds::new(start, end).duration()? / period)
        .ok()
        .and_then(|n| n.checked_add(1))
        .filter(|&n| n <= MAX_GRID_POINTS)
        .ok_or_else(|| {
            AnemosError::Range(format!(
                "filling {} to {} every {}s exceeds {} points",
                start, end, period, MAX_GRID_POINTS
            ))
        })?;
    let timestamps = window.timestamps();
    let uniform = timestamps.len() == steps
        && timestamps
            .iter()
            .enumerate()
            .all(|(i, &ts)| ts == start + i as i64 * period);
    if uniform {
        return Ok(window);
    }

    let values = window.values();
    let mut grid = Vec::with_capacity(steps);
    let mut filled = Vec::with_capacity(steps);
    let mut cursor = 0;
    for step in 0..steps {
        let ts = start + step as i64 * period;
        while cursor < timestamps.len() && timestamps[cursor] < ts {
            cursor += 1;
        }
        let value = match timestamps.get(cursor) {
            Some(&found) if found == ts => values[cursor],
            _ => MISSING,
        };
        grid.push(ts);
        filled.push(value);
    }
    Ok(Series::from_shared(window.meta.clone(), grid.into(), filled.into()))
}
