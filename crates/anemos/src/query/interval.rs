//! Resampling intervals: codes, adaptive selection and calendar-aware rounding.

use crate::error::{AnemosError, Result};
use crate::query::time::{from_datetime, to_datetime, TimeBounds};
use crate::storage::frame::Timestamp;
use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};

const MINUTE: i64 = 60;
const HOUR: i64 = 3_600;
const DAY: i64 = 86_400;
const WEEK: i64 = 7 * DAY;
/// Nominal month used for interval comparisons: 4.5 weeks.
const MONTH: i64 = WEEK * 9 / 2;
const YEAR: i64 = 12 * MONTH;

/// Interval period code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntervalCode {
    /// Minutes.
    #[serde(rename = "Min")]
    Minute,
    /// Hours.
    #[serde(rename = "H")]
    Hour,
    /// Days.
    #[serde(rename = "D")]
    Day,
    /// Weeks starting on Monday.
    #[serde(rename = "W")]
    Week,
    /// Calendar months, labelled by their first day.
    #[serde(rename = "MS")]
    MonthStart,
    /// Calendar years starting on 1 January.
    #[serde(rename = "A")]
    Year,
    /// No resampling.
    #[serde(rename = "C")]
    Complete,
}

impl IntervalCode {
    /// Nominal length of one period in seconds (0 for `Complete`).
    pub fn nominal_seconds(self) -> i64 {
        match self {
            Self::Minute => MINUTE,
            Self::Hour => HOUR,
            Self::Day => DAY,
            Self::Week => WEEK,
            Self::MonthStart => MONTH,
            Self::Year => YEAR,
            Self::Complete => 0,
        }
    }

    fn fixed_seconds(self) -> Option<i64> {
        match self {
            Self::Minute => Some(MINUTE),
            Self::Hour => Some(HOUR),
            Self::Day => Some(DAY),
            Self::Week => Some(WEEK),
            Self::MonthStart | Self::Year | Self::Complete => None,
        }
    }

    fn calendar_months(self) -> Option<u32> {
        match self {
            Self::MonthStart => Some(1),
            Self::Year => Some(12),
            _ => None,
        }
    }
}

/// A bucketing period: `units` periods of `code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interval {
    /// Number of periods.
    pub units: u32,
    /// Period code.
    pub code: IntervalCode,
}

/// Standard intervals offered by adaptive resolution, finest first.
pub const STANDARD_INTERVALS: [Interval; 22] = [
    Interval::new(10, IntervalCode::Minute),
    Interval::new(20, IntervalCode::Minute),
    Interval::new(30, IntervalCode::Minute),
    Interval::new(1, IntervalCode::Hour),
    Interval::new(2, IntervalCode::Hour),
    Interval::new(3, IntervalCode::Hour),
    Interval::new(4, IntervalCode::Hour),
    Interval::new(6, IntervalCode::Hour),
    Interval::new(12, IntervalCode::Hour),
    Interval::new(1, IntervalCode::Day),
    Interval::new(2, IntervalCode::Day),
    Interval::new(3, IntervalCode::Day),
    Interval::new(4, IntervalCode::Day),
    Interval::new(5, IntervalCode::Day),
    Interval::new(1, IntervalCode::Week),
    Interval::new(2, IntervalCode::Week),
    Interval::new(1, IntervalCode::MonthStart),
    Interval::new(2, IntervalCode::MonthStart),
    Interval::new(3, IntervalCode::MonthStart),
    Interval::new(4, IntervalCode::MonthStart),
    Interval::new(6, IntervalCode::MonthStart),
    Interval::new(1, IntervalCode::Year),
];

/// Adaptive fallback when no standard interval is coarse enough.
pub const ADAPTIVE_FALLBACK: Interval = Interval::new(2, IntervalCode::Year);

impl Interval {
    /// No resampling.
    pub const COMPLETE: Interval = Interval::new(1, IntervalCode::Complete);

    /// Creates an interval.
    pub const fn new(units: u32, code: IntervalCode) -> Self {
        Self { units, code }
    }

    /// Returns true for the `Complete` code.
    pub fn is_complete(&self) -> bool {
        self.code == IntervalCode::Complete
    }

    /// Rejects zero units.
    pub fn validate(&self) -> Result<()> {
        if self.units == 0 {
            return Err(AnemosError::InvalidRequest(
                "interval units must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Nominal length in seconds.
    pub fn nominal_seconds(&self) -> i64 {
        i64::from(self.units) * self.code.nominal_seconds()
    }

    /// Aligns `timestamp` down to the start of its natural period.
    ///
    /// Minutes align to the hour so that sub-hour buckets land on round times.
    pub fn origin(&self, timestamp: Timestamp) -> Result<Timestamp> {
        match self.code {
            IntervalCode::Minute | IntervalCode::Hour => floor_to(timestamp, HOUR, 0),
            IntervalCode::Day => floor_to(timestamp, DAY, 0),
            // 1970-01-01 was a Thursday.
            IntervalCode::Week => floor_to(timestamp, 7 * DAY, 3 * DAY),
            IntervalCode::MonthStart => first_of_month(timestamp, false),
            IntervalCode::Year => first_of_month(timestamp, true),
            IntervalCode::Complete => Ok(timestamp),
        }
    }

    /// Moves `timestamp` forward by `count` intervals.
    pub fn advance(&self, timestamp: Timestamp, count: u32) -> Result<Timestamp> {
        let overflow = || {
            AnemosError::Range(format!(
                "{} + {} x {:?} overflows",
                timestamp, count, self
            ))
        };
        if let Some(seconds) = self.code.fixed_seconds() {
            return i64::from(count)
                .checked_mul(i64::from(self.units))
                .and_then(|n| n.checked_mul(seconds))
                .and_then(|span| timestamp.checked_add(span))
                .ok_or_else(overflow);
        }
        match self.code.calendar_months() {
            Some(months) => {
                let total = count
                    .checked_mul(self.units)
                    .and_then(|n| n.checked_mul(months))
                    .ok_or_else(overflow)?;
                add_months(timestamp, total)
            }
            None => Ok(timestamp),
        }
    }

    /// Widens `bounds` to whole intervals from the natural origin.
    pub fn round_bounds(&self, bounds: TimeBounds) -> Result<TimeBounds> {
        if self.is_complete() {
            return Ok(bounds);
        }
        let lower = self.origin(bounds.lower)?;
        if bounds.upper <= lower {
            return Ok(TimeBounds::new(lower, lower));
        }

        let count = match self.code.fixed_seconds() {
            Some(seconds) => {
                let step = i64::from(self.units) * seconds;
                let span = TimeBounds::new(lower, bounds.upper).duration()?;
                let steps = span / step + i64::from(span % step != 0);
                u32::try_from(steps).map_err(|_| {
                    AnemosError::Range(format!("{} intervals exceed the supported span", steps))
                })?
            }
            None => {
                let months_per_step = self
                    .units
                    .checked_mul(self.code.calendar_months().unwrap_or(1))
                    .ok_or_else(|| {
                        AnemosError::Range(format!("{:?} spans too many months", self))
                    })?;
                let months = months_covering(lower, bounds.upper)?;
                months.div_ceil(months_per_step)
            }
        };
        Ok(TimeBounds::new(lower, self.advance(lower, count)?))
    }
}

/// Aligns down to a multiple of `unit` counted from `offset`.
fn floor_to(timestamp: Timestamp, unit: i64, offset: i64) -> Result<Timestamp> {
    let shifted = timestamp
        .checked_add(offset)
        .ok_or_else(|| AnemosError::Range(format!("timestamp {} out of range", timestamp)))?;
    shifted
        .div_euclid(unit)
        .checked_mul(unit)
        .and_then(|aligned| aligned.checked_sub(offset))
        .ok_or_else(|| AnemosError::Range(format!("timestamp {} out of range", timestamp)))
}

fn first_of_month(timestamp: Timestamp, january: bool) -> Result<Timestamp> {
    let date = to_datetime(timestamp)?.date();
    let month = if january { 1 } else { date.month() };
    NaiveDate::from_ymd_opt(date.year(), month, 1)
        .and_then(|first| first.and_hms_opt(0, 0, 0))
        .map(from_datetime)
        .ok_or_else(|| AnemosError::Range(format!("no month start for {}", timestamp)))
}

fn add_months(timestamp: Timestamp, months: u32) -> Result<Timestamp> {
    to_datetime(timestamp)?
        .checked_add_months(Months::new(months))
        .map(from_datetime)
        .ok_or_else(|| AnemosError::Range(format!("{} + {} months overflows", timestamp, months)))
}

/// Whole calendar months from `lower` (a month start) to `upper`, plus one for a remainder.
fn months_covering(lower: Timestamp, upper: Timestamp) -> Result<u32> {
    let start = to_datetime(lower)?;
    let end = to_datetime(upper)?;
    let span = (end.year() - start.year()) * 12 + end.month() as i32 - start.month() as i32;
    let mut months = u32::try_from(span.max(0))
        .map_err(|_| AnemosError::Range("negative month span".to_string()))?;
    if add_months(lower, months)? < upper {
        months += 1;
    }
    Ok(months)
}

/// Picks the finest standard interval not shorter than the target bucket.
///
/// The target is the bound span divided by the requested point count,
/// raised to the coarsest native sampling period among the series.
pub fn adaptive(bounds: TimeBounds, point_count: usize, coarsest_period: Option<i64>) -> Result<Interval> {
    if point_count == 0 {
        return Err(AnemosError::InvalidRequest(
            "adaptive interval needs a positive point count".to_string(),
        ));
    }
    let points = i64::try_from(point_count).unwrap_or(i64::MAX);
    let mut target = bounds.duration()?.max(0) / points;
    if let Some(period) = coarsest_period {
        target = target.max(period);
    }
    Ok(STANDARD_INTERVALS
        .iter()
        .copied()
        .find(|interval| target <= interval.nominal_seconds())
        .unwrap_or(ADAPTIVE_FALLBACK))
}
