//! Calendar conversions, time bounds and the time-of-year filter.

use crate::error::{AnemosError, Result};
use crate::series::Series;
use crate::storage::frame::Timestamp;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Converts epoch seconds to a UTC calendar time.
pub fn to_datetime(timestamp: Timestamp) -> Result<NaiveDateTime> {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| AnemosError::Range(format!("timestamp {} out of range", timestamp)))
}

/// Converts a UTC calendar time to epoch seconds.
pub fn from_datetime(datetime: NaiveDateTime) -> Timestamp {
    datetime.and_utc().timestamp()
}

/// Parses a bound written as RFC 3339 or a naive UTC date/time.
pub fn parse_time(text: &str) -> Result<Timestamp> {
    let text = text.trim();
    if let Ok(datetime) = DateTime::parse_from_rfc3339(text) {
        return Ok(datetime.timestamp());
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(from_datetime(datetime));
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(from_datetime)
        .ok_or_else(|| AnemosError::InvalidRequest(format!("unrecognized time `{}`", text)))
}

/// An explicit time bound in a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeBound {
    /// Epoch seconds.
    Epoch(Timestamp),
    /// A date or date-time string.
    Text(String),
}

impl TimeBound {
    /// Resolves the bound to epoch seconds.
    pub fn resolve(&self) -> Result<Timestamp> {
        match self {
            Self::Epoch(timestamp) => Ok(*timestamp),
            Self::Text(text) => parse_time(text),
        }
    }
}

/// The `time` section of a data request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSpec {
    /// Overrides the lower bound.
    #[serde(default)]
    pub lower_bound: Option<TimeBound>,
    /// Overrides the upper bound.
    #[serde(default)]
    pub upper_bound: Option<TimeBound>,
    /// Allowed years.
    #[serde(default)]
    pub years: Option<Vec<i32>>,
    /// Allowed months (1-12).
    #[serde(default)]
    pub months: Option<Vec<u32>>,
    /// Allowed hours (0-23).
    #[serde(default)]
    pub hours: Option<Vec<u32>>,
}

impl TimeSpec {
    /// The allow-list part of the spec.
    pub fn time_of_year(&self) -> TimeOfYear {
        TimeOfYear {
            years: self.years.clone().unwrap_or_default(),
            months: self.months.clone().unwrap_or_default(),
            hours: self.hours.clone().unwrap_or_default(),
        }
    }
}

/// Inclusive time bounds of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBounds {
    /// Lower bound.
    pub lower: Timestamp,
    /// Upper bound.
    pub upper: Timestamp,
}

impl TimeBounds {
    /// Creates bounds.
    pub fn new(lower: Timestamp, upper: Timestamp) -> Self {
        Self { lower, upper }
    }

    /// Bound span in seconds.
    pub fn duration(&self) -> Result<i64> {
        self.upper.checked_sub(self.lower).ok_or_else(|| {
            AnemosError::Range(format!(
                "span from {} to {} overflows",
                self.lower, self.upper
            ))
        })
    }

    /// Rejects bounds outside the calendar range.
    pub fn validate(&self) -> Result<()> {
        to_datetime(self.lower)?;
        to_datetime(self.upper)?;
        if self.lower > self.upper {
            return Err(AnemosError::Range(format!(
                "lower bound {} is after upper bound {}",
                self.lower, self.upper
            )));
        }
        Ok(())
    }
}

/// Year, month and hour allow-lists; an empty list does not constrain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeOfYear {
    /// Allowed years.
    pub years: Vec<i32>,
    /// Allowed months.
    pub months: Vec<u32>,
    /// Allowed hours.
    pub hours: Vec<u32>,
}

impl TimeOfYear {
    /// Returns true if no list constrains anything.
    pub fn is_unconstrained(&self) -> bool {
        self.years.is_empty() && self.months.is_empty() && self.hours.is_empty()
    }

    /// Tests one timestamp against every list.
    pub fn matches(&self, timestamp: Timestamp) -> bool {
        let Ok(datetime) = to_datetime(timestamp) else {
            return false;
        };
        (self.years.is_empty() || self.years.contains(&datetime.year()))
            && (self.months.is_empty() || self.months.contains(&datetime.month()))
            && (self.hours.is_empty() || self.hours.contains(&datetime.hour()))
    }

    /// Keeps the samples of `series` that match.
    pub fn apply(&self, series: &Series) -> Series {
        if self.is_unconstrained() {
            return series.clone();
        }
        series.filter(|timestamp| self.matches(timestamp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::SeriesMeta;

    #[test]
    fn test_parse_formats() {
        assert_eq!(parse_time("1970-01-02").unwrap(), 86_400);
        assert_eq!(parse_time("1970-01-01 01:00:00").unwrap(), 3_600);
        assert_eq!(parse_time("1970-01-01T00:01:00").unwrap(), 60);
        assert_eq!(parse_time("1970-01-01T01:00:00+01:00").unwrap(), 0);
        assert!(matches!(
            parse_time("yesterday"),
            Err(AnemosError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_time_bound_deserialize() {
        let spec: TimeSpec =
            serde_json::from_str(r#"{"lowerBound": 60, "upperBound": "1970-01-02", "hours": []}"#)
                .unwrap();
        assert_eq!(spec.lower_bound.unwrap().resolve().unwrap(), 60);
        assert_eq!(spec.upper_bound.unwrap().resolve().unwrap(), 86_400);
        assert!(spec.years.is_none());
    }

    #[test]
    fn test_bounds_validate() {
        assert!(TimeBounds::new(0, 86_400).validate().is_ok());
        assert_eq!(TimeBounds::new(0, 86_400).duration().unwrap(), 86_400);
        for bounds in [
            TimeBounds::new(-i64::MAX, 0),
            TimeBounds::new(0, i64::MAX),
            TimeBounds::new(10, 0),
        ] {
            assert!(matches!(bounds.validate(), Err(AnemosError::Range(_))));
        }
        assert!(matches!(
            TimeBounds::new(i64::MIN, i64::MAX).duration(),
            Err(AnemosError::Range(_))
        ));
    }

    #[test]
    fn test_time_of_year_filter() {
        // 2020-01-01 00:00, 2020-01-01 06:00, 2020-07-01 00:00
        let january = 1_577_836_800;
        let july = 1_593_561_600;
        let series = Series::new(
            SeriesMeta::default(),
            vec![january, january + 6 * 3600, july],
            vec![1.0, 2.0, 3.0],
        )
        .unwrap();

        let filter = TimeOfYear {
            months: vec![1],
            hours: vec![6],
            ..Default::default()
        };
        assert_eq!(filter.apply(&series).timestamps(), &[january + 6 * 3600]);

        let empty_lists = TimeOfYear::default();
        assert_eq!(empty_lists.apply(&series).len(), 3);
    }
}
