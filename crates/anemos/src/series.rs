//! Series: one variable's time-ordered values plus identifying metadata.

use crate::catalog::{TableMeta, VariableMeta};
use crate::error::{AnemosError, Result};
use crate::storage::frame::{is_missing, Timestamp};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::sync::Arc;

/// Identifies the table, variable, statistic and altitude of a series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesMeta {
    /// Source table code.
    pub table_code: String,
    /// Source table name.
    pub table_name: String,
    /// Variable type (or transform id for derived series).
    pub variable_type: String,
    /// Statistic kind.
    pub variable_statistic: String,
    /// Sensor altitude.
    pub variable_altitude: f64,
    /// First timestamp after filtering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_timestamp: Option<Timestamp>,
    /// Last timestamp after filtering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_timestamp: Option<Timestamp>,
}

impl SeriesMeta {
    /// Metadata for a native variable of `table`.
    pub fn for_variable(table: &TableMeta, variable: &VariableMeta) -> Self {
        Self {
            table_code: table.code.clone(),
            table_name: table.name.clone(),
            variable_type: variable.variable_type.clone(),
            variable_statistic: variable.statistic.clone(),
            variable_altitude: variable.altitude,
            first_timestamp: None,
            last_timestamp: None,
        }
    }
}

/// A strictly time-ordered mapping from timestamp to value.
///
/// Gaps are explicit missing markers. The arrays are shared, so cloning a
/// series or extracting a whole table column never copies data.
#[derive(Debug, Clone)]
pub struct Series {
    /// Identifying metadata.
    pub meta: SeriesMeta,
    timestamps: Arc<[Timestamp]>,
    values: Arc<[f64]>,
}

impl Series {
    /// Creates a series, checking lengths and timestamp order.
    pub fn new(meta: SeriesMeta, timestamps: Vec<Timestamp>, values: Vec<f64>) -> Result<Self> {
        if timestamps.len() != values.len() {
            return Err(AnemosError::Schema(format!(
                "series has {} timestamps and {} values",
                timestamps.len(),
                values.len()
            )));
        }
        if timestamps.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(AnemosError::Schema(
                "series timestamps must be strictly increasing".to_string(),
            ));
        }
        Ok(Self::from_shared(meta, timestamps.into(), values.into()))
    }

    pub(crate) fn from_shared(meta: SeriesMeta, timestamps: Arc<[Timestamp]>, values: Arc<[f64]>) -> Self {
        Self {
            meta,
            timestamps,
            values,
        }
    }

    /// Number of samples, including missing ones.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Returns true if the series has no samples.
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Sample timestamps.
    pub fn timestamps(&self) -> &[Timestamp] {
        &self.timestamps
    }

    /// Sample values.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Shared timestamp array.
    pub fn shared_timestamps(&self) -> &Arc<[Timestamp]> {
        &self.timestamps
    }

    /// Shared value array.
    pub fn shared_values(&self) -> &Arc<[f64]> {
        &self.values
    }

    /// `(timestamp, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (Timestamp, f64)> + '_ {
        self.timestamps.iter().copied().zip(self.values.iter().copied())
    }

    /// Non-missing values.
    pub fn valid_values(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().copied().filter(|v| !is_missing(*v))
    }

    /// First timestamp, if any.
    pub fn first_timestamp(&self) -> Option<Timestamp> {
        self.timestamps.first().copied()
    }

    /// Last timestamp, if any.
    pub fn last_timestamp(&self) -> Option<Timestamp> {
        self.timestamps.last().copied()
    }

    /// Same timestamps and metadata with new values.
    pub fn with_values(&self, values: Vec<f64>) -> Result<Self> {
        if values.len() != self.len() {
            return Err(AnemosError::Schema(format!(
                "expected {} values, got {}",
                self.len(),
                values.len()
            )));
        }
        Ok(Self::from_shared(
            self.meta.clone(),
            self.timestamps.clone(),
            values.into(),
        ))
    }

    /// Samples with `lower <= timestamp <= upper`.
    pub fn between(&self, lower: Timestamp, upper: Timestamp) -> Self {
        let start = self.timestamps.partition_point(|&ts| ts < lower);
        let end = self.timestamps.partition_point(|&ts| ts <= upper);
        if start == 0 && end == self.len() {
            return self.clone();
        }
        let end = end.max(start);
        Self::from_shared(
            self.meta.clone(),
            Arc::from(&self.timestamps[start..end]),
            Arc::from(&self.values[start..end]),
        )
    }

    /// Samples whose timestamp satisfies `keep`.
    pub fn filter<F>(&self, keep: F) -> Self
    where
        F: Fn(Timestamp) -> bool,
    {
        let indices: Vec<usize> = (0..self.len()).filter(|&i| keep(self.timestamps[i])).collect();
        if indices.len() == self.len() {
            return self.clone();
        }
        Self::from_shared(
            self.meta.clone(),
            indices.iter().map(|&i| self.timestamps[i]).collect(),
            indices.iter().map(|&i| self.values[i]).collect(),
        )
    }

    /// Records the first and last timestamps in the metadata.
    pub fn with_extent(mut self) -> Self {
        self.meta.first_timestamp = self.first_timestamp();
        self.meta.last_timestamp = self.last_timestamp();
        self
    }
}

impl PartialEq for Series {
    /// Missing markers compare equal to each other.
    fn eq(&self, other: &Self) -> bool {
        self.meta == other.meta
            && self.timestamps == other.timestamps
            && self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .zip(other.values.iter())
                .all(|(a, b)| a == b || (is_missing(*a) && is_missing(*b)))
    }
}

impl Serialize for Series {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let data: Vec<(Timestamp, f64)> = self.iter().collect();
        let mut state = serializer.serialize_struct("Series", 2)?;
        state.serialize_field("metaData", &self.meta)?;
        state.serialize_field("data", &data)?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::frame::MISSING;

    fn series(timestamps: &[i64], values: &[f64]) -> Series {
        Series::new(SeriesMeta::default(), timestamps.to_vec(), values.to_vec()).unwrap()
    }

    #[test]
    fn test_new_rejects_unsorted() {
        assert!(Series::new(SeriesMeta::default(), vec![60, 0], vec![1.0, 2.0]).is_err());
        assert!(Series::new(SeriesMeta::default(), vec![0], vec![1.0, 2.0]).is_err());
    }

    #[test]
    fn test_between_inclusive_and_shared() {
        let s = series(&[0, 60, 120, 180], &[1.0, 2.0, 3.0, 4.0]);
        let all = s.between(-10, 500);
        assert!(Arc::ptr_eq(s.shared_values(), all.shared_values()));
        let part = s.between(60, 120);
        assert_eq!(part.timestamps(), &[60, 120]);
        assert!(s.between(500, 900).is_empty());
    }

    #[test]
    fn test_serialize_missing_as_null() {
        let s = series(&[0, 60], &[1.5, MISSING]).with_extent();
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["data"], serde_json::json!([[0, 1.5], [60, null]]));
        assert_eq!(json["metaData"]["lastTimestamp"], serde_json::json!(60));
    }

    #[test]
    fn test_valid_values() {
        let s = series(&[0, 60, 120], &[1.0, MISSING, 3.0]);
        assert_eq!(s.valid_values().collect::<Vec<_>>(), vec![1.0, 3.0]);
    }
}
