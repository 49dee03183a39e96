//! Column-oriented row batches.
//!
//! A [`TableFrame`] is the unit exchanged between the column store, the table
//! cache and callers. Columns are reference counted so that a frame covering a
//! whole table can be handed out without copying its backing arrays.

use crate::error::{AnemosError, Result};
use std::sync::Arc;

/// Seconds since the Unix epoch (UTC).
pub type Timestamp = i64;

/// The missing-value marker.
pub const MISSING: f64 = f64::NAN;

/// Returns true if `value` is the missing-value marker.
#[inline]
pub fn is_missing(value: f64) -> bool {
    value.is_nan()
}

/// One row of a table: a timestamp followed by one value per variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Row timestamp.
    pub timestamp: Timestamp,
    /// Values in table variable order.
    pub values: Vec<f64>,
}

impl Row {
    /// Creates a new row.
    pub fn new(timestamp: Timestamp, values: Vec<f64>) -> Self {
        Self { timestamp, values }
    }
}

/// A batch of rows stored column by column.
#[derive(Debug, Clone)]
pub struct TableFrame {
    timestamps: Arc<[Timestamp]>,
    columns: Vec<Arc<[f64]>>,
}

impl TableFrame {
    /// Creates an empty frame with `column_count` value columns.
    pub fn empty(column_count: usize) -> Self {
        Self {
            timestamps: Arc::from(Vec::new()),
            columns: (0..column_count).map(|_| Arc::from(Vec::new())).collect(),
        }
    }

    /// Builds a frame from a timestamp column and value columns of equal length.
    pub fn from_columns(timestamps: Vec<Timestamp>, columns: Vec<Vec<f64>>) -> Result<Self> {
        if let Some((index, column)) = columns
            .iter()
            .enumerate()
            .find(|(_, column)| column.len() != timestamps.len())
        {
            return Err(AnemosError::Schema(format!(
                "column {} has {} values, expected {}",
                index,
                column.len(),
                timestamps.len()
            )));
        }
        Ok(Self {
            timestamps: timestamps.into(),
            columns: columns.into_iter().map(Arc::from).collect(),
        })
    }

    /// Builds a frame from rows, checking every row against `column_count`.
    pub fn from_rows(rows: &[Row], column_count: usize) -> Result<Self> {
        let mut timestamps = Vec::with_capacity(rows.len());
        let mut columns = vec![Vec::with_capacity(rows.len()); column_count];
        for (index, row) in rows.iter().enumerate() {
            if row.values.len() != column_count {
                return Err(AnemosError::Schema(format!(
                    "row {} has {} values, table has {} variables",
                    index,
                    row.values.len(),
                    column_count
                )));
            }
            timestamps.push(row.timestamp);
            for (column, value) in columns.iter_mut().zip(&row.values) {
                column.push(*value);
            }
        }
        Self::from_columns(timestamps, columns)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Returns true if the frame holds no rows.
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Number of value columns.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// The timestamp column.
    pub fn timestamps(&self) -> &Arc<[Timestamp]> {
        &self.timestamps
    }

    /// The value column at `index`.
    pub fn column(&self, index: usize) -> Option<&Arc<[f64]>> {
        self.columns.get(index)
    }

    /// All value columns in variable order.
    pub fn columns(&self) -> &[Arc<[f64]>] {
        &self.columns
    }

    /// First timestamp, if any.
    pub fn first_timestamp(&self) -> Option<Timestamp> {
        self.timestamps.first().copied()
    }

    /// Last timestamp, if any.
    pub fn last_timestamp(&self) -> Option<Timestamp> {
        self.timestamps.last().copied()
    }

    /// Returns the row at `index`.
    pub fn row(&self, index: usize) -> Option<Row> {
        let timestamp = *self.timestamps.get(index)?;
        let values = self.columns.iter().map(|column| column[index]).collect();
        Some(Row { timestamp, values })
    }

    /// Converts the frame back into rows.
    pub fn to_rows(&self) -> Vec<Row> {
        (0..self.len()).filter_map(|index| self.row(index)).collect()
    }

    /// Returns rows `first..=last`.
    ///
    /// Requesting the whole frame shares the backing arrays instead of copying.
    pub fn slice(&self, first: usize, last: usize) -> Result<Self> {
        if first > last || last >= self.len() {
            return Err(AnemosError::Range(format!(
                "row range {}..={} outside table of {} rows",
                first,
                last,
                self.len()
            )));
        }
        if first == 0 && last + 1 == self.len() {
            return Ok(self.clone());
        }
        Ok(Self {
            timestamps: Arc::from(&self.timestamps[first..=last]),
            columns: self
                .columns
                .iter()
                .map(|column| Arc::from(&column[first..=last]))
                .collect(),
        })
    }

    /// Returns all rows from `first` on; empty if `first` is past the end.
    pub fn tail(&self, first: usize) -> Self {
        if first >= self.len() {
            return Self::empty(self.column_count());
        }
        if first == 0 {
            return self.clone();
        }
        Self {
            timestamps: Arc::from(&self.timestamps[first..]),
            columns: self
                .columns
                .iter()
                .map(|column| Arc::from(&column[first..]))
                .collect(),
        }
    }

    /// Returns the frame with rows `first..=last` removed.
    pub fn without_range(&self, first: usize, last: usize) -> Result<Self> {
        if first > last || last >= self.len() {
            return Err(AnemosError::Range(format!(
                "row range {}..={} outside table of {} rows",
                first,
                last,
                self.len()
            )));
        }
        let keep: Vec<usize> = (0..first).chain(last + 1..self.len()).collect();
        Ok(self.gather(&keep))
    }

    /// Index of the first row whose timestamp is `>= timestamp`.
    pub fn position_at_or_after(&self, timestamp: Timestamp) -> usize {
        self.timestamps.partition_point(|&ts| ts < timestamp)
    }

    /// Sorts rows by timestamp, keeping the first occurrence of duplicates.
    pub fn sorted_unique(&self) -> Self {
        if self.timestamps.windows(2).all(|pair| pair[0] < pair[1]) {
            return self.clone();
        }
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by_key(|&index| self.timestamps[index]);
        order.dedup_by_key(|index| self.timestamps[*index]);
        self.gather(&order)
    }

    /// Merges `update` into this frame.
    ///
    /// Both frames must be sorted with unique timestamps. For a timestamp
    /// present in both, a value from `update` replaces the existing one only
    /// if it is not missing; new timestamps are inserted in order.
    pub fn merge(&self, update: &TableFrame) -> Result<Self> {
        if update.column_count() != self.column_count() {
            return Err(AnemosError::Schema(format!(
                "update has {} columns, table has {}",
                update.column_count(),
                self.column_count()
            )));
        }
        let capacity = self.len() + update.len();
        let mut timestamps = Vec::with_capacity(capacity);
        let mut columns = vec![Vec::with_capacity(capacity); self.column_count()];

        let (mut i, mut j) = (0, 0);
        while i < self.len() || j < update.len() {
            let take_old = j >= update.len()
                || (i < self.len() && self.timestamps[i] < update.timestamps[j]);
            let take_new = i >= self.len()
                || (j < update.len() && update.timestamps[j] < self.timestamps[i]);
            if take_old {
                timestamps.push(self.timestamps[i]);
                for (column, source) in columns.iter_mut().zip(&self.columns) {
                    column.push(source[i]);
                }
                i += 1;
            } else if take_new {
                timestamps.push(update.timestamps[j]);
                for (column, source) in columns.iter_mut().zip(&update.columns) {
                    column.push(source[j]);
                }
                j += 1;
            } else {
                timestamps.push(self.timestamps[i]);
                for ((column, old), new) in columns.iter_mut().zip(&self.columns).zip(&update.columns) {
                    let value = if is_missing(new[j]) { old[i] } else { new[j] };
                    column.push(value);
                }
                i += 1;
                j += 1;
            }
        }
        Self::from_columns(timestamps, columns)
    }

    fn gather(&self, indices: &[usize]) -> Self {
        Self {
            timestamps: indices.iter().map(|&i| self.timestamps[i]).collect(),
            columns: self
                .columns
                .iter()
                .map(|column| indices.iter().map(|&i| column[i]).collect())
                .collect(),
        }
    }
}

impl PartialEq for TableFrame {
    /// Missing markers compare equal to each other.
    fn eq(&self, other: &Self) -> bool {
        self.timestamps == other.timestamps
            && self.columns.len() == other.columns.len()
            && self.columns.iter().zip(&other.columns).all(|(a, b)| {
                a.len() == b.len()
                    && a.iter()
                        .zip(b.iter())
                        .all(|(x, y)| x == y || (is_missing(*x) && is_missing(*y)))
            })
    }
}
