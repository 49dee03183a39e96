//! Fixed-bin histograms and cumulative distributions.

use crate::compute::{ComputationResult, SeriesResult};
use crate::error::{AnemosError, Result};
use crate::series::Series;
use serde::{Deserialize, Serialize};

/// Default bin count.
pub const DEFAULT_BINS: usize = 10;

fn default_bins() -> usize {
    DEFAULT_BINS
}

/// Parameters of `histogram` and `cumulativeDistribution`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramParams {
    /// Number of equal-width bins.
    #[serde(default = "default_bins")]
    pub bins: usize,
    /// Lower edge; computed across all series when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Upper edge; computed across all series when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Report densities instead of counts.
    #[serde(default)]
    pub density: bool,
}

impl Default for HistogramParams {
    fn default() -> Self {
        Self {
            bins: DEFAULT_BINS,
            min: None,
            max: None,
            density: false,
        }
    }
}

/// One histogram bin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramBin {
    /// Lower and upper edge.
    pub edges: [f64; 2],
    /// Count, density or cumulative count.
    pub value: f64,
}

/// Equal-width bins over `[lower, upper]`, the last bin closed on the right.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Binning {
    pub lower: f64,
    pub upper: f64,
    pub bins: usize,
}

impl Binning {
    pub fn new(lower: f64, upper: f64, bins: usize) -> Result<Self> {
        if bins == 0 {
            return Err(AnemosError::Range("bin count must be positive".to_string()));
        }
        if !(lower < upper) {
            return Err(AnemosError::Range(format!(
                "histogram range [{}, {}] is empty",
                lower, upper
            )));
        }
        Ok(Self { lower, upper, bins })
    }

    /// Resolves a binning from explicit bounds, falling back to the data range.
    ///
    /// Returns `None` when the data range has no spread.
    pub fn resolve(
        bins: usize,
        min: Option<f64>,
        max: Option<f64>,
        values: impl Iterator<Item = f64>,
    ) -> Result<Option<Self>> {
        if let (Some(lower), Some(upper)) = (min, max) {
            return Self::new(lower, upper, bins).map(Some);
        }
        if bins == 0 {
            return Err(AnemosError::Range("bin count must be positive".to_string()));
        }
        let (low, high) = values
            .filter(|v| v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });
        let lower = min.unwrap_or(low);
        let upper = max.unwrap_or(high);
        if lower.is_finite() && upper.is_finite() && lower < upper {
            Ok(Some(Self { lower, upper, bins }))
        } else {
            Ok(None)
        }
    }

    pub fn width(&self) -> f64 {
        (self.upper - self.lower) / self.bins as f64
    }

    pub fn edges(&self) -> Vec<f64> {
        let mut edges: Vec<f64> = (0..=self.bins)
            .map(|i| self.lower + (self.upper - self.lower) * i as f64 / self.bins as f64)
            .collect();
        if let Some(last) = edges.last_mut() {
            *last = self.upper;
        }
        edges
    }

    /// Bin index of `value`, or `None` outside the range.
    pub fn index(&self, value: f64, edges: &[f64]) -> Option<usize> {
        if !(value >= self.lower && value <= self.upper) {
            return None;
        }
        let scaled = (value - self.lower) / (self.upper - self.lower) * self.bins as f64;
        let mut index = (scaled as usize).min(self.bins - 1);
        if index > 0 && value < edges[index] {
            index -= 1;
        } else if index + 1 < self.bins && value >= edges[index + 1] {
            index += 1;
        }
        Some(index)
    }

    pub fn counts(&self, values: impl Iterator<Item = f64>) -> Vec<f64> {
        let edges = self.edges();
        let mut counts = vec![0.0; self.bins];
        for value in values {
            if let Some(index) = self.index(value, &edges) {
                counts[index] += 1.0;
            }
        }
        counts
    }
}

fn labelled(edges: &[f64], values: Vec<f64>) -> Vec<HistogramBin> {
    values
        .into_iter()
        .enumerate()
        .map(|(i, value)| HistogramBin {
            edges: [edges[i], edges[i + 1]],
            value,
        })
        .collect()
}

fn shared_binning(params: &HistogramParams, series: &[Series]) -> Result<Option<Binning>> {
    Binning::resolve(
        params.bins,
        params.min,
        params.max,
        series.iter().flat_map(|s| s.valid_values()),
    )
}

/// Per-series histogram with bins shared across series.
pub fn histogram(params: &HistogramParams, series: &[Series]) -> Result<ComputationResult> {
    let binning = shared_binning(params, series)?;
    let results = series
        .iter()
        .map(|s| {
            let data = match binning {
                Some(binning) if s.valid_values().next().is_some() => {
                    let mut counts = binning.counts(s.valid_values());
                    if params.density {
                        let total: f64 = counts.iter().sum();
                        let scale = if total > 0.0 {
                            1.0 / (total * binning.width())
                        } else {
                            0.0
                        };
                        counts.iter_mut().for_each(|c| *c *= scale);
                    }
                    labelled(&binning.edges(), counts)
                }
                _ => Vec::new(),
            };
            SeriesResult::new(s.meta.clone(), data)
        })
        .collect();
    Ok(ComputationResult::Histogram(results))
}

/// Running sum of histogram counts; normalized to end at 1 when `density` is set.
pub fn cumulative_distribution(params: &HistogramParams, series: &[Series]) -> Result<ComputationResult> {
    let binning = shared_binning(params, series)?;
    let results = series
        .iter()
        .map(|s| {
            let data = match binning {
                Some(binning) if s.valid_values().next().is_some() => {
                    let counts = binning.counts(s.valid_values());
                    let total: f64 = counts.iter().sum();
                    let mut running = 0.0;
                    let cumulative = counts
                        .into_iter()
                        .map(|count| {
                            running += count;
                            if params.density && total > 0.0 {
                                running / total
                            } else {
                                running
                            }
                        })
                        .collect();
                    labelled(&binning.edges(), cumulative)
                }
                _ => Vec::new(),
            };
            SeriesResult::new(s.meta.clone(), data)
        })
        .collect();
    Ok(ComputationResult::Histogram(results))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::SeriesMeta;
    use crate::storage::frame::MISSING;

    fn series(values: &[f64]) -> Series {
        let timestamps = (0..values.len() as i64).collect();
        Series::new(SeriesMeta::default(), timestamps, values.to_vec()).unwrap()
    }

    fn bins(result: ComputationResult) -> Vec<Vec<HistogramBin>> {
        match result {
            ComputationResult::Histogram(results) => results.into_iter().map(|r| r.data).collect(),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_two_bins() {
        let params = HistogramParams {
            bins: 2,
            min: Some(1.0),
            max: Some(4.0),
            density: false,
        };
        let result = bins(histogram(&params, &[series(&[1.0, 2.0, 2.0, 3.0, 4.0])]).unwrap());
        assert_eq!(
            result[0],
            vec![
                HistogramBin {
                    edges: [1.0, 2.5],
                    value: 3.0
                },
                HistogramBin {
                    edges: [2.5, 4.0],
                    value: 2.0
                },
            ]
        );
    }

    #[test]
    fn test_auto_range_spans_all_series() {
        let params = HistogramParams {
            bins: 4,
            ..Default::default()
        };
        let result = bins(
            histogram(&params, &[series(&[0.0, 1.0, MISSING]), series(&[4.0])]).unwrap(),
        );
        assert_eq!(result[0][0].edges, [0.0, 1.0]);
        assert_eq!(result[0][1].value, 1.0);
        assert_eq!(result[1][3].value, 1.0);
    }

    #[test]
    fn test_density_integrates_to_one() {
        let params = HistogramParams {
            bins: 3,
            min: Some(0.0),
            max: Some(6.0),
            density: true,
        };
        let result = bins(histogram(&params, &[series(&[0.5, 1.0, 3.0, 5.0])]).unwrap());
        let area: f64 = result[0].iter().map(|b| b.value * 2.0).sum();
        assert!((area - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_ranges() {
        let inverted = HistogramParams {
            bins: 2,
            min: Some(4.0),
            max: Some(1.0),
            density: false,
        };
        assert_eq!(
            histogram(&inverted, &[series(&[1.0])]).unwrap_err().kind(),
            "rangeError"
        );
        let no_bins = HistogramParams {
            bins: 0,
            ..Default::default()
        };
        assert!(histogram(&no_bins, &[series(&[1.0, 2.0])]).is_err());

        let flat = bins(histogram(&HistogramParams::default(), &[series(&[2.0, 2.0])]).unwrap());
        assert!(flat[0].is_empty());
    }

    #[test]
    fn test_cumulative() {
        let params = HistogramParams {
            bins: 2,
            min: Some(1.0),
            max: Some(4.0),
            density: false,
        };
        let result = bins(
            cumulative_distribution(&params, &[series(&[1.0, 2.0, 2.0, 3.0, 4.0])]).unwrap(),
        );
        assert_eq!(result[0][0].value, 3.0);
        assert_eq!(result[0][1].value, 5.0);
    }

    #[test]
    fn test_all_missing_series_has_no_bins() {
        let params = HistogramParams {
            bins: 2,
            min: Some(1.0),
            max: Some(4.0),
            density: true,
        };
        let input = [series(&[1.0, 3.0]), series(&[MISSING, MISSING])];
        let counts = bins(histogram(&params, &input).unwrap());
        let cumulative = bins(cumulative_distribution(&params, &input).unwrap());
        assert_eq!(counts[0].len(), 2);
        assert_eq!(cumulative[0].len(), 2);
        assert!(counts[1].is_empty());
        assert!(cumulative[1].is_empty());
    }
}
