//! Wind roses: joint direction/velocity histograms.

use crate::compute::histogram::Binning;
use crate::compute::{ComputationResult, SeriesResult};
use crate::error::{AnemosError, Result};
use crate::series::Series;
use serde::{Deserialize, Serialize};

/// Default number of direction sectors.
pub const DEFAULT_DIRECTION_BINS: usize = 16;
/// Default number of velocity classes.
pub const DEFAULT_VELOCITY_BINS: usize = 10;

fn default_direction_bins() -> usize {
    DEFAULT_DIRECTION_BINS
}

fn default_velocity_bins() -> usize {
    DEFAULT_VELOCITY_BINS
}

fn default_density() -> bool {
    true
}

fn default_direction_type() -> String {
    "dirv".to_string()
}

fn default_velocity_type() -> String {
    "vels".to_string()
}

/// Parameters of `windRose`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindRoseParams {
    /// Direction sectors over 360°.
    #[serde(default = "default_direction_bins")]
    pub direction_bins: usize,
    /// Velocity classes.
    #[serde(default = "default_velocity_bins")]
    pub velocity_bins: usize,
    /// Lower velocity edge; the data minimum when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity_min: Option<f64>,
    /// Upper velocity edge; the data maximum when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity_max: Option<f64>,
    /// Report densities instead of counts.
    #[serde(default = "default_density")]
    pub density: bool,
    /// Variable type of direction series.
    #[serde(default = "default_direction_type")]
    pub direction_type: String,
    /// Variable type of velocity series.
    #[serde(default = "default_velocity_type")]
    pub velocity_type: String,
}

impl Default for WindRoseParams {
    fn default() -> Self {
        Self {
            direction_bins: DEFAULT_DIRECTION_BINS,
            velocity_bins: DEFAULT_VELOCITY_BINS,
            velocity_min: None,
            velocity_max: None,
            density: true,
            direction_type: default_direction_type(),
            velocity_type: default_velocity_type(),
        }
    }
}

/// A wind rose matrix.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindRose {
    /// Counts or densities indexed `[velocity][direction]`.
    pub histogram: Vec<Vec<f64>>,
    /// Sector edges in degrees, centered on compass points.
    pub direction_bin_edges: Vec<f64>,
    /// Velocity class edges.
    pub velocity_bin_edges: Vec<f64>,
}

fn same_sensor(a: &Series, b: &Series) -> bool {
    a.meta.table_code == b.meta.table_code
        && a.meta.variable_altitude.to_bits() == b.meta.variable_altitude.to_bits()
        && a.meta.variable_statistic == b.meta.variable_statistic
}

/// Pairs each velocity series with the first unused direction series of the same sensor.
fn pair_series<'a>(params: &WindRoseParams, series: &'a [Series]) -> Vec<(&'a Series, &'a Series)> {
    let mut used = vec![false; series.len()];
    let mut pairs = Vec::new();
    for velocity in series.iter().filter(|s| s.meta.variable_type == params.velocity_type) {
        let direction = series.iter().enumerate().find(|(index, s)| {
            !used[*index] && s.meta.variable_type == params.direction_type && same_sensor(s, velocity)
        });
        if let Some((index, direction)) = direction {
            used[index] = true;
            pairs.push((direction, velocity));
        }
    }
    pairs
}

/// `(direction, velocity)` samples at matching timestamps, both present.
fn joint_samples(direction: &Series, velocity: &Series) -> Vec<(f64, f64)> {
    let mut samples = Vec::new();
    let (mut i, mut j) = (0, 0);
    let (dt, vt) = (direction.timestamps(), velocity.timestamps());
    while i < dt.len() && j < vt.len() {
        match dt[i].cmp(&vt[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                let (d, v) = (direction.values()[i], velocity.values()[j]);
                if d.is_finite() && v.is_finite() {
                    samples.push((d, v));
                }
                i += 1;
                j += 1;
            }
        }
    }
    samples
}

fn rose(params: &WindRoseParams, samples: &[(f64, f64)]) -> Result<WindRose> {
    let half = 360.0 / (2 * params.direction_bins) as f64;
    let directions = Binning::new(0.0, 360.0, params.direction_bins)?;
    let Some(velocities) = Binning::resolve(
        params.velocity_bins,
        params.velocity_min,
        params.velocity_max,
        samples.iter().map(|&(_, v)| v),
    )?
    else {
        return Ok(WindRose {
            histogram: Vec::new(),
            direction_bin_edges: Vec::new(),
            velocity_bin_edges: Vec::new(),
        });
    };

    let direction_edges = directions.edges();
    let velocity_edges = velocities.edges();
    let mut histogram = vec![vec![0.0; params.direction_bins]; params.velocity_bins];
    let mut total = 0.0;
    for &(direction, velocity) in samples {
        let shifted = (direction + half).rem_euclid(360.0);
        if let (Some(d), Some(v)) = (
            directions.index(shifted, &direction_edges),
            velocities.index(velocity, &velocity_edges),
        ) {
            histogram[v][d] += 1.0;
            total += 1.0;
        }
    }
    if params.density && total > 0.0 {
        let scale = 1.0 / (total * directions.width() * velocities.width());
        histogram
            .iter_mut()
            .flat_map(|row| row.iter_mut())
            .for_each(|cell| *cell *= scale);
    }

    Ok(WindRose {
        histogram,
        direction_bin_edges: direction_edges
            .iter()
            .map(|edge| (edge - half).rem_euclid(360.0))
            .collect(),
        velocity_bin_edges: velocity_edges,
    })
}

/// One wind rose per paired direction/velocity sensor.
pub fn wind_rose(params: &WindRoseParams, series: &[Series]) -> Result<ComputationResult> {
    if params.direction_bins == 0 || params.velocity_bins == 0 {
        return Err(AnemosError::Range("wind rose bin counts must be positive".to_string()));
    }
    let results = pair_series(params, series)
        .into_iter()
        .map(|(direction, velocity)| {
            let mut meta = direction.meta.clone();
            meta.variable_type = "windRose".to_string();
            let data = rose(params, &joint_samples(direction, velocity))?;
            Ok(SeriesResult::new(meta, data))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(ComputationResult::WindRose(results))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::SeriesMeta;
    use crate::storage::frame::MISSING;

    fn series(variable_type: &str, altitude: f64, values: &[f64]) -> Series {
        let meta = SeriesMeta {
            table_code: "T1".to_string(),
            variable_type: variable_type.to_string(),
            variable_statistic: "mean".to_string(),
            variable_altitude: altitude,
            ..Default::default()
        };
        let timestamps = (0..values.len() as i64).map(|i| i * 600).collect();
        Series::new(meta, timestamps, values.to_vec()).unwrap()
    }

    fn roses(result: ComputationResult) -> Vec<SeriesResult<WindRose>> {
        match result {
            ComputationResult::WindRose(roses) => roses,
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_pairs_by_sensor() {
        let input = [
            series("vels", 80.0, &[1.0]),
            series("dirv", 40.0, &[0.0]),
            series("dirv", 80.0, &[0.0]),
            series("vels", 10.0, &[1.0]),
        ];
        let pairs = pair_series(&WindRoseParams::default(), &input);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].0.meta.variable_altitude, 80.0);
    }

    #[test]
    fn test_counts_and_centered_edges() {
        let params = WindRoseParams {
            direction_bins: 4,
            velocity_bins: 2,
            velocity_min: Some(0.0),
            velocity_max: Some(10.0),
            density: false,
            ..Default::default()
        };
        let input = [
            series("dirv", 80.0, &[350.0, 10.0, 90.0, 180.0, MISSING]),
            series("vels", 80.0, &[1.0, 6.0, 2.0, 9.0, 3.0]),
        ];
        let result = roses(wind_rose(&params, &input).unwrap());
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].meta_data.variable_type, "windRose");

        let rose = &result[0].data;
        assert_eq!(rose.direction_bin_edges, vec![315.0, 45.0, 135.0, 225.0, 315.0]);
        assert_eq!(rose.velocity_bin_edges, vec![0.0, 5.0, 10.0]);
        assert_eq!(rose.histogram[0], vec![1.0, 1.0, 0.0, 0.0]);
        assert_eq!(rose.histogram[1], vec![1.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_density_default() {
        let input = [
            series("dirv", 80.0, &[0.0, 90.0, 180.0, 270.0]),
            series("vels", 80.0, &[1.0, 2.0, 3.0, 4.0]),
        ];
        let result = roses(wind_rose(&WindRoseParams::default(), &input).unwrap());
        let rose = &result[0].data;
        let cell = (360.0 / 16.0) * (3.0 / 10.0);
        let mass: f64 = rose.histogram.iter().flatten().map(|d| d * cell).sum();
        assert!((mass - 1.0).abs() < 1e-9);
    }
}
