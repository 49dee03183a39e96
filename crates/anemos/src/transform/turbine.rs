//! Turbine power: wind speed mapped through a density-corrected power curve.

use crate::catalog::{TableMeta, TurbineCurve};
use crate::error::{AnemosError, Result};
use crate::storage::frame::is_missing;
use crate::transform::{Transform, TransformInput};
use serde::Deserialize;
use serde_json::Value;

/// Variable type of wind speed.
pub const VELOCITY_TYPE: &str = "vels";
/// Variable type of air temperature (°C).
pub const TEMPERATURE_TYPE: &str = "temp";
/// Variable type of air pressure (hPa).
pub const PRESSURE_TYPE: &str = "pres";

/// Specific gas constant of dry air, J/(kg·K).
const DRY_AIR_GAS_CONSTANT: f64 = 287.058;

/// Request parameters of the turbine power transform.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurbinePowerParams {
    /// Turbine model id in the catalog.
    pub turbine_model: String,
    /// Fixed air density (kg/m³), overriding every other source.
    #[serde(default)]
    pub density: Option<f64>,
    /// Report power as a percentage of rated power.
    #[serde(default)]
    pub plant_factor: bool,
    /// Overrides the model's rated power for the plant factor.
    #[serde(default)]
    pub rated_power: Option<f64>,
}

/// The `turbinePower` transform.
#[derive(Debug, Clone, Copy, Default)]
pub struct TurbinePower;

impl Transform for TurbinePower {
    fn id(&self) -> &str {
        "turbinePower"
    }

    fn apply(&self, input: &TransformInput<'_>, params: Option<&Value>) -> Result<Vec<f64>> {
        let params: TurbinePowerParams = params
            .cloned()
            .ok_or_else(|| AnemosError::Transform("turbinePower requires parameters".to_string()))
            .and_then(|value| {
                serde_json::from_value(value)
                    .map_err(|e| AnemosError::Transform(format!("turbinePower parameters: {}", e)))
            })?;
        let model = input.catalog.turbine_model(&params.turbine_model)?;
        validate_curve(&model.curve)?;
        let velocity = input.column(VELOCITY_TYPE)?;
        let density = air_density(input, params.density);

        let scale = if params.plant_factor {
            let rated = params.rated_power.unwrap_or(model.rated_power);
            if rated <= 0.0 || is_missing(rated) {
                return Err(AnemosError::Transform(format!(
                    "rated power must be positive, got {}",
                    rated
                )));
            }
            100.0 / rated
        } else {
            1.0
        };

        Ok(velocity
            .iter()
            .enumerate()
            .map(|(row, &speed)| {
                let correction = (model.reference_density / density.at(row)).cbrt();
                let power = interp(speed / correction, &model.curve.velocity, &model.curve.power);
                if power.is_finite() {
                    power * scale
                } else {
                    0.0
                }
            })
            .collect())
    }
}

fn validate_curve(curve: &TurbineCurve) -> Result<()> {
    if curve.velocity.is_empty() || curve.velocity.len() != curve.power.len() {
        return Err(AnemosError::Transform(format!(
            "power curve needs matching non-empty arrays, got {} speeds and {} powers",
            curve.velocity.len(),
            curve.power.len()
        )));
    }
    if curve.velocity.windows(2).any(|w| w[0] > w[1]) {
        return Err(AnemosError::Transform(
            "power curve speeds must be increasing".to_string(),
        ));
    }
    Ok(())
}

/// Air density per row or for the whole table.
#[derive(Debug, Clone, PartialEq)]
pub enum AirDensity {
    /// One density for every row.
    Constant(f64),
    /// Density computed per row from temperature and pressure.
    PerRow(Vec<f64>),
}

impl AirDensity {
    /// Density at `row`.
    pub fn at(&self, row: usize) -> f64 {
        match self {
            Self::Constant(density) => *density,
            Self::PerRow(densities) => densities.get(row).copied().unwrap_or(f64::NAN),
        }
    }
}

/// Resolves air density for the input group.
///
/// Order: the fixed parameter, temperature and pressure at the altitude
/// nearest the velocity sensor, the station's mean air density, and finally
/// a linear model of station elevation.
pub fn air_density(input: &TransformInput<'_>, fixed: Option<f64>) -> AirDensity {
    if let Some(density) = fixed {
        return AirDensity::Constant(density);
    }
    let temperature = nearest_column(input.table, TEMPERATURE_TYPE, input.group.altitude);
    let pressure = nearest_column(input.table, PRESSURE_TYPE, input.group.altitude);
    if let (Some(t), Some(p)) = (temperature, pressure) {
        if let (Some(t), Some(p)) = (input.frame.column(t), input.frame.column(p)) {
            return AirDensity::PerRow(
                t.iter()
                    .zip(p.iter())
                    .map(|(&celsius, &hpa)| {
                        100.0 * hpa / (DRY_AIR_GAS_CONSTANT * (celsius + 273.15))
                    })
                    .collect(),
            );
        }
    }
    AirDensity::Constant(station_density(input.table))
}

/// Mean air density recorded for the station, else derived from elevation.
pub fn station_density(table: &TableMeta) -> f64 {
    table
        .lookup(&["info", "location", "meanAirDensity"])
        .and_then(Value::as_f64)
        .unwrap_or(1.2 - 0.1 * table.elevation / 1000.0)
}

/// Index of the `mean` variable of `variable_type` closest to `altitude`.
fn nearest_column(table: &TableMeta, variable_type: &str, altitude: f64) -> Option<usize> {
    table
        .variables
        .iter()
        .enumerate()
        .filter(|(_, v)| v.variable_type == variable_type && v.statistic == "mean")
        .min_by(|(_, a), (_, b)| {
            (a.altitude - altitude)
                .abs()
                .total_cmp(&(b.altitude - altitude).abs())
        })
        .map(|(index, _)| index)
}

/// Piecewise-linear interpolation with end values held outside the range.
///
/// `xp` must be increasing and the same length as `fp`.
pub fn interp(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    if x.is_nan() || xp.is_empty() {
        return f64::NAN;
    }
    let last = xp.len() - 1;
    if x <= xp[0] {
        return fp[0];
    }
    if x >= xp[last] {
        return fp[last];
    }
    let upper = xp.partition_point(|&p| p <= x);
    let lower = upper - 1;
    let span = xp[upper] - xp[lower];
    if span == 0.0 {
        return fp[upper];
    }
    fp[lower] + (fp[upper] - fp[lower]) * (x - xp[lower]) / span
}
