//! Named statistics used by resampling and computations.

use crate::error::{AnemosError, Result};
use crate::storage::frame::{is_missing, MISSING};
use serde::{Deserialize, Serialize};

/// A statistic as written in a request: `{name, level?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticSpec {
    /// Reducer name.
    pub name: String,
    /// Percentile level in 0-100.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<f64>,
}

impl StatisticSpec {
    /// A statistic without parameters.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            level: None,
        }
    }

    /// A percentile at `level`.
    pub fn percentile(level: f64) -> Self {
        Self {
            name: "percentile".to_string(),
            level: Some(level),
        }
    }
}

/// A reduction over a slice of values.
///
/// Every reducer except `Count` and `Fraction` ignores missing markers and
/// yields a missing marker when nothing valid remains.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reducer {
    /// Arithmetic mean.
    Mean,
    /// Minimum.
    Min,
    /// Maximum.
    Max,
    /// Sum.
    Sum,
    /// Number of valid values.
    Count,
    /// Median.
    Median,
    /// Sample standard deviation.
    Std,
    /// Sample variance.
    Var,
    /// First valid value.
    First,
    /// Last valid value.
    Last,
    /// Linear-interpolated percentile, level in 0-100.
    Percentile(f64),
    /// Share of valid values in 0..=1.
    Fraction,
}

impl Reducer {
    /// Resolves a request statistic.
    pub fn from_spec(spec: &StatisticSpec) -> Result<Self> {
        let reducer = match spec.name.as_str() {
            "mean" => Self::Mean,
            "min" => Self::Min,
            "max" => Self::Max,
            "sum" => Self::Sum,
            "count" => Self::Count,
            "median" => Self::Median,
            "std" => Self::Std,
            "var" => Self::Var,
            "first" => Self::First,
            "last" => Self::Last,
            "fraction" => Self::Fraction,
            "percentile" => {
                let level = spec.level.ok_or_else(|| {
                    AnemosError::InvalidRequest("percentile requires a level".to_string())
                })?;
                if !(0.0..=100.0).contains(&level) {
                    return Err(AnemosError::InvalidRequest(format!(
                        "percentile level {} outside 0-100",
                        level
                    )));
                }
                Self::Percentile(level)
            }
            other => {
                return Err(AnemosError::InvalidRequest(format!(
                    "unknown statistic `{}`",
                    other
                )))
            }
        };
        Ok(reducer)
    }

    /// Returns true for the fraction reducer.
    pub fn is_fraction(&self) -> bool {
        matches!(self, Self::Fraction)
    }

    /// Reduces `values` to a single number.
    pub fn reduce(&self, values: &[f64]) -> f64 {
        let mut valid = values.iter().copied().filter(|v| !is_missing(*v));
        match self {
            Self::Count => valid.count() as f64,
            Self::Fraction => {
                if values.is_empty() {
                    0.0
                } else {
                    valid.count() as f64 / values.len() as f64
                }
            }
            Self::Sum => {
                let mut any = false;
                let total: f64 = valid.inspect(|_| any = true).sum();
                if any {
                    total
                } else {
                    MISSING
                }
            }
            Self::Mean => mean(valid),
            Self::Min => valid.reduce(f64::min).unwrap_or(MISSING),
            Self::Max => valid.reduce(f64::max).unwrap_or(MISSING),
            Self::First => valid.next().unwrap_or(MISSING),
            Self::Last => valid.last().unwrap_or(MISSING),
            Self::Var => variance(values),
            Self::Std => variance(values).sqrt(),
            Self::Median => percentile(&mut valid.collect::<Vec<_>>(), 50.0),
            Self::Percentile(level) => percentile(&mut valid.collect::<Vec<_>>(), *level),
        }
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if count == 0 {
        MISSING
    } else {
        sum / count as f64
    }
}

/// Sample variance (one delta degree of freedom).
pub(crate) fn variance(values: &[f64]) -> f64 {
    let valid = || values.iter().copied().filter(|v| !is_missing(*v));
    let count = valid().count();
    if count < 2 {
        return MISSING;
    }
    let center = mean(valid());
    let squares: f64 = valid().map(|v| (v - center).powi(2)).sum();
    squares / (count - 1) as f64
}

/// Linear-interpolated percentile of valid values; sorts in place.
pub(crate) fn percentile(values: &mut [f64], level: f64) -> f64 {
    if values.is_empty() {
        return MISSING;
    }
    values.sort_by(f64::total_cmp);
    let rank = level / 100.0 * (values.len() - 1) as f64;
    let below = rank.floor() as usize;
    let above = rank.ceil() as usize;
    let weight = rank - below as f64;
    values[below] + (values[above] - values[below]) * weight
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reduce(name: &str, values: &[f64]) -> f64 {
        Reducer::from_spec(&StatisticSpec::named(name))
            .unwrap()
            .reduce(values)
    }

    #[test]
    fn test_basic_reducers_skip_missing() {
        let values = [1.0, MISSING, 3.0, 4.0];
        assert_eq!(reduce("mean", &values), 8.0 / 3.0);
        assert_eq!(reduce("min", &values), 1.0);
        assert_eq!(reduce("max", &values), 4.0);
        assert_eq!(reduce("sum", &values), 8.0);
        assert_eq!(reduce("count", &values), 3.0);
        assert_eq!(reduce("first", &values), 1.0);
        assert_eq!(reduce("last", &values), 4.0);
        assert_eq!(reduce("median", &values), 3.0);
        assert_eq!(reduce("fraction", &values), 0.75);
    }

    #[test]
    fn test_empty_inputs() {
        assert!(is_missing(reduce("mean", &[])));
        assert!(is_missing(reduce("sum", &[MISSING])));
        assert!(is_missing(reduce("std", &[1.0])));
        assert_eq!(reduce("count", &[]), 0.0);
        assert_eq!(reduce("fraction", &[]), 0.0);
    }

    #[test]
    fn test_sample_variance() {
        assert_eq!(reduce("var", &[1.0, 2.0, 3.0, 4.0]), 5.0 / 3.0);
        assert!((reduce("std", &[2.0, 4.0]) - 2f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_percentile_linear() {
        let reducer = Reducer::from_spec(&StatisticSpec::percentile(25.0)).unwrap();
        assert_eq!(reducer.reduce(&[4.0, 1.0, 3.0, 2.0, 5.0]), 2.0);
        let reducer = Reducer::from_spec(&StatisticSpec::percentile(90.0)).unwrap();
        assert!((reducer.reduce(&[1.0, 2.0]) - 1.9).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_statistics() {
        assert!(matches!(
            Reducer::from_spec(&StatisticSpec::named("mode")),
            Err(AnemosError::InvalidRequest(_))
        ));
        assert!(Reducer::from_spec(&StatisticSpec::named("percentile")).is_err());
        assert!(Reducer::from_spec(&StatisticSpec::percentile(120.0)).is_err());
    }
}
