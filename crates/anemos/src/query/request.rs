//! Request objects consumed by the query layer.
//!
//! # Example
//!
//! ```rust,ignore
//! let request: Request = serde_json::from_str(r#"{
//!     "type": "data",
//!     "table": {"code": "T1"},
//!     "variable": {"type": ["vels", "turbinePower"], "statistic": "mean"},
//!     "time": {"lowerBound": "2024-01-01", "months": [1, 2]},
//!     "resampling": {
//!         "interval": {"type": "adaptive", "seriesLength": 500},
//!         "statistic": {"name": "mean"},
//!         "minimumFraction": 0.8
//!     },
//!     "transform": {"turbinePower": {"turbineModel": "V90"}}
//! }"#)?;
//! ```

use crate::catalog::filter::FieldFilter;
use crate::compute::ComputationSpec;
use crate::query::interval::IntervalCode;
use crate::query::reducer::StatisticSpec;
use crate::query::time::TimeSpec;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A request for data or metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    /// Series extraction, processing and computation.
    #[serde(rename = "data")]
    Data(DataRequest),
    /// Catalog inspection.
    #[serde(rename = "metaData")]
    MetaData(MetaDataQuery),
}

/// The body of a `data` request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataRequest {
    /// Table field predicates; absent selects every table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<FieldFilter>,
    /// Variable field predicates; absent selects every variable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable: Option<FieldFilter>,
    /// Time bounds and time-of-year filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<TimeSpec>,
    /// Resampling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resampling: Option<ResamplingSpec>,
    /// Computation applied last.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computation: Option<ComputationSpec>,
    /// Per-transform parameters keyed by transform id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<Map<String, Value>>,
}

/// The `resampling` section of a data request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResamplingSpec {
    /// Interval selection.
    pub interval: IntervalSpec,
    /// Bucket statistic.
    pub statistic: StatisticSpec,
    /// Buckets with a lower share of valid samples become missing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_fraction: Option<f64>,
}

/// Fixed or adaptive interval selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum IntervalSpec {
    /// An explicit interval.
    Fixed {
        /// Number of periods.
        #[serde(default = "default_units")]
        units: u32,
        /// Period code.
        code: IntervalCode,
    },
    /// The finest standard interval giving about `point_count` buckets.
    Adaptive {
        /// Requested number of points.
        #[serde(rename = "seriesLength", alias = "pointCount")]
        point_count: usize,
    },
}

fn default_units() -> u32 {
    1
}

/// Catalog inspection requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "camelCase")]
pub enum MetaDataQuery {
    /// Vocabularies plus every table descriptor.
    AllMetaData,
    /// One table descriptor.
    TableMetaData {
        /// Table code.
        #[serde(rename = "tableCode")]
        table_code: String,
    },
    /// Sorted table codes.
    TableCodes,
    /// Variable types present in any of the tables.
    VariableTypeUnion {
        /// Table codes.
        #[serde(rename = "tableCodes")]
        table_codes: Vec<String>,
    },
    /// Variable types present in all of the tables.
    VariableTypeIntersection {
        /// Table codes.
        #[serde(rename = "tableCodes")]
        table_codes: Vec<String>,
    },
    /// Altitudes of matching variables in any of the tables.
    VariableAltitudeUnion {
        /// Table codes.
        #[serde(rename = "tableCodes")]
        table_codes: Vec<String>,
        /// Variable type.
        #[serde(rename = "variableType")]
        variable_type: String,
        /// Variable statistic.
        #[serde(rename = "variableStatistic")]
        variable_statistic: String,
    },
    /// Altitudes of matching variables in all of the tables.
    VariableAltitudeIntersection {
        /// Table codes.
        #[serde(rename = "tableCodes")]
        table_codes: Vec<String>,
        /// Variable type.
        #[serde(rename = "variableType")]
        variable_type: String,
        /// Variable statistic.
        #[serde(rename = "variableStatistic")]
        variable_statistic: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::filter::Predicate;
    use serde_json::json;

    #[test]
    fn test_parse_data_request() {
        let request: Request = serde_json::from_value(json!({
            "type": "data",
            "table": {"code": ["T1", "T2"]},
            "resampling": {
                "interval": {"type": "fixed", "code": "H"},
                "statistic": {"name": "percentile", "level": 90},
                "minimumFraction": 0.5
            },
            "computation": {"name": "standardSummary"}
        }))
        .unwrap();

        let Request::Data(data) = request else {
            panic!("expected a data request");
        };
        assert!(matches!(
            data.table.unwrap()["code"],
            Predicate::AnyOf(ref codes) if codes.len() == 2
        ));
        let resampling = data.resampling.unwrap();
        assert_eq!(
            resampling.interval,
            IntervalSpec::Fixed {
                units: 1,
                code: IntervalCode::Hour
            }
        );
        assert_eq!(resampling.statistic.level, Some(90.0));
        assert_eq!(data.computation, Some(ComputationSpec::StandardSummary));
    }

    #[test]
    fn test_adaptive_alias() {
        let spec: IntervalSpec =
            serde_json::from_value(json!({"type": "adaptive", "pointCount": 100})).unwrap();
        assert_eq!(spec, IntervalSpec::Adaptive { point_count: 100 });
    }

    #[test]
    fn test_parse_metadata_request() {
        let request: Request = serde_json::from_value(json!({
            "type": "metaData",
            "name": "variableAltitudeUnion",
            "tableCodes": ["T1"],
            "variableType": "vels",
            "variableStatistic": "mean"
        }))
        .unwrap();
        assert!(matches!(
            request,
            Request::MetaData(MetaDataQuery::VariableAltitudeUnion { .. })
        ));
        assert!(serde_json::from_value::<Request>(json!({"type": "bogus"})).is_err());
    }
}
