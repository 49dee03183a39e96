//! Answer objects produced by the query layer.

use crate::compute::ComputationResult;
use crate::error::AnemosError;
use crate::query::interval::Interval;
use crate::series::Series;
use serde::Serialize;
use serde_json::Value;

/// The payload of an answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AnswerResult {
    /// Processed series.
    Series(Vec<Series>),
    /// Catalog metadata.
    MetaData(Value),
    /// Computation output.
    Computed(ComputationResult),
    /// No result (failed request).
    Empty,
}

/// A structured failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorPayload {
    /// Stable error tag, e.g. `notFoundError`.
    pub kind: String,
    /// Human-readable message.
    pub message: String,
}

impl From<&AnemosError> for ErrorPayload {
    fn from(err: &AnemosError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// The answer to one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    /// Series, metadata or computation output.
    pub result: AnswerResult,
    /// Resolved interval; absent when no series matched.
    pub interval: Option<Interval>,
    /// Wall-clock processing time in seconds.
    pub computation_time: f64,
    /// Set when the request failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

impl Answer {
    /// A successful answer.
    pub fn success(result: AnswerResult, interval: Option<Interval>, computation_time: f64) -> Self {
        Self {
            result,
            interval,
            computation_time,
            error: None,
        }
    }

    /// A failed answer carrying `err`.
    pub fn failure(err: &AnemosError, computation_time: f64) -> Self {
        Self {
            result: AnswerResult::Empty,
            interval: None,
            computation_time,
            error: Some(err.into()),
        }
    }

    /// Returns true if the request failed.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// The returned series, if the result is a series list.
    pub fn series(&self) -> Option<&[Series]> {
        match &self.result {
            AnswerResult::Series(series) => Some(series),
            _ => None,
        }
    }

    /// Serializes the answer to JSON.
    pub fn to_json(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_failure_payload() {
        let answer = Answer::failure(&AnemosError::table_not_found("T9"), 0.5);
        let json = answer.to_json().unwrap();
        assert_eq!(json["result"], Value::Null);
        assert_eq!(json["interval"], Value::Null);
        assert_eq!(json["error"]["kind"], json!("notFoundError"));
        assert!(json["error"]["message"].as_str().unwrap().contains("T9"));
    }

    #[test]
    fn test_success_omits_error() {
        let answer = Answer::success(
            AnswerResult::Series(Vec::new()),
            Some(Interval::COMPLETE),
            0.0,
        );
        let json = answer.to_json().unwrap();
        assert!(json.get("error").is_none());
        assert_eq!(json["interval"], json!({"units": 1, "code": "C"}));
        assert_eq!(json["computationTime"], json!(0.0));
    }
}
