//! Evaluation results
//!
//! Results are ephemeral: computed on demand, never stored. Every test in the
//! requested scope appears in the response with either a usable value or a
//! typed unavailability marker.

use crate::test::ModelTest;
use crate::threshold::ThresholdOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of result a slot holds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    /// The metric is usable
    #[default]
    Value,
    /// The metric engine has no predictions for the (model, split)
    PredictionUnavailable,
    /// Feature influences have not been computed for the split
    InfluenceUnavailable,
    /// Any other engine failure; `error_message` carries the remote detail
    OtherException,
}

/// Serialize a possibly-NaN metric as `null` instead of failing
mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            serializer.serialize_none()
        } else {
            serializer.serialize_some(value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
    }
}

/// Result of evaluating one test against one concrete split
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    /// The evaluated test, with the concrete split substituted into the target
    pub test_details: ModelTest,
    /// Metric value; NaN when unavailable (serialized as null)
    #[serde(with = "nan_as_null")]
    pub metric_value: f64,
    /// Result classification
    pub result_kind: ResultKind,
    /// Warning threshold outcome
    pub warning: ThresholdOutcome,
    /// Fail threshold outcome
    pub pass_fail: ThresholdOutcome,
    /// Remote error detail, prefixed uniformly
    pub error_message: Option<String>,
    /// When this result was computed
    pub computed_at: DateTime<Utc>,
}

impl TestResult {
    /// A fresh result slot for a test: NaN metric, undefined outcomes.
    #[must_use]
    pub fn slot(test_details: ModelTest) -> Self {
        Self {
            test_details,
            metric_value: f64::NAN,
            result_kind: ResultKind::Value,
            warning: ThresholdOutcome::Undefined,
            pass_fail: ThresholdOutcome::Undefined,
            error_message: None,
            computed_at: Utc::now(),
        }
    }

    /// Mark this slot unavailable with the uniform error prefix
    pub fn mark_unavailable(&mut self, kind: ResultKind, remote_message: &str) {
        self.metric_value = f64::NAN;
        self.result_kind = kind;
        self.error_message = Some(format!(
            "Error in determining test result: {remote_message}"
        ));
    }
}
