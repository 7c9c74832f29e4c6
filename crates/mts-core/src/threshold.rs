//! Test thresholds and their evaluation
//!
//! A threshold is `{single value | value range} x {absolute | relative} x
//! condition`. Evaluation is a pure function of the metric, the spec, and an
//! optional reference metric; the service layer supplies the reference for
//! relative thresholds.

use serde::{Deserialize, Serialize};

/// Whether threshold values are taken as-is or scaled by a reference metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdMode {
    /// Values compared directly
    Absolute,
    /// Values are fractional offsets from a reference metric
    Relative,
}

/// Condition for a single-value threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueCondition {
    /// Fire when the metric is below the threshold
    FailIfLessThan,
    /// Fire when the metric is above the threshold
    FailIfGreaterThan,
}

/// Condition for a value-range threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeCondition {
    /// Fire when the metric lies strictly inside the range
    FailIfWithin,
    /// Fire when the metric lies outside the range
    FailIfOutside,
}

/// The comparison a threshold performs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdSpec {
    /// Compare against a single value
    SingleValue {
        /// Threshold value (a fractional offset when relative)
        value: f64,
        /// Firing condition
        condition: ValueCondition,
        /// Absolute or relative
        mode: ThresholdMode,
    },
    /// Compare against a `[lower, upper]` range
    ValueRange {
        /// Lower bound (a fractional offset when relative)
        lower: f64,
        /// Upper bound (a fractional offset when relative)
        upper: f64,
        /// Firing condition
        condition: RangeCondition,
        /// Absolute or relative
        mode: ThresholdMode,
    },
}

impl ThresholdSpec {
    /// Whether this spec needs a reference metric
    #[must_use]
    pub const fn is_relative(&self) -> bool {
        matches!(
            self,
            Self::SingleValue {
                mode: ThresholdMode::Relative,
                ..
            } | Self::ValueRange {
                mode: ThresholdMode::Relative,
                ..
            }
        )
    }

    /// The raw threshold value(s), for validation
    #[must_use]
    pub fn values(&self) -> Vec<f64> {
        match self {
            Self::SingleValue { value, .. } => vec![*value],
            Self::ValueRange { lower, upper, .. } => vec![*lower, *upper],
        }
    }
}

/// A threshold slot on a test.
///
/// `spec = None` is a deliberately unset threshold: it never fires and
/// evaluates to [`ThresholdOutcome::Undefined`]. Relative specs may name a
/// reference model and/or split; unset references fall back to the test's own
/// model / split / the model's train split.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestThreshold {
    /// The comparison, if the threshold is set
    pub spec: Option<ThresholdSpec>,
    /// Model to measure the reference metric on
    pub reference_model_id: Option<String>,
    /// Split to measure the reference metric on
    pub reference_split_id: Option<String>,
}

impl TestThreshold {
    /// An unset threshold (never fires)
    #[must_use]
    pub fn unset() -> Self {
        Self::default()
    }

    /// Absolute single-value threshold
    #[must_use]
    pub fn absolute_value(value: f64, condition: ValueCondition) -> Self {
        Self {
            spec: Some(ThresholdSpec::SingleValue {
                value,
                condition,
                mode: ThresholdMode::Absolute,
            }),
            ..Self::default()
        }
    }

    /// Relative single-value threshold
    #[must_use]
    pub fn relative_value(value: f64, condition: ValueCondition) -> Self {
        Self {
            spec: Some(ThresholdSpec::SingleValue {
                value,
                condition,
                mode: ThresholdMode::Relative,
            }),
            ..Self::default()
        }
    }

    /// Absolute range threshold
    #[must_use]
    pub fn absolute_range(lower: f64, upper: f64, condition: RangeCondition) -> Self {
        Self {
            spec: Some(ThresholdSpec::ValueRange {
                lower,
                upper,
                condition,
                mode: ThresholdMode::Absolute,
            }),
            ..Self::default()
        }
    }

    /// Name a reference model for relative evaluation
    #[must_use]
    pub fn with_reference_model(mut self, model_id: impl Into<String>) -> Self {
        self.reference_model_id = Some(model_id.into());
        self
    }

    /// Name a reference split for relative evaluation
    #[must_use]
    pub fn with_reference_split(mut self, split_id: impl Into<String>) -> Self {
        self.reference_split_id = Some(split_id.into());
        self
    }

    /// Whether this threshold needs a reference metric
    #[must_use]
    pub fn is_relative(&self) -> bool {
        self.spec.as_ref().is_some_and(ThresholdSpec::is_relative)
    }
}

/// Outcome of evaluating one threshold
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdOutcome {
    /// The threshold did not fire
    Pass,
    /// The threshold fired
    Fail,
    /// Could not be decided (NaN metric, unset threshold, missing reference)
    #[default]
    Undefined,
}

/// Evaluate a metric against a threshold spec.
///
/// `reference` must be supplied for relative specs; a relative spec with no
/// reference evaluates to `Undefined`. The effective threshold of a relative
/// spec is `reference * (1 + value)` per bound.
#[must_use]
pub fn evaluate_threshold(
    metric: f64,
    spec: &ThresholdSpec,
    reference: Option<f64>,
) -> ThresholdOutcome {
    if metric.is_nan() {
        return ThresholdOutcome::Undefined;
    }
    match spec {
        ThresholdSpec::SingleValue {
            value,
            condition,
            mode,
        } => {
            let effective = match mode {
                ThresholdMode::Absolute => *value,
                ThresholdMode::Relative => match reference {
                    Some(r) => r + value * r,
                    None => return ThresholdOutcome::Undefined,
                },
            };
            match condition {
                ValueCondition::FailIfLessThan => {
                    if metric < effective {
                        ThresholdOutcome::Fail
                    } else {
                        ThresholdOutcome::Pass
                    }
                }
                ValueCondition::FailIfGreaterThan => {
                    if metric > effective {
                        ThresholdOutcome::Fail
                    } else {
                        ThresholdOutcome::Pass
                    }
                }
            }
        }
        ThresholdSpec::ValueRange {
            lower,
            upper,
            condition,
            mode,
        } => {
            let (lo, hi) = match mode {
                ThresholdMode::Absolute => (*lower, *upper),
                ThresholdMode::Relative => match reference {
                    Some(r) => (r + lower * r, r + upper * r),
                    None => return ThresholdOutcome::Undefined,
                },
            };
            match condition {
                RangeCondition::FailIfWithin => {
                    if lo < metric && metric < hi {
                        ThresholdOutcome::Fail
                    } else {
                        ThresholdOutcome::Pass
                    }
                }
                RangeCondition::FailIfOutside => {
                    if metric < lo || metric > hi {
                        ThresholdOutcome::Fail
                    } else {
                        ThresholdOutcome::Pass
                    }
                }
            }
        }
    }
}
