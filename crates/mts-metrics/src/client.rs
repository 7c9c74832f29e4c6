//! Metric engine client facade
//!
//! One trait over the external analytics engine's accuracy, distance, bias,
//! and feature-influence endpoints. Requests are batched even when a single
//! test asks for a single metric, because threshold evaluation may request a
//! reference metric that coincides with another test's metric. The client
//! never blocks the request thread: unfinished computations come back as
//! [`Pending::InFlight`].

use crate::pending::Pending;
use mts_core::types::{AccuracyType, BiasType, DistanceType, ScoreType, SegmentDef};
use mts_core::{RequestContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Outcome of one metric computation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricValue {
    /// A usable value
    Value(f64),
    /// The engine has no predictions for the (model, split)
    PredictionUnavailable(String),
    /// Any other engine failure
    Failed(String),
}

impl MetricValue {
    /// The numeric value, if usable
    #[must_use]
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Value(v) => Some(*v),
            _ => None,
        }
    }

    /// The remote error detail, if any
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Value(_) => None,
            Self::PredictionUnavailable(m) | Self::Failed(m) => Some(m),
        }
    }
}

/// Rows a metric is computed over: a split, optionally filtered
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputSpec {
    /// The split under measurement
    pub split_id: String,
    /// Canonical filter expression restricting rows; `None` means all rows
    pub filter_expression: Option<String>,
}

impl InputSpec {
    /// All rows of a split
    #[must_use]
    pub fn all_rows(split_id: impl Into<String>) -> Self {
        Self {
            split_id: split_id.into(),
            filter_expression: None,
        }
    }

    /// Restrict rows by a canonical filter expression
    #[must_use]
    pub fn with_filter(mut self, filter_expression: impl Into<String>) -> Self {
        self.filter_expression = Some(filter_expression.into());
        self
    }
}

/// One prediction stream: a model's outputs on a split, optionally filtered
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputSpec {
    /// The model producing the stream
    pub model_id: String,
    /// The split the predictions are on
    pub split_id: String,
    /// Canonical filter expression restricting rows
    pub filter_expression: Option<String>,
}

impl OutputSpec {
    /// A model's outputs over all rows of a split
    #[must_use]
    pub fn new(model_id: impl Into<String>, split_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            split_id: split_id.into(),
            filter_expression: None,
        }
    }

    /// Restrict rows by a canonical filter expression
    #[must_use]
    pub fn with_filter(mut self, filter_expression: impl Into<String>) -> Self {
        self.filter_expression = Some(filter_expression.into());
        self
    }
}

/// One bias computation: a model on a split, protected vs. comparison segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiasRequest {
    /// Model under test
    pub model_id: String,
    /// Split under test
    pub split_id: String,
    /// Privileged side of the comparison
    pub protected: SegmentDef,
    /// Comparison side; `None` means the rest of the split
    pub comparison: Option<SegmentDef>,
    /// Every bias metric needed for this segment pair
    pub bias_types: Vec<BiasType>,
}

/// One bias metric result inside a batch response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiasValue {
    /// The metric this value answers
    pub bias_type: BiasType,
    /// The computed outcome
    pub outcome: MetricValue,
}

/// Uniform facade over the external analytics engine.
///
/// Every method returns per-item [`Pending`] results and never blocks on the
/// engine; in-flight operation ids must be propagated to the caller.
pub trait MetricClient: Send + Sync {
    /// Compute one accuracy metric for a model over many input specs
    ///
    /// # Errors
    ///
    /// Transport-level failures only; per-item errors come back as
    /// [`MetricValue`] variants.
    fn performance_batch(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        model_id: &str,
        specs: &[InputSpec],
        accuracy_type: AccuracyType,
    ) -> Result<Vec<Pending<MetricValue>>>;

    /// Compute distances between (base, comparison) output-spec pairs,
    /// batched per distance type
    ///
    /// # Errors
    ///
    /// Transport-level failures only.
    fn stability_batch(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        requests: &BTreeMap<DistanceType, Vec<(OutputSpec, OutputSpec)>>,
    ) -> Result<BTreeMap<DistanceType, Vec<Pending<MetricValue>>>>;

    /// Compute bias metrics for deduplicated segment pairs
    ///
    /// # Errors
    ///
    /// Transport-level failures only.
    fn fairness_batch(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        requests: &[BiasRequest],
    ) -> Result<Vec<Pending<Vec<BiasValue>>>>;

    /// Compute global feature importances for a model on a split.
    ///
    /// # Errors
    ///
    /// `NotFound` when influences have not been computed for the split;
    /// transport-level failures otherwise.
    fn feature_importances(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        model_id: &str,
        split_id: &str,
        background_split_id: &str,
        score_type: ScoreType,
        segment_filter: Option<&str>,
    ) -> Result<Pending<BTreeMap<String, f64>>>;
}

impl<C: MetricClient + ?Sized> MetricClient for Arc<C> {
    fn performance_batch(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        model_id: &str,
        specs: &[InputSpec],
        accuracy_type: AccuracyType,
    ) -> Result<Vec<Pending<MetricValue>>> {
        (**self).performance_batch(ctx, project_id, model_id, specs, accuracy_type)
    }

    fn stability_batch(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        requests: &BTreeMap<DistanceType, Vec<(OutputSpec, OutputSpec)>>,
    ) -> Result<BTreeMap<DistanceType, Vec<Pending<MetricValue>>>> {
        (**self).stability_batch(ctx, project_id, requests)
    }

    fn fairness_batch(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        requests: &[BiasRequest],
    ) -> Result<Vec<Pending<Vec<BiasValue>>>> {
        (**self).fairness_batch(ctx, project_id, requests)
    }

    fn feature_importances(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        model_id: &str,
        split_id: &str,
        background_split_id: &str,
        score_type: ScoreType,
        segment_filter: Option<&str>,
    ) -> Result<Pending<BTreeMap<String, f64>>> {
        (**self).feature_importances(
            ctx,
            project_id,
            model_id,
            split_id,
            background_split_id,
            score_type,
            segment_filter,
        )
    }
}
