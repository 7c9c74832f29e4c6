//! Programmable metric client for tests
//!
//! Responses are keyed the way the evaluator scatters them; anything not
//! programmed comes back as a prediction-unavailable result, which mirrors an
//! engine asked about a (model, split) it has never scored. Call counters let
//! tests assert on cache behavior.

use crate::client::{BiasRequest, BiasValue, InputSpec, MetricClient, MetricValue, OutputSpec};
use crate::pending::Pending;
use mts_core::types::{AccuracyType, BiasType, DistanceType, ScoreType};
use mts_core::{Error, RequestContext, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

type PerformanceKey = (String, String, AccuracyType, Option<String>);
type DistanceKey = (String, String, DistanceType);
type BiasKey = (String, String, Option<String>, BiasType);

#[derive(Default)]
struct MockState {
    performance: HashMap<PerformanceKey, Pending<MetricValue>>,
    distances: HashMap<DistanceKey, Pending<MetricValue>>,
    biases: HashMap<BiasKey, MetricValue>,
    bias_pending: HashMap<(String, String, Option<String>), Vec<String>>,
    importances: HashMap<(String, String), Pending<BTreeMap<String, f64>>>,
    importance_errors: HashMap<(String, String), String>,
}

/// In-memory [`MetricClient`] with programmable responses
#[derive(Default)]
pub struct MockMetricClient {
    state: Mutex<MockState>,
    performance_calls: AtomicUsize,
    stability_calls: AtomicUsize,
    fairness_calls: AtomicUsize,
    importance_calls: AtomicUsize,
}

impl MockMetricClient {
    /// Create an empty mock
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Program an accuracy value for (model, split, metric, segment filter)
    pub fn set_performance(
        &self,
        model_id: &str,
        split_id: &str,
        accuracy_type: AccuracyType,
        segment_filter: Option<&str>,
        value: f64,
    ) {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        state.performance.insert(
            (
                model_id.to_string(),
                split_id.to_string(),
                accuracy_type,
                segment_filter.map(str::to_string),
            ),
            Pending::Ready(MetricValue::Value(value)),
        );
    }

    /// Program an in-flight accuracy computation
    pub fn set_performance_pending(
        &self,
        model_id: &str,
        split_id: &str,
        accuracy_type: AccuracyType,
        segment_filter: Option<&str>,
        operation_id: &str,
    ) {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        state.performance.insert(
            (
                model_id.to_string(),
                split_id.to_string(),
                accuracy_type,
                segment_filter.map(str::to_string),
            ),
            Pending::InFlight(vec![operation_id.to_string()]),
        );
    }

    /// Program an accuracy failure
    pub fn set_performance_failed(
        &self,
        model_id: &str,
        split_id: &str,
        accuracy_type: AccuracyType,
        segment_filter: Option<&str>,
        message: &str,
    ) {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        state.performance.insert(
            (
                model_id.to_string(),
                split_id.to_string(),
                accuracy_type,
                segment_filter.map(str::to_string),
            ),
            Pending::Ready(MetricValue::Failed(message.to_string())),
        );
    }

    /// Program a distance value for (base split, comparison split, distance)
    pub fn set_distance(
        &self,
        base_split_id: &str,
        compare_split_id: &str,
        distance_type: DistanceType,
        value: f64,
    ) {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        state.distances.insert(
            (
                base_split_id.to_string(),
                compare_split_id.to_string(),
                distance_type,
            ),
            Pending::Ready(MetricValue::Value(value)),
        );
    }

    /// Program a bias value for (split, protected def, comparison def, metric)
    pub fn set_bias(
        &self,
        split_id: &str,
        protected_def: &str,
        comparison_def: Option<&str>,
        bias_type: BiasType,
        value: f64,
    ) {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        state.biases.insert(
            (
                split_id.to_string(),
                protected_def.to_string(),
                comparison_def.map(str::to_string),
                bias_type,
            ),
            MetricValue::Value(value),
        );
    }

    /// Program an in-flight bias computation for a segment pair
    pub fn set_bias_pending(
        &self,
        split_id: &str,
        protected_def: &str,
        comparison_def: Option<&str>,
        operation_id: &str,
    ) {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        state.bias_pending.insert(
            (
                split_id.to_string(),
                protected_def.to_string(),
                comparison_def.map(str::to_string),
            ),
            vec![operation_id.to_string()],
        );
    }

    /// Program feature importances for (model, split)
    pub fn set_importances(
        &self,
        model_id: &str,
        split_id: &str,
        importances: BTreeMap<String, f64>,
    ) {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        state.importances.insert(
            (model_id.to_string(), split_id.to_string()),
            Pending::Ready(importances),
        );
    }

    /// Program an in-flight influence computation for (model, split)
    pub fn set_importances_pending(&self, model_id: &str, split_id: &str, operation_id: &str) {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        state.importances.insert(
            (model_id.to_string(), split_id.to_string()),
            Pending::InFlight(vec![operation_id.to_string()]),
        );
    }

    /// Program a missing-influence error for (model, split)
    pub fn set_importances_unavailable(&self, model_id: &str, split_id: &str, message: &str) {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        state
            .importance_errors
            .insert((model_id.to_string(), split_id.to_string()), message.to_string());
    }

    /// Number of performance batch calls observed
    #[must_use]
    pub fn performance_calls(&self) -> usize {
        self.performance_calls.load(Ordering::Relaxed)
    }

    /// Number of stability batch calls observed
    #[must_use]
    pub fn stability_calls(&self) -> usize {
        self.stability_calls.load(Ordering::Relaxed)
    }

    /// Number of fairness batch calls observed
    #[must_use]
    pub fn fairness_calls(&self) -> usize {
        self.fairness_calls.load(Ordering::Relaxed)
    }

    /// Number of feature-importance calls observed
    #[must_use]
    pub fn importance_calls(&self) -> usize {
        self.importance_calls.load(Ordering::Relaxed)
    }
}

impl MetricClient for MockMetricClient {
    fn performance_batch(
        &self,
        _ctx: &RequestContext,
        _project_id: &str,
        model_id: &str,
        specs: &[InputSpec],
        accuracy_type: AccuracyType,
    ) -> Result<Vec<Pending<MetricValue>>> {
        self.performance_calls.fetch_add(1, Ordering::Relaxed);
        let state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(specs
            .iter()
            .map(|spec| {
                let key = (
                    model_id.to_string(),
                    spec.split_id.clone(),
                    accuracy_type,
                    spec.filter_expression.clone(),
                );
                state.performance.get(&key).cloned().unwrap_or_else(|| {
                    Pending::Ready(MetricValue::PredictionUnavailable(format!(
                        "no predictions for model {model_id} on split {}",
                        spec.split_id
                    )))
                })
            })
            .collect())
    }

    fn stability_batch(
        &self,
        _ctx: &RequestContext,
        _project_id: &str,
        requests: &BTreeMap<DistanceType, Vec<(OutputSpec, OutputSpec)>>,
    ) -> Result<BTreeMap<DistanceType, Vec<Pending<MetricValue>>>> {
        self.stability_calls.fetch_add(1, Ordering::Relaxed);
        let state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut out = BTreeMap::new();
        for (distance_type, pairs) in requests {
            let results = pairs
                .iter()
                .map(|(base, compare)| {
                    let key = (base.split_id.clone(), compare.split_id.clone(), *distance_type);
                    state.distances.get(&key).cloned().unwrap_or_else(|| {
                        Pending::Ready(MetricValue::PredictionUnavailable(format!(
                            "no predictions for splits {} and {}",
                            base.split_id, compare.split_id
                        )))
                    })
                })
                .collect();
            out.insert(*distance_type, results);
        }
        Ok(out)
    }

    fn fairness_batch(
        &self,
        _ctx: &RequestContext,
        _project_id: &str,
        requests: &[BiasRequest],
    ) -> Result<Vec<Pending<Vec<BiasValue>>>> {
        self.fairness_calls.fetch_add(1, Ordering::Relaxed);
        let state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(requests
            .iter()
            .map(|request| {
                let comparison_def = request
                    .comparison
                    .as_ref()
                    .map(|c| c.filter_expression.clone());
                let pending_key = (
                    request.split_id.clone(),
                    request.protected.filter_expression.clone(),
                    comparison_def.clone(),
                );
                if let Some(ops) = state.bias_pending.get(&pending_key) {
                    return Pending::InFlight(ops.clone());
                }
                let values = request
                    .bias_types
                    .iter()
                    .map(|bias_type| {
                        let key = (
                            request.split_id.clone(),
                            request.protected.filter_expression.clone(),
                            comparison_def.clone(),
                            *bias_type,
                        );
                        let outcome = state.biases.get(&key).cloned().unwrap_or_else(|| {
                            MetricValue::PredictionUnavailable(format!(
                                "no bias result for split {}",
                                request.split_id
                            ))
                        });
                        BiasValue {
                            bias_type: *bias_type,
                            outcome,
                        }
                    })
                    .collect();
                Pending::Ready(values)
            })
            .collect())
    }

    fn feature_importances(
        &self,
        _ctx: &RequestContext,
        _project_id: &str,
        model_id: &str,
        split_id: &str,
        _background_split_id: &str,
        _score_type: ScoreType,
        _segment_filter: Option<&str>,
    ) -> Result<Pending<BTreeMap<String, f64>>> {
        self.importance_calls.fetch_add(1, Ordering::Relaxed);
        let state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let key = (model_id.to_string(), split_id.to_string());
        if let Some(message) = state.importance_errors.get(&key) {
            return Err(Error::NotFound(message.clone()));
        }
        state
            .importances
            .get(&key)
            .cloned()
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "influences not computed for model {model_id} on split {split_id}"
                ))
            })
    }
}
