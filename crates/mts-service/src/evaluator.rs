//! Batched test evaluation
//!
//! For one (project, model) the evaluator expands every test in scope into
//! result slots, fetches metrics in batches (one performance batch per
//! accuracy type, one stability batch per distance type, fairness requests
//! deduplicated by canonical segment definitions), applies warning and fail
//! thresholds independently, and accumulates pending operation ids. A
//! partially pending response is normal: every slot in scope appears with
//! either a value or a typed unavailability marker.

use crate::api::{GetTestResultsRequest, TestResultsResponse};
use crate::service::ModelTestService;
use crate::validate;
use mts_core::result::{ResultKind, TestResult};
use mts_core::test::{TestPayload, TestTarget};
use mts_core::threshold::{TestThreshold, ThresholdOutcome, evaluate_threshold};
use mts_core::types::{AccuracyType, BiasType, DistanceType, SegmentDef, SegmentId};
use mts_core::{Error, ModelTest, RequestContext, Result};
use mts_metrics::{BiasRequest, InputSpec, MetricClient, MetricValue, OutputSpec, Pending};
use mts_store::{CollectionScope, MetadataCatalog, MetadataCatalogExt, ModelMeta, TestQuery};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::warn;

/// Pending operations and the tests waiting on them
#[derive(Debug, Default)]
struct PendingAcc {
    operations: Vec<String>,
    tests: Vec<String>,
}

impl PendingAcc {
    fn register(&mut self, operation_ids: &[String], test_id: &str) {
        self.operations.extend(operation_ids.iter().cloned());
        if !self.tests.iter().any(|t| t == test_id) {
            self.tests.push(test_id.to_string());
        }
    }
}

/// Apply a threshold that never needs a reference metric
fn static_threshold(score: f64, threshold: &TestThreshold) -> ThresholdOutcome {
    threshold
        .spec
        .as_ref()
        .map_or(ThresholdOutcome::Undefined, |spec| {
            evaluate_threshold(score, spec, None)
        })
}

impl ModelTestService {
    /// Evaluate every test in scope for a model.
    ///
    /// # Errors
    ///
    /// Authorization failures, unknown model, metadata lookup failures, and
    /// transport-level metric engine failures. Per-slot engine errors are
    /// typed into the slots instead.
    pub fn get_test_results_for_model(
        &self,
        ctx: &RequestContext,
        request: &GetTestResultsRequest,
    ) -> Result<TestResultsResponse> {
        self.gateway
            .authorize_analyze(ctx, "GET_TEST_RESULTS_FOR_MODEL", &request.project_id)?;
        let model = self.metadata.require_model(&request.model_id)?;
        let mut query = TestQuery::for_project(request.project_id.as_str())
            .with_data_collection(model.data_collection_id.as_str());
        query.test_type = request.test_type;
        query.split_id = request.split_id.clone();
        let tests = self.tests.get_model_tests(&query)?;
        self.evaluate_tests(ctx, &request.project_id, &model, tests)
    }

    fn evaluate_tests(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        model: &ModelMeta,
        tests: Vec<ModelTest>,
    ) -> Result<TestResultsResponse> {
        let mut response = TestResultsResponse::default();
        let mut acc = PendingAcc::default();

        let mut performance: BTreeMap<AccuracyType, Vec<ModelTest>> = BTreeMap::new();
        let mut stability = Vec::new();
        let mut fairness = Vec::new();
        let mut feature_importance = Vec::new();
        for test in tests {
            match &test.payload {
                TestPayload::Performance(p) => match p.accuracy_type {
                    Some(metric) => performance.entry(metric).or_default().push(test),
                    None => {
                        warn!(test_id = %test.id, "performance test without an accuracy type; skipping");
                    }
                },
                TestPayload::Stability(_) => stability.push(test),
                TestPayload::Fairness(_) => fairness.push(test),
                TestPayload::FeatureImportance(_) => feature_importance.push(test),
            }
        }

        for (metric, batch) in performance {
            let results =
                self.evaluate_performance_batch(ctx, project_id, model, metric, &batch, &mut acc)?;
            response.performance_test_results.extend(results);
        }
        response.stability_test_results =
            self.evaluate_stability(ctx, project_id, model, &stability, &mut acc)?;
        response.fairness_test_results =
            self.evaluate_fairness(ctx, project_id, model, &fairness, &mut acc)?;
        response.feature_importance_test_results =
            self.evaluate_feature_importance(ctx, project_id, model, &feature_importance, &mut acc)?;

        response.pending_operation_ids = acc.operations;
        response.pending_test_ids = acc.tests;
        Ok(response)
    }

    /// Expand a test target into concrete (collection, split) pairs. Regex
    /// targets are resolved within the model's data collection.
    fn resolved_targets(
        &self,
        project_id: &str,
        model: &ModelMeta,
        test: &ModelTest,
    ) -> Result<Vec<(String, String)>> {
        match &test.target {
            TestTarget::Split {
                data_collection_id,
                split_id,
            } => Ok(vec![(data_collection_id.clone(), split_id.clone())]),
            TestTarget::Regex {
                split_name_regex, ..
            } => Ok(self
                .resolver
                .splits_from_regex(
                    project_id,
                    split_name_regex,
                    &CollectionScope::Ids(vec![model.data_collection_id.clone()]),
                )?
                .into_iter()
                .map(|s| (s.data_collection_id, s.id))
                .collect()),
        }
    }

    /// Canonical filter expression of a test's segment, if one is set
    fn segment_filter(&self, segment: &SegmentId) -> Result<Option<String>> {
        if segment.is_empty() {
            return Ok(None);
        }
        let meta = self
            .metadata
            .require_segment(&segment.segmentation_id, &segment.segment_name)?;
        Ok(Some(meta.filter_expression))
    }

    fn evaluate_performance_batch(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        model: &ModelMeta,
        metric: AccuracyType,
        tests: &[ModelTest],
        acc: &mut PendingAcc,
    ) -> Result<Vec<TestResult>> {
        let mut specs = Vec::new();
        let mut filters = Vec::new();
        let mut slots = Vec::new();
        for test in tests {
            let filter = self.segment_filter(&test.segment)?;
            for (dc, split_id) in self.resolved_targets(project_id, model, test)? {
                let mut spec = InputSpec::all_rows(split_id.clone());
                if let Some(f) = &filter {
                    spec = spec.with_filter(f.clone());
                }
                specs.push(spec);
                filters.push(filter.clone());
                slots.push(TestResult::slot(test.with_concrete_split(dc, split_id)));
            }
        }
        if slots.is_empty() {
            return Ok(slots);
        }

        let results =
            self.metrics
                .performance_batch(ctx, project_id, &model.id, &specs, metric)?;
        let mut any_pending = false;
        for (result, slot) in results.iter().zip(&slots) {
            if result.is_pending() {
                acc.register(result.operation_ids(), &slot.test_details.id);
                any_pending = true;
            }
        }
        // A pending item leaves the whole batch unevaluated; the caller
        // polls the surfaced operation ids and retries.
        if any_pending {
            return Ok(slots);
        }

        for ((result, slot), filter) in results.into_iter().zip(&mut slots).zip(&filters) {
            match result.into_ready() {
                Some(MetricValue::Value(value)) => {
                    slot.metric_value = value;
                    slot.result_kind = ResultKind::Value;
                    let (warning, fail) = performance_thresholds(&slot.test_details);
                    let dc = slot
                        .test_details
                        .target
                        .data_collection_id()
                        .unwrap_or_default()
                        .to_string();
                    let split_id = slot
                        .test_details
                        .target
                        .split_id()
                        .unwrap_or_default()
                        .to_string();
                    let test_id = slot.test_details.id.clone();
                    slot.warning = self.evaluate_with_reference(
                        ctx,
                        project_id,
                        model,
                        value,
                        &warning,
                        metric,
                        filter.as_deref(),
                        &dc,
                        &split_id,
                        &test_id,
                        acc,
                    )?;
                    slot.pass_fail = self.evaluate_with_reference(
                        ctx,
                        project_id,
                        model,
                        value,
                        &fail,
                        metric,
                        filter.as_deref(),
                        &dc,
                        &split_id,
                        &test_id,
                        acc,
                    )?;
                }
                Some(MetricValue::PredictionUnavailable(message)) => {
                    slot.mark_unavailable(ResultKind::PredictionUnavailable, &message);
                }
                Some(MetricValue::Failed(message)) => {
                    slot.mark_unavailable(ResultKind::OtherException, &message);
                }
                None => {
                    slot.mark_unavailable(
                        ResultKind::OtherException,
                        "metric engine returned no result for the batch item",
                    );
                }
            }
        }
        Ok(slots)
    }

    /// Evaluate a threshold, computing the reference metric for relative
    /// specs. The reference is measured on the named reference model/split,
    /// falling back to the test's own model, the slot's split, or the
    /// model's train split. A pending or unavailable reference yields
    /// `Undefined`.
    fn evaluate_with_reference(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        model: &ModelMeta,
        score: f64,
        threshold: &TestThreshold,
        metric: AccuracyType,
        segment_filter: Option<&str>,
        slot_data_collection_id: &str,
        slot_split_id: &str,
        test_id: &str,
        acc: &mut PendingAcc,
    ) -> Result<ThresholdOutcome> {
        let Some(spec) = &threshold.spec else {
            return Ok(ThresholdOutcome::Undefined);
        };
        if !spec.is_relative() {
            return Ok(evaluate_threshold(score, spec, None));
        }
        if let Err(e) = validate::ensure_reference_in_collection(
            self.metadata.as_ref(),
            threshold,
            slot_data_collection_id,
        ) {
            warn!(error = %e, test_id, "reference for relative threshold is unusable");
            return Ok(ThresholdOutcome::Undefined);
        }
        let reference_split = threshold
            .reference_split_id
            .as_deref()
            .filter(|s| !s.is_empty());
        let (reference_model_id, reference_split_id) = match threshold
            .reference_model_id
            .as_deref()
            .filter(|s| !s.is_empty())
        {
            Some(reference_model) => (
                reference_model.to_string(),
                reference_split.unwrap_or(slot_split_id).to_string(),
            ),
            None => match reference_split
                .map(str::to_string)
                .or_else(|| model.train_split_id.clone())
            {
                Some(split) => (model.id.clone(), split),
                None => return Ok(ThresholdOutcome::Undefined),
            },
        };
        match self.metrics.performance_single(
            ctx,
            project_id,
            &reference_model_id,
            &reference_split_id,
            metric,
            segment_filter,
        )? {
            Pending::InFlight(ops) => {
                acc.register(&ops, test_id);
                Ok(ThresholdOutcome::Undefined)
            }
            Pending::Ready(MetricValue::Value(reference)) => {
                Ok(evaluate_threshold(score, spec, Some(reference)))
            }
            Pending::Ready(_) => Ok(ThresholdOutcome::Undefined),
        }
    }

    fn evaluate_stability(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        model: &ModelMeta,
        tests: &[ModelTest],
        acc: &mut PendingAcc,
    ) -> Result<Vec<TestResult>> {
        if tests.is_empty() {
            return Ok(Vec::new());
        }
        let mut batches: BTreeMap<DistanceType, Vec<(OutputSpec, OutputSpec)>> = BTreeMap::new();
        let mut batch_slots: BTreeMap<DistanceType, Vec<TestResult>> = BTreeMap::new();
        for test in tests {
            let TestPayload::Stability(payload) = &test.payload else {
                continue;
            };
            // Base split: the test's explicit base, else the model's train
            // split. Slots without a usable same-collection base are dropped.
            let (base_split_id, base_collection) = match payload
                .base_split_id
                .as_deref()
                .filter(|s| !s.is_empty())
            {
                Some(base_id) => {
                    let base = self.metadata.require_split(base_id)?;
                    (base.id, base.data_collection_id)
                }
                None => match &model.train_split_id {
                    Some(train) => (train.clone(), model.data_collection_id.clone()),
                    None => {
                        warn!(test_id = %test.id, "no base split and no train split; dropping stability slot");
                        continue;
                    }
                },
            };
            if base_collection != model.data_collection_id {
                warn!(test_id = %test.id, "base split is outside the model's data collection; dropping stability slot");
                continue;
            }
            let filter = self.segment_filter(&test.segment)?;
            for (dc, split_id) in self.resolved_targets(project_id, model, test)? {
                let mut base_spec = OutputSpec::new(model.id.clone(), base_split_id.clone());
                let mut compare_spec = OutputSpec::new(model.id.clone(), split_id.clone());
                if let Some(f) = &filter {
                    base_spec = base_spec.with_filter(f.clone());
                    compare_spec = compare_spec.with_filter(f.clone());
                }
                batches
                    .entry(payload.distance_type)
                    .or_default()
                    .push((base_spec, compare_spec));
                batch_slots
                    .entry(payload.distance_type)
                    .or_default()
                    .push(TestResult::slot(test.with_concrete_split(dc, split_id)));
            }
        }
        if batches.is_empty() {
            return Ok(Vec::new());
        }

        let responses = self.metrics.stability_batch(ctx, project_id, &batches)?;
        let mut out = Vec::new();
        for (distance_type, mut slots) in batch_slots {
            let results = responses.get(&distance_type).cloned().unwrap_or_default();
            for (i, slot) in slots.iter_mut().enumerate() {
                match results.get(i) {
                    Some(Pending::InFlight(ops)) => {
                        acc.register(ops, &slot.test_details.id);
                    }
                    Some(Pending::Ready(MetricValue::Value(value))) => {
                        slot.metric_value = *value;
                        slot.result_kind = ResultKind::Value;
                        let (warning, fail) = stability_thresholds(&slot.test_details);
                        slot.warning = static_threshold(*value, &warning);
                        slot.pass_fail = static_threshold(*value, &fail);
                    }
                    Some(Pending::Ready(MetricValue::PredictionUnavailable(message))) => {
                        slot.mark_unavailable(ResultKind::PredictionUnavailable, message);
                    }
                    Some(Pending::Ready(MetricValue::Failed(message))) => {
                        slot.mark_unavailable(ResultKind::OtherException, message);
                    }
                    None => {
                        slot.mark_unavailable(
                            ResultKind::OtherException,
                            "metric engine returned no result for the batch item",
                        );
                    }
                }
            }
            out.extend(slots);
        }
        Ok(out)
    }

    fn evaluate_fairness(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        model: &ModelMeta,
        tests: &[ModelTest],
        acc: &mut PendingAcc,
    ) -> Result<Vec<TestResult>> {
        if tests.is_empty() {
            return Ok(Vec::new());
        }
        // Canonical stringified filter definitions for every segment in the
        // project; the dedup and scatter keys derive from these, not from
        // object identity.
        let mut segment_defs: HashMap<(String, String), String> = HashMap::new();
        for group in self.metadata.segment_groups_in_project(project_id)? {
            for segment in group.segments {
                segment_defs.insert((group.id.clone(), segment.name), segment.filter_expression);
            }
        }

        enum PairSource {
            Pairs(Vec<(SegmentDef, Option<SegmentDef>)>),
            Missing(String),
        }

        struct FairnessSlot {
            result: TestResult,
            key: Option<(String, String, Option<String>, BiasType)>,
        }

        let mut slots: Vec<FairnessSlot> = Vec::new();
        let mut requests: Vec<BiasRequest> = Vec::new();
        let mut request_tests: Vec<String> = Vec::new();
        let mut request_index: HashMap<(String, String, Option<String>), usize> = HashMap::new();

        for test in tests {
            let TestPayload::Fairness(payload) = &test.payload else {
                continue;
            };
            let source = if let Some(regex) = payload
                .protected_segment_name_regex
                .as_deref()
                .filter(|s| !s.is_empty())
            {
                PairSource::Pairs(
                    self.resolver
                        .protected_segments_from_regex(project_id, regex)?
                        .into_iter()
                        .map(|p| (p, None))
                        .collect(),
                )
            } else {
                let protected_key = (
                    payload.protected.segmentation_id.clone(),
                    payload.protected.segment_name.clone(),
                );
                match segment_defs.get(&protected_key) {
                    None => PairSource::Missing(format!(
                        "protected segment {} is not defined in project metadata",
                        payload.protected.key()
                    )),
                    Some(protected_def) => {
                        let protected =
                            SegmentDef::new(payload.protected.clone(), protected_def.clone());
                        if payload.comparison.segment_name.is_empty() {
                            PairSource::Pairs(vec![(protected, None)])
                        } else {
                            let comparison_key = (
                                payload.comparison.segmentation_id.clone(),
                                payload.comparison.segment_name.clone(),
                            );
                            match segment_defs.get(&comparison_key) {
                                Some(comparison_def) => PairSource::Pairs(vec![(
                                    protected,
                                    Some(SegmentDef::new(
                                        payload.comparison.clone(),
                                        comparison_def.clone(),
                                    )),
                                )]),
                                None => PairSource::Missing(format!(
                                    "comparison segment {} is not defined in project metadata",
                                    payload.comparison.key()
                                )),
                            }
                        }
                    }
                }
            };
            let bias_type = payload.bias_type;

            for (dc, split_id) in self.resolved_targets(project_id, model, test)? {
                match &source {
                    PairSource::Missing(message) => {
                        let mut slot =
                            TestResult::slot(test.with_concrete_split(dc.clone(), split_id.clone()));
                        slot.mark_unavailable(ResultKind::OtherException, message);
                        slots.push(FairnessSlot {
                            result: slot,
                            key: None,
                        });
                    }
                    PairSource::Pairs(pairs) => {
                        for (protected, comparison) in pairs {
                            let mut details =
                                test.with_concrete_split(dc.clone(), split_id.clone());
                            if let TestPayload::Fairness(f) = &mut details.payload {
                                f.protected = protected.id.clone();
                                f.comparison = comparison
                                    .as_ref()
                                    .map_or_else(SegmentId::empty, |c| c.id.clone());
                            }
                            let comparison_def =
                                comparison.as_ref().map(|c| c.filter_expression.clone());
                            let request_key = (
                                split_id.clone(),
                                protected.filter_expression.clone(),
                                comparison_def,
                            );
                            let index =
                                *request_index.entry(request_key.clone()).or_insert_with(|| {
                                    requests.push(BiasRequest {
                                        model_id: model.id.clone(),
                                        split_id: split_id.clone(),
                                        protected: protected.clone(),
                                        comparison: comparison.clone(),
                                        bias_types: Vec::new(),
                                    });
                                    request_tests.push(test.id.clone());
                                    requests.len() - 1
                                });
                            if !requests[index].bias_types.contains(&bias_type) {
                                requests[index].bias_types.push(bias_type);
                            }
                            slots.push(FairnessSlot {
                                result: TestResult::slot(details),
                                key: Some((
                                    request_key.0,
                                    request_key.1,
                                    request_key.2,
                                    bias_type,
                                )),
                            });
                        }
                    }
                }
            }
        }
        if requests.is_empty() {
            return Ok(slots.into_iter().map(|s| s.result).collect());
        }

        let responses = self.metrics.fairness_batch(ctx, project_id, &requests)?;
        let mut results_map: HashMap<(String, String, Option<String>, BiasType), MetricValue> =
            HashMap::new();
        let mut pending_keys: HashSet<(String, String, Option<String>)> = HashSet::new();
        for (i, response) in responses.iter().enumerate() {
            let request = &requests[i];
            let base_key = (
                request.split_id.clone(),
                request.protected.filter_expression.clone(),
                request.comparison.as_ref().map(|c| c.filter_expression.clone()),
            );
            match response {
                Pending::InFlight(ops) => {
                    acc.register(ops, &request_tests[i]);
                    pending_keys.insert(base_key);
                }
                Pending::Ready(values) => {
                    for value in values {
                        results_map.insert(
                            (
                                base_key.0.clone(),
                                base_key.1.clone(),
                                base_key.2.clone(),
                                value.bias_type,
                            ),
                            value.outcome.clone(),
                        );
                    }
                }
            }
        }

        let mut out = Vec::new();
        for slot in slots {
            let mut result = slot.result;
            if let Some(key) = slot.key {
                let base_key = (key.0.clone(), key.1.clone(), key.2.clone());
                match results_map.get(&key) {
                    Some(MetricValue::Value(value)) => {
                        result.metric_value = *value;
                        result.result_kind = ResultKind::Value;
                        let (warning, fail) = fairness_thresholds(&result.test_details);
                        result.warning = static_threshold(*value, &warning);
                        result.pass_fail = static_threshold(*value, &fail);
                    }
                    Some(MetricValue::PredictionUnavailable(message)) => {
                        result.mark_unavailable(ResultKind::PredictionUnavailable, message);
                    }
                    Some(MetricValue::Failed(message)) => {
                        result.mark_unavailable(ResultKind::OtherException, message);
                    }
                    None => {
                        if !pending_keys.contains(&base_key) {
                            result.mark_unavailable(
                                ResultKind::PredictionUnavailable,
                                "no fairness result returned for the requested segment pair",
                            );
                        }
                    }
                }
            }
            out.push(result);
        }
        Ok(out)
    }

    fn evaluate_feature_importance(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        model: &ModelMeta,
        tests: &[ModelTest],
        acc: &mut PendingAcc,
    ) -> Result<Vec<TestResult>> {
        let mut out = Vec::new();
        for test in tests {
            let TestPayload::FeatureImportance(payload) = &test.payload else {
                continue;
            };
            let filter = self.segment_filter(&test.segment)?;
            for (dc, split_id) in self.resolved_targets(project_id, model, test)? {
                let mut slot =
                    TestResult::slot(test.with_concrete_split(dc.clone(), split_id.clone()));
                match self.metadata.split(&payload.background_split_id)? {
                    None => {
                        slot.mark_unavailable(
                            ResultKind::InfluenceUnavailable,
                            &format!(
                                "background split {} does not exist",
                                payload.background_split_id
                            ),
                        );
                        out.push(slot);
                        continue;
                    }
                    Some(background) if background.data_collection_id != dc => {
                        warn!(test_id = %test.id, "background split is outside the test split's data collection; dropping slot");
                        continue;
                    }
                    Some(_) => {}
                }
                match self.metrics.feature_importances(
                    ctx,
                    project_id,
                    &model.id,
                    &split_id,
                    &payload.background_split_id,
                    payload.score_type,
                    filter.as_deref(),
                ) {
                    Ok(Pending::InFlight(ops)) => {
                        acc.register(&ops, &test.id);
                    }
                    Ok(Pending::Ready(importances)) => {
                        let count = importances
                            .values()
                            .filter(|v| **v < payload.min_importance_value)
                            .count();
                        slot.metric_value = count as f64;
                        slot.result_kind = ResultKind::Value;
                        slot.warning = static_threshold(count as f64, &payload.threshold_warning);
                        slot.pass_fail = static_threshold(count as f64, &payload.threshold_fail);
                    }
                    Err(Error::NotFound(message)) => {
                        slot.mark_unavailable(ResultKind::InfluenceUnavailable, &message);
                    }
                    Err(e) => {
                        slot.mark_unavailable(ResultKind::OtherException, &e.to_string());
                    }
                }
                out.push(slot);
            }
        }
        Ok(out)
    }
}

fn performance_thresholds(test: &ModelTest) -> (TestThreshold, TestThreshold) {
    match &test.payload {
        TestPayload::Performance(p) => {
            (p.threshold_warning.clone(), p.threshold_fail.clone())
        }
        _ => (TestThreshold::unset(), TestThreshold::unset()),
    }
}

fn stability_thresholds(test: &ModelTest) -> (TestThreshold, TestThreshold) {
    match &test.payload {
        TestPayload::Stability(s) => (s.threshold_warning.clone(), s.threshold_fail.clone()),
        _ => (TestThreshold::unset(), TestThreshold::unset()),
    }
}

fn fairness_thresholds(test: &ModelTest) -> (TestThreshold, TestThreshold) {
    match &test.payload {
        TestPayload::Fairness(f) => (f.threshold_warning.clone(), f.threshold_fail.clone()),
        _ => (TestThreshold::unset(), TestThreshold::unset()),
    }
}
