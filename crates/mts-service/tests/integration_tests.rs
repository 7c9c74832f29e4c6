//! Integration tests for the model test service
//!
//! Exercises the full path from test creation through batched evaluation
//! against a programmable metric engine, plus the bootstrapper and the
//! group lifecycle.

use mts_core::test::{
    FairnessTest, FeatureImportanceTest, PerformanceTest, StabilityTest, TestPayload,
};
use mts_core::threshold::{RangeCondition, TestThreshold, ThresholdOutcome, ValueCondition};
use mts_core::types::{AccuracyType, BiasType, DistanceType, ScoreType, SegmentId, TestType};
use mts_core::{Error, RequestContext};
use mts_metrics::{MetricClient, MockMetricClient};
use mts_service::{
    AllowAllPolicy, CreateFairnessTestRequest, CreateFeatureImportanceTestRequest,
    CreatePerformanceTestGroupRequest, CreatePerformanceTestRequest, CreateStabilityTestRequest,
    CreateTestsFromSplitRequest, DenyAllPolicy, GetDataSplitsFromRegexRequest,
    GetModelTestGroupsRequest, GetTestResultsRequest, InMemoryWorkflowQueue, ModelTestService,
    ServiceConfig, StartBaselineWorkflowRequest, TestGroupSpec,
};
use mts_store::{
    BiasConfig, DataCollectionMeta, InMemoryCatalog, InMemoryTestStore, ModelMeta, ProjectMeta,
    SegmentGroupMeta, SegmentMeta, SplitKind, SplitMeta, TestStore,
};
use std::collections::BTreeMap;
use std::sync::Arc;

struct Harness {
    service: ModelTestService,
    store: Arc<InMemoryTestStore>,
    mock: Arc<MockMetricClient>,
    queue: Arc<InMemoryWorkflowQueue>,
}

fn ctx() -> RequestContext {
    RequestContext::new("tester", "acme")
}

fn fixture_catalog() -> Arc<InMemoryCatalog> {
    let catalog = Arc::new(InMemoryCatalog::new());
    catalog.add_project(ProjectMeta {
        id: "p1".to_string(),
        name: "credit".to_string(),
        score_type: ScoreType::ClassificationProbits,
        bias_configs: vec![BiasConfig {
            bias_type: BiasType::DisparateImpact,
            acceptable_min: 0.8,
            acceptable_max: 1.25,
        }],
    });
    catalog.add_data_collection(DataCollectionMeta {
        id: "dc1".to_string(),
        name: "loans".to_string(),
        project_id: "p1".to_string(),
    });
    catalog.add_data_collection(DataCollectionMeta {
        id: "dc2".to_string(),
        name: "cards".to_string(),
        project_id: "p1".to_string(),
    });
    for (id, name, dc, kind) in [
        ("s-train", "train", "dc1", SplitKind::Train),
        ("s-holdout1", "holdout_v1", "dc1", SplitKind::Test),
        ("s-holdout2", "holdout_v2", "dc1", SplitKind::Test),
        ("s-ref", "reference", "dc1", SplitKind::Test),
        ("s-prod", "live_traffic", "dc1", SplitKind::Production),
        ("s-other", "holdout_other", "dc2", SplitKind::Test),
    ] {
        catalog.add_split(SplitMeta {
            id: id.to_string(),
            name: name.to_string(),
            data_collection_id: dc.to_string(),
            kind,
            active: true,
        });
    }
    catalog.add_segment_group(SegmentGroupMeta {
        id: "sg1".to_string(),
        name: "gender".to_string(),
        project_id: "p1".to_string(),
        segments: vec![
            SegmentMeta {
                name: "Female".to_string(),
                is_protected: true,
                filter_expression: "gender == \"F\"".to_string(),
            },
            SegmentMeta {
                name: "Male".to_string(),
                is_protected: false,
                filter_expression: "gender == \"M\"".to_string(),
            },
        ],
    });
    catalog.add_model(ModelMeta {
        id: "m1".to_string(),
        name: "champion".to_string(),
        data_collection_id: "dc1".to_string(),
        train_split_id: Some("s-train".to_string()),
    });
    catalog
}

fn harness() -> Harness {
    let catalog = fixture_catalog();
    let store = Arc::new(InMemoryTestStore::new());
    let mock = Arc::new(MockMetricClient::new());
    let queue = Arc::new(InMemoryWorkflowQueue::new());
    let service = ModelTestService::new(
        ServiceConfig::default(),
        catalog,
        store.clone(),
        mock.clone() as Arc<dyn MetricClient>,
        Arc::new(AllowAllPolicy),
    )
    .with_workflow_queue(queue.clone());
    Harness {
        service,
        store,
        mock,
        queue,
    }
}

fn performance_request(
    split_id: &str,
    warning: TestThreshold,
    fail: TestThreshold,
) -> CreatePerformanceTestRequest {
    CreatePerformanceTestRequest {
        project_id: "p1".to_string(),
        split_id: split_id.to_string(),
        segment_id: SegmentId::empty(),
        test_definition: PerformanceTest {
            accuracy_type: Some(AccuracyType::RecallOfPositives),
            threshold_warning: warning,
            threshold_fail: fail,
        },
        test_name: String::new(),
        description: String::new(),
        autorun: true,
        overwrite: false,
    }
}

fn results_for_model(harness: &Harness) -> mts_service::TestResultsResponse {
    harness
        .service
        .get_test_results_for_model(
            &ctx(),
            &GetTestResultsRequest {
                project_id: "p1".to_string(),
                model_id: "m1".to_string(),
                split_id: None,
                test_type: None,
            },
        )
        .expect("evaluation")
}

#[test]
fn test_performance_absolute_threshold() {
    let h = harness();
    h.mock
        .set_performance("m1", "s-holdout1", AccuracyType::RecallOfPositives, None, 0.80);
    h.service
        .create_performance_test(
            &ctx(),
            &performance_request(
                "s-holdout1",
                TestThreshold::absolute_value(0.85, ValueCondition::FailIfLessThan),
                TestThreshold::absolute_value(0.70, ValueCondition::FailIfLessThan),
            ),
        )
        .expect("create");

    let response = results_for_model(&h);
    assert_eq!(response.performance_test_results.len(), 1);
    let result = &response.performance_test_results[0];
    assert!((result.metric_value - 0.80).abs() < 1e-12);
    assert_eq!(result.result_kind, mts_core::ResultKind::Value);
    assert_eq!(result.warning, ThresholdOutcome::Fail);
    assert_eq!(result.pass_fail, ThresholdOutcome::Pass);
    assert!(response.pending_operation_ids.is_empty());
}

#[test]
fn test_performance_relative_threshold_scales_reference() {
    let h = harness();
    h.mock
        .set_performance("m1", "s-holdout1", AccuracyType::RecallOfPositives, None, 0.80);
    h.mock
        .set_performance("m1", "s-ref", AccuracyType::RecallOfPositives, None, 0.90);
    h.service
        .create_performance_test(
            &ctx(),
            &performance_request(
                "s-holdout1",
                TestThreshold::relative_value(-0.10, ValueCondition::FailIfLessThan)
                    .with_reference_split("s-ref"),
                TestThreshold::unset(),
            ),
        )
        .expect("create");

    let response = results_for_model(&h);
    let result = &response.performance_test_results[0];
    // effective threshold = 0.90 + (-0.10 * 0.90) = 0.81 > 0.80
    assert_eq!(result.warning, ThresholdOutcome::Fail);
    assert_eq!(result.pass_fail, ThresholdOutcome::Undefined);
}

#[test]
fn test_relative_threshold_falls_back_to_train_split() {
    let h = harness();
    h.mock
        .set_performance("m1", "s-holdout1", AccuracyType::RecallOfPositives, None, 0.82);
    h.mock
        .set_performance("m1", "s-train", AccuracyType::RecallOfPositives, None, 0.80);
    h.service
        .create_performance_test(
            &ctx(),
            &performance_request(
                "s-holdout1",
                TestThreshold::relative_value(0.0, ValueCondition::FailIfLessThan),
                TestThreshold::unset(),
            ),
        )
        .expect("create");

    let response = results_for_model(&h);
    // 0.82 >= 0.80: no degradation against the train split
    assert_eq!(
        response.performance_test_results[0].warning,
        ThresholdOutcome::Pass
    );
}

#[test]
fn test_stability_wasserstein_ranges() {
    let h = harness();
    h.mock.set_distance(
        "s-train",
        "s-holdout1",
        DistanceType::NumericalWasserstein,
        0.25,
    );
    h.service
        .create_stability_test(
            &ctx(),
            &CreateStabilityTestRequest {
                project_id: "p1".to_string(),
                split_id: "s-holdout1".to_string(),
                segment_id: SegmentId::empty(),
                test_definition: StabilityTest {
                    distance_type: DistanceType::NumericalWasserstein,
                    base_split_id: Some("s-train".to_string()),
                    threshold_warning: TestThreshold::absolute_range(
                        0.0,
                        0.20,
                        RangeCondition::FailIfOutside,
                    ),
                    threshold_fail: TestThreshold::absolute_range(
                        0.0,
                        0.30,
                        RangeCondition::FailIfOutside,
                    ),
                },
                test_name: String::new(),
                description: String::new(),
                autorun: true,
                overwrite: false,
            },
        )
        .expect("create");

    let response = results_for_model(&h);
    assert_eq!(response.stability_test_results.len(), 1);
    let result = &response.stability_test_results[0];
    assert!((result.metric_value - 0.25).abs() < 1e-12);
    assert_eq!(result.warning, ThresholdOutcome::Fail);
    assert_eq!(result.pass_fail, ThresholdOutcome::Pass);
}

#[test]
fn test_fairness_range_pass() {
    let h = harness();
    h.mock.set_bias(
        "s-holdout1",
        "gender == \"F\"",
        Some("gender == \"M\""),
        BiasType::DisparateImpact,
        1.15,
    );
    h.service
        .create_fairness_test(
            &ctx(),
            &CreateFairnessTestRequest {
                project_id: "p1".to_string(),
                split_id: "s-holdout1".to_string(),
                segment_id: SegmentId::empty(),
                test_definition: FairnessTest {
                    bias_type: BiasType::DisparateImpact,
                    protected: SegmentId::new("sg1", "Female"),
                    comparison: SegmentId::new("sg1", "Male"),
                    protected_segment_name_regex: None,
                    threshold_warning: TestThreshold::absolute_range(
                        0.80,
                        1.25,
                        RangeCondition::FailIfOutside,
                    ),
                    threshold_fail: TestThreshold::unset(),
                },
                test_name: String::new(),
                description: String::new(),
                autorun: true,
                overwrite: false,
            },
        )
        .expect("create");

    let response = results_for_model(&h);
    assert_eq!(response.fairness_test_results.len(), 1);
    let result = &response.fairness_test_results[0];
    assert!((result.metric_value - 1.15).abs() < 1e-12);
    assert_eq!(result.warning, ThresholdOutcome::Pass);
}

#[test]
fn test_feature_importance_count_thresholds() {
    let h = harness();
    let mut importances = BTreeMap::new();
    for i in 0..12 {
        importances.insert(format!("weak_{i}"), 0.001);
    }
    for i in 0..28 {
        importances.insert(format!("strong_{i}"), 0.5);
    }
    h.mock.set_importances("m1", "s-holdout1", importances);
    h.service
        .create_feature_importance_test(
            &ctx(),
            &CreateFeatureImportanceTestRequest {
                project_id: "p1".to_string(),
                split_id: "s-holdout1".to_string(),
                segment_id: SegmentId::empty(),
                test_definition: FeatureImportanceTest {
                    background_split_id: "s-train".to_string(),
                    score_type: ScoreType::ClassificationProbits,
                    min_importance_value: 0.01,
                    threshold_warning: TestThreshold::absolute_value(
                        10.0,
                        ValueCondition::FailIfGreaterThan,
                    ),
                    threshold_fail: TestThreshold::absolute_value(
                        20.0,
                        ValueCondition::FailIfGreaterThan,
                    ),
                },
                test_name: String::new(),
                description: String::new(),
                autorun: true,
                overwrite: false,
            },
        )
        .expect("create");

    let response = results_for_model(&h);
    assert_eq!(response.feature_importance_test_results.len(), 1);
    let result = &response.feature_importance_test_results[0];
    assert!((result.metric_value - 12.0).abs() < 1e-12);
    assert_eq!(result.warning, ThresholdOutcome::Fail);
    assert_eq!(result.pass_fail, ThresholdOutcome::Pass);
}

#[test]
fn test_regex_group_expands_per_split_at_evaluation_time() {
    let h = harness();
    h.mock
        .set_performance("m1", "s-holdout1", AccuracyType::RecallOfPositives, None, 0.9);
    h.mock
        .set_performance("m1", "s-holdout2", AccuracyType::RecallOfPositives, None, 0.7);
    h.service
        .create_performance_test_group(
            &ctx(),
            &CreatePerformanceTestGroupRequest {
                group: TestGroupSpec {
                    project_id: "p1".to_string(),
                    test_name: "holdout recall".to_string(),
                    split_name_regex: Some("holdout_.*".to_string()),
                    data_collection_ids: vec!["dc1".to_string()],
                    ..TestGroupSpec::default()
                },
                test_definition: PerformanceTest {
                    accuracy_type: Some(AccuracyType::RecallOfPositives),
                    threshold_warning: TestThreshold::absolute_value(
                        0.85,
                        ValueCondition::FailIfLessThan,
                    ),
                    threshold_fail: TestThreshold::unset(),
                },
            },
        )
        .expect("create group");

    let response = results_for_model(&h);
    assert_eq!(response.performance_test_results.len(), 2);
    let mut split_ids: Vec<&str> = response
        .performance_test_results
        .iter()
        .map(|r| r.test_details.target.split_id().expect("concrete split"))
        .collect();
    split_ids.sort_unstable();
    assert_eq!(split_ids, vec!["s-holdout1", "s-holdout2"]);
}

#[test]
fn test_group_round_trip_reports_inputs() {
    let h = harness();
    let response = h
        .service
        .create_performance_test_group(
            &ctx(),
            &CreatePerformanceTestGroupRequest {
                group: TestGroupSpec {
                    project_id: "p1".to_string(),
                    test_name: "segmented recall".to_string(),
                    split_ids: vec!["s-holdout1".to_string(), "s-holdout2".to_string()],
                    segment_ids: vec![SegmentId::new("sg1", "Female")],
                    ..TestGroupSpec::default()
                },
                test_definition: PerformanceTest {
                    accuracy_type: Some(AccuracyType::RecallOfPositives),
                    threshold_warning: TestThreshold::unset(),
                    threshold_fail: TestThreshold::unset(),
                },
            },
        )
        .expect("create group");
    assert_eq!(response.test_ids.len(), 2);

    let groups = h
        .service
        .get_model_test_groups(
            &ctx(),
            &GetModelTestGroupsRequest {
                project_id: "p1".to_string(),
                ..GetModelTestGroupsRequest::default()
            },
        )
        .expect("groups");
    assert_eq!(groups.len(), 1);
    let group = &groups[0];
    assert_eq!(group.test_group_id, response.test_group_id);
    assert_eq!(
        group.split_ids,
        vec!["s-holdout1".to_string(), "s-holdout2".to_string()]
    );
    assert_eq!(group.segment_ids, vec![SegmentId::new("sg1", "Female")]);
    assert_eq!(group.test_name, "segmented recall");
}

#[test]
fn test_group_upsert_replaces_members() {
    let h = harness();
    let first = h
        .service
        .create_performance_test_group(
            &ctx(),
            &CreatePerformanceTestGroupRequest {
                group: TestGroupSpec {
                    project_id: "p1".to_string(),
                    test_name: "recall gate".to_string(),
                    split_ids: vec!["s-holdout1".to_string(), "s-holdout2".to_string()],
                    ..TestGroupSpec::default()
                },
                test_definition: PerformanceTest {
                    accuracy_type: Some(AccuracyType::RecallOfPositives),
                    threshold_warning: TestThreshold::unset(),
                    threshold_fail: TestThreshold::unset(),
                },
            },
        )
        .expect("create group");
    assert_eq!(h.store.len(), 2);

    let second = h
        .service
        .create_performance_test_group(
            &ctx(),
            &CreatePerformanceTestGroupRequest {
                group: TestGroupSpec {
                    project_id: "p1".to_string(),
                    test_group_id: Some(first.test_group_id.clone()),
                    test_name: "recall gate".to_string(),
                    split_ids: vec!["s-holdout1".to_string()],
                    ..TestGroupSpec::default()
                },
                test_definition: PerformanceTest {
                    accuracy_type: Some(AccuracyType::RecallOfPositives),
                    threshold_warning: TestThreshold::unset(),
                    threshold_fail: TestThreshold::unset(),
                },
            },
        )
        .expect("upsert group");
    assert_eq!(second.test_group_id, first.test_group_id);
    // Old members removed after the new row went in
    assert_eq!(h.store.len(), 1);
}

#[test]
fn test_overwrite_replaces_single_row_by_identity() {
    let h = harness();
    let first = h
        .service
        .create_performance_test(
            &ctx(),
            &performance_request(
                "s-holdout1",
                TestThreshold::absolute_value(0.85, ValueCondition::FailIfLessThan),
                TestThreshold::unset(),
            ),
        )
        .expect("create");
    assert_eq!(h.store.len(), 1);

    let mut request = performance_request(
        "s-holdout1",
        TestThreshold::absolute_value(0.95, ValueCondition::FailIfLessThan),
        TestThreshold::unset(),
    );
    request.overwrite = true;
    let second = h.service.create_performance_test(&ctx(), &request).expect("overwrite");

    // Same logical row: same id, same group, one row total, new payload
    assert_eq!(second.test_id, first.test_id);
    assert_eq!(second.test_group_id, first.test_group_id);
    assert_eq!(h.store.len(), 1);
    let stored = h.store.all().expect("all");
    let TestPayload::Performance(payload) = &stored[0].payload else {
        panic!("expected performance payload");
    };
    let spec = payload.threshold_warning.spec.as_ref().expect("spec");
    assert!(spec.values().contains(&0.95));
}

#[test]
fn test_duplicate_name_rejected() {
    let h = harness();
    let mut request = performance_request("s-holdout1", TestThreshold::unset(), TestThreshold::unset());
    request.test_name = "unique name".to_string();
    h.service.create_performance_test(&ctx(), &request).expect("create");

    let mut duplicate = performance_request("s-holdout2", TestThreshold::unset(), TestThreshold::unset());
    duplicate.test_name = "unique name".to_string();
    let err = h.service.create_performance_test(&ctx(), &duplicate).unwrap_err();
    assert!(matches!(err, Error::AlreadyExists(_)));
}

#[test]
fn test_production_split_rejected() {
    let h = harness();
    let err = h
        .service
        .create_performance_test(
            &ctx(),
            &performance_request("s-prod", TestThreshold::unset(), TestThreshold::unset()),
        )
        .unwrap_err();
    assert!(matches!(err, Error::Unsupported(_)));
}

#[test]
fn test_cross_collection_reference_rejected_at_create() {
    let h = harness();
    let err = h
        .service
        .create_performance_test(
            &ctx(),
            &performance_request(
                "s-holdout1",
                TestThreshold::relative_value(0.0, ValueCondition::FailIfLessThan)
                    .with_reference_split("s-other"),
                TestThreshold::unset(),
            ),
        )
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}

#[test]
fn test_pending_metrics_surface_operation_ids() {
    let h = harness();
    h.mock.set_performance_pending(
        "m1",
        "s-holdout1",
        AccuracyType::RecallOfPositives,
        None,
        "op-42",
    );
    let created = h
        .service
        .create_performance_test(
            &ctx(),
            &performance_request(
                "s-holdout1",
                TestThreshold::absolute_value(0.85, ValueCondition::FailIfLessThan),
                TestThreshold::unset(),
            ),
        )
        .expect("create");

    let response = results_for_model(&h);
    assert_eq!(response.pending_operation_ids, vec!["op-42".to_string()]);
    assert_eq!(response.pending_test_ids, vec![created.test_id]);
    let result = &response.performance_test_results[0];
    assert!(result.metric_value.is_nan());
    assert_eq!(result.warning, ThresholdOutcome::Undefined);
    assert_eq!(result.pass_fail, ThresholdOutcome::Undefined);
}

#[test]
fn test_dangling_split_reference_surfaces_unavailable() {
    let h = harness();
    h.service
        .create_performance_test(
            &ctx(),
            &performance_request(
                "s-holdout1",
                TestThreshold::absolute_value(0.85, ValueCondition::FailIfLessThan),
                TestThreshold::unset(),
            ),
        )
        .expect("create");
    // Nothing programmed in the engine for this (model, split)
    let response = results_for_model(&h);
    let result = &response.performance_test_results[0];
    assert_eq!(result.result_kind, mts_core::ResultKind::PredictionUnavailable);
    assert!(result.metric_value.is_nan());
    let message = result.error_message.as_deref().expect("message");
    assert!(message.starts_with("Error in determining test result:"));
}

#[test]
fn test_reference_metric_is_cached_across_evaluations() {
    let h = harness();
    h.mock
        .set_performance("m1", "s-holdout1", AccuracyType::RecallOfPositives, None, 0.80);
    h.mock
        .set_performance("m1", "s-ref", AccuracyType::RecallOfPositives, None, 0.90);
    h.service
        .create_performance_test(
            &ctx(),
            &performance_request(
                "s-holdout1",
                TestThreshold::relative_value(-0.10, ValueCondition::FailIfLessThan)
                    .with_reference_split("s-ref"),
                TestThreshold::unset(),
            ),
        )
        .expect("create");

    let first = results_for_model(&h);
    let second = results_for_model(&h);
    assert_eq!(
        first.performance_test_results[0].warning,
        second.performance_test_results[0].warning
    );
    // Two evaluation batches, but only one reference lookup: the second hits
    // the cache within its TTL window.
    assert_eq!(h.mock.performance_calls(), 3);
}

#[test]
fn test_bootstrapper_creates_defaults_idempotently() {
    let h = harness();
    let first = h
        .service
        .create_tests_from_split(
            &ctx(),
            &CreateTestsFromSplitRequest {
                project_id: "p1".to_string(),
                split_id: "s-holdout1".to_string(),
            },
        )
        .expect("bootstrap");
    // One performance, one fairness (single configured bias band), one
    // stability
    assert_eq!(first.len(), 3);
    let types: Vec<TestType> = first.iter().map(mts_core::ModelTest::test_type).collect();
    assert!(types.contains(&TestType::Performance));
    assert!(types.contains(&TestType::Fairness));
    assert!(types.contains(&TestType::Stability));
    for test in &first {
        assert!(test.autorun);
        assert!(!test.test_group_id.is_empty());
        assert_eq!(test.target.split_name_regex(), Some(".*"));
    }

    let second = h
        .service
        .create_tests_from_split(
            &ctx(),
            &CreateTestsFromSplitRequest {
                project_id: "p1".to_string(),
                split_id: "s-holdout2".to_string(),
            },
        )
        .expect("bootstrap again");
    assert!(second.is_empty());
    assert_eq!(h.store.len(), 3);
}

#[test]
fn test_bootstrapper_rejects_production_split() {
    let h = harness();
    let err = h
        .service
        .create_tests_from_split(
            &ctx(),
            &CreateTestsFromSplitRequest {
                project_id: "p1".to_string(),
                split_id: "s-prod".to_string(),
            },
        )
        .unwrap_err();
    assert!(matches!(err, Error::Unsupported(_)));
}

#[test]
fn test_baseline_workflow_enqueued_with_idempotent_id() {
    let h = harness();
    let response = h
        .service
        .start_baseline_model_workflow(
            &ctx(),
            &StartBaselineWorkflowRequest {
                project_id: "p1".to_string(),
                data_collection_id: "dc1".to_string(),
                split_id: "s-holdout1".to_string(),
            },
        )
        .expect("start workflow");
    assert!(response.workflow_id.starts_with("test_creation_workflow_"));
    assert_eq!(h.queue.workflow_ids(), vec![response.workflow_id.clone()]);
    let job = h.queue.job(&response.workflow_id).expect("job");
    assert_eq!(job.split_id, "s-holdout1");
    assert_eq!(job.context.caller, "tester");
}

#[test]
fn test_legacy_rows_get_group_ids_at_startup() {
    let catalog = fixture_catalog();
    let store = Arc::new(InMemoryTestStore::new());
    store
        .insert(mts_core::ModelTest {
            id: "t-legacy".to_string(),
            test_group_id: String::new(),
            project_id: "p1".to_string(),
            target: mts_core::TestTarget::Split {
                data_collection_id: "dc1".to_string(),
                split_id: "s-holdout1".to_string(),
            },
            segment: SegmentId::empty(),
            test_name: String::new(),
            description: String::new(),
            autorun: true,
            payload: TestPayload::Performance(PerformanceTest {
                accuracy_type: Some(AccuracyType::Auc),
                threshold_warning: TestThreshold::unset(),
                threshold_fail: TestThreshold::unset(),
            }),
        })
        .expect("seed legacy row");

    let _service = ModelTestService::new(
        ServiceConfig::default(),
        catalog,
        store.clone(),
        Arc::new(MockMetricClient::new()) as Arc<dyn MetricClient>,
        Arc::new(AllowAllPolicy),
    );
    let repaired = store.all().expect("all");
    assert_eq!(repaired[0].test_group_id, "t-legacy");
}

#[test]
fn test_denied_caller_cannot_create() {
    let catalog = fixture_catalog();
    let service = ModelTestService::new(
        ServiceConfig::default(),
        catalog,
        Arc::new(InMemoryTestStore::new()),
        Arc::new(MockMetricClient::new()) as Arc<dyn MetricClient>,
        Arc::new(DenyAllPolicy),
    );
    let err = service
        .create_performance_test(
            &ctx(),
            &performance_request("s-holdout1", TestThreshold::unset(), TestThreshold::unset()),
        )
        .unwrap_err();
    assert!(matches!(err, Error::PermissionDenied(_)));
}

#[test]
fn test_delete_group_and_split_cascade() {
    let h = harness();
    let group = h
        .service
        .create_performance_test_group(
            &ctx(),
            &CreatePerformanceTestGroupRequest {
                group: TestGroupSpec {
                    project_id: "p1".to_string(),
                    test_name: "to delete".to_string(),
                    split_ids: vec!["s-holdout1".to_string(), "s-holdout2".to_string()],
                    ..TestGroupSpec::default()
                },
                test_definition: PerformanceTest {
                    accuracy_type: Some(AccuracyType::RecallOfPositives),
                    threshold_warning: TestThreshold::unset(),
                    threshold_fail: TestThreshold::unset(),
                },
            },
        )
        .expect("create group");

    let deleted = h
        .service
        .delete_model_test_group(&ctx(), "p1", &group.test_group_id)
        .expect("delete group");
    assert_eq!(deleted.deleted_test_ids.len(), 2);
    assert!(h.store.is_empty());

    // Split cascade
    h.service
        .create_performance_test(
            &ctx(),
            &performance_request("s-holdout1", TestThreshold::unset(), TestThreshold::unset()),
        )
        .expect("create");
    let removed = h
        .service
        .delete_model_tests_for_split(&ctx(), "p1", "s-holdout1")
        .expect("cascade");
    assert_eq!(removed.deleted_tests.len(), 1);
    assert!(h.store.is_empty());
}

#[test]
fn test_data_splits_from_regex_preview() {
    let h = harness();
    let splits = h
        .service
        .get_data_splits_from_regex(
            &ctx(),
            &GetDataSplitsFromRegexRequest {
                project_id: "p1".to_string(),
                split_name_regex: "holdout_.*".to_string(),
                data_collection_ids: vec!["dc1".to_string()],
                data_collection_name_regex: None,
            },
        )
        .expect("preview");
    let ids: Vec<&str> = splits.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["s-holdout1", "s-holdout2"]);

    let err = h
        .service
        .get_data_splits_from_regex(
            &ctx(),
            &GetDataSplitsFromRegexRequest {
                project_id: "p1".to_string(),
                split_name_regex: ".*".to_string(),
                data_collection_ids: vec!["dc1".to_string()],
                data_collection_name_regex: Some("loa.*".to_string()),
            },
        )
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}

#[test]
fn test_invalid_regex_is_invalid_argument_naming_field() {
    let h = harness();
    let err = h
        .service
        .get_data_splits_from_regex(
            &ctx(),
            &GetDataSplitsFromRegexRequest {
                project_id: "p1".to_string(),
                split_name_regex: "holdout_(".to_string(),
                data_collection_ids: vec!["dc1".to_string()],
                data_collection_name_regex: None,
            },
        )
        .unwrap_err();
    match err {
        Error::InvalidRegex { field, .. } => assert_eq!(field, "split_name_regex"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_fairness_regex_expands_to_protected_segments() {
    let h = harness();
    h.mock.set_bias(
        "s-holdout1",
        "gender == \"F\"",
        None,
        BiasType::DisparateImpact,
        0.5,
    );
    h.service
        .create_fairness_test(
            &ctx(),
            &CreateFairnessTestRequest {
                project_id: "p1".to_string(),
                split_id: "s-holdout1".to_string(),
                segment_id: SegmentId::empty(),
                test_definition: FairnessTest {
                    bias_type: BiasType::DisparateImpact,
                    protected: SegmentId::empty(),
                    comparison: SegmentId::empty(),
                    protected_segment_name_regex: Some(".*".to_string()),
                    threshold_warning: TestThreshold::absolute_range(
                        0.8,
                        1.25,
                        RangeCondition::FailIfOutside,
                    ),
                    threshold_fail: TestThreshold::unset(),
                },
                test_name: String::new(),
                description: String::new(),
                autorun: true,
                overwrite: false,
            },
        )
        .expect("create");

    let response = results_for_model(&h);
    // Only "Female" is protected, so the regex expands to one slot with an
    // empty comparison segment
    assert_eq!(response.fairness_test_results.len(), 1);
    let result = &response.fairness_test_results[0];
    let TestPayload::Fairness(payload) = &result.test_details.payload else {
        panic!("expected fairness payload");
    };
    assert_eq!(payload.protected, SegmentId::new("sg1", "Female"));
    assert!(payload.comparison.is_empty());
    assert!((result.metric_value - 0.5).abs() < 1e-12);
    // 0.5 is outside [0.8, 1.25]
    assert_eq!(result.warning, ThresholdOutcome::Fail);
}
