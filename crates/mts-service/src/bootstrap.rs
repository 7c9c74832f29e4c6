//! Baseline test bootstrapping
//!
//! When a new split is ingested, a sensible default test set is created: one
//! performance test, one stability test, and one fairness test per configured
//! bias band. Defaults are matched by canonical name, so re-running the
//! bootstrapper never duplicates them. The long-running variant is enqueued
//! as a durable workflow on the external orchestrator.

use crate::config::ServiceConfig;
use mts_core::test::{
    CollectionRef, FairnessTest, PerformanceTest, StabilityTest, TestPayload, TestTarget,
};
use mts_core::threshold::{RangeCondition, TestThreshold, ValueCondition};
use mts_core::types::{DistanceType, ScoreType, SegmentId};
use mts_core::{ModelTest, RequestContext, Result, new_id};
use mts_store::BiasConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Canonical name of the bootstrapped performance test
pub const DEFAULT_PERFORMANCE_TEST_NAME: &str = "Default Performance Test";
/// Canonical name of the bootstrapped fairness tests
pub const DEFAULT_FAIRNESS_TEST_NAME: &str = "Default Fairness Test";
/// Canonical name of the bootstrapped stability test
pub const DEFAULT_STABILITY_TEST_NAME: &str = "Default Stability Test";

fn wildcard_target() -> TestTarget {
    TestTarget::Regex {
        split_name_regex: ".*".to_string(),
        collection: CollectionRef::NameRegex(".*".to_string()),
    }
}

/// The default performance test for a project.
///
/// Warning threshold is a relative single value at 0 — any degradation
/// against the reference fires — with the direction set by score type. The
/// fail threshold is left unset and never fires.
#[must_use]
pub fn default_performance_test(
    project_id: &str,
    score_type: ScoreType,
    config: &ServiceConfig,
) -> ModelTest {
    let condition = if score_type.is_regression() {
        // Lower error is better, so degradation means a larger value
        ValueCondition::FailIfGreaterThan
    } else {
        ValueCondition::FailIfLessThan
    };
    ModelTest {
        id: new_id(),
        test_group_id: new_id(),
        project_id: project_id.to_string(),
        target: wildcard_target(),
        segment: SegmentId::empty(),
        test_name: DEFAULT_PERFORMANCE_TEST_NAME.to_string(),
        description: String::new(),
        autorun: true,
        payload: TestPayload::Performance(PerformanceTest {
            accuracy_type: Some(config.default_accuracy_for(score_type)),
            threshold_warning: TestThreshold::relative_value(0.0, condition),
            threshold_fail: TestThreshold::unset(),
        }),
    }
}

/// The default fairness tests for a project: one per configured bias band,
/// sharing one group so the canonical name stays unique per group.
///
/// Each uses the project's acceptable `[min, max]` as an absolute range that
/// warns outside the band, over every protected segment.
#[must_use]
pub fn default_fairness_tests(project_id: &str, bias_configs: &[BiasConfig]) -> Vec<ModelTest> {
    let group_id = new_id();
    bias_configs
        .iter()
        .map(|config| ModelTest {
            id: new_id(),
            test_group_id: group_id.clone(),
            project_id: project_id.to_string(),
            target: wildcard_target(),
            segment: SegmentId::empty(),
            test_name: DEFAULT_FAIRNESS_TEST_NAME.to_string(),
            description: String::new(),
            autorun: true,
            payload: TestPayload::Fairness(FairnessTest {
                bias_type: config.bias_type,
                protected: SegmentId::empty(),
                comparison: SegmentId::empty(),
                protected_segment_name_regex: Some(".*".to_string()),
                threshold_warning: TestThreshold::absolute_range(
                    config.acceptable_min,
                    config.acceptable_max,
                    RangeCondition::FailIfOutside,
                ),
                threshold_fail: TestThreshold::unset(),
            }),
        })
        .collect()
}

/// The default stability test for a project: Wasserstein distance on
/// numerical predictions with empty thresholds, so evaluation yields
/// `undefined` until the user tightens them.
#[must_use]
pub fn default_stability_test(project_id: &str) -> ModelTest {
    ModelTest {
        id: new_id(),
        test_group_id: new_id(),
        project_id: project_id.to_string(),
        target: wildcard_target(),
        segment: SegmentId::empty(),
        test_name: DEFAULT_STABILITY_TEST_NAME.to_string(),
        description: String::new(),
        autorun: true,
        payload: TestPayload::Stability(StabilityTest {
            distance_type: DistanceType::NumericalWasserstein,
            base_split_id: None,
            threshold_warning: TestThreshold::unset(),
            threshold_fail: TestThreshold::unset(),
        }),
    }
}

/// Everything the durable baseline workflow needs to run detached from the
/// originating RPC
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineWorkflowRequest {
    /// Caller context, forwarded so downstream auth keeps working
    pub context: RequestContext,
    /// Project scope
    pub project_id: String,
    /// Collection of the newly ingested split
    pub data_collection_id: String,
    /// The newly ingested split
    pub split_id: String,
}

/// Client seam for the external workflow orchestrator
pub trait WorkflowQueue: Send + Sync {
    /// Start a durable baseline-creation workflow under an idempotent id.
    ///
    /// Enqueueing an id that is already running must be a no-op.
    ///
    /// # Errors
    ///
    /// Transport-level failures.
    fn enqueue_baseline_creation(
        &self,
        workflow_id: &str,
        request: BaselineWorkflowRequest,
    ) -> Result<()>;
}

/// In-memory workflow queue for tests and embedded use
#[derive(Debug, Default)]
pub struct InMemoryWorkflowQueue {
    jobs: Mutex<BTreeMap<String, BaselineWorkflowRequest>>,
}

impl InMemoryWorkflowQueue {
    /// Create an empty queue
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids of all enqueued workflows
    #[must_use]
    pub fn workflow_ids(&self) -> Vec<String> {
        self.jobs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// The request enqueued under a workflow id
    #[must_use]
    pub fn job(&self, workflow_id: &str) -> Option<BaselineWorkflowRequest> {
        self.jobs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(workflow_id)
            .cloned()
    }
}

impl WorkflowQueue for InMemoryWorkflowQueue {
    fn enqueue_baseline_creation(
        &self,
        workflow_id: &str,
        request: BaselineWorkflowRequest,
    ) -> Result<()> {
        let mut jobs = self
            .jobs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        // Idempotent: a running workflow with this id keeps its request
        jobs.entry(workflow_id.to_string()).or_insert(request);
        Ok(())
    }
}
