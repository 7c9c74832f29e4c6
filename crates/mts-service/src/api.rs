//! RPC request and response types
//!
//! Transport-agnostic message shapes for the service surface. Field names
//! mirror their purpose; a transport adapter maps them onto its own encoding.

use mts_core::test::{
    FairnessTest, FeatureImportanceTest, PerformanceTest, StabilityTest, TestPayload,
};
use mts_core::types::{SegmentId, TestType};
use mts_core::{ModelTest, TestResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Create a single performance test against a concrete split
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePerformanceTestRequest {
    /// Project scope
    pub project_id: String,
    /// Target split
    pub split_id: String,
    /// Optional row segment
    #[serde(default)]
    pub segment_id: SegmentId,
    /// The test definition
    pub test_definition: PerformanceTest,
    /// Display name, unique per project when non-empty
    #[serde(default)]
    pub test_name: String,
    /// Free-form description
    #[serde(default)]
    pub description: String,
    /// Whether the test runs automatically
    #[serde(default)]
    pub autorun: bool,
    /// Replace the single row matching the type-specific identity tuple
    #[serde(default)]
    pub overwrite: bool,
}

/// Create a single stability test against a concrete split
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateStabilityTestRequest {
    /// Project scope
    pub project_id: String,
    /// Target (comparison) split
    pub split_id: String,
    /// Optional row segment
    #[serde(default)]
    pub segment_id: SegmentId,
    /// The test definition
    pub test_definition: StabilityTest,
    /// Display name
    #[serde(default)]
    pub test_name: String,
    /// Free-form description
    #[serde(default)]
    pub description: String,
    /// Whether the test runs automatically
    #[serde(default)]
    pub autorun: bool,
    /// Replace the single row matching the identity tuple
    #[serde(default)]
    pub overwrite: bool,
}

/// Create a single fairness test against a concrete split
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateFairnessTestRequest {
    /// Project scope
    pub project_id: String,
    /// Target split
    pub split_id: String,
    /// Optional row segment
    #[serde(default)]
    pub segment_id: SegmentId,
    /// The test definition
    pub test_definition: FairnessTest,
    /// Display name
    #[serde(default)]
    pub test_name: String,
    /// Free-form description
    #[serde(default)]
    pub description: String,
    /// Whether the test runs automatically
    #[serde(default)]
    pub autorun: bool,
    /// Replace the single row matching the identity tuple
    #[serde(default)]
    pub overwrite: bool,
}

/// Create a single feature importance test against a concrete split
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateFeatureImportanceTestRequest {
    /// Project scope
    pub project_id: String,
    /// Target split
    pub split_id: String,
    /// Optional row segment
    #[serde(default)]
    pub segment_id: SegmentId,
    /// The test definition
    pub test_definition: FeatureImportanceTest,
    /// Display name
    #[serde(default)]
    pub test_name: String,
    /// Free-form description
    #[serde(default)]
    pub description: String,
    /// Whether the test runs automatically
    #[serde(default)]
    pub autorun: bool,
    /// Replace the single row matching the identity tuple
    #[serde(default)]
    pub overwrite: bool,
}

/// Response for single-test creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTestResponse {
    /// Id of the created or replaced test
    pub test_id: String,
    /// Group the test belongs to
    pub test_group_id: String,
}

/// Shared scaffold for group-creation requests.
///
/// Targets either concrete `split_ids` x `segment_ids` (expanded as a
/// Cartesian product into individual rows) or a `split_name_regex` scoped by
/// collection ids or a collection name regex. Supplying `test_group_id`
/// upserts the group: new rows are inserted, then existing members removed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestGroupSpec {
    /// Project scope
    pub project_id: String,
    /// Existing group to replace, if any
    #[serde(default)]
    pub test_group_id: Option<String>,
    /// Display name; required for groups
    #[serde(default)]
    pub test_name: String,
    /// Free-form description
    #[serde(default)]
    pub description: String,
    /// Concrete target splits
    #[serde(default)]
    pub split_ids: Vec<String>,
    /// Regex target over split names
    #[serde(default)]
    pub split_name_regex: Option<String>,
    /// Collections searched by the regex target
    #[serde(default)]
    pub data_collection_ids: Vec<String>,
    /// Collections searched by name
    #[serde(default)]
    pub data_collection_name_regex: Option<String>,
    /// Segments expanded against each target split
    #[serde(default)]
    pub segment_ids: Vec<SegmentId>,
    /// Per-collection base (stability) or background (feature importance)
    /// split
    #[serde(default)]
    pub data_collection_id_to_base_split_id: BTreeMap<String, String>,
    /// Protected segments for fairness groups
    #[serde(default)]
    pub protected_segment_ids: Vec<SegmentId>,
    /// Comparison segments, aligned with `protected_segment_ids`
    #[serde(default)]
    pub comparison_segment_ids: Vec<SegmentId>,
}

/// Create a group of performance tests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePerformanceTestGroupRequest {
    /// Group targets and metadata
    pub group: TestGroupSpec,
    /// The shared test definition
    pub test_definition: PerformanceTest,
}

/// Create a group of stability tests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateStabilityTestGroupRequest {
    /// Group targets and metadata
    pub group: TestGroupSpec,
    /// The shared test definition
    pub test_definition: StabilityTest,
}

/// Create a group of fairness tests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateFairnessTestGroupRequest {
    /// Group targets and metadata
    pub group: TestGroupSpec,
    /// The shared test definition
    pub test_definition: FairnessTest,
}

/// Create a group of feature importance tests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateFeatureImportanceTestGroupRequest {
    /// Group targets and metadata
    pub group: TestGroupSpec,
    /// The shared test definition
    pub test_definition: FeatureImportanceTest,
}

/// Response for group creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTestGroupResponse {
    /// The group all created tests share
    pub test_group_id: String,
    /// Ids of the created tests
    pub test_ids: Vec<String>,
}

/// Filters for listing tests
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetModelTestsRequest {
    /// Project scope
    pub project_id: String,
    /// Restrict to one test type
    #[serde(default)]
    pub test_type: Option<TestType>,
    /// Restrict to tests targeting this collection
    #[serde(default)]
    pub data_collection_id: Option<String>,
    /// Restrict to tests targeting this split
    #[serde(default)]
    pub split_id: Option<String>,
    /// Restrict to one test id
    #[serde(default)]
    pub test_id: Option<String>,
    /// Restrict to an exact test name
    #[serde(default)]
    pub test_name: Option<String>,
}

/// Filters for listing test groups
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetModelTestGroupsRequest {
    /// Project scope
    pub project_id: String,
    /// Restrict to one test type
    #[serde(default)]
    pub test_type: Option<TestType>,
    /// Restrict to tests targeting this collection
    #[serde(default)]
    pub data_collection_id: Option<String>,
    /// Restrict to tests targeting this split
    #[serde(default)]
    pub split_id: Option<String>,
    /// Restrict to one group
    #[serde(default)]
    pub test_group_id: Option<String>,
    /// Restrict to an exact test name
    #[serde(default)]
    pub test_name: Option<String>,
}

/// A group of tests collapsed into one view, reconstructed from its members
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelTestGroupView {
    /// Project scope
    pub project_id: String,
    /// The group id
    pub test_group_id: String,
    /// Shared display name
    pub test_name: String,
    /// Shared description
    pub description: String,
    /// Concrete target splits across members
    pub split_ids: Vec<String>,
    /// Regex target, when members target by name
    pub split_name_regex: Option<String>,
    /// Concrete collections across regex members
    pub data_collection_ids: Vec<String>,
    /// Collection name regex, when members target collections by name
    pub data_collection_name_regex: Option<String>,
    /// Segments across members
    pub segment_ids: Vec<SegmentId>,
    /// Protected segments across fairness members
    pub protected_segment_ids: Vec<SegmentId>,
    /// Comparison segments across fairness members
    pub comparison_segment_ids: Vec<SegmentId>,
    /// Protected segment regex, when fairness members use one
    pub protected_segment_name_regex: Option<String>,
    /// Base/background split per collection, from stability and feature
    /// importance members
    pub data_collection_id_to_base_split_id: BTreeMap<String, String>,
    /// Representative definition shared by the members
    pub test_definition: TestPayload,
}

/// Evaluate all tests in scope for a model
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetTestResultsRequest {
    /// Project scope
    pub project_id: String,
    /// Model to evaluate
    pub model_id: String,
    /// Restrict to one split
    #[serde(default)]
    pub split_id: Option<String>,
    /// Restrict to one test type
    #[serde(default)]
    pub test_type: Option<TestType>,
}

/// Best-effort, possibly partial evaluation response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestResultsResponse {
    /// Performance test results
    pub performance_test_results: Vec<TestResult>,
    /// Stability test results
    pub stability_test_results: Vec<TestResult>,
    /// Fairness test results
    pub fairness_test_results: Vec<TestResult>,
    /// Feature importance test results
    pub feature_importance_test_results: Vec<TestResult>,
    /// Operation ids of metric jobs still running
    pub pending_operation_ids: Vec<String>,
    /// Tests waiting on those operations
    pub pending_test_ids: Vec<String>,
}

/// Resolver preview: expand a split regex without creating anything
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetDataSplitsFromRegexRequest {
    /// Project scope
    pub project_id: String,
    /// Split name pattern
    pub split_name_regex: String,
    /// Collections to search by id
    #[serde(default)]
    pub data_collection_ids: Vec<String>,
    /// Collections to search by name
    #[serde(default)]
    pub data_collection_name_regex: Option<String>,
}

/// Synchronously seed default tests for a newly ingested split
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateTestsFromSplitRequest {
    /// Project scope
    pub project_id: String,
    /// The newly ingested split
    pub split_id: String,
}

/// Enqueue the long-running baseline creation workflow
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartBaselineWorkflowRequest {
    /// Project scope
    pub project_id: String,
    /// Collection of the newly ingested split
    pub data_collection_id: String,
    /// The newly ingested split
    pub split_id: String,
}

/// Handle for polling the enqueued workflow
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartBaselineWorkflowResponse {
    /// Durable workflow id; empty when no workflow engine is configured
    pub workflow_id: String,
}

/// Response for test deletion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteModelTestResponse {
    /// The removed test
    pub deleted_test: ModelTest,
}

/// Response for group deletion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteModelTestGroupResponse {
    /// Ids of the removed tests
    pub deleted_test_ids: Vec<String>,
}

/// Response for split-cascade deletion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteModelTestsForSplitResponse {
    /// The removed tests
    pub deleted_tests: Vec<ModelTest>,
}
