//! Model Test Service
//!
//! The service surface: authn/z and audit at the gateway, request validation,
//! test creation with overwrite-by-identity and group expansion, batched test
//! evaluation against the metric engine, and the baseline bootstrapper that
//! seeds default tests for a newly ingested split.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
// Allow common patterns
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)]
// Allow common patterns in test code
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::redundant_clone))]
#![cfg_attr(test, allow(clippy::too_many_lines))]

pub mod api;
pub mod bootstrap;
pub mod config;
pub mod context;
pub mod evaluator;
pub mod service;
mod validate;

pub use api::{
    CreateFairnessTestGroupRequest, CreateFairnessTestRequest,
    CreateFeatureImportanceTestGroupRequest, CreateFeatureImportanceTestRequest,
    CreatePerformanceTestGroupRequest, CreatePerformanceTestRequest,
    CreateStabilityTestGroupRequest, CreateStabilityTestRequest, CreateTestGroupResponse,
    CreateTestResponse, CreateTestsFromSplitRequest, DeleteModelTestGroupResponse,
    DeleteModelTestResponse, DeleteModelTestsForSplitResponse, GetDataSplitsFromRegexRequest,
    GetModelTestGroupsRequest, GetModelTestsRequest, GetTestResultsRequest, ModelTestGroupView,
    StartBaselineWorkflowRequest, StartBaselineWorkflowResponse, TestGroupSpec,
    TestResultsResponse,
};
pub use bootstrap::{
    BaselineWorkflowRequest, DEFAULT_FAIRNESS_TEST_NAME, DEFAULT_PERFORMANCE_TEST_NAME,
    DEFAULT_STABILITY_TEST_NAME, InMemoryWorkflowQueue, WorkflowQueue, default_fairness_tests,
    default_performance_test, default_stability_test,
};
pub use config::ServiceConfig;
pub use context::{AccessPolicy, AllowAllPolicy, DenyAllPolicy, Permission, RequestGateway};
pub use service::ModelTestService;
