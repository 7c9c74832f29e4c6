//! The model test service
//!
//! RPC handlers for test creation (single and group, with
//! overwrite-by-identity and upsert-by-group), deletion, queries, the
//! resolver preview, and the baseline bootstrapper entry points. Evaluation
//! lives in [`crate::evaluator`].

use crate::api::{
    CreateFairnessTestGroupRequest, CreateFairnessTestRequest,
    CreateFeatureImportanceTestGroupRequest, CreateFeatureImportanceTestRequest,
    CreatePerformanceTestGroupRequest, CreatePerformanceTestRequest,
    CreateStabilityTestGroupRequest, CreateStabilityTestRequest, CreateTestGroupResponse,
    CreateTestResponse, CreateTestsFromSplitRequest, DeleteModelTestGroupResponse,
    DeleteModelTestResponse, DeleteModelTestsForSplitResponse, GetDataSplitsFromRegexRequest,
    GetModelTestGroupsRequest, GetModelTestsRequest, ModelTestGroupView,
    StartBaselineWorkflowRequest, StartBaselineWorkflowResponse, TestGroupSpec,
};
use crate::bootstrap::{
    BaselineWorkflowRequest, DEFAULT_FAIRNESS_TEST_NAME, DEFAULT_PERFORMANCE_TEST_NAME,
    DEFAULT_STABILITY_TEST_NAME, WorkflowQueue, default_fairness_tests, default_performance_test,
    default_stability_test,
};
use crate::config::ServiceConfig;
use crate::context::{AccessPolicy, RequestGateway};
use crate::validate;
use mts_core::test::{CollectionRef, FairnessTest, TestPayload, TestTarget};
use mts_core::types::{SegmentId, TestType};
use mts_core::{Error, ModelTest, RequestContext, Result, new_id};
use mts_metrics::{CachingMetricClient, MetricClient};
use mts_store::{
    CollectionScope, MetadataCatalog, MetadataCatalogExt, Resolver, SplitMeta, TestCatalog,
    TestQuery, TestStore,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{error, info, warn};

/// The model test service surface
pub struct ModelTestService {
    pub(crate) metadata: Arc<dyn MetadataCatalog>,
    pub(crate) tests: TestCatalog,
    pub(crate) resolver: Resolver,
    pub(crate) metrics: CachingMetricClient<Arc<dyn MetricClient>>,
    pub(crate) gateway: RequestGateway,
    pub(crate) workflows: Option<Arc<dyn WorkflowQueue>>,
    pub(crate) config: ServiceConfig,
}

impl ModelTestService {
    /// Wire the service over its collaborators.
    ///
    /// Runs the legacy group repair as a best-effort pass; a repair failure
    /// is logged and never prevents the service from serving traffic.
    #[must_use]
    pub fn new(
        config: ServiceConfig,
        metadata: Arc<dyn MetadataCatalog>,
        store: Arc<dyn TestStore>,
        metric_client: Arc<dyn MetricClient>,
        policy: Arc<dyn AccessPolicy>,
    ) -> Self {
        let tests = TestCatalog::new(store, metadata.clone());
        if let Err(e) = tests.repair_legacy_groups() {
            error!(error = %e, "failed to handle conversion of legacy tests (if any)");
        }
        let metrics = CachingMetricClient::with_tunables(
            metric_client,
            config.metric_cache_size,
            config.metric_cache_ttl(),
        );
        let gateway = RequestGateway::new(policy, metadata.clone());
        let resolver = Resolver::new(metadata.clone());
        info!("started model test service");
        Self {
            metadata,
            tests,
            resolver,
            metrics,
            gateway,
            workflows: None,
            config,
        }
    }

    /// Attach a workflow queue, enabling the long-running baseline path
    #[must_use]
    pub fn with_workflow_queue(mut self, queue: Arc<dyn WorkflowQueue>) -> Self {
        self.workflows = Some(queue);
        self
    }

    // ── Single test creation ────────────────────────────────────────────

    /// Create (or overwrite) one performance test.
    ///
    /// # Errors
    ///
    /// Validation, authorization, and store failures.
    pub fn create_performance_test(
        &self,
        ctx: &RequestContext,
        request: &CreatePerformanceTestRequest,
    ) -> Result<CreateTestResponse> {
        let split = self.validate_single_target(
            ctx,
            "CREATE_PERFORMANCE_TEST",
            &request.project_id,
            &request.split_id,
        )?;
        if request.test_definition.accuracy_type.is_none() {
            return Err(Error::InvalidArgument(
                "accuracy_type missing in performance test definition".to_string(),
            ));
        }
        for threshold in [
            &request.test_definition.threshold_warning,
            &request.test_definition.threshold_fail,
        ] {
            validate::ensure_reference_in_collection(
                self.metadata.as_ref(),
                threshold,
                &split.data_collection_id,
            )?;
        }
        let test = ModelTest {
            id: new_id(),
            test_group_id: String::new(),
            project_id: request.project_id.clone(),
            target: TestTarget::Split {
                data_collection_id: split.data_collection_id,
                split_id: request.split_id.clone(),
            },
            segment: request.segment_id.clone(),
            test_name: request.test_name.clone(),
            description: request.description.clone(),
            autorun: request.autorun,
            payload: TestPayload::Performance(request.test_definition.clone()),
        };
        self.finish_single_create(test, request.overwrite)
    }

    /// Create (or overwrite) one stability test.
    ///
    /// # Errors
    ///
    /// Validation, authorization, and store failures.
    pub fn create_stability_test(
        &self,
        ctx: &RequestContext,
        request: &CreateStabilityTestRequest,
    ) -> Result<CreateTestResponse> {
        let split = self.validate_single_target(
            ctx,
            "CREATE_STABILITY_TEST",
            &request.project_id,
            &request.split_id,
        )?;
        if let Some(base_id) = request
            .test_definition
            .base_split_id
            .as_deref()
            .filter(|s| !s.is_empty())
        {
            let base = self.metadata.require_split(base_id)?;
            if base.data_collection_id != split.data_collection_id {
                return Err(Error::InvalidArgument(format!(
                    "Comparison and base data split in a stability test have to be in the same data collection: comparison collection {}, base collection {}",
                    split.data_collection_id, base.data_collection_id
                )));
            }
        }
        let test = ModelTest {
            id: new_id(),
            test_group_id: String::new(),
            project_id: request.project_id.clone(),
            target: TestTarget::Split {
                data_collection_id: split.data_collection_id,
                split_id: request.split_id.clone(),
            },
            segment: request.segment_id.clone(),
            test_name: request.test_name.clone(),
            description: request.description.clone(),
            autorun: request.autorun,
            payload: TestPayload::Stability(request.test_definition.clone()),
        };
        self.finish_single_create(test, request.overwrite)
    }

    /// Create (or overwrite) one fairness test.
    ///
    /// # Errors
    ///
    /// Validation, authorization, and store failures.
    pub fn create_fairness_test(
        &self,
        ctx: &RequestContext,
        request: &CreateFairnessTestRequest,
    ) -> Result<CreateTestResponse> {
        let split = self.validate_single_target(
            ctx,
            "CREATE_FAIRNESS_TEST",
            &request.project_id,
            &request.split_id,
        )?;
        validate::ensure_valid_regex(
            "protected_segment_name_regex",
            request
                .test_definition
                .protected_segment_name_regex
                .as_deref(),
        )?;
        let test = ModelTest {
            id: new_id(),
            test_group_id: String::new(),
            project_id: request.project_id.clone(),
            target: TestTarget::Split {
                data_collection_id: split.data_collection_id,
                split_id: request.split_id.clone(),
            },
            segment: request.segment_id.clone(),
            test_name: request.test_name.clone(),
            description: request.description.clone(),
            autorun: request.autorun,
            payload: TestPayload::Fairness(request.test_definition.clone()),
        };
        self.finish_single_create(test, request.overwrite)
    }

    /// Create (or overwrite) one feature importance test.
    ///
    /// # Errors
    ///
    /// Validation, authorization, and store failures.
    pub fn create_feature_importance_test(
        &self,
        ctx: &RequestContext,
        request: &CreateFeatureImportanceTestRequest,
    ) -> Result<CreateTestResponse> {
        let split = self.validate_single_target(
            ctx,
            "CREATE_FEATURE_IMPORTANCE_TEST",
            &request.project_id,
            &request.split_id,
        )?;
        let project = self.metadata.require_project(&request.project_id)?;
        validate::ensure_feature_importance_payload(&request.test_definition, project.score_type)?;
        if request.test_definition.background_split_id.is_empty() {
            return Err(Error::InvalidArgument(
                "background_split_id missing in feature importance test definition".to_string(),
            ));
        }
        let background = self
            .metadata
            .require_split(&request.test_definition.background_split_id)?;
        if background.data_collection_id != split.data_collection_id {
            return Err(Error::InvalidArgument(format!(
                "Background split and test split in a feature importance test have to be in the same data collection: background collection {}, test collection {}",
                background.data_collection_id, split.data_collection_id
            )));
        }
        let test = ModelTest {
            id: new_id(),
            test_group_id: String::new(),
            project_id: request.project_id.clone(),
            target: TestTarget::Split {
                data_collection_id: split.data_collection_id,
                split_id: request.split_id.clone(),
            },
            segment: request.segment_id.clone(),
            test_name: request.test_name.clone(),
            description: request.description.clone(),
            autorun: request.autorun,
            payload: TestPayload::FeatureImportance(request.test_definition.clone()),
        };
        self.finish_single_create(test, request.overwrite)
    }

    // ── Group creation ──────────────────────────────────────────────────

    /// Create a group of performance tests.
    ///
    /// # Errors
    ///
    /// Validation, authorization, and store failures.
    pub fn create_performance_test_group(
        &self,
        ctx: &RequestContext,
        request: &CreatePerformanceTestGroupRequest,
    ) -> Result<CreateTestGroupResponse> {
        self.gateway.authorize_update(
            ctx,
            "CREATE_PERFORMANCE_TEST_GROUP",
            &request.group.project_id,
        )?;
        let def = &request.test_definition;
        if def.accuracy_type.is_none() {
            return Err(Error::InvalidArgument(
                "accuracy_type missing in performance test definition".to_string(),
            ));
        }
        for split_id in &request.group.split_ids {
            let split = self.metadata.require_split(split_id)?;
            for threshold in [&def.threshold_warning, &def.threshold_fail] {
                validate::ensure_reference_in_collection(
                    self.metadata.as_ref(),
                    threshold,
                    &split.data_collection_id,
                )?;
            }
        }
        let segments = segments_or_whole_split(&request.group.segment_ids);
        let payload = def.clone();
        self.create_test_group(&request.group, TestType::Performance, &|_dc| {
            Ok(segments
                .iter()
                .map(|s| (s.clone(), TestPayload::Performance(payload.clone())))
                .collect())
        })
    }

    /// Create a group of stability tests.
    ///
    /// # Errors
    ///
    /// Validation, authorization, and store failures.
    pub fn create_stability_test_group(
        &self,
        ctx: &RequestContext,
        request: &CreateStabilityTestGroupRequest,
    ) -> Result<CreateTestGroupResponse> {
        self.gateway.authorize_update(
            ctx,
            "CREATE_STABILITY_TEST_GROUP",
            &request.group.project_id,
        )?;
        let def = &request.test_definition;
        validate::ensure_base_split_map_consistent(
            self.metadata.as_ref(),
            &request.group.data_collection_id_to_base_split_id,
        )?;
        if let Some(base_id) = def.base_split_id.as_deref().filter(|s| !s.is_empty()) {
            let base = self.metadata.require_split(base_id)?;
            for split_id in &request.group.split_ids {
                let split = self.metadata.require_split(split_id)?;
                if base.data_collection_id != split.data_collection_id {
                    return Err(Error::InvalidArgument(format!(
                        "Comparison and base data split in a stability test have to be in the same data collection: comparison split {split_id}, base split {base_id}"
                    )));
                }
            }
        }
        let segments = segments_or_whole_split(&request.group.segment_ids);
        let base_map = request.group.data_collection_id_to_base_split_id.clone();
        let payload = def.clone();
        self.create_test_group(&request.group, TestType::Stability, &move |dc| {
            let mut payload = payload.clone();
            if let Some(base) = dc
                .and_then(|dc| base_map.get(dc))
                .filter(|s| !s.is_empty())
            {
                payload.base_split_id = Some(base.clone());
            }
            Ok(segments
                .iter()
                .map(|s| (s.clone(), TestPayload::Stability(payload.clone())))
                .collect())
        })
    }

    /// Create a group of fairness tests.
    ///
    /// Protected and comparison segment lists must align; an omitted
    /// comparison defaults to "same segmentation, rest of the split".
    ///
    /// # Errors
    ///
    /// Validation, authorization, and store failures.
    pub fn create_fairness_test_group(
        &self,
        ctx: &RequestContext,
        request: &CreateFairnessTestGroupRequest,
    ) -> Result<CreateTestGroupResponse> {
        self.gateway.authorize_update(
            ctx,
            "CREATE_FAIRNESS_TEST_GROUP",
            &request.group.project_id,
        )?;
        let def = &request.test_definition;
        let protected = &request.group.protected_segment_ids;
        let regex = def
            .protected_segment_name_regex
            .as_deref()
            .filter(|s| !s.is_empty());
        if let Some(regex) = regex {
            if !protected.is_empty() {
                return Err(Error::InvalidArgument(
                    "Conflicts: both `protected_segment_ids` and `protected_segment_name_regex` are provided".to_string(),
                ));
            }
            validate::ensure_valid_regex("protected_segment_name_regex", Some(regex))?;
        } else if protected.is_empty() {
            return Err(Error::InvalidArgument(
                "Need to provide a protected segment to create a fairness test group".to_string(),
            ));
        }
        let mut comparisons = request.group.comparison_segment_ids.clone();
        if comparisons.is_empty() {
            comparisons = protected
                .iter()
                .map(|p| SegmentId::new(p.segmentation_id.clone(), ""))
                .collect();
        } else if comparisons.len() != protected.len() {
            return Err(Error::InvalidArgument(
                "Number of protected segments and comparison segments need to be the same when defining a fairness test group".to_string(),
            ));
        }
        let definitions: Vec<FairnessTest> = if regex.is_some() {
            vec![def.clone()]
        } else {
            protected
                .iter()
                .zip(&comparisons)
                .map(|(p, c)| {
                    let mut definition = def.clone();
                    definition.protected = p.clone();
                    definition.comparison = c.clone();
                    definition.protected_segment_name_regex = None;
                    definition
                })
                .collect()
        };
        self.create_test_group(&request.group, TestType::Fairness, &|_dc| {
            Ok(definitions
                .iter()
                .map(|d| (SegmentId::empty(), TestPayload::Fairness(d.clone())))
                .collect())
        })
    }

    /// Create a group of feature importance tests.
    ///
    /// # Errors
    ///
    /// Validation, authorization, and store failures.
    pub fn create_feature_importance_test_group(
        &self,
        ctx: &RequestContext,
        request: &CreateFeatureImportanceTestGroupRequest,
    ) -> Result<CreateTestGroupResponse> {
        self.gateway.authorize_update(
            ctx,
            "CREATE_FEATURE_IMPORTANCE_TEST_GROUP",
            &request.group.project_id,
        )?;
        if request
            .group
            .data_collection_name_regex
            .as_deref()
            .is_some_and(|s| !s.is_empty())
        {
            return Err(Error::InvalidArgument(
                "Cannot use `data_collection_name_regex` when creating a feature importance test group".to_string(),
            ));
        }
        let def = &request.test_definition;
        let project = self.metadata.require_project(&request.group.project_id)?;
        validate::ensure_feature_importance_payload(def, project.score_type)?;
        let base_map = &request.group.data_collection_id_to_base_split_id;
        validate::ensure_base_split_map_consistent(self.metadata.as_ref(), base_map)?;
        if def.background_split_id.is_empty() {
            for split_id in &request.group.split_ids {
                let split = self.metadata.require_split(split_id)?;
                if base_map
                    .get(&split.data_collection_id)
                    .is_none_or(|s| s.is_empty())
                {
                    return Err(Error::InvalidArgument(format!(
                        "Background split definition missing for split: {split_id}"
                    )));
                }
            }
            for dc_id in &request.group.data_collection_ids {
                if base_map.get(dc_id).is_none_or(|s| s.is_empty()) {
                    return Err(Error::InvalidArgument(format!(
                        "Background split definition missing for data collection: {dc_id}"
                    )));
                }
            }
        } else {
            let background = self.metadata.require_split(&def.background_split_id)?;
            for split_id in &request.group.split_ids {
                let split = self.metadata.require_split(split_id)?;
                if background.data_collection_id != split.data_collection_id {
                    return Err(Error::InvalidArgument(format!(
                        "Background split and test split in a feature importance test have to be in the same data collection: background split {}, test split {split_id}",
                        def.background_split_id
                    )));
                }
            }
            for dc_id in &request.group.data_collection_ids {
                if &background.data_collection_id != dc_id {
                    return Err(Error::InvalidArgument(format!(
                        "Background split {} does not belong in data collection {dc_id}",
                        def.background_split_id
                    )));
                }
            }
        }
        let segments = segments_or_whole_split(&request.group.segment_ids);
        let base_map = base_map.clone();
        let payload = def.clone();
        self.create_test_group(&request.group, TestType::FeatureImportance, &move |dc| {
            let mut payload = payload.clone();
            if let Some(background) = dc
                .and_then(|dc| base_map.get(dc))
                .filter(|s| !s.is_empty())
            {
                payload.background_split_id = background.clone();
            }
            Ok(segments
                .iter()
                .map(|s| (s.clone(), TestPayload::FeatureImportance(payload.clone())))
                .collect())
        })
    }

    // ── Deletion ────────────────────────────────────────────────────────

    /// Delete one test by id.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown test; authorization failures.
    pub fn delete_model_test(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        test_id: &str,
    ) -> Result<DeleteModelTestResponse> {
        self.gateway
            .authorize_update(ctx, "DELETE_MODEL_TEST", project_id)?;
        if test_id.is_empty() {
            return Err(Error::InvalidArgument(
                "test_id missing in request".to_string(),
            ));
        }
        let hits = self
            .tests
            .get_model_tests(&TestQuery::for_project(project_id).with_test_id(test_id))?;
        match hits.len() {
            0 => Err(Error::NotFound(format!(
                "Provided test_id does not exist: {test_id}"
            ))),
            1 => {
                self.tests.store().delete(&hits[0].id)?;
                Ok(DeleteModelTestResponse {
                    deleted_test: hits[0].clone(),
                })
            }
            n => Err(Error::Internal(format!(
                "Unexpected state: found {n} tests matching the delete request. Canceling request."
            ))),
        }
    }

    /// Delete a whole group by id.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown group; authorization failures.
    pub fn delete_model_test_group(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        test_group_id: &str,
    ) -> Result<DeleteModelTestGroupResponse> {
        self.gateway
            .authorize_update(ctx, "DELETE_MODEL_TEST_GROUP", project_id)?;
        if test_group_id.is_empty() {
            return Err(Error::InvalidArgument(
                "test_group_id missing in request".to_string(),
            ));
        }
        let deleted = self.tests.delete_group(project_id, test_group_id)?;
        Ok(DeleteModelTestGroupResponse {
            deleted_test_ids: deleted.into_iter().map(|t| t.id).collect(),
        })
    }

    /// Delete every test targeting a split.
    ///
    /// # Errors
    ///
    /// Unknown split; authorization failures.
    pub fn delete_model_tests_for_split(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        split_id: &str,
    ) -> Result<DeleteModelTestsForSplitResponse> {
        self.gateway
            .authorize_update(ctx, "DELETE_MODEL_TESTS_FOR_SPLIT", project_id)?;
        self.metadata.require_split(split_id)?;
        let deleted = self.tests.delete_for_split(project_id, split_id)?;
        Ok(DeleteModelTestsForSplitResponse {
            deleted_tests: deleted,
        })
    }

    // ── Queries ─────────────────────────────────────────────────────────

    /// List tests matching the filters.
    ///
    /// # Errors
    ///
    /// Authorization failures; `Unsupported` for production splits.
    pub fn get_model_tests(
        &self,
        ctx: &RequestContext,
        request: &GetModelTestsRequest,
    ) -> Result<Vec<ModelTest>> {
        self.gateway
            .authorize_view(ctx, "GET_MODEL_TESTS", &request.project_id)?;
        let mut query = TestQuery::for_project(request.project_id.as_str());
        query.test_type = request.test_type;
        query.data_collection_id = request.data_collection_id.clone();
        query.split_id = request.split_id.clone();
        query.test_id = request.test_id.clone();
        query.test_name = request.test_name.clone();
        self.tests.get_model_tests(&query)
    }

    /// List tests collapsed into group views.
    ///
    /// # Errors
    ///
    /// Authorization failures; `Unsupported` for production splits.
    pub fn get_model_test_groups(
        &self,
        ctx: &RequestContext,
        request: &GetModelTestGroupsRequest,
    ) -> Result<Vec<ModelTestGroupView>> {
        self.gateway
            .authorize_view(ctx, "GET_MODEL_TEST_GROUPS", &request.project_id)?;
        let mut query = TestQuery::for_project(request.project_id.as_str());
        query.test_type = request.test_type;
        query.data_collection_id = request.data_collection_id.clone();
        query.split_id = request.split_id.clone();
        query.test_group_id = request.test_group_id.clone();
        query.test_name = request.test_name.clone();
        let matched = self.tests.get_model_tests(&query)?;

        let group_ids: BTreeSet<String> =
            matched.into_iter().map(|t| t.test_group_id).collect();
        let mut views = Vec::new();
        for group_id in group_ids {
            let members = self.tests.get_model_tests(
                &TestQuery::for_project(request.project_id.as_str()).with_group(group_id.as_str()),
            )?;
            if let Some(view) = build_group_view(&members) {
                views.push(view);
            }
        }
        Ok(views)
    }

    /// Resolver preview: concrete splits a regex would select.
    ///
    /// # Errors
    ///
    /// Exactly one of ids / name regex must be given; bad regex.
    pub fn get_data_splits_from_regex(
        &self,
        ctx: &RequestContext,
        request: &GetDataSplitsFromRegexRequest,
    ) -> Result<Vec<SplitMeta>> {
        self.gateway
            .authorize_view(ctx, "GET_DATA_SPLITS_FROM_REGEX", &request.project_id)?;
        let has_regex = request
            .data_collection_name_regex
            .as_deref()
            .is_some_and(|s| !s.is_empty());
        let scope = match (request.data_collection_ids.is_empty(), has_regex) {
            (false, false) => CollectionScope::Ids(request.data_collection_ids.clone()),
            (true, true) => CollectionScope::NameRegex(
                request.data_collection_name_regex.clone().unwrap_or_default(),
            ),
            (false, true) => {
                return Err(Error::InvalidArgument(
                    "Please only provide one of `data_collection_ids` or `data_collection_name_regex`".to_string(),
                ));
            }
            (true, false) => {
                return Err(Error::InvalidArgument(
                    "Request must specify either `data_collection_ids` or `data_collection_name_regex`".to_string(),
                ));
            }
        };
        self.resolver
            .splits_from_regex(&request.project_id, &request.split_name_regex, &scope)
    }

    // ── Baseline bootstrapper ───────────────────────────────────────────

    /// Synchronously create the default test set for a newly ingested split.
    ///
    /// Idempotent: defaults matched by canonical name are never duplicated.
    ///
    /// # Errors
    ///
    /// Authorization failures; `Unsupported` for production splits.
    pub fn create_tests_from_split(
        &self,
        ctx: &RequestContext,
        request: &CreateTestsFromSplitRequest,
    ) -> Result<Vec<ModelTest>> {
        self.gateway
            .authorize_update(ctx, "CREATE_TESTS_FROM_SPLIT", &request.project_id)?;
        let split = self.metadata.require_split(&request.split_id)?;
        if split.kind.is_production() {
            let message = format!(
                "Split {} is a production split from monitoring and tests cannot be created for it",
                split.name
            );
            error!("{message}");
            return Err(Error::Unsupported(message));
        }
        let project = self.metadata.require_project(&request.project_id)?;

        let mut created = Vec::new();
        if self.default_missing(&request.project_id, TestType::Performance, DEFAULT_PERFORMANCE_TEST_NAME)? {
            created.push(default_performance_test(
                &request.project_id,
                project.score_type,
                &self.config,
            ));
        } else {
            info!("default performance test already exists");
        }
        if self.default_missing(&request.project_id, TestType::Fairness, DEFAULT_FAIRNESS_TEST_NAME)? {
            created.extend(default_fairness_tests(
                &request.project_id,
                &project.bias_configs,
            ));
        } else {
            info!("default fairness test already exists");
        }
        if self.default_missing(&request.project_id, TestType::Stability, DEFAULT_STABILITY_TEST_NAME)? {
            created.push(default_stability_test(&request.project_id));
        } else {
            info!("default stability test already exists");
        }
        for test in &created {
            self.tests.store().insert(test.clone())?;
        }
        Ok(created)
    }

    /// Enqueue the durable baseline-creation workflow.
    ///
    /// Returns an empty workflow id when no workflow engine is configured.
    ///
    /// # Errors
    ///
    /// Authorization and queue failures.
    pub fn start_baseline_model_workflow(
        &self,
        ctx: &RequestContext,
        request: &StartBaselineWorkflowRequest,
    ) -> Result<StartBaselineWorkflowResponse> {
        self.gateway
            .authorize_update(ctx, "CREATE_TESTS_FROM_SPLIT", &request.project_id)?;
        let Some(queue) = &self.workflows else {
            warn!("no workflow engine configured; baseline workflow not started");
            return Ok(StartBaselineWorkflowResponse::default());
        };
        let workflow_id = format!("test_creation_workflow_{}", new_id());
        queue.enqueue_baseline_creation(
            &workflow_id,
            BaselineWorkflowRequest {
                context: ctx.clone(),
                project_id: request.project_id.clone(),
                data_collection_id: request.data_collection_id.clone(),
                split_id: request.split_id.clone(),
            },
        )?;
        info!(workflow_id = %workflow_id, "enqueued baseline model workflow");
        Ok(StartBaselineWorkflowResponse { workflow_id })
    }

    // ── Shared helpers ──────────────────────────────────────────────────

    fn default_missing(
        &self,
        project_id: &str,
        test_type: TestType,
        name: &str,
    ) -> Result<bool> {
        let hits = self.tests.get_model_tests(
            &TestQuery::for_project(project_id)
                .with_test_type(test_type)
                .with_test_name(name),
        )?;
        Ok(hits.is_empty())
    }

    fn validate_single_target(
        &self,
        ctx: &RequestContext,
        rpc: &str,
        project_id: &str,
        split_id: &str,
    ) -> Result<SplitMeta> {
        self.gateway.authorize_update(ctx, rpc, project_id)?;
        if split_id.is_empty() {
            return Err(Error::InvalidArgument("split_id cannot be empty".to_string()));
        }
        let split = self.metadata.require_split(split_id)?;
        if split.kind.is_production() {
            return Err(Error::Unsupported(format!(
                "Split {} is a production split from monitoring and tests cannot be created for it",
                split.name
            )));
        }
        Ok(split)
    }

    fn finish_single_create(
        &self,
        mut test: ModelTest,
        overwrite: bool,
    ) -> Result<CreateTestResponse> {
        validate::ensure_valid_identifier("test_name", &test.test_name)?;
        validate::ensure_valid_identifier("description", &test.description)?;
        let mut existing_group = None;
        if overwrite {
            if let Some((id, group_id)) = self.tests.resolve_overwrite(&test)? {
                test.id = id;
                existing_group = Some(group_id);
            }
        }
        self.tests
            .ensure_name_available(&test.project_id, &test.test_name, existing_group.as_deref())?;
        // A test always belongs to a group
        test.test_group_id = existing_group.unwrap_or_else(new_id);
        let response = CreateTestResponse {
            test_id: test.id.clone(),
            test_group_id: test.test_group_id.clone(),
        };
        if overwrite {
            self.tests.store().upsert(test)?;
        } else {
            self.tests.store().insert(test)?;
        }
        Ok(response)
    }

    /// Group-creation engine. The caller has already authorized the request
    /// and validated the payload; `variants` produces the (segment, payload)
    /// rows for one data collection (or `None` when the collection is only
    /// known by regex).
    fn create_test_group(
        &self,
        spec: &TestGroupSpec,
        test_type: TestType,
        variants: &dyn Fn(Option<&str>) -> Result<Vec<(SegmentId, TestPayload)>>,
    ) -> Result<CreateTestGroupResponse> {
        validate::ensure_valid_identifier("test_name", &spec.test_name)?;
        validate::ensure_valid_identifier("description", &spec.description)?;
        if spec.test_name.is_empty() {
            return Err(Error::InvalidArgument(
                "Need to specify `test_name` when creating a test group".to_string(),
            ));
        }
        let mut members_to_delete = Vec::new();
        let group_id = match spec.test_group_id.as_deref().filter(|s| !s.is_empty()) {
            Some(existing) => {
                members_to_delete = self.tests.store().search(
                    &TestQuery::for_project(spec.project_id.as_str())
                        .with_test_type(test_type)
                        .with_group(existing),
                )?;
                if members_to_delete.is_empty() {
                    return Err(Error::NotFound(format!("No such test group: {existing}")));
                }
                existing.to_string()
            }
            None => new_id(),
        };
        self.tests
            .ensure_name_available(&spec.project_id, &spec.test_name, Some(&group_id))?;
        validate::ensure_valid_regex("split_name_regex", spec.split_name_regex.as_deref())?;
        validate::ensure_valid_regex(
            "data_collection_name_regex",
            spec.data_collection_name_regex.as_deref(),
        )?;

        let mut test_ids = Vec::new();
        let mut insert_row =
            |target: TestTarget, segment: SegmentId, payload: TestPayload| -> Result<()> {
                let test = ModelTest {
                    id: new_id(),
                    test_group_id: group_id.clone(),
                    project_id: spec.project_id.clone(),
                    target,
                    segment,
                    test_name: spec.test_name.clone(),
                    description: spec.description.clone(),
                    autorun: true,
                    payload,
                };
                test_ids.push(test.id.clone());
                self.tests.store().insert(test)
            };

        if spec.split_ids.is_empty() {
            let split_regex = spec
                .split_name_regex
                .as_deref()
                .filter(|s| !s.is_empty())
                .ok_or_else(|| {
                    Error::InvalidArgument(
                        "Please provide either `split_ids` or `split_name_regex`".to_string(),
                    )
                })?;
            let collection_regex = spec
                .data_collection_name_regex
                .as_deref()
                .filter(|s| !s.is_empty());
            if let Some(collection_regex) = collection_regex {
                for (segment, payload) in variants(None)? {
                    insert_row(
                        TestTarget::Regex {
                            split_name_regex: split_regex.to_string(),
                            collection: CollectionRef::NameRegex(collection_regex.to_string()),
                        },
                        segment,
                        payload,
                    )?;
                }
            } else if spec.data_collection_ids.is_empty() {
                return Err(Error::InvalidArgument(
                    "Please provide either `data_collection_name_regex` or `data_collection_ids` if `split_ids` are not explicitly given".to_string(),
                ));
            } else {
                for dc_id in &spec.data_collection_ids {
                    self.metadata.require_data_collection(dc_id)?;
                    for (segment, payload) in variants(Some(dc_id))? {
                        insert_row(
                            TestTarget::Regex {
                                split_name_regex: split_regex.to_string(),
                                collection: CollectionRef::Id(dc_id.clone()),
                            },
                            segment,
                            payload,
                        )?;
                    }
                }
            }
        } else {
            for split_id in &spec.split_ids {
                let split = self.metadata.require_split(split_id)?;
                if split.kind.is_production() {
                    return Err(Error::Unsupported(format!(
                        "Split {} is a production split from monitoring and tests cannot be created for it",
                        split.name
                    )));
                }
                for (segment, payload) in variants(Some(&split.data_collection_id))? {
                    insert_row(
                        TestTarget::Split {
                            data_collection_id: split.data_collection_id.clone(),
                            split_id: split.id.clone(),
                        },
                        segment,
                        payload,
                    )?;
                }
            }
        }

        // Upsert-by-group: old members go away only after the new rows exist
        for member in members_to_delete {
            self.tests.store().delete(&member.id)?;
        }
        Ok(CreateTestGroupResponse {
            test_group_id: group_id,
            test_ids,
        })
    }
}

fn segments_or_whole_split(segments: &[SegmentId]) -> Vec<SegmentId> {
    if segments.is_empty() {
        vec![SegmentId::empty()]
    } else {
        segments.to_vec()
    }
}

/// Collapse group members into the group view the API reports
fn build_group_view(members: &[ModelTest]) -> Option<ModelTestGroupView> {
    let mut members: Vec<&ModelTest> = members.iter().collect();
    members.sort_by(|a, b| a.id.cmp(&b.id));
    let first = *members.first()?;

    let mut split_ids = BTreeSet::new();
    let mut split_name_regex = None;
    let mut data_collection_ids = BTreeSet::new();
    let mut data_collection_name_regex = None;
    let mut segment_ids: BTreeMap<String, SegmentId> = BTreeMap::new();
    let mut protected_segment_ids: BTreeMap<String, SegmentId> = BTreeMap::new();
    let mut comparison_segment_ids: BTreeMap<String, SegmentId> = BTreeMap::new();
    let mut protected_segment_name_regex = None;
    let mut base_split_map = BTreeMap::new();

    for member in &members {
        match &member.target {
            TestTarget::Split { split_id, .. } => {
                split_ids.insert(split_id.clone());
            }
            TestTarget::Regex {
                split_name_regex: regex,
                collection,
            } => {
                split_name_regex = Some(regex.clone());
                match collection {
                    CollectionRef::Id(id) => {
                        data_collection_ids.insert(id.clone());
                    }
                    CollectionRef::NameRegex(re) => {
                        data_collection_name_regex = Some(re.clone());
                    }
                }
            }
        }
        if !member.segment.is_empty() {
            segment_ids.insert(member.segment.key(), member.segment.clone());
        }
        match &member.payload {
            TestPayload::Fairness(f) => {
                if !f.protected.is_empty() {
                    protected_segment_ids.insert(f.protected.key(), f.protected.clone());
                } else if let Some(regex) = f
                    .protected_segment_name_regex
                    .as_deref()
                    .filter(|s| !s.is_empty())
                {
                    protected_segment_name_regex = Some(regex.to_string());
                }
                if !f.comparison.is_empty() {
                    comparison_segment_ids.insert(f.comparison.key(), f.comparison.clone());
                }
            }
            TestPayload::Stability(s) => {
                if let (Some(dc), Some(base)) =
                    (member.target.data_collection_id(), &s.base_split_id)
                {
                    base_split_map.insert(dc.to_string(), base.clone());
                }
            }
            TestPayload::FeatureImportance(fi) => {
                if let Some(dc) = member.target.data_collection_id() {
                    base_split_map.insert(dc.to_string(), fi.background_split_id.clone());
                }
            }
            TestPayload::Performance(_) => {}
        }
    }

    let test_definition = match &first.payload {
        TestPayload::Performance(p) => TestPayload::Performance(p.clone()),
        TestPayload::Stability(s) => {
            let mut shared = s.clone();
            shared.base_split_id = None;
            TestPayload::Stability(shared)
        }
        TestPayload::Fairness(f) => {
            let mut shared = f.clone();
            shared.protected = SegmentId::empty();
            shared.comparison = SegmentId::empty();
            shared.protected_segment_name_regex = protected_segment_name_regex.clone();
            TestPayload::Fairness(shared)
        }
        TestPayload::FeatureImportance(fi) => {
            let mut shared = fi.clone();
            shared.background_split_id = String::new();
            TestPayload::FeatureImportance(shared)
        }
    };

    Some(ModelTestGroupView {
        project_id: first.project_id.clone(),
        test_group_id: first.test_group_id.clone(),
        test_name: first.test_name.clone(),
        description: first.description.clone(),
        split_ids: split_ids.into_iter().collect(),
        split_name_regex,
        data_collection_ids: data_collection_ids.into_iter().collect(),
        data_collection_name_regex,
        segment_ids: segment_ids.into_values().collect(),
        protected_segment_ids: protected_segment_ids.into_values().collect(),
        comparison_segment_ids: comparison_segment_ids.into_values().collect(),
        protected_segment_name_regex,
        data_collection_id_to_base_split_id: base_split_map,
        test_definition,
    })
}
