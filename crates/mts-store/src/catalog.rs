//! Test lookup with name-aware filtering
//!
//! Couples the test store with the metadata catalog: concrete ids in a query
//! are resolved to names so regex-targeted rows can be filtered in memory,
//! name uniqueness is enforced, overwrite identities are resolved, and legacy
//! rows are repaired at startup.

use crate::metadata::MetadataCatalog;
use crate::resolver::compile_anchored;
use crate::store::{TestQuery, TestStore};
use mts_core::{Error, ModelTest, Result};
use std::sync::Arc;
use tracing::info;

/// Test store coupled with the metadata catalog
#[derive(Clone)]
pub struct TestCatalog {
    store: Arc<dyn TestStore>,
    metadata: Arc<dyn MetadataCatalog>,
}

impl TestCatalog {
    /// Create a catalog over a store and metadata client
    #[must_use]
    pub fn new(store: Arc<dyn TestStore>, metadata: Arc<dyn MetadataCatalog>) -> Self {
        Self { store, metadata }
    }

    /// The underlying store
    #[must_use]
    pub fn store(&self) -> &Arc<dyn TestStore> {
        &self.store
    }

    /// Search tests, filtering regex-targeted rows against resolved names.
    ///
    /// When the query carries a concrete split or collection id, the matching
    /// names are looked up and every regex row whose pattern does not match
    /// them is dropped. Querying by a production split is unsupported.
    ///
    /// # Errors
    ///
    /// `Unsupported` for production splits; metadata lookup failures.
    pub fn get_model_tests(&self, query: &TestQuery) -> Result<Vec<ModelTest>> {
        let mut data_collection_name = None;
        let mut split_name = None;

        if let Some(dc_id) = &query.data_collection_id {
            data_collection_name = self.metadata.data_collection(dc_id)?.map(|dc| dc.name);
        }
        if let Some(split_id) = &query.split_id {
            if let Some(split) = self.metadata.split(split_id)? {
                if split.kind.is_production() {
                    return Err(Error::Unsupported(format!(
                        "Split {} is a production split from monitoring and tests cannot target it",
                        split.name
                    )));
                }
                data_collection_name = self
                    .metadata
                    .data_collection(&split.data_collection_id)?
                    .map(|dc| dc.name);
                split_name = Some(split.name);
            }
        }

        let mut out = Vec::new();
        for test in self.store.search(query)? {
            if let (Some(dc_name), Some(pattern)) =
                (&data_collection_name, test.target.collection_name_regex())
            {
                if !compile_anchored("data_collection_name_regex", pattern)?.is_match(dc_name) {
                    continue;
                }
            }
            if let (Some(s_name), Some(pattern)) = (&split_name, test.target.split_name_regex()) {
                if !compile_anchored("split_name_regex", pattern)?.is_match(s_name) {
                    continue;
                }
            }
            out.push(test);
        }
        Ok(out)
    }

    /// Enforce per-project uniqueness of non-empty test names.
    ///
    /// Members of `exclude_group` are ignored so a group update can keep its
    /// own name.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` when another test holds the name.
    pub fn ensure_name_available(
        &self,
        project_id: &str,
        test_name: &str,
        exclude_group: Option<&str>,
    ) -> Result<()> {
        if test_name.is_empty() {
            return Ok(());
        }
        let query = TestQuery::for_project(project_id).with_test_name(test_name);
        let holders: Vec<ModelTest> = self
            .store
            .search(&query)?
            .into_iter()
            .filter(|t| exclude_group != Some(t.test_group_id.as_str()))
            .collect();
        if holders.is_empty() {
            Ok(())
        } else {
            Err(Error::AlreadyExists(format!(
                "Test with name \"{test_name}\" already exists in project {project_id}"
            )))
        }
    }

    /// Find the single row a candidate test would overwrite.
    ///
    /// Returns the `(id, test_group_id)` of the matching row, if any.
    ///
    /// # Errors
    ///
    /// `Internal` when more than one row matches the identity tuple.
    pub fn resolve_overwrite(
        &self,
        candidate: &ModelTest,
    ) -> Result<Option<(String, String)>> {
        let identity = candidate.overwrite_identity();
        let query = TestQuery::for_project(candidate.project_id.as_str())
            .with_test_type(candidate.test_type());
        let matches: Vec<ModelTest> = self
            .store
            .search(&query)?
            .into_iter()
            .filter(|t| t.overwrite_identity() == identity)
            .collect();
        match matches.len() {
            0 => Ok(None),
            1 => Ok(Some((
                matches[0].id.clone(),
                matches[0].test_group_id.clone(),
            ))),
            n => Err(Error::Internal(format!(
                "Unexpected state: found {n} tests matching the overwrite request for identity {identity:?}. Request aborted."
            ))),
        }
    }

    /// Delete every member of a group, returning the removed tests.
    ///
    /// # Errors
    ///
    /// `NotFound` when the group has no members.
    pub fn delete_group(&self, project_id: &str, test_group_id: &str) -> Result<Vec<ModelTest>> {
        let query = TestQuery::for_project(project_id).with_group(test_group_id);
        let members = self.store.search(&query)?;
        if members.is_empty() {
            return Err(Error::NotFound(format!(
                "Provided test_group_id does not exist: {test_group_id}"
            )));
        }
        let mut deleted = Vec::with_capacity(members.len());
        for member in members {
            if let Some(removed) = self.store.delete(&member.id)? {
                deleted.push(removed);
            }
        }
        Ok(deleted)
    }

    /// Delete every test targeting a split, returning the removed tests.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub fn delete_for_split(&self, project_id: &str, split_id: &str) -> Result<Vec<ModelTest>> {
        let all = self
            .store
            .search(&TestQuery::for_project(project_id))?;
        let mut deleted = Vec::new();
        for test in all {
            if test.target.split_id() == Some(split_id) {
                if let Some(removed) = self.store.delete(&test.id)? {
                    deleted.push(removed);
                }
            }
        }
        Ok(deleted)
    }

    /// Assign a group id to rows written before groups existed.
    ///
    /// Each legacy row gets a fresh group equal to its own id, so singleton
    /// groups stay consistent. Safe to run under concurrent traffic: every
    /// fix is an upsert keyed by the primary id.
    ///
    /// # Errors
    ///
    /// Store failures; callers log and continue.
    pub fn repair_legacy_groups(&self) -> Result<usize> {
        let mut repaired = 0;
        for mut test in self.store.all()? {
            if test.test_group_id.is_empty() {
                test.test_group_id = test.id.clone();
                self.store.upsert(test)?;
                repaired += 1;
            }
        }
        info!(repaired, "assigned group ids to legacy tests");
        Ok(repaired)
    }
}
