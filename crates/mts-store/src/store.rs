//! Test definition storage
//!
//! Writes are serialized per test id; overwrite replaces atomically under the
//! store lock. Reads are snapshot-per-query.

use mts_core::types::{SegmentId, TestType};
use mts_core::{Error, ModelTest, Result};
use std::collections::BTreeMap;
use std::sync::RwLock;

/// Filters accepted by [`TestStore::search`].
///
/// A test with a regex target matches a concrete `data_collection_id` /
/// `split_id` filter as well: regex rows apply to "any" collection or split
/// until resolved. Name-level regex filtering happens one layer up, where
/// resolved names are available.
#[derive(Debug, Clone, Default)]
pub struct TestQuery {
    /// Project scope (required)
    pub project_id: String,
    /// Restrict to one test type
    pub test_type: Option<TestType>,
    /// Restrict to tests targeting this collection (or any collection)
    pub data_collection_id: Option<String>,
    /// Restrict to tests targeting this split (or any split)
    pub split_id: Option<String>,
    /// Restrict to an exact segment pair
    pub segment: Option<SegmentId>,
    /// Restrict to one test id
    pub test_id: Option<String>,
    /// Restrict to one group
    pub test_group_id: Option<String>,
    /// Restrict to an exact test name
    pub test_name: Option<String>,
}

impl TestQuery {
    /// Query scoped to a project
    #[must_use]
    pub fn for_project(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            ..Self::default()
        }
    }

    /// Restrict to one test type
    #[must_use]
    pub fn with_test_type(mut self, test_type: TestType) -> Self {
        self.test_type = Some(test_type);
        self
    }

    /// Restrict to tests targeting this collection
    #[must_use]
    pub fn with_data_collection(mut self, id: impl Into<String>) -> Self {
        self.data_collection_id = Some(id.into());
        self
    }

    /// Restrict to tests targeting this split
    #[must_use]
    pub fn with_split(mut self, id: impl Into<String>) -> Self {
        self.split_id = Some(id.into());
        self
    }

    /// Restrict to an exact segment pair
    #[must_use]
    pub fn with_segment(mut self, segment: SegmentId) -> Self {
        self.segment = Some(segment);
        self
    }

    /// Restrict to one test id
    #[must_use]
    pub fn with_test_id(mut self, id: impl Into<String>) -> Self {
        self.test_id = Some(id.into());
        self
    }

    /// Restrict to one group
    #[must_use]
    pub fn with_group(mut self, id: impl Into<String>) -> Self {
        self.test_group_id = Some(id.into());
        self
    }

    /// Restrict to an exact test name
    #[must_use]
    pub fn with_test_name(mut self, name: impl Into<String>) -> Self {
        self.test_name = Some(name.into());
        self
    }

    /// Whether a stored test satisfies this query
    #[must_use]
    pub fn matches(&self, test: &ModelTest) -> bool {
        if test.project_id != self.project_id {
            return false;
        }
        if let Some(t) = self.test_type {
            if test.test_type() != t {
                return false;
            }
        }
        if let Some(dc) = &self.data_collection_id {
            // Regex rows target "any" collection until resolved
            if test
                .target
                .data_collection_id()
                .is_some_and(|id| id != dc)
            {
                return false;
            }
        }
        if let Some(split) = &self.split_id {
            if test.target.split_id().is_some_and(|id| id != split) {
                return false;
            }
        }
        if let Some(segment) = &self.segment {
            if &test.segment != segment {
                return false;
            }
        }
        if let Some(id) = &self.test_id {
            if &test.id != id {
                return false;
            }
        }
        if let Some(group) = &self.test_group_id {
            if &test.test_group_id != group {
                return false;
            }
        }
        if let Some(name) = &self.test_name {
            if &test.test_name != name {
                return false;
            }
        }
        true
    }
}

/// Persistence seam for test definitions
pub trait TestStore: Send + Sync {
    /// Insert a new test; fails with `AlreadyExists` on a duplicate id
    fn insert(&self, test: ModelTest) -> Result<()>;

    /// Insert or replace by id
    fn upsert(&self, test: ModelTest) -> Result<()>;

    /// Delete by id, returning the removed test
    fn delete(&self, test_id: &str) -> Result<Option<ModelTest>>;

    /// All tests satisfying a query, in stable id order
    fn search(&self, query: &TestQuery) -> Result<Vec<ModelTest>>;

    /// Every stored test, for maintenance passes
    fn all(&self) -> Result<Vec<ModelTest>>;
}

/// In-memory test store
#[derive(Debug, Default)]
pub struct InMemoryTestStore {
    tests: RwLock<BTreeMap<String, ModelTest>>,
}

impl InMemoryTestStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored tests
    #[must_use]
    pub fn len(&self) -> usize {
        self.tests
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TestStore for InMemoryTestStore {
    fn insert(&self, test: ModelTest) -> Result<()> {
        let mut tests = self
            .tests
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if tests.contains_key(&test.id) {
            return Err(Error::AlreadyExists(format!(
                "Test with id {} already exists",
                test.id
            )));
        }
        tests.insert(test.id.clone(), test);
        Ok(())
    }

    fn upsert(&self, test: ModelTest) -> Result<()> {
        let mut tests = self
            .tests
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        tests.insert(test.id.clone(), test);
        Ok(())
    }

    fn delete(&self, test_id: &str) -> Result<Option<ModelTest>> {
        let mut tests = self
            .tests
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(tests.remove(test_id))
    }

    fn search(&self, query: &TestQuery) -> Result<Vec<ModelTest>> {
        let tests = self
            .tests
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(tests.values().filter(|t| query.matches(t)).cloned().collect())
    }

    fn all(&self) -> Result<Vec<ModelTest>> {
        let tests = self
            .tests
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(tests.values().cloned().collect())
    }
}
