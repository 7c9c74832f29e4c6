//! Foreign metadata contracts
//!
//! Projects, data collections, splits, segments, and models are owned by the
//! external metadata repository; this service holds references only. The
//! catalog trait is the client-side seam, with an in-memory implementation
//! for tests and embedded use.

use mts_core::types::{BiasType, ScoreType};
use mts_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// Kind of a data split. Production splits are excluded from testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitKind {
    /// Training data
    Train,
    /// Held-out test data
    Test,
    /// Validation data
    Validation,
    /// Out-of-time holdout
    OutOfTime,
    /// Live production traffic captured by monitoring
    Production,
    /// Anything else
    Custom,
}

impl SplitKind {
    /// Whether this split carries production data
    #[must_use]
    pub const fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Per-project fairness configuration: acceptable band for one bias metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiasConfig {
    /// The configured bias metric
    pub bias_type: BiasType,
    /// Lower bound of the acceptable band
    pub acceptable_min: f64,
    /// Upper bound of the acceptable band
    pub acceptable_max: f64,
}

/// Project metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectMeta {
    /// Project id
    pub id: String,
    /// Display name
    pub name: String,
    /// The scalar the project's models emit
    pub score_type: ScoreType,
    /// Configured fairness bands
    pub bias_configs: Vec<BiasConfig>,
}

/// Data collection metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataCollectionMeta {
    /// Collection id
    pub id: String,
    /// Display name
    pub name: String,
    /// Owning project
    pub project_id: String,
}

/// Data split metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitMeta {
    /// Split id
    pub id: String,
    /// Display name
    pub name: String,
    /// Owning collection
    pub data_collection_id: String,
    /// Split kind
    pub kind: SplitKind,
    /// Whether the split is active (inactive splits are skipped by resolution)
    pub active: bool,
}

/// A named predicate over split rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentMeta {
    /// Segment name within its group
    pub name: String,
    /// Eligible to act as the privileged side of a fairness comparison
    pub is_protected: bool,
    /// Canonical stringified filter expression
    pub filter_expression: String,
}

/// A group of segments over the same split schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentGroupMeta {
    /// Segment group id
    pub id: String,
    /// Display name
    pub name: String,
    /// Owning project
    pub project_id: String,
    /// Member segments
    pub segments: Vec<SegmentMeta>,
}

/// Model metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelMeta {
    /// Model id
    pub id: String,
    /// Display name
    pub name: String,
    /// Collection the model is attached to
    pub data_collection_id: String,
    /// Split the model was trained on, when recorded
    pub train_split_id: Option<String>,
}

/// Read-only client over the external metadata repository
pub trait MetadataCatalog: Send + Sync {
    /// Look up a project by id
    fn project(&self, id: &str) -> Result<Option<ProjectMeta>>;

    /// Look up a data collection by id
    fn data_collection(&self, id: &str) -> Result<Option<DataCollectionMeta>>;

    /// All data collections in a project
    fn data_collections_in_project(&self, project_id: &str) -> Result<Vec<DataCollectionMeta>>;

    /// Look up a split by id
    fn split(&self, id: &str) -> Result<Option<SplitMeta>>;

    /// All splits in a collection
    fn splits_in_collection(&self, data_collection_id: &str) -> Result<Vec<SplitMeta>>;

    /// Look up a model by id
    fn model(&self, id: &str) -> Result<Option<ModelMeta>>;

    /// All segment groups in a project
    fn segment_groups_in_project(&self, project_id: &str) -> Result<Vec<SegmentGroupMeta>>;

    /// Look up a segment group by id
    fn segment_group(&self, id: &str) -> Result<Option<SegmentGroupMeta>>;
}

/// Catalog helpers that turn missing references into [`Error::NotFound`]
pub trait MetadataCatalogExt: MetadataCatalog {
    /// Project by id or `NotFound`
    fn require_project(&self, id: &str) -> Result<ProjectMeta> {
        self.project(id)?
            .ok_or_else(|| Error::NotFound(format!("Provided project_id does not exist: {id}")))
    }

    /// Split by id or `NotFound`
    fn require_split(&self, id: &str) -> Result<SplitMeta> {
        self.split(id)?
            .ok_or_else(|| Error::NotFound(format!("Provided split_id does not exist: {id}")))
    }

    /// Model by id or `NotFound`
    fn require_model(&self, id: &str) -> Result<ModelMeta> {
        self.model(id)?
            .ok_or_else(|| Error::NotFound(format!("Provided model_id does not exist: {id}")))
    }

    /// Data collection by id or `NotFound`
    fn require_data_collection(&self, id: &str) -> Result<DataCollectionMeta> {
        self.data_collection(id)?
            .ok_or_else(|| Error::NotFound(format!("No such data collection: {id}")))
    }

    /// Segment by group id and name, or `NotFound`
    fn require_segment(&self, segmentation_id: &str, segment_name: &str) -> Result<SegmentMeta> {
        let group = self.segment_group(segmentation_id)?.ok_or_else(|| {
            Error::NotFound(format!("Couldn't find segment group {segmentation_id}"))
        })?;
        group
            .segments
            .into_iter()
            .find(|s| s.name == segment_name)
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "Couldn't find segment {segment_name} in segment group {segmentation_id}"
                ))
            })
    }
}

impl<T: MetadataCatalog + ?Sized> MetadataCatalogExt for T {}

#[derive(Debug, Default)]
struct CatalogState {
    projects: HashMap<String, ProjectMeta>,
    collections: HashMap<String, DataCollectionMeta>,
    splits: HashMap<String, SplitMeta>,
    models: HashMap<String, ModelMeta>,
    segment_groups: HashMap<String, SegmentGroupMeta>,
}

/// In-memory metadata catalog
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    state: RwLock<CatalogState>,
}

impl InMemoryCatalog {
    /// Create an empty catalog
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a project
    pub fn add_project(&self, project: ProjectMeta) {
        let mut state = self.state.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        state.projects.insert(project.id.clone(), project);
    }

    /// Register a data collection
    pub fn add_data_collection(&self, collection: DataCollectionMeta) {
        let mut state = self.state.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        state.collections.insert(collection.id.clone(), collection);
    }

    /// Register a split
    pub fn add_split(&self, split: SplitMeta) {
        let mut state = self.state.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        state.splits.insert(split.id.clone(), split);
    }

    /// Register a model
    pub fn add_model(&self, model: ModelMeta) {
        let mut state = self.state.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        state.models.insert(model.id.clone(), model);
    }

    /// Register a segment group
    pub fn add_segment_group(&self, group: SegmentGroupMeta) {
        let mut state = self.state.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        state.segment_groups.insert(group.id.clone(), group);
    }

    /// Remove a split, simulating external deletion
    pub fn remove_split(&self, id: &str) {
        let mut state = self.state.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        state.splits.remove(id);
    }
}

impl MetadataCatalog for InMemoryCatalog {
    fn project(&self, id: &str) -> Result<Option<ProjectMeta>> {
        let state = self.state.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(state.projects.get(id).cloned())
    }

    fn data_collection(&self, id: &str) -> Result<Option<DataCollectionMeta>> {
        let state = self.state.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(state.collections.get(id).cloned())
    }

    fn data_collections_in_project(&self, project_id: &str) -> Result<Vec<DataCollectionMeta>> {
        let state = self.state.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut out: Vec<DataCollectionMeta> = state
            .collections
            .values()
            .filter(|c| c.project_id == project_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    fn split(&self, id: &str) -> Result<Option<SplitMeta>> {
        let state = self.state.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(state.splits.get(id).cloned())
    }

    fn splits_in_collection(&self, data_collection_id: &str) -> Result<Vec<SplitMeta>> {
        let state = self.state.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut out: Vec<SplitMeta> = state
            .splits
            .values()
            .filter(|s| s.data_collection_id == data_collection_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    fn model(&self, id: &str) -> Result<Option<ModelMeta>> {
        let state = self.state.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(state.models.get(id).cloned())
    }

    fn segment_groups_in_project(&self, project_id: &str) -> Result<Vec<SegmentGroupMeta>> {
        let state = self.state.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut out: Vec<SegmentGroupMeta> = state
            .segment_groups
            .values()
            .filter(|g| g.project_id == project_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    fn segment_group(&self, id: &str) -> Result<Option<SegmentGroupMeta>> {
        let state = self.state.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(state.segment_groups.get(id).cloned())
    }
}
