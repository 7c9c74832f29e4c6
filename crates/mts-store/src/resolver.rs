//! Regex target resolution
//!
//! Regex targets are selectors, not joins: they are expanded against the
//! current split and segment inventory at request time, so the concrete set a
//! test yields can grow or shrink as data changes. Patterns are compiled per
//! request; a compile failure is an invalid-argument error naming the field.

use crate::metadata::{MetadataCatalog, SegmentGroupMeta, SplitMeta};
use mts_core::types::{SegmentDef, SegmentId};
use mts_core::{Error, Result};
use regex::Regex;
use std::sync::Arc;

/// Compile a request regex, anchored at the start of the candidate name.
///
/// # Errors
///
/// Returns [`Error::InvalidRegex`] naming `field` when the pattern does not
/// compile.
pub fn compile_anchored(field: &str, pattern: &str) -> Result<Regex> {
    Regex::new(&format!("^(?:{pattern})")).map_err(|e| Error::InvalidRegex {
        field: field.to_string(),
        message: e.to_string(),
    })
}

/// Which data collections a regex target searches
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionScope {
    /// Concrete collection ids
    Ids(Vec<String>),
    /// All collections in the project whose name matches
    NameRegex(String),
}

/// Expands regex references into concrete split and segment ids
#[derive(Clone)]
pub struct Resolver {
    metadata: Arc<dyn MetadataCatalog>,
}

impl Resolver {
    /// Create a resolver over a metadata catalog
    #[must_use]
    pub fn new(metadata: Arc<dyn MetadataCatalog>) -> Self {
        Self { metadata }
    }

    /// All active, non-production splits in scope whose name matches.
    ///
    /// # Errors
    ///
    /// Invalid regex fields and metadata lookup failures.
    pub fn splits_from_regex(
        &self,
        project_id: &str,
        split_name_regex: &str,
        scope: &CollectionScope,
    ) -> Result<Vec<SplitMeta>> {
        let split_re = compile_anchored("split_name_regex", split_name_regex)?;
        let collection_ids = match scope {
            CollectionScope::Ids(ids) => ids.clone(),
            CollectionScope::NameRegex(pattern) => {
                let collection_re = compile_anchored("data_collection_name_regex", pattern)?;
                self.metadata
                    .data_collections_in_project(project_id)?
                    .into_iter()
                    .filter(|dc| collection_re.is_match(&dc.name))
                    .map(|dc| dc.id)
                    .collect()
            }
        };
        let mut out = Vec::new();
        for dc_id in &collection_ids {
            for split in self.metadata.splits_in_collection(dc_id)? {
                if split.active && !split.kind.is_production() && split_re.is_match(&split.name) {
                    out.push(split);
                }
            }
        }
        Ok(out)
    }

    /// All protected segments in the project whose name matches.
    ///
    /// # Errors
    ///
    /// Invalid regex field and metadata lookup failures.
    pub fn protected_segments_from_regex(
        &self,
        project_id: &str,
        segment_name_regex: &str,
    ) -> Result<Vec<SegmentDef>> {
        let segment_re = compile_anchored("protected_segment_name_regex", segment_name_regex)?;
        let groups: Vec<SegmentGroupMeta> =
            self.metadata.segment_groups_in_project(project_id)?;
        let mut out = Vec::new();
        for group in groups {
            for segment in group.segments {
                if segment.is_protected && segment_re.is_match(&segment.name) {
                    out.push(SegmentDef::new(
                        SegmentId::new(group.id.clone(), segment.name),
                        segment.filter_expression,
                    ));
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{
        DataCollectionMeta, InMemoryCatalog, ProjectMeta, SegmentMeta, SplitKind,
    };
    use mts_core::types::ScoreType;

    fn fixture() -> Arc<InMemoryCatalog> {
        let catalog = Arc::new(InMemoryCatalog::new());
        catalog.add_project(ProjectMeta {
            id: "p1".to_string(),
            name: "credit".to_string(),
            score_type: ScoreType::ClassificationProbits,
            bias_configs: vec![],
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
        for (id, name, dc, kind, active) in [
            ("s1", "holdout_v1", "dc1", SplitKind::Test, true),
            ("s2", "holdout_v2", "dc1", SplitKind::Test, true),
            ("s3", "train", "dc1", SplitKind::Train, true),
            ("s4", "holdout_prod", "dc1", SplitKind::Production, true),
            ("s5", "holdout_stale", "dc1", SplitKind::Test, false),
            ("s6", "holdout_v1", "dc2", SplitKind::Test, true),
        ] {
            catalog.add_split(SplitMeta {
                id: id.to_string(),
                name: name.to_string(),
                data_collection_id: dc.to_string(),
                kind,
                active,
            });
        }
        catalog
    }

    #[test]
    fn test_splits_from_regex_by_collection_ids() {
        let resolver = Resolver::new(fixture());
        let splits = resolver
            .splits_from_regex(
                "p1",
                "holdout_.*",
                &CollectionScope::Ids(vec!["dc1".to_string()]),
            )
            .expect("resolve");
        let ids: Vec<&str> = splits.iter().map(|s| s.id.as_str()).collect();
        // Production and inactive splits are excluded
        assert_eq!(ids, vec!["s1", "s2"]);
    }

    #[test]
    fn test_splits_from_regex_by_collection_name() {
        let resolver = Resolver::new(fixture());
        let splits = resolver
            .splits_from_regex(
                "p1",
                "holdout_v1",
                &CollectionScope::NameRegex("c.*".to_string()),
            )
            .expect("resolve");
        // Only dc2 ("cards") matches the collection name regex
        assert_eq!(splits.len(), 1);
        assert_eq!(splits[0].id, "s6");
    }

    #[test]
    fn test_regex_is_anchored() {
        let resolver = Resolver::new(fixture());
        let splits = resolver
            .splits_from_regex(
                "p1",
                "v1",
                &CollectionScope::Ids(vec!["dc1".to_string()]),
            )
            .expect("resolve");
        // "v1" does not match "holdout_v1" from the start
        assert!(splits.is_empty());
    }

    #[test]
    fn test_invalid_regex_names_field() {
        let resolver = Resolver::new(fixture());
        let err = resolver
            .splits_from_regex(
                "p1",
                "holdout_(",
                &CollectionScope::Ids(vec!["dc1".to_string()]),
            )
            .unwrap_err();
        match err {
            Error::InvalidRegex { field, .. } => assert_eq!(field, "split_name_regex"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_protected_segments_from_regex() {
        let catalog = fixture();
        catalog.add_segment_group(crate::metadata::SegmentGroupMeta {
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
        catalog.add_segment_group(crate::metadata::SegmentGroupMeta {
            id: "sg2".to_string(),
            name: "age".to_string(),
            project_id: "p1".to_string(),
            segments: vec![SegmentMeta {
                name: "Senior".to_string(),
                is_protected: true,
                filter_expression: "age >= 65".to_string(),
            }],
        });
        let resolver = Resolver::new(catalog);

        let all = resolver
            .protected_segments_from_regex("p1", ".*")
            .expect("resolve");
        // Only protected segments are returned
        assert_eq!(all.len(), 2);

        let females = resolver
            .protected_segments_from_regex("p1", "Fem.*")
            .expect("resolve");
        assert_eq!(females.len(), 1);
        assert_eq!(females[0].id.segment_name, "Female");
        assert_eq!(females[0].id.segmentation_id, "sg1");
    }

    #[test]
    fn test_compile_anchored_error() {
        let err = compile_anchored("my_field", "(").unwrap_err();
        assert!(err.to_string().contains("my_field"));
    }
}
