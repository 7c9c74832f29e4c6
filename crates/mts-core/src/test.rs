//! Model test definitions
//!
//! The central entity: a declarative assertion about a model's behavior on a
//! data split, with a test-type-specific payload. Tests created together
//! share a `test_group_id`; every test belongs to exactly one group.

use crate::threshold::TestThreshold;
use crate::types::{AccuracyType, BiasType, DistanceType, ScoreType, SegmentId, TestType};
use serde::{Deserialize, Serialize};

/// How a test names the data collections it applies to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionRef {
    /// A concrete data collection id
    Id(String),
    /// All collections whose name matches a regex
    NameRegex(String),
}

/// Target selector: exactly one of a concrete split or a regex family
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestTarget {
    /// A single concrete split
    Split {
        /// Collection the split belongs to
        data_collection_id: String,
        /// The split under test
        split_id: String,
    },
    /// Every split whose name matches, within the referenced collections.
    ///
    /// Expanded at evaluation time, not at creation time, so the concrete
    /// result set grows and shrinks with the split inventory.
    Regex {
        /// Split name pattern
        split_name_regex: String,
        /// Which collections to search
        collection: CollectionRef,
    },
}

impl TestTarget {
    /// Concrete split id, if this target is concrete
    #[must_use]
    pub fn split_id(&self) -> Option<&str> {
        match self {
            Self::Split { split_id, .. } => Some(split_id),
            Self::Regex { .. } => None,
        }
    }

    /// Concrete data collection id, if this target names one
    #[must_use]
    pub fn data_collection_id(&self) -> Option<&str> {
        match self {
            Self::Split {
                data_collection_id, ..
            } => Some(data_collection_id),
            Self::Regex {
                collection: CollectionRef::Id(id),
                ..
            } => Some(id),
            Self::Regex { .. } => None,
        }
    }

    /// Split name regex, if this target is a regex family
    #[must_use]
    pub fn split_name_regex(&self) -> Option<&str> {
        match self {
            Self::Regex {
                split_name_regex, ..
            } => Some(split_name_regex),
            Self::Split { .. } => None,
        }
    }

    /// Collection name regex, if this target selects collections by name
    #[must_use]
    pub fn collection_name_regex(&self) -> Option<&str> {
        match self {
            Self::Regex {
                collection: CollectionRef::NameRegex(re),
                ..
            } => Some(re),
            _ => None,
        }
    }
}

/// Performance test payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceTest {
    /// Metric to compute
    pub accuracy_type: Option<AccuracyType>,
    /// Warning threshold
    pub threshold_warning: TestThreshold,
    /// Fail threshold
    pub threshold_fail: TestThreshold,
}

/// Stability test payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StabilityTest {
    /// Distance to compute between base and comparison predictions
    pub distance_type: DistanceType,
    /// Base split; falls back to the model's train split when unset
    pub base_split_id: Option<String>,
    /// Warning threshold
    pub threshold_warning: TestThreshold,
    /// Fail threshold
    pub threshold_fail: TestThreshold,
}

/// Fairness test payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FairnessTest {
    /// Bias metric to compute
    pub bias_type: BiasType,
    /// Privileged side of the comparison
    pub protected: SegmentId,
    /// Comparison side; empty means "rest of the split"
    pub comparison: SegmentId,
    /// Expands to one slot per matched protected segment at evaluation time
    pub protected_segment_name_regex: Option<String>,
    /// Warning threshold
    pub threshold_warning: TestThreshold,
    /// Fail threshold
    pub threshold_fail: TestThreshold,
}

/// Feature importance test payload.
///
/// The metric is the count of features whose importance falls below
/// `min_importance_value`, so thresholds carry whole-number counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportanceTest {
    /// Background split for influence computation; must share the target's
    /// data collection
    pub background_split_id: String,
    /// Score type the influences are computed against
    pub score_type: ScoreType,
    /// Features below this importance count against the thresholds
    pub min_importance_value: f64,
    /// Warning threshold
    pub threshold_warning: TestThreshold,
    /// Fail threshold
    pub threshold_fail: TestThreshold,
}

/// Test-type-specific payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestPayload {
    /// Scalar performance metric
    Performance(PerformanceTest),
    /// Distributional stability
    Stability(StabilityTest),
    /// Segment fairness
    Fairness(FairnessTest),
    /// Feature importance floor
    FeatureImportance(FeatureImportanceTest),
}

impl TestPayload {
    /// The test type this payload belongs to
    #[must_use]
    pub const fn test_type(&self) -> TestType {
        match self {
            Self::Performance(_) => TestType::Performance,
            Self::Stability(_) => TestType::Stability,
            Self::Fairness(_) => TestType::Fairness,
            Self::FeatureImportance(_) => TestType::FeatureImportance,
        }
    }

    /// Warning threshold of this payload
    #[must_use]
    pub fn threshold_warning(&self) -> &TestThreshold {
        match self {
            Self::Performance(p) => &p.threshold_warning,
            Self::Stability(s) => &s.threshold_warning,
            Self::Fairness(f) => &f.threshold_warning,
            Self::FeatureImportance(fi) => &fi.threshold_warning,
        }
    }

    /// Fail threshold of this payload
    #[must_use]
    pub fn threshold_fail(&self) -> &TestThreshold {
        match self {
            Self::Performance(p) => &p.threshold_fail,
            Self::Stability(s) => &s.threshold_fail,
            Self::Fairness(f) => &f.threshold_fail,
            Self::FeatureImportance(fi) => &fi.threshold_fail,
        }
    }
}

/// The identity tuple that designates "the same logical test" for overwrite
/// semantics. Two tests with equal identities are the same row; an overwrite
/// request matching more than one row is an invariant violation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OverwriteIdentity {
    /// Project scope
    pub project_id: String,
    /// Test type
    pub test_type: TestType,
    /// Concrete split id; empty for regex targets
    pub split_id: String,
    /// Canonical segment pair key
    pub segment_key: String,
    /// Canonical per-type discriminator
    pub payload_key: String,
}

/// A stored model test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelTest {
    /// Unique test id
    pub id: String,
    /// Group shared by sibling tests created together; never empty once stored
    pub test_group_id: String,
    /// Project scope
    pub project_id: String,
    /// Target selector
    pub target: TestTarget,
    /// Optional row segment; empty pair means "whole split"
    pub segment: SegmentId,
    /// Display name, unique per project across groups when non-empty
    pub test_name: String,
    /// Free-form description
    pub description: String,
    /// Whether the test runs automatically on evaluation requests
    pub autorun: bool,
    /// Test-type-specific payload
    pub payload: TestPayload,
}

impl ModelTest {
    /// The test type, derived from the payload
    #[must_use]
    pub const fn test_type(&self) -> TestType {
        self.payload.test_type()
    }

    /// The overwrite identity tuple for this test.
    ///
    /// Per type: performance keys on the accuracy type, stability on the base
    /// split and distance type, fairness on the bias type and both segment
    /// pairs, feature importance on the target alone.
    #[must_use]
    pub fn overwrite_identity(&self) -> OverwriteIdentity {
        let payload_key = match &self.payload {
            TestPayload::Performance(p) => {
                let metric = p
                    .accuracy_type
                    .map_or_else(String::new, |a| a.to_string());
                format!("accuracy={metric}")
            }
            TestPayload::Stability(s) => format!(
                "base={};distance={}",
                s.base_split_id.as_deref().unwrap_or(""),
                s.distance_type
            ),
            TestPayload::Fairness(f) => format!(
                "bias={};protected={};comparison={}",
                f.bias_type,
                f.protected.key(),
                f.comparison.key()
            ),
            TestPayload::FeatureImportance(_) => String::new(),
        };
        OverwriteIdentity {
            project_id: self.project_id.clone(),
            test_type: self.test_type(),
            split_id: self.target.split_id().unwrap_or("").to_string(),
            segment_key: self.segment.key(),
            payload_key,
        }
    }

    /// Copy of this test with the concrete split substituted into the target.
    ///
    /// Used when a regex target resolves to a concrete split so a result slot
    /// carries the split it was measured on.
    #[must_use]
    pub fn with_concrete_split(
        &self,
        data_collection_id: impl Into<String>,
        split_id: impl Into<String>,
    ) -> Self {
        let mut test = self.clone();
        test.target = TestTarget::Split {
            data_collection_id: data_collection_id.into(),
            split_id: split_id.into(),
        };
        test
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AccuracyType;

    fn performance_test(split_id: &str, accuracy: AccuracyType) -> ModelTest {
        ModelTest {
            id: "t1".to_string(),
            test_group_id: "g1".to_string(),
            project_id: "p1".to_string(),
            target: TestTarget::Split {
                data_collection_id: "dc1".to_string(),
                split_id: split_id.to_string(),
            },
            segment: SegmentId::empty(),
            test_name: "perf".to_string(),
            description: String::new(),
            autorun: true,
            payload: TestPayload::Performance(PerformanceTest {
                accuracy_type: Some(accuracy),
                threshold_warning: TestThreshold::unset(),
                threshold_fail: TestThreshold::unset(),
            }),
        }
    }

    #[test]
    fn test_test_type_from_payload() {
        let test = performance_test("s1", AccuracyType::Auc);
        assert_eq!(test.test_type(), TestType::Performance);
    }

    #[test]
    fn test_overwrite_identity_distinguishes_metric() {
        let a = performance_test("s1", AccuracyType::Auc);
        let b = performance_test("s1", AccuracyType::RecallOfPositives);
        assert_ne!(a.overwrite_identity(), b.overwrite_identity());
    }

    #[test]
    fn test_overwrite_identity_distinguishes_split() {
        let a = performance_test("s1", AccuracyType::Auc);
        let b = performance_test("s2", AccuracyType::Auc);
        assert_ne!(a.overwrite_identity(), b.overwrite_identity());
    }

    #[test]
    fn test_overwrite_identity_same_logical_test() {
        let mut a = performance_test("s1", AccuracyType::Auc);
        let mut b = performance_test("s1", AccuracyType::Auc);
        a.id = "x".to_string();
        b.id = "y".to_string();
        b.test_name = "other name".to_string();
        assert_eq!(a.overwrite_identity(), b.overwrite_identity());
    }

    #[test]
    fn test_fairness_identity_keys_on_segments() {
        let base = FairnessTest {
            bias_type: BiasType::DisparateImpact,
            protected: SegmentId::new("sg1", "Female"),
            comparison: SegmentId::new("sg1", "Male"),
            protected_segment_name_regex: None,
            threshold_warning: TestThreshold::unset(),
            threshold_fail: TestThreshold::unset(),
        };
        let mut a = performance_test("s1", AccuracyType::Auc);
        a.payload = TestPayload::Fairness(base.clone());
        let mut b = a.clone();
        if let TestPayload::Fairness(f) = &mut b.payload {
            f.comparison = SegmentId::empty();
        }
        assert_ne!(a.overwrite_identity(), b.overwrite_identity());
    }

    #[test]
    fn test_target_accessors() {
        let concrete = TestTarget::Split {
            data_collection_id: "dc1".to_string(),
            split_id: "s1".to_string(),
        };
        assert_eq!(concrete.split_id(), Some("s1"));
        assert_eq!(concrete.data_collection_id(), Some("dc1"));
        assert!(concrete.split_name_regex().is_none());

        let regex = TestTarget::Regex {
            split_name_regex: "holdout_.*".to_string(),
            collection: CollectionRef::NameRegex(".*".to_string()),
        };
        assert!(regex.split_id().is_none());
        assert!(regex.data_collection_id().is_none());
        assert_eq!(regex.split_name_regex(), Some("holdout_.*"));
        assert_eq!(regex.collection_name_regex(), Some(".*"));

        let scoped = TestTarget::Regex {
            split_name_regex: ".*".to_string(),
            collection: CollectionRef::Id("dc2".to_string()),
        };
        assert_eq!(scoped.data_collection_id(), Some("dc2"));
        assert!(scoped.collection_name_regex().is_none());
    }

    #[test]
    fn test_with_concrete_split() {
        let mut test = performance_test("s1", AccuracyType::Auc);
        test.target = TestTarget::Regex {
            split_name_regex: "holdout_.*".to_string(),
            collection: CollectionRef::Id("dc1".to_string()),
        };
        let slot = test.with_concrete_split("dc1", "holdout_v2");
        assert_eq!(slot.target.split_id(), Some("holdout_v2"));
        // The original is untouched
        assert!(test.target.split_id().is_none());
    }

    #[test]
    fn test_payload_threshold_accessors() {
        let test = performance_test("s1", AccuracyType::Auc);
        assert!(test.payload.threshold_warning().spec.is_none());
        assert!(test.payload.threshold_fail().spec.is_none());
    }

    #[test]
    fn test_model_test_serde_roundtrip() {
        let test = performance_test("s1", AccuracyType::NdcgAtK);
        let json = serde_json::to_string(&test).expect("serialize");
        let back: ModelTest = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, test);
    }
}
