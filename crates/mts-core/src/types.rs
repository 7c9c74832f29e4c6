//! Shared enums and identifiers: score types, metric names, segments

use serde::{Deserialize, Serialize};

/// The scalar a model emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreType {
    /// Raw classification logits
    ClassificationLogits,
    /// Classification probabilities
    ClassificationProbits,
    /// Hard class labels
    ClassificationLabel,
    /// Regression values
    Regression,
    /// Ranking scores
    Ranking,
}

impl ScoreType {
    /// All score types
    #[must_use]
    pub const fn all() -> [Self; 5] {
        [
            Self::ClassificationLogits,
            Self::ClassificationProbits,
            Self::ClassificationLabel,
            Self::Regression,
            Self::Ranking,
        ]
    }

    /// Whether this is a classification output
    #[must_use]
    pub const fn is_classification(&self) -> bool {
        matches!(
            self,
            Self::ClassificationLogits | Self::ClassificationProbits | Self::ClassificationLabel
        )
    }

    /// Whether this is a regression output
    #[must_use]
    pub const fn is_regression(&self) -> bool {
        matches!(self, Self::Regression)
    }

    /// Whether this is a ranking output
    #[must_use]
    pub const fn is_ranking(&self) -> bool {
        matches!(self, Self::Ranking)
    }

    /// Parse a score type from its lowercase name.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown names.
    pub fn from_str_lowercase(s: &str) -> crate::Result<Self> {
        match s.to_lowercase().as_str() {
            "classification_logits" => Ok(Self::ClassificationLogits),
            "classification_probits" | "classification" => Ok(Self::ClassificationProbits),
            "classification_label" => Ok(Self::ClassificationLabel),
            "regression" => Ok(Self::Regression),
            "ranking" => Ok(Self::Ranking),
            other => Err(crate::Error::InvalidArgument(format!(
                "Unknown score type: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for ScoreType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ClassificationLogits => write!(f, "classification_logits"),
            Self::ClassificationProbits => write!(f, "classification_probits"),
            Self::ClassificationLabel => write!(f, "classification_label"),
            Self::Regression => write!(f, "regression"),
            Self::Ranking => write!(f, "ranking"),
        }
    }
}

/// Test category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestType {
    /// Scalar performance metric against a threshold
    Performance,
    /// Distributional distance between two prediction streams
    Stability,
    /// Bias metric between a protected and a comparison segment
    Fairness,
    /// Count of features below an importance floor
    FeatureImportance,
}

impl TestType {
    /// All test types
    #[must_use]
    pub const fn all() -> [Self; 4] {
        [
            Self::Performance,
            Self::Stability,
            Self::Fairness,
            Self::FeatureImportance,
        ]
    }
}

impl std::fmt::Display for TestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Performance => write!(f, "performance"),
            Self::Stability => write!(f, "stability"),
            Self::Fairness => write!(f, "fairness"),
            Self::FeatureImportance => write!(f, "feature_importance"),
        }
    }
}

/// A named scalar performance metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccuracyType {
    /// Area under the ROC curve
    Auc,
    /// Fraction of correct predictions
    Accuracy,
    /// Precision of the positive class
    Precision,
    /// Recall of the positive class
    RecallOfPositives,
    /// Harmonic mean of precision and recall
    F1,
    /// Mean absolute error
    MeanAbsoluteError,
    /// Root mean squared error
    RootMeanSquaredError,
    /// Normalized discounted cumulative gain at k
    NdcgAtK,
    /// Mean reciprocal rank
    MeanReciprocalRank,
}

impl std::fmt::Display for AccuracyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auc => write!(f, "auc"),
            Self::Accuracy => write!(f, "accuracy"),
            Self::Precision => write!(f, "precision"),
            Self::RecallOfPositives => write!(f, "recall_of_positives"),
            Self::F1 => write!(f, "f1"),
            Self::MeanAbsoluteError => write!(f, "mean_absolute_error"),
            Self::RootMeanSquaredError => write!(f, "root_mean_squared_error"),
            Self::NdcgAtK => write!(f, "ndcg_at_k"),
            Self::MeanReciprocalRank => write!(f, "mean_reciprocal_rank"),
        }
    }
}

/// A distributional distance between two prediction streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceType {
    /// Wasserstein distance on numerical predictions
    NumericalWasserstein,
    /// Population stability index
    PopulationStabilityIndex,
    /// Difference of means
    DifferenceOfMean,
    /// Jensen-Shannon divergence
    JensenShannon,
}

impl std::fmt::Display for DistanceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NumericalWasserstein => write!(f, "numerical_wasserstein"),
            Self::PopulationStabilityIndex => write!(f, "population_stability_index"),
            Self::DifferenceOfMean => write!(f, "difference_of_mean"),
            Self::JensenShannon => write!(f, "jensen_shannon"),
        }
    }
}

/// A named fairness metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiasType {
    /// Ratio of positive-outcome rates
    DisparateImpact,
    /// Difference of positive-outcome rates
    StatisticalParityDifference,
    /// Difference of true-positive rates
    EqualOpportunityDifference,
    /// Mean of TPR and FPR differences
    AverageOddsDifference,
}

impl BiasType {
    /// Parse a bias type from its lowercase name.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown names.
    pub fn from_str_lowercase(s: &str) -> crate::Result<Self> {
        match s.to_lowercase().as_str() {
            "disparate_impact" => Ok(Self::DisparateImpact),
            "statistical_parity_difference" => Ok(Self::StatisticalParityDifference),
            "equal_opportunity_difference" => Ok(Self::EqualOpportunityDifference),
            "average_odds_difference" => Ok(Self::AverageOddsDifference),
            other => Err(crate::Error::InvalidArgument(format!(
                "Unknown bias type: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for BiasType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DisparateImpact => write!(f, "disparate_impact"),
            Self::StatisticalParityDifference => write!(f, "statistical_parity_difference"),
            Self::EqualOpportunityDifference => write!(f, "equal_opportunity_difference"),
            Self::AverageOddsDifference => write!(f, "average_odds_difference"),
        }
    }
}

/// Reference to a segment inside a segment group.
///
/// An empty pair means "whole split".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SegmentId {
    /// Segment group id
    pub segmentation_id: String,
    /// Segment name within the group
    pub segment_name: String,
}

impl SegmentId {
    /// Reference a segment by group id and name
    #[must_use]
    pub fn new(segmentation_id: impl Into<String>, segment_name: impl Into<String>) -> Self {
        Self {
            segmentation_id: segmentation_id.into(),
            segment_name: segment_name.into(),
        }
    }

    /// The empty reference ("whole split")
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether this reference is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segmentation_id.is_empty() && self.segment_name.is_empty()
    }

    /// Canonical key used for grouping and dedup
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}-{}", self.segmentation_id, self.segment_name)
    }
}

/// A segment reference together with its canonical filter expression
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SegmentDef {
    /// Segment reference
    pub id: SegmentId,
    /// Canonical stringified filter expression over split rows
    pub filter_expression: String,
}

impl SegmentDef {
    /// Pair a segment reference with its filter expression
    #[must_use]
    pub fn new(id: SegmentId, filter_expression: impl Into<String>) -> Self {
        Self {
            id,
            filter_expression: filter_expression.into(),
        }
    }
}
