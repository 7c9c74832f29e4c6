//! Model Test Service — core data model
//!
//! Declarative model tests, thresholds, and evaluation results. A test is an
//! assertion about a model's behavior on a data split (or a regex-matched
//! family of splits), optionally restricted to a segment of rows; evaluating
//! it yields pass / warn / fail with provenance.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
// Allow common patterns
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::needless_pass_by_value)]
// Allow common patterns in test code
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::redundant_clone))]

pub mod context;
pub mod error;
pub mod id;
pub mod result;
pub mod test;
pub mod threshold;
pub mod types;

pub use context::RequestContext;
pub use error::{Error, ErrorCode, Result};
pub use id::new_id;
pub use result::{ResultKind, TestResult};
pub use test::{
    CollectionRef, FairnessTest, FeatureImportanceTest, ModelTest, OverwriteIdentity,
    PerformanceTest, StabilityTest, TestPayload, TestTarget,
};
pub use threshold::{
    RangeCondition, TestThreshold, ThresholdMode, ThresholdOutcome, ThresholdSpec, ValueCondition,
    evaluate_threshold,
};
pub use types::{
    AccuracyType, BiasType, DistanceType, ScoreType, SegmentDef, SegmentId, TestType,
};
