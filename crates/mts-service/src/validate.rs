//! Request validation
//!
//! Validation fails fast, before any downstream call. Everything here maps to
//! `InvalidArgument` unless noted.

use mts_core::test::FeatureImportanceTest;
use mts_core::threshold::{TestThreshold, ThresholdSpec};
use mts_core::types::ScoreType;
use mts_core::{Error, Result};
use mts_store::{MetadataCatalog, MetadataCatalogExt, compile_anchored};

const MAX_IDENTIFIER_LEN: usize = 256;

/// Names and descriptions: printable, no control characters, bounded length
pub(crate) fn ensure_valid_identifier(field: &str, value: &str) -> Result<()> {
    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(Error::InvalidArgument(format!(
            "`{field}` exceeds {MAX_IDENTIFIER_LEN} characters"
        )));
    }
    if value.chars().any(char::is_control) {
        return Err(Error::InvalidArgument(format!(
            "`{field}` contains control characters"
        )));
    }
    Ok(())
}

/// Compile-check a regex field when present
pub(crate) fn ensure_valid_regex(field: &str, pattern: Option<&str>) -> Result<()> {
    if let Some(pattern) = pattern {
        compile_anchored(field, pattern)?;
    }
    Ok(())
}

/// Check that a referenced model and/or split share a data collection, and
/// that both sit in the test's collection when given.
pub(crate) fn ensure_same_collection(
    metadata: &dyn MetadataCatalog,
    model_id: Option<&str>,
    split_id: Option<&str>,
    test_data_collection_id: Option<&str>,
) -> Result<()> {
    let model_id = model_id.filter(|s| !s.is_empty());
    let split_id = split_id.filter(|s| !s.is_empty());

    let split_dc = match split_id {
        Some(id) => Some(metadata.require_split(id)?.data_collection_id),
        None => None,
    };
    let model_dc = match model_id {
        Some(id) => Some(metadata.require_model(id)?.data_collection_id),
        None => None,
    };

    if let (Some(split_dc), Some(model_dc)) = (&split_dc, &model_dc) {
        if split_dc != model_dc {
            return Err(Error::InvalidArgument(format!(
                "Provided split and model are not in the same data collection: split collection {split_dc}, model collection {model_dc}"
            )));
        }
    } else if let (Some(model_dc), Some(test_dc)) = (&model_dc, test_data_collection_id) {
        if model_dc != test_dc {
            return Err(Error::InvalidArgument(format!(
                "Test and reference model are not in the same data collection: test collection {test_dc}, reference model collection {model_dc}"
            )));
        }
    } else if let (Some(split_dc), Some(test_dc)) = (&split_dc, test_data_collection_id) {
        if split_dc != test_dc {
            return Err(Error::InvalidArgument(format!(
                "Test and reference split are not in the same data collection: test collection {test_dc}, reference split collection {split_dc}"
            )));
        }
    }
    Ok(())
}

/// Threshold references must sit in the test's data collection
pub(crate) fn ensure_reference_in_collection(
    metadata: &dyn MetadataCatalog,
    threshold: &TestThreshold,
    data_collection_id: &str,
) -> Result<()> {
    ensure_same_collection(
        metadata,
        threshold.reference_model_id.as_deref(),
        threshold.reference_split_id.as_deref(),
        Some(data_collection_id),
    )
}

/// Every base/background split in the map must exist and belong to its keyed
/// collection
pub(crate) fn ensure_base_split_map_consistent(
    metadata: &dyn MetadataCatalog,
    map: &std::collections::BTreeMap<String, String>,
) -> Result<()> {
    for (dc_id, base_split_id) in map {
        if base_split_id.is_empty() {
            continue;
        }
        let base = metadata.require_split(base_split_id)?;
        if base.data_collection_id != *dc_id {
            return Err(Error::InvalidArgument(format!(
                "Base split {base_split_id} does not belong in data collection {dc_id}"
            )));
        }
    }
    Ok(())
}

/// Feature importance payload rules: importance floor in (0, 1), whole-number
/// count thresholds, score type compatible with the project
pub(crate) fn ensure_feature_importance_payload(
    payload: &FeatureImportanceTest,
    project_score_type: ScoreType,
) -> Result<()> {
    if payload.min_importance_value <= 0.0 || payload.min_importance_value >= 1.0 {
        return Err(Error::InvalidArgument(
            "min_importance_value needs to be between 0 and 1".to_string(),
        ));
    }
    for (name, threshold) in [
        ("threshold_warning", &payload.threshold_warning),
        ("threshold_fail", &payload.threshold_fail),
    ] {
        if let Some(spec @ ThresholdSpec::SingleValue { .. }) = &threshold.spec {
            if spec.values().iter().any(|v| v.fract() != 0.0) {
                return Err(Error::InvalidArgument(format!(
                    "`{name}` needs to be a whole-number feature count"
                )));
            }
        }
    }
    if project_score_type.is_regression() && !payload.score_type.is_regression() {
        return Err(Error::InvalidArgument(format!(
            "{} is not a valid score type for a regression project",
            payload.score_type
        )));
    }
    if project_score_type.is_classification() && !payload.score_type.is_classification() {
        return Err(Error::InvalidArgument(format!(
            "{} is not a valid score type for a classification project",
            payload.score_type
        )));
    }
    Ok(())
}
