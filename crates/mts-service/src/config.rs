//! Service configuration
//!
//! Downstream endpoints and tunables, loaded from a YAML file and overridable
//! from `MTS_*` environment variables. The binary layers flag overrides on
//! top.

use mts_core::types::{AccuracyType, ScoreType};
use mts_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Analytics engine endpoint (accuracy, bias, distance, influences)
    pub analytics_url: String,
    /// Metadata repository endpoint
    pub metadata_url: String,
    /// Model runner endpoint
    pub model_runner_url: String,
    /// Artifact repository endpoint (project score type, model assets)
    pub artifact_repo_url: String,
    /// Data service endpoint
    pub data_service_url: String,
    /// Workflow engine namespace; baseline workflows are disabled when unset
    pub workflow_namespace: Option<String>,
    /// Metric cache capacity per kind
    pub metric_cache_size: usize,
    /// Metric cache entry lifetime in seconds
    pub metric_cache_ttl_secs: u64,
    /// Metric seeded into default performance tests of classification
    /// projects
    pub default_classification_metric: AccuracyType,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            analytics_url: String::new(),
            metadata_url: String::new(),
            model_runner_url: String::new(),
            artifact_repo_url: String::new(),
            data_service_url: String::new(),
            workflow_namespace: None,
            metric_cache_size: 128,
            metric_cache_ttl_secs: 30,
            default_classification_metric: AccuracyType::RecallOfPositives,
        }
    }
}

impl ServiceConfig {
    /// Load from a YAML file.
    ///
    /// # Errors
    ///
    /// IO failures and malformed YAML.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&raw)
            .map_err(|e| Error::InvalidArgument(format!("config parse error: {e}")))
    }

    /// Override fields from `MTS_*` environment variables
    pub fn apply_env(&mut self) {
        for (var, field) in [
            ("MTS_ANALYTICS_URL", &mut self.analytics_url),
            ("MTS_METADATA_URL", &mut self.metadata_url),
            ("MTS_MODEL_RUNNER_URL", &mut self.model_runner_url),
            ("MTS_ARTIFACT_REPO_URL", &mut self.artifact_repo_url),
            ("MTS_DATA_SERVICE_URL", &mut self.data_service_url),
        ] {
            if let Ok(value) = std::env::var(var) {
                *field = value;
            }
        }
        if let Ok(value) = std::env::var("MTS_WORKFLOW_NAMESPACE") {
            self.workflow_namespace = if value.is_empty() { None } else { Some(value) };
        }
    }

    /// Check that the required downstream endpoints are configured.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` naming the first missing endpoint.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("analytics_url", &self.analytics_url),
            ("metadata_url", &self.metadata_url),
            ("artifact_repo_url", &self.artifact_repo_url),
        ] {
            if value.is_empty() {
                return Err(Error::InvalidArgument(format!(
                    "required endpoint `{name}` is not configured"
                )));
            }
        }
        Ok(())
    }

    /// Metric cache TTL as a duration
    #[must_use]
    pub fn metric_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.metric_cache_ttl_secs)
    }

    /// The default performance metric for a project score type
    #[must_use]
    pub fn default_accuracy_for(&self, score_type: ScoreType) -> AccuracyType {
        if score_type.is_regression() {
            AccuracyType::MeanAbsoluteError
        } else if score_type.is_ranking() {
            AccuracyType::NdcgAtK
        } else {
            self.default_classification_metric
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.metric_cache_size, 128);
        assert_eq!(config.metric_cache_ttl(), Duration::from_secs(30));
        assert_eq!(
            config.default_classification_metric,
            AccuracyType::RecallOfPositives
        );
    }

    #[test]
    fn test_validate_requires_endpoints() {
        let mut config = ServiceConfig::default();
        assert!(config.validate().is_err());
        config.analytics_url = "http://analytics:9000".to_string();
        config.metadata_url = "http://metadata:9001".to_string();
        config.artifact_repo_url = "http://artifacts:9002".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_accuracy_table() {
        let config = ServiceConfig::default();
        assert_eq!(
            config.default_accuracy_for(ScoreType::ClassificationProbits),
            AccuracyType::RecallOfPositives
        );
        assert_eq!(
            config.default_accuracy_for(ScoreType::Regression),
            AccuracyType::MeanAbsoluteError
        );
        assert_eq!(
            config.default_accuracy_for(ScoreType::Ranking),
            AccuracyType::NdcgAtK
        );
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(
            file,
            "analytics_url: http://analytics:9000\nmetric_cache_ttl_secs: 5"
        )
        .expect("write");
        let config = ServiceConfig::from_yaml_file(file.path()).expect("load");
        assert_eq!(config.analytics_url, "http://analytics:9000");
        assert_eq!(config.metric_cache_ttl_secs, 5);
        // Unspecified fields keep defaults
        assert_eq!(config.metric_cache_size, 128);
    }

    #[test]
    fn test_from_yaml_file_rejects_garbage() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "metric_cache_size: [not a number").expect("write");
        assert!(ServiceConfig::from_yaml_file(file.path()).is_err());
    }
}
