//! Policy Configuration
//!
//! Thresholds for turning scorer output into verdicts.
//! Defaults come from `constants.rs`; can be loaded from a JSON file.

use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    DEFAULT_AUTO_MITIGATE_LABELS, DEFAULT_LOW_CONFIDENCE_SCORE_THRESHOLD,
    DEFAULT_SUPERVISED_CONFIDENCE_THRESHOLD,
};

// ============================================================================
// POLICY CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Supervised label is trusted only when confidence is strictly above this
    pub supervised_confidence_threshold: f64,
    /// Unflagged scores strictly below this are logged for investigation
    pub low_confidence_score_threshold: f64,
    /// Trusted labels that trigger blocking (case-insensitive)
    pub auto_mitigate_labels: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            supervised_confidence_threshold: DEFAULT_SUPERVISED_CONFIDENCE_THRESHOLD,
            low_confidence_score_threshold: DEFAULT_LOW_CONFIDENCE_SCORE_THRESHOLD,
            auto_mitigate_labels: DEFAULT_AUTO_MITIGATE_LABELS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Error)]
pub enum PolicyConfigError {
    #[error("failed to read policy file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid policy file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid policy: {0}")]
    Invalid(String),
}

impl PolicyConfig {
    /// Load from JSON; missing keys keep their defaults
    pub fn from_file(path: &Path) -> Result<Self, PolicyConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|source| PolicyConfigError::Io { path: path.to_path_buf(), source })?;
        let mut config: PolicyConfig = serde_json::from_str(&content)
            .map_err(|source| PolicyConfigError::Parse { path: path.to_path_buf(), source })?;
        config.normalize_labels();
        config.validate()?;
        log::info!("Loaded policy from {:?}", path);
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PolicyConfigError> {
        let t = self.supervised_confidence_threshold;
        if !t.is_finite() || !(0.0..=1.0).contains(&t) {
            return Err(PolicyConfigError::Invalid(format!(
                "supervised_confidence_threshold {} must be within [0, 1]",
                t
            )));
        }
        if !self.low_confidence_score_threshold.is_finite() {
            return Err(PolicyConfigError::Invalid(
                "low_confidence_score_threshold must be finite".to_string(),
            ));
        }
        Ok(())
    }

    /// Trim entries and drop blank ones
    pub fn normalize_labels(&mut self) {
        self.auto_mitigate_labels = self
            .auto_mitigate_labels
            .iter()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();
    }

    /// Check if a trusted label should be blocked
    pub fn should_mitigate(&self, label: &str) -> bool {
        let label = label.trim();
        self.auto_mitigate_labels
            .iter()
            .any(|l| l.trim().eq_ignore_ascii_case(label))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PolicyConfig::default();
        assert_eq!(config.supervised_confidence_threshold, 0.85);
        assert_eq!(config.low_confidence_score_threshold, -0.1);
        assert!(config.should_mitigate("portscan"));
        assert!(config.should_mitigate("DDoS"));
        assert!(!config.should_mitigate("benign"));
    }

    #[test]
    fn test_no_labels_means_no_mitigation() {
        let config = PolicyConfig {
            auto_mitigate_labels: Vec::new(),
            ..Default::default()
        };
        assert!(!config.should_mitigate("portscan"));
    }

    #[test]
    fn test_padded_labels_match() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.json");
        std::fs::write(&path, r#"{ "auto_mitigate_labels": [" ddos ", "", "PortScan"] }"#).unwrap();

        let config = PolicyConfig::from_file(&path).unwrap();
        assert_eq!(config.auto_mitigate_labels, vec!["ddos", "PortScan"]);
        assert!(config.should_mitigate("DDoS"));
        assert!(config.should_mitigate(" portscan"));

        let unnormalized = PolicyConfig {
            auto_mitigate_labels: vec![" ddos ".to_string()],
            ..Default::default()
        };
        assert!(unnormalized.should_mitigate("ddos"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.json");
        std::fs::write(&path, r#"{ "supervised_confidence_threshold": 0.7 }"#).unwrap();

        let config = PolicyConfig::from_file(&path).unwrap();
        assert_eq!(config.supervised_confidence_threshold, 0.7);
        assert_eq!(config.auto_mitigate_labels, vec!["portscan", "ddos"]);
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.json");
        std::fs::write(&path, r#"{ "supervised_confidence_threshold": 1.5 }"#).unwrap();
        assert!(matches!(
            PolicyConfig::from_file(&path),
            Err(PolicyConfigError::Invalid(_))
        ));

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            PolicyConfig::from_file(&path),
            Err(PolicyConfigError::Parse { .. })
        ));
    }
}
