//! Scoring Capabilities
//!
//! Stable interface between the pipeline and whatever model backs it:
//! a `FeatureVector` goes in, a score or a label comes out. Implementations
//! can be swapped without touching the decision engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::logic::window::FeatureVector;

// ============================================================================
// OUTPUTS
// ============================================================================

/// Unsupervised output. Lower scores are more anomalous.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalyScore {
    pub score: f64,
    pub is_anomaly: bool,
}

/// Supervised output. `confidence` is in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelPrediction {
    pub label: String,
    pub confidence: f64,
}

// ============================================================================
// ERROR HANDLING
// ============================================================================

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("inference failed: {0}")]
    Inference(String),

    #[error("invalid model output: {0}")]
    InvalidOutput(String),
}

// ============================================================================
// TRAITS
// ============================================================================

/// Unsupervised scorer (isolation-forest style)
pub trait AnomalyScorer: Send + Sync {
    fn name(&self) -> &str;
    fn score(&self, features: &FeatureVector) -> Result<AnomalyScore, ScoringError>;
}

/// Supervised classifier
pub trait LabelClassifier: Send + Sync {
    fn name(&self) -> &str;
    fn classify(&self, features: &FeatureVector) -> Result<LabelPrediction, ScoringError>;
}

impl LabelPrediction {
    /// Reject NaN or out-of-range confidences and empty labels
    pub fn validate(self) -> Result<Self, ScoringError> {
        if self.label.trim().is_empty() {
            return Err(ScoringError::InvalidOutput("empty label".to_string()));
        }
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(ScoringError::InvalidOutput(format!(
                "confidence {} outside [0, 1]",
                self.confidence
            )));
        }
        Ok(self)
    }
}

impl AnomalyScore {
    pub fn validate(self) -> Result<Self, ScoringError> {
        if !self.score.is_finite() {
            return Err(ScoringError::InvalidOutput(format!("score {} is not finite", self.score)));
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_validation() {
        let ok = LabelPrediction { label: "portscan".into(), confidence: 0.9 };
        assert!(ok.validate().is_ok());

        let high = LabelPrediction { label: "portscan".into(), confidence: 1.2 };
        assert!(high.validate().is_err());

        let nan = LabelPrediction { label: "ddos".into(), confidence: f64::NAN };
        assert!(nan.validate().is_err());

        let empty = LabelPrediction { label: "  ".into(), confidence: 0.5 };
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_score_validation() {
        assert!(AnomalyScore { score: -0.3, is_anomaly: true }.validate().is_ok());
        assert!(AnomalyScore { score: f64::NAN, is_anomaly: false }.validate().is_err());
    }
}
