//! Policy Types
//!
//! Data only. The decision logic lives in `engine.rs`.

use serde::{Deserialize, Serialize};

use crate::logic::model::{AnomalyScore, LabelPrediction};

// ============================================================================
// DECISION
// ============================================================================

/// Supervised label as stored in the audit trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupervisedLabel {
    pub label: String,
    /// Confidence in `[0, 1]`
    pub prob: f64,
}

impl From<LabelPrediction> for SupervisedLabel {
    fn from(p: LabelPrediction) -> Self {
        Self { label: p.label, prob: p.confidence }
    }
}

/// Raw scorer outputs for one feature record.
///
/// A missing or failing scorer leaves its fields at `None` / `false`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub anomaly_score: Option<f64>,
    pub is_anomaly: bool,
    pub supervised_label: Option<SupervisedLabel>,
}

impl Decision {
    pub fn from_outputs(anomaly: Option<AnomalyScore>, label: Option<LabelPrediction>) -> Self {
        Self {
            anomaly_score: anomaly.map(|a| a.score),
            is_anomaly: anomaly.map(|a| a.is_anomaly).unwrap_or(false),
            supervised_label: label.map(SupervisedLabel::from),
        }
    }
}

// ============================================================================
// VERDICT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerdictStatus {
    Detected,
    Investigate,
}

impl VerdictStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictStatus::Detected => "Detected",
            VerdictStatus::Investigate => "Investigate",
        }
    }
}

impl std::fmt::Display for VerdictStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Policy outcome for a decision that warrants an audit entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// "Anomaly", a supervised label, or "LowConfidenceAnomaly"
    pub category: String,
    pub status: VerdictStatus,
    pub mitigation_required: bool,
}

impl Verdict {
    pub const ANOMALY: &'static str = "Anomaly";
    pub const LOW_CONFIDENCE: &'static str = "LowConfidenceAnomaly";
}
