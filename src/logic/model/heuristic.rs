//! Fallback Heuristic Scorer
//!
//! Model-free unsupervised scorer used when no ONNX model is configured.
//! Each dimension is compared against a ceiling; the worst ratio drives the
//! score. Output follows the isolation-forest convention: positive is normal,
//! negative is anomalous.

use serde::{Deserialize, Serialize};

use super::scorer::{AnomalyScore, AnomalyScorer, ScoringError};
use crate::logic::window::FeatureVector;

/// Per-window ceilings. `None` disables a dimension.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeuristicLimits {
    pub max_packets: Option<f32>,
    pub max_bytes: Option<f32>,
    pub max_unique_dst_ports: Option<f32>,
    pub max_duration: Option<f32>,
    pub max_protocols: Option<f32>,
    /// Scores at or below this are flagged
    pub anomaly_cutoff: f64,
}

impl Default for HeuristicLimits {
    fn default() -> Self {
        Self {
            max_packets: Some(2000.0),
            max_bytes: Some(2_000_000.0),
            max_unique_dst_ports: Some(20.0),
            max_duration: None,
            max_protocols: Some(3.0),
            anomaly_cutoff: -0.5,
        }
    }
}

pub struct HeuristicScorer {
    limits: HeuristicLimits,
}

impl HeuristicScorer {
    pub fn new(limits: HeuristicLimits) -> Self {
        Self { limits }
    }

    fn ceilings(&self) -> [Option<f32>; 5] {
        [
            self.limits.max_packets,
            self.limits.max_bytes,
            self.limits.max_unique_dst_ports,
            self.limits.max_duration,
            self.limits.max_protocols,
        ]
    }
}

impl Default for HeuristicScorer {
    fn default() -> Self {
        Self::new(HeuristicLimits::default())
    }
}

impl AnomalyScorer for HeuristicScorer {
    fn name(&self) -> &str {
        "heuristic"
    }

    fn score(&self, features: &FeatureVector) -> Result<AnomalyScore, ScoringError> {
        let mut max_ratio = 0.0f64;

        for (value, ceiling) in features.iter().zip(self.ceilings()) {
            if let Some(limit) = ceiling.filter(|l| *l > 0.0) {
                max_ratio = max_ratio.max(f64::from(*value) / f64::from(limit));
            }
        }

        let score = (1.0 - max_ratio).clamp(-1.0, 1.0);
        AnomalyScore {
            score,
            is_anomaly: score <= self.limits.anomaly_cutoff,
        }
        .validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normal_traffic() {
        let s = HeuristicScorer::default();
        let out = s.score(&[5.0, 2500.0, 2.0, 4.5, 1.0]).unwrap();
        assert!(!out.is_anomaly);
        assert!(out.score > 0.0);
    }

    #[test]
    fn test_portscan_like() {
        let s = HeuristicScorer::default();
        let out = s.score(&[120.0, 40000.0, 60.0, 2.0, 1.0]).unwrap();
        assert!(out.is_anomaly);
        assert_eq!(out.score, -1.0);
    }

    #[test]
    fn test_ddos_like() {
        let s = HeuristicScorer::default();
        let out = s.score(&[5000.0, 1_500_000.0, 1.0, 10.0, 1.0]).unwrap();
        assert!(out.is_anomaly);
    }

    #[test]
    fn test_borderline_is_low_confidence_band() {
        let s = HeuristicScorer::default();
        // 25 ports / 20 = 1.25 -> score -0.25: below -0.1 but not flagged
        let out = s.score(&[30.0, 5000.0, 25.0, 3.0, 1.0]).unwrap();
        assert!(!out.is_anomaly);
        assert!(out.score < -0.1);
    }
}
