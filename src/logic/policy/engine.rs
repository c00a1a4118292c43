//! Decision Engine
//!
//! Input: FeatureRecord + configured scorers + PolicyConfig
//! Output: Decision, and a Verdict when the record is worth auditing
//!
//! Precedence:
//! 1. flagged anomaly -> "Anomaly", always mitigated
//! 2. trusted supervised label -> label, mitigated if in the auto-mitigate set
//! 3. unflagged but low score -> "LowConfidenceAnomaly", investigate only
//! 4. otherwise nothing is recorded

use std::sync::Arc;

use crate::logic::audit::{AuditEntry, AuditLog};
use crate::logic::model::{AnomalyScorer, LabelClassifier};
use crate::logic::window::FeatureRecord;
use super::config::PolicyConfig;
use super::types::*;

// ============================================================================
// POLICY
// ============================================================================

/// Apply the policy to a decision. `None` means no audit entry and no action.
pub fn classify(decision: &Decision, config: &PolicyConfig) -> Option<Verdict> {
    if decision.is_anomaly {
        return Some(Verdict {
            category: Verdict::ANOMALY.to_string(),
            status: VerdictStatus::Detected,
            mitigation_required: true,
        });
    }

    if let Some(sup) = &decision.supervised_label {
        if sup.prob > config.supervised_confidence_threshold {
            return Some(Verdict {
                category: sup.label.clone(),
                status: VerdictStatus::Detected,
                mitigation_required: config.should_mitigate(&sup.label),
            });
        }
    }

    match decision.anomaly_score {
        Some(score) if score < config.low_confidence_score_threshold => Some(Verdict {
            category: Verdict::LOW_CONFIDENCE.to_string(),
            status: VerdictStatus::Investigate,
            mitigation_required: false,
        }),
        _ => None,
    }
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct DecisionEngine {
    anomaly_scorer: Option<Arc<dyn AnomalyScorer>>,
    label_classifier: Option<Arc<dyn LabelClassifier>>,
    config: PolicyConfig,
    audit: Arc<AuditLog>,
}

impl DecisionEngine {
    pub fn new(config: PolicyConfig, audit: Arc<AuditLog>) -> Self {
        Self {
            anomaly_scorer: None,
            label_classifier: None,
            config,
            audit,
        }
    }

    pub fn with_anomaly_scorer(mut self, scorer: Option<Arc<dyn AnomalyScorer>>) -> Self {
        self.anomaly_scorer = scorer;
        self
    }

    pub fn with_label_classifier(mut self, classifier: Option<Arc<dyn LabelClassifier>>) -> Self {
        self.label_classifier = classifier;
        self
    }

    /// Run the configured scorers. A failing scorer counts as absent for
    /// this record only.
    pub fn decide(&self, record: &FeatureRecord) -> Decision {
        let features = record.to_vector();

        let anomaly = self.anomaly_scorer.as_ref().and_then(|s| {
            s.score(&features)
                .map_err(|e| log::warn!("Scorer {} failed for {}: {}", s.name(), record.src_ip, e))
                .ok()
        });

        let label = self.label_classifier.as_ref().and_then(|c| {
            c.classify(&features)
                .map_err(|e| log::warn!("Classifier {} failed for {}: {}", c.name(), record.src_ip, e))
                .ok()
        });

        Decision::from_outputs(anomaly, label)
    }

    /// Decide, classify and audit one record
    pub fn handle(&self, record: &FeatureRecord) -> Option<Verdict> {
        let decision = self.decide(record);
        let verdict = classify(&decision, &self.config);

        let Some(verdict) = verdict else {
            log::debug!(
                "{} window@{}: no finding (score={:?})",
                record.src_ip, record.window_start, decision.anomaly_score
            );
            return None;
        };

        log::warn!(
            "{} {} [{}] score={:?} label={:?}",
            record.src_ip,
            verdict.category,
            verdict.status,
            decision.anomaly_score,
            decision.supervised_label.as_ref().map(|s| (&s.label, s.prob))
        );

        let extra = serde_json::json!({ "feat": record, "dec": decision });
        self.audit.record(
            AuditEntry::new(&record.src_ip.to_string(), &verdict.category, verdict.status.as_str())
                .with_extra(extra),
        );

        Some(verdict)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::model::scorer::ScoringError;
    use crate::logic::model::{AnomalyScore, LabelPrediction};
    use crate::logic::window::FeatureVector;

    struct FixedScorer(Result<AnomalyScore, ()>);

    impl AnomalyScorer for FixedScorer {
        fn name(&self) -> &str {
            "fixed"
        }
        fn score(&self, _: &FeatureVector) -> Result<AnomalyScore, ScoringError> {
            self.0.map_err(|_| ScoringError::Inference("boom".to_string()))
        }
    }

    struct FixedLabel(&'static str, f64);

    impl LabelClassifier for FixedLabel {
        fn name(&self) -> &str {
            "fixed"
        }
        fn classify(&self, _: &FeatureVector) -> Result<LabelPrediction, ScoringError> {
            Ok(LabelPrediction { label: self.0.to_string(), confidence: self.1 })
        }
    }

    fn decision(score: Option<f64>, anomaly: bool, label: Option<(&str, f64)>) -> Decision {
        Decision {
            anomaly_score: score,
            is_anomaly: anomaly,
            supervised_label: label.map(|(l, p)| SupervisedLabel { label: l.to_string(), prob: p }),
        }
    }

    fn record() -> FeatureRecord {
        FeatureRecord {
            window_start: 100.0,
            src_ip: "10.0.0.5".parse().unwrap(),
            packets: 120,
            bytes: 40_000,
            unique_dst_ports: 60,
            duration: 2.0,
            protocol_count: 1,
        }
    }

    fn engine(dir: &tempfile::TempDir) -> (DecisionEngine, Arc<AuditLog>) {
        let audit = Arc::new(AuditLog::open(dir.path().join("audit.jsonl")).unwrap());
        (DecisionEngine::new(PolicyConfig::default(), Arc::clone(&audit)), audit)
    }

    #[test]
    fn test_anomaly_wins_over_label() {
        let v = classify(&decision(Some(-0.6), true, Some(("benign", 0.99))), &PolicyConfig::default())
            .unwrap();
        assert_eq!(v.category, "Anomaly");
        assert_eq!(v.status, VerdictStatus::Detected);
        assert!(v.mitigation_required);
    }

    #[test]
    fn test_supervised_threshold_is_strict() {
        let config = PolicyConfig::default();

        let v = classify(&decision(None, false, Some(("portscan", 0.9))), &config).unwrap();
        assert_eq!(v.category, "portscan");
        assert!(v.mitigation_required);

        assert!(classify(&decision(None, false, Some(("portscan", 0.80))), &config).is_none());
        assert!(classify(&decision(None, false, Some(("portscan", 0.85))), &config).is_none());
    }

    #[test]
    fn test_benign_label_not_mitigated() {
        let v = classify(&decision(None, false, Some(("benign", 0.95))), &PolicyConfig::default())
            .unwrap();
        assert_eq!(v.category, "benign");
        assert_eq!(v.status, VerdictStatus::Detected);
        assert!(!v.mitigation_required);
    }

    #[test]
    fn test_label_match_case_insensitive() {
        let v = classify(&decision(None, false, Some(("PortScan", 0.95))), &PolicyConfig::default())
            .unwrap();
        assert!(v.mitigation_required);
    }

    #[test]
    fn test_low_confidence_band() {
        let config = PolicyConfig::default();

        let v = classify(&decision(Some(-0.25), false, None), &config).unwrap();
        assert_eq!(v.category, "LowConfidenceAnomaly");
        assert_eq!(v.status, VerdictStatus::Investigate);
        assert!(!v.mitigation_required);

        // Untrusted label falls through to the score check
        let v = classify(&decision(Some(-0.2), false, Some(("ddos", 0.5))), &config).unwrap();
        assert_eq!(v.category, "LowConfidenceAnomaly");

        assert!(classify(&decision(Some(-0.1), false, None), &config).is_none());
        assert!(classify(&decision(Some(0.3), false, None), &config).is_none());
        assert!(classify(&Decision::default(), &config).is_none());
    }

    #[test]
    fn test_failing_scorer_treated_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, audit) = engine(&dir);
        let engine = engine.with_anomaly_scorer(Some(Arc::new(FixedScorer(Err(())))));

        assert_eq!(engine.decide(&record()), Decision::default());
        assert!(engine.handle(&record()).is_none());
        assert!(audit.read_all().is_empty());
    }

    #[test]
    fn test_handle_writes_detection_entry() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, audit) = engine(&dir);
        let engine = engine
            .with_anomaly_scorer(Some(Arc::new(FixedScorer(Ok(AnomalyScore {
                score: -0.7,
                is_anomaly: true,
            })))))
            .with_label_classifier(Some(Arc::new(FixedLabel("portscan", 0.97))));

        let verdict = engine.handle(&record()).unwrap();
        assert_eq!(verdict.category, "Anomaly");

        let entries = audit.read_all();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].subject, "10.0.0.5");
        assert_eq!(entries[0].status, "Detected");
        assert_eq!(entries[0].extra["feat"]["unique_dst_ports"], 60);
        assert_eq!(entries[0].extra["dec"]["is_anomaly"], true);
        assert_eq!(entries[0].extra["dec"]["supervised_label"]["label"], "portscan");
    }
}
