//! Model Module - Pluggable scoring capabilities
//!
//! The decision engine only sees the traits, so models can be swapped
//! (heuristic, ONNX, test doubles) without touching the pipeline.

pub mod scorer;
pub mod heuristic;
pub mod onnx;

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

// Re-export common types
pub use scorer::{AnomalyScore, AnomalyScorer, LabelClassifier, LabelPrediction};
pub use heuristic::{HeuristicLimits, HeuristicScorer};
pub use onnx::{ModelLoadError, OnnxAnomalyScorer, OnnxLabelClassifier};

/// Which unsupervised scorer to construct
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum UnsupervisedBackend {
    None,
    Heuristic,
    Onnx { path: PathBuf, sha256: Option<String> },
}

/// Which supervised classifier to construct
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SupervisedBackend {
    None,
    Onnx { path: PathBuf, sha256: Option<String> },
}

/// Build the unsupervised scorer. A configured model that cannot be loaded
/// is a startup error, never a silent downgrade.
pub fn build_anomaly_scorer(
    backend: &UnsupervisedBackend,
    limits: &HeuristicLimits,
) -> Result<Option<Arc<dyn AnomalyScorer>>, ModelLoadError> {
    let scorer: Option<Arc<dyn AnomalyScorer>> = match backend {
        UnsupervisedBackend::None => None,
        UnsupervisedBackend::Heuristic => Some(Arc::new(HeuristicScorer::new(limits.clone()))),
        UnsupervisedBackend::Onnx { path, sha256 } => {
            Some(Arc::new(OnnxAnomalyScorer::load(path, sha256.as_deref())?))
        }
    };

    match &scorer {
        Some(s) => log::info!("Unsupervised scorer: {}", s.name()),
        None => log::info!("Unsupervised scorer: none"),
    }
    Ok(scorer)
}

/// Build the supervised classifier
pub fn build_label_classifier(
    backend: &SupervisedBackend,
) -> Result<Option<Arc<dyn LabelClassifier>>, ModelLoadError> {
    let classifier: Option<Arc<dyn LabelClassifier>> = match backend {
        SupervisedBackend::None => None,
        SupervisedBackend::Onnx { path, sha256 } => {
            Some(Arc::new(OnnxLabelClassifier::load(path, sha256.as_deref())?))
        }
    };

    match &classifier {
        Some(c) => log::info!("Supervised classifier: {}", c.name()),
        None => log::info!("Supervised classifier: none"),
    }
    Ok(classifier)
}
