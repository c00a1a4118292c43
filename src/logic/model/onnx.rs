//! ONNX Scorers - ONNX Runtime Integration
//!
//! Both scorers load an exported model plus a JSON sidecar with the scaler
//! parameters used at training time:
//!
//! ```json
//! { "mean": [..5], "scale": [..5], "threshold": 0.0, "labels": ["benign", "portscan", "ddos"] }
//! ```
//!
//! Unsupervised models must emit one float per row where lower means more
//! anomalous (isolation-forest `decision_function`). Classifiers must emit a
//! float probability row ordered like `labels`.

use std::path::{Path, PathBuf};
use ndarray::Array2;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Value;

use super::scorer::{AnomalyScore, AnomalyScorer, LabelClassifier, LabelPrediction, ScoringError};
use crate::logic::window::{FeatureVector, FEATURE_COUNT};

// ============================================================================
// ERRORS
// ============================================================================

/// Startup-time model loading failure
#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("model not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("invalid sidecar {path}: {reason}")]
    Sidecar { path: PathBuf, reason: String },

    #[error("onnx runtime: {0}")]
    Runtime(String),
}

// ============================================================================
// SIDECAR
// ============================================================================

/// Scaler + decision parameters stored next to the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSidecar {
    #[serde(default = "default_mean")]
    pub mean: Vec<f32>,
    #[serde(default = "default_scale")]
    pub scale: Vec<f32>,
    /// Unsupervised: scores below this are anomalies
    #[serde(default)]
    pub threshold: f64,
    /// Classifier: class names in output order
    #[serde(default)]
    pub labels: Vec<String>,
}

fn default_mean() -> Vec<f32> {
    vec![0.0; FEATURE_COUNT]
}

fn default_scale() -> Vec<f32> {
    vec![1.0; FEATURE_COUNT]
}

impl Default for ModelSidecar {
    fn default() -> Self {
        Self {
            mean: default_mean(),
            scale: default_scale(),
            threshold: 0.0,
            labels: Vec::new(),
        }
    }
}

impl ModelSidecar {
    /// Load `<model>.json` if it exists, defaults otherwise
    pub fn load_for(model_path: &Path) -> Result<Self, ModelLoadError> {
        let path = model_path.with_extension("json");
        if !path.exists() {
            log::info!("No sidecar at {:?}, using identity scaling", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|source| ModelLoadError::Io { path: path.clone(), source })?;
        let sidecar: ModelSidecar = serde_json::from_str(&content)
            .map_err(|e| ModelLoadError::Sidecar { path: path.clone(), reason: e.to_string() })?;

        if sidecar.mean.len() != FEATURE_COUNT || sidecar.scale.len() != FEATURE_COUNT {
            return Err(ModelLoadError::Sidecar {
                path,
                reason: format!("mean/scale must have {} entries", FEATURE_COUNT),
            });
        }
        Ok(sidecar)
    }

    /// Standard-scale one vector
    pub fn normalize(&self, features: &FeatureVector) -> FeatureVector {
        let mut out = [0.0f32; FEATURE_COUNT];
        for i in 0..FEATURE_COUNT {
            let mean = self.mean.get(i).copied().unwrap_or(0.0);
            let scale = self.scale.get(i).copied().filter(|s| s.abs() > 1e-12).unwrap_or(1.0);
            out[i] = (features[i] - mean) / scale;
        }
        out
    }
}

// ============================================================================
// LOADING
// ============================================================================

/// Compare the file's SHA-256 against a pinned hex digest
pub fn verify_checksum(path: &Path, expected: &str) -> Result<(), ModelLoadError> {
    let bytes = std::fs::read(path)
        .map_err(|source| ModelLoadError::Io { path: path.to_path_buf(), source })?;
    let actual = hex::encode(Sha256::digest(&bytes));

    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(())
    } else {
        Err(ModelLoadError::ChecksumMismatch {
            path: path.to_path_buf(),
            expected: expected.trim().to_lowercase(),
            actual,
        })
    }
}

fn load_session(path: &Path, checksum: Option<&str>) -> Result<Session, ModelLoadError> {
    log::info!("Loading ONNX model from: {:?}", path);

    if !path.exists() {
        return Err(ModelLoadError::NotFound(path.to_path_buf()));
    }
    if let Some(expected) = checksum {
        verify_checksum(path, expected)?;
    }

    let session = Session::builder()
        .map_err(|e| ModelLoadError::Runtime(format!("Failed to create session builder: {}", e)))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| ModelLoadError::Runtime(format!("Failed to set optimization: {}", e)))?
        .commit_from_file(path)
        .map_err(|e| ModelLoadError::Runtime(format!("Failed to load model: {}", e)))?;

    log::info!("ONNX model loaded: {:?}", path);
    Ok(session)
}

/// Run one row through the session and return the first float output
fn run_single_row(session: &Mutex<Session>, row: FeatureVector) -> Result<Vec<f32>, ScoringError> {
    let input_array = Array2::<f32>::from_shape_vec((1, FEATURE_COUNT), row.to_vec())
        .map_err(|e| ScoringError::Inference(format!("Array error: {}", e)))?;

    let mut guard = session.lock();
    let output_names: Vec<String> = guard.outputs.iter().map(|o| o.name.clone()).collect();
    if output_names.is_empty() {
        return Err(ScoringError::InvalidOutput("No output defined".to_string()));
    }

    let input_tensor = Value::from_array(input_array)
        .map_err(|e| ScoringError::Inference(format!("Tensor error: {}", e)))?;

    let outputs = guard
        .run(ort::inputs![input_tensor])
        .map_err(|e| ScoringError::Inference(format!("Inference failed: {}", e)))?;

    // skl2onnx exports put an int64 label first; take the first float tensor
    for name in &output_names {
        if let Some(output) = outputs.get(name.as_str()) {
            if let Ok(tensor) = output.try_extract_tensor::<f32>() {
                return Ok(tensor.1.to_vec());
            }
        }
    }

    Err(ScoringError::InvalidOutput("no float output tensor".to_string()))
}

// ============================================================================
// UNSUPERVISED
// ============================================================================

pub struct OnnxAnomalyScorer {
    path: String,
    session: Mutex<Session>,
    sidecar: ModelSidecar,
}

impl OnnxAnomalyScorer {
    pub fn load(path: &Path, checksum: Option<&str>) -> Result<Self, ModelLoadError> {
        let session = load_session(path, checksum)?;
        let sidecar = ModelSidecar::load_for(path)?;
        Ok(Self {
            path: path.display().to_string(),
            session: Mutex::new(session),
            sidecar,
        })
    }
}

impl AnomalyScorer for OnnxAnomalyScorer {
    fn name(&self) -> &str {
        &self.path
    }

    fn score(&self, features: &FeatureVector) -> Result<AnomalyScore, ScoringError> {
        let data = run_single_row(&self.session, self.sidecar.normalize(features))?;
        let score = data
            .first()
            .copied()
            .ok_or_else(|| ScoringError::InvalidOutput("empty score tensor".to_string()))?;

        AnomalyScore {
            score: f64::from(score),
            is_anomaly: f64::from(score) < self.sidecar.threshold,
        }
        .validate()
    }
}

// ============================================================================
// SUPERVISED
// ============================================================================

pub struct OnnxLabelClassifier {
    path: String,
    session: Mutex<Session>,
    sidecar: ModelSidecar,
}

impl OnnxLabelClassifier {
    pub fn load(path: &Path, checksum: Option<&str>) -> Result<Self, ModelLoadError> {
        let session = load_session(path, checksum)?;
        let sidecar = ModelSidecar::load_for(path)?;

        if sidecar.labels.is_empty() {
            return Err(ModelLoadError::Sidecar {
                path: path.with_extension("json"),
                reason: "classifier sidecar must list labels".to_string(),
            });
        }

        Ok(Self {
            path: path.display().to_string(),
            session: Mutex::new(session),
            sidecar,
        })
    }
}

impl LabelClassifier for OnnxLabelClassifier {
    fn name(&self) -> &str {
        &self.path
    }

    fn classify(&self, features: &FeatureVector) -> Result<LabelPrediction, ScoringError> {
        let probs = run_single_row(&self.session, self.sidecar.normalize(features))?;
        pick_label(&probs, &self.sidecar.labels)
    }
}

/// Arg-max over the probability row
pub fn pick_label(probs: &[f32], labels: &[String]) -> Result<LabelPrediction, ScoringError> {
    if probs.len() < labels.len() {
        return Err(ScoringError::InvalidOutput(format!(
            "expected {} probabilities, got {}",
            labels.len(),
            probs.len()
        )));
    }

    let (idx, prob) = probs
        .iter()
        .take(labels.len())
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (i, &p)| match best {
            Some((_, bp)) if bp >= p => best,
            _ => Some((i, p)),
        })
        .ok_or_else(|| ScoringError::InvalidOutput("empty probability row".to_string()))?;

    LabelPrediction {
        label: labels[idx].clone(),
        confidence: f64::from(prob),
    }
    .validate()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_standard_scaler() {
        let sidecar = ModelSidecar {
            mean: vec![10.0, 100.0, 0.0, 1.0, 1.0],
            scale: vec![2.0, 50.0, 1.0, 0.0, 1.0],
            ..Default::default()
        };
        let out = sidecar.normalize(&[14.0, 200.0, 3.0, 3.0, 1.0]);
        assert_eq!(out, [2.0, 2.0, 3.0, 2.0, 0.0]);
    }

    #[test]
    fn test_pick_label_argmax() {
        let labels = vec!["benign".to_string(), "portscan".to_string(), "ddos".to_string()];
        let pred = pick_label(&[0.05, 0.9, 0.05], &labels).unwrap();
        assert_eq!(pred.label, "portscan");
        assert!((pred.confidence - 0.9).abs() < 1e-6);

        assert!(pick_label(&[0.5], &labels).is_err());
    }

    #[test]
    fn test_checksum_pin() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.onnx");
        std::fs::write(&path, b"not really a model").unwrap();

        let digest = hex::encode(Sha256::digest(b"not really a model"));
        assert!(verify_checksum(&path, &digest).is_ok());
        assert!(verify_checksum(&path, &digest.to_uppercase()).is_ok());
        assert!(matches!(
            verify_checksum(&path, "deadbeef"),
            Err(ModelLoadError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_missing_model_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.onnx");
        assert!(matches!(
            OnnxAnomalyScorer::load(&missing, None),
            Err(ModelLoadError::NotFound(_))
        ));
    }

    #[test]
    fn test_sidecar_wrong_width_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("iso.onnx");
        std::fs::write(model.with_extension("json"), r#"{"mean":[0.0],"scale":[1.0]}"#).unwrap();
        assert!(matches!(
            ModelSidecar::load_for(&model),
            Err(ModelLoadError::Sidecar { .. })
        ));
    }
}
