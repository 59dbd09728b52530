//! Model loading and inference
//!
//! One ONNX artifact per detector, loaded at startup and replaced by atomic
//! swap. The hot path only ever sees `predict_proba`; everything that can go
//! wrong surfaces as `InferenceError` and the detector degrades to its rule
//! overlay.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ndarray::Array2;
use once_cell::sync::Lazy;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use parking_lot::{Mutex, RwLock};

use crate::engine::types::DetectorId;

// ============================================================================
// ERROR HANDLING
// ============================================================================

#[derive(Debug)]
pub struct InferenceError(pub String);

impl std::fmt::Display for InferenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "InferenceError: {}", self.0)
    }
}

impl std::error::Error for InferenceError {}

// ============================================================================
// SCORER
// ============================================================================

/// An opaque probabilistic scorer backed by one ONNX session.
///
/// The session is mutated during `run`, so it sits behind a mutex; scoring a
/// handful of floats is far cheaper than the lock is contended.
pub struct OnnxScorer {
    session: Mutex<Session>,
    output_name: String,
    pub path: String,
    pub loaded_at: DateTime<Utc>,
}

impl OnnxScorer {
    pub fn load(path: &Path) -> Result<Self, InferenceError> {
        if !path.exists() {
            return Err(InferenceError(format!("model not found: {}", path.display())));
        }

        let session = Session::builder()
            .map_err(|e| InferenceError(format!("session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| InferenceError(format!("optimization level: {e}")))?
            .commit_from_file(path)
            .map_err(|e| InferenceError(format!("load model: {e}")))?;

        // Classifier exports commonly emit [label, probabilities]; the
        // probability tensor is the last declared output.
        let output_name = session
            .outputs()
            .last()
            .map(|o| o.name().to_string())
            .ok_or_else(|| InferenceError("model declares no outputs".into()))?;

        Ok(Self {
            session: Mutex::new(session),
            output_name,
            path: path.display().to_string(),
            loaded_at: Utc::now(),
        })
    }

    /// Positive-class probability for one feature vector. Deterministic for
    /// a fixed model and input; always within [0, 1].
    pub fn predict_proba(&self, features: &[f32]) -> Result<f64, InferenceError> {
        let input = Array2::<f32>::from_shape_vec((1, features.len()), features.to_vec())
            .map_err(|e| InferenceError(format!("input shape: {e}")))?;

        let tensor = Value::from_array(input)
            .map_err(|e| InferenceError(format!("input tensor: {e}")))?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![tensor])
            .map_err(|e| InferenceError(format!("inference failed: {e}")))?;

        let output = outputs
            .get(&self.output_name)
            .ok_or_else(|| InferenceError(format!("output {} missing", self.output_name)))?;

        let (_, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| InferenceError(format!("extract output: {e}")))?;

        // (1,) sigmoid output or (1, 2) class probabilities; the positive
        // class is last either way.
        let p = match data.len() {
            1 | 2 => *data.last().unwrap_or(&0.5),
            n => return Err(InferenceError(format!("unexpected output arity {n}"))),
        };

        if !p.is_finite() {
            return Err(InferenceError("non-finite model output".into()));
        }
        Ok((p as f64).clamp(0.0, 1.0))
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

static MODELS: Lazy<RwLock<HashMap<DetectorId, Arc<OnnxScorer>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Artifact file name for a detector
pub fn artifact_name(id: DetectorId) -> &'static str {
    match id {
        DetectorId::Phishing => "phishing.onnx",
        DetectorId::Quishing => "quishing.onnx",
        DetectorId::Collect => "collect.onnx",
        DetectorId::Malware => "malware.onnx",
    }
}

/// Load every detector model found under `model_dir`. Missing or broken
/// artifacts leave the detector in rule-only mode; returns how many loaded.
pub fn load_all(model_dir: &str) -> usize {
    let mut loaded = 0;
    for id in DetectorId::ALL {
        let path = PathBuf::from(model_dir).join(artifact_name(id));
        match OnnxScorer::load(&path) {
            Ok(scorer) => {
                tracing::info!(detector = id.as_str(), path = %scorer.path, "model loaded");
                MODELS.write().insert(id, Arc::new(scorer));
                loaded += 1;
            }
            Err(e) => {
                tracing::warn!(detector = id.as_str(), "rule-only mode: {}", e);
            }
        }
    }
    loaded
}

/// Current scorer for a detector, if its model loaded
pub fn scorer(id: DetectorId) -> Option<Arc<OnnxScorer>> {
    MODELS.read().get(&id).cloned()
}

pub fn is_loaded(id: DetectorId) -> bool {
    MODELS.read().contains_key(&id)
}

pub fn loaded_count() -> usize {
    MODELS.read().len()
}

/// Hot-swap one detector's model. In-flight requests keep whichever scorer
/// they already cloned.
pub fn swap(id: DetectorId, new: OnnxScorer) {
    MODELS.write().insert(id, Arc::new(new));
}

/// Drop one detector's model (returns it to rule-only mode)
pub fn unload(id: DetectorId) {
    MODELS.write().remove(&id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_artifact_is_an_error() {
        let err = OnnxScorer::load(Path::new("/nonexistent/phishing.onnx"));
        assert!(err.is_err());
    }

    #[test]
    fn test_artifact_names_are_distinct() {
        let names: std::collections::HashSet<_> =
            DetectorId::ALL.iter().map(|id| artifact_name(*id)).collect();
        assert_eq!(names.len(), DetectorId::ALL.len());
    }

    #[test]
    fn test_load_all_tolerates_missing_directory() {
        assert_eq!(load_all("/nonexistent/model/dir"), 0);
    }
}
