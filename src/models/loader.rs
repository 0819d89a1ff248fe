//! Artifact loading: ONNX classifier, fitted scaler, and the one-time
//! `NotLoaded -> Loaded -> Ready | LoadFailed` lifecycle around them.

use crate::config::{AppConfig, ModelsConfig};
use crate::error::ScoringError;
use crate::models::inference::{Classifier, OnnxClassifier};
use crate::models::scaler::{FeatureScaler, FittedScaler};
use crate::pipeline::{PipelineSettings, ScoringPipeline};
use anyhow::{Context, Result};
use ort::session::{builder::GraphOptimizationLevel, Session};
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, OnceLock, RwLock};
use tracing::{error, info};

/// Loaded ONNX model with metadata
pub struct LoadedModel {
    /// Model name
    pub name: String,
    /// ONNX Runtime session
    pub session: Session,
    /// Input name for the model
    pub input_name: String,
    /// Output name for probabilities
    pub output_name: String,
}

/// Loader for ONNX models
pub struct ModelLoader {
    /// Number of threads for ONNX inference
    onnx_threads: usize,
}

impl ModelLoader {
    /// Create a new model loader with specified number of threads
    pub fn with_threads(onnx_threads: usize) -> Result<Self> {
        ort::init().commit()?;
        info!(onnx_threads = onnx_threads, "ONNX Runtime initialized");
        Ok(Self { onnx_threads })
    }

    /// Load a single ONNX model from file
    pub fn load_model<P: AsRef<Path>>(&self, path: P, name: &str) -> Result<LoadedModel> {
        let path = path.as_ref();

        info!(model = %name, path = %path.display(), threads = self.onnx_threads, "Loading ONNX model");

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(self.onnx_threads)?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "float_input".to_string());

        let output_name = session
            .outputs
            .iter()
            .find(|o| o.name.contains("prob"))
            .or_else(|| session.outputs.last())
            .map(|o| o.name.clone())
            .unwrap_or_else(|| "probabilities".to_string());

        info!(
            model = %name,
            input = %input_name,
            output = %output_name,
            "Model loaded successfully"
        );

        Ok(LoadedModel {
            name: name.to_string(),
            session,
            input_name,
            output_name,
        })
    }
}

/// The external collaborators a pipeline is built from
pub struct ScoringArtifacts {
    pub classifier: Arc<dyn Classifier>,
    pub scaler: Box<dyn FeatureScaler>,
}

/// Read the scaler, then the classifier, from the configured paths.
pub fn load_artifacts(config: &ModelsConfig) -> Result<ScoringArtifacts, ScoringError> {
    let scaler = FittedScaler::from_json_file(&config.scaler_path)
        .map_err(|e| ScoringError::ArtifactLoadFailed(format!("{:#}", e)))?;
    info!(
        path = %config.scaler_path.display(),
        n_features = scaler.n_features(),
        "Scaler loaded"
    );

    let model_path = &config.model_path;
    if !model_path.exists() {
        return Err(ScoringError::ArtifactLoadFailed(format!(
            "model file {} not found",
            model_path.display()
        )));
    }
    let name = model_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("model")
        .to_string();

    let model = ModelLoader::with_threads(config.onnx_threads)
        .and_then(|loader| loader.load_model(model_path, &name))
        .map_err(|e| ScoringError::ArtifactLoadFailed(format!("{:#}", e)))?;

    Ok(ScoringArtifacts {
        classifier: Arc::new(OnnxClassifier::new(model)),
        scaler: Box::new(scaler),
    })
}

/// Artifact lifecycle. `Ready` and `LoadFailed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactState {
    NotLoaded,
    Loaded,
    Ready,
    LoadFailed,
}

/// Process-wide pipeline handle, built at most once.
///
/// Concurrent first callers block on the same initialization instead of
/// loading twice; afterwards every caller gets the same read-only pipeline
/// or the same load error.
pub struct SharedPipeline {
    state: RwLock<ArtifactState>,
    cell: OnceLock<Result<Arc<ScoringPipeline>, ScoringError>>,
}

impl SharedPipeline {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ArtifactState::NotLoaded),
            cell: OnceLock::new(),
        }
    }

    pub fn state(&self) -> ArtifactState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: ArtifactState) {
        *self.state.write().unwrap_or_else(|e| e.into_inner()) = state;
    }

    /// Load artifacts from the configured paths on first call.
    pub fn get_or_load(&self, config: &AppConfig) -> Result<Arc<ScoringPipeline>, ScoringError> {
        let settings = PipelineSettings::from_config(config);
        self.get_or_init(&settings, || load_artifacts(&config.models))
    }

    /// Build the pipeline with `load` on first call.
    pub fn get_or_init<F>(
        &self,
        settings: &PipelineSettings,
        load: F,
    ) -> Result<Arc<ScoringPipeline>, ScoringError>
    where
        F: FnOnce() -> Result<ScoringArtifacts, ScoringError>,
    {
        self.cell
            .get_or_init(|| {
                let result = load().and_then(|artifacts| {
                    self.set_state(ArtifactState::Loaded);
                    ScoringPipeline::new(settings, artifacts)
                });
                match result {
                    Ok(pipeline) => {
                        self.set_state(ArtifactState::Ready);
                        Ok(Arc::new(pipeline))
                    }
                    Err(e) => {
                        error!(error = %e, kind = e.kind().as_str(), "Artifact initialization failed");
                        self.set_state(ArtifactState::LoadFailed);
                        Err(e)
                    }
                }
            })
            .clone()
    }

    /// The pipeline, if initialization already succeeded
    pub fn get(&self) -> Option<Arc<ScoringPipeline>> {
        self.cell.get().and_then(|r| r.as_ref().ok().cloned())
    }
}

impl Default for SharedPipeline {
    fn default() -> Self {
        Self::new()
    }
}
