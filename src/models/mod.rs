//! Model and scaler artifacts

pub mod inference;
pub mod loader;
pub mod scaler;

pub use inference::{Classifier, OnnxClassifier};
pub use loader::{ArtifactState, ModelLoader, ScoringArtifacts, SharedPipeline};
pub use scaler::{FeatureScaler, FittedScaler, ScalerAdapter};
