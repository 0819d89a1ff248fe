//! Error kinds surfaced by the scoring pipeline

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure while loading artifacts or scoring a transaction.
///
/// `InvalidInput` and `ScoringFailed` are per-request. `ArtifactLoadFailed`
/// and `SchemaMismatch` mean the deployed model/scaler pairing is broken.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScoringError {
    #[error("artifact load failed: {0}")]
    ArtifactLoadFailed(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
    #[error("scoring failed: {0}")]
    ScoringFailed(String),
}

/// Machine-readable error kind, as reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ArtifactLoadFailed,
    InvalidInput,
    SchemaMismatch,
    ScoringFailed,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ArtifactLoadFailed => "artifact_load_failed",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::SchemaMismatch => "schema_mismatch",
            ErrorKind::ScoringFailed => "scoring_failed",
        }
    }
}

impl ScoringError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScoringError::ArtifactLoadFailed(_) => ErrorKind::ArtifactLoadFailed,
            ScoringError::InvalidInput(_) => ErrorKind::InvalidInput,
            ScoringError::SchemaMismatch(_) => ErrorKind::SchemaMismatch,
            ScoringError::ScoringFailed(_) => ErrorKind::ScoringFailed,
        }
    }

    /// Message without the kind prefix
    pub fn message(&self) -> &str {
        match self {
            ScoringError::ArtifactLoadFailed(m)
            | ScoringError::InvalidInput(m)
            | ScoringError::SchemaMismatch(m)
            | ScoringError::ScoringFailed(m) => m,
        }
    }

    /// Configuration-level failures that no retry or different input can fix.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ScoringError::ArtifactLoadFailed(_) | ScoringError::SchemaMismatch(_)
        )
    }
}
