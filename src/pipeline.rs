//! End-to-end scoring: encode -> scale -> select -> classify -> decide.
//!
//! A [`ScoringPipeline`] is immutable once built and holds no per-request
//! state, so one instance can serve concurrent requests through an `Arc`.

use crate::config::AppConfig;
use crate::error::ScoringError;
use crate::feature_encoder::{EncodedFeatureRow, FeatureEncoder};
use crate::models::inference::{Classifier, POSITIVE_CLASS};
use crate::models::loader::ScoringArtifacts;
use crate::models::scaler::ScalerAdapter;
use crate::schema::{FeatureSchema, FeatureSelection, SchemaVariant};
use crate::types::prediction::{PredictionResult, ScoringResponse};
use crate::types::transaction::{RawTransaction, TransactionForm};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Default decision threshold
pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// Slack allowed for classifier probabilities computed in single precision
const PROBABILITY_EPSILON: f64 = 1e-6;

/// Selected, scaled features handed to the classifier
pub type SelectedFeatureVector = Vec<f64>;

/// Schema and decision parameters a pipeline is built with
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub variant: SchemaVariant,
    /// Overrides the variant's default selection when set
    pub selected_features: Option<Vec<String>>,
    pub threshold: f64,
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            variant: config.schema.variant,
            selected_features: config.schema.selected_features.clone(),
            threshold: config.detection.threshold,
        }
    }

    pub fn selected_feature_names(&self) -> Vec<String> {
        self.selected_features
            .clone()
            .unwrap_or_else(|| self.variant.default_selection())
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            variant: SchemaVariant::Legacy,
            selected_features: None,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

/// Scores transactions against one schema, scaler and classifier.
pub struct ScoringPipeline {
    schema: Arc<FeatureSchema>,
    encoder: FeatureEncoder,
    scaler: ScalerAdapter,
    selection: FeatureSelection,
    classifier: Arc<dyn Classifier>,
    threshold: f64,
}

impl ScoringPipeline {
    /// Wire artifacts to a schema, failing fast on any width or name mismatch.
    pub fn new(
        settings: &PipelineSettings,
        artifacts: ScoringArtifacts,
    ) -> Result<Self, ScoringError> {
        let t = settings.threshold;
        if !(t > 0.0 && t <= 1.0) {
            return Err(ScoringError::SchemaMismatch(format!(
                "decision threshold must lie in (0, 1], got {}",
                t
            )));
        }

        let schema = Arc::new(FeatureSchema::new(settings.variant));
        let selection = schema.resolve_selection(&settings.selected_feature_names())?;
        let scaler = ScalerAdapter::new(artifacts.scaler, &schema)?;

        info!(
            schema = %schema.variant(),
            columns = ?schema.names(),
            selected = ?selection.names(),
            indices = ?selection.indices(),
            threshold = settings.threshold,
            classifier = %artifacts.classifier.name(),
            "Scoring pipeline ready"
        );

        Ok(Self {
            encoder: FeatureEncoder::new(schema.clone()),
            schema,
            scaler,
            selection,
            classifier: artifacts.classifier,
            threshold: settings.threshold,
        })
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn selection(&self) -> &FeatureSelection {
        &self.selection
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn encoder(&self) -> &FeatureEncoder {
        &self.encoder
    }

    /// Encode, scale and select; everything before the classifier call.
    pub fn prepare(&self, tx: &RawTransaction) -> Result<SelectedFeatureVector, ScoringError> {
        let row = self.encoder.encode(tx)?;
        self.prepare_row(&row)
    }

    /// Scale and select an already encoded row.
    pub fn prepare_row(&self, row: &EncodedFeatureRow) -> Result<SelectedFeatureVector, ScoringError> {
        let scaled = self.scaler.transform(row)?;
        self.selection.project(&scaled)
    }

    /// Score one transaction.
    pub fn score(&self, tx: &RawTransaction) -> Result<PredictionResult, ScoringError> {
        let selected = self.prepare(tx)?;
        let mut results = self.classify(&[selected])?;
        let result = results.pop().ok_or_else(|| {
            ScoringError::ScoringFailed("classifier returned no prediction".to_string())
        })?;

        debug!(
            tx_type = %tx.tx_type,
            probability = result.probability,
            is_fraud = result.is_fraud,
            "Transaction scored"
        );
        Ok(result)
    }

    /// Validate a raw submission, then score it.
    pub fn score_form(&self, form: &TransactionForm) -> Result<PredictionResult, ScoringError> {
        let tx = RawTransaction::try_from(form)?;
        self.score(&tx)
    }

    /// Score several transactions with a single classifier call.
    pub fn score_batch(&self, txs: &[RawTransaction]) -> Result<Vec<PredictionResult>, ScoringError> {
        if txs.is_empty() {
            return Ok(Vec::new());
        }
        let rows = txs
            .iter()
            .map(|tx| self.encoder.encode(tx))
            .collect::<Result<Vec<_>, _>>()?;
        let selected = self
            .scaler
            .transform_rows(&rows)?
            .iter()
            .map(|scaled| self.selection.project(scaled))
            .collect::<Result<Vec<_>, _>>()?;
        self.classify(&selected)
    }

    /// Pipeline boundary: every outcome becomes a structured response.
    pub fn respond(&self, form: &TransactionForm) -> ScoringResponse {
        let result = self.score_form(form);
        if let Err(e) = &result {
            let tx_id = form.transaction_id.as_deref().unwrap_or("-");
            match e {
                ScoringError::InvalidInput(_) => {
                    warn!(transaction_id = %tx_id, error = %e, "Rejected transaction")
                }
                _ => error!(
                    transaction_id = %tx_id,
                    error = %e,
                    fatal = e.is_fatal(),
                    "Scoring failed"
                ),
            }
        }
        ScoringResponse::from_result(form.transaction_id.clone(), result)
    }

    /// Apply the decision rule to a probability.
    pub fn decide(&self, probability: f64) -> PredictionResult {
        PredictionResult::from_probability(probability, self.threshold)
    }

    fn classify(&self, batch: &[SelectedFeatureVector]) -> Result<Vec<PredictionResult>, ScoringError> {
        let probabilities = self
            .classifier
            .predict_proba(batch)
            .map_err(|e| ScoringError::ScoringFailed(format!("{:#}", e)))?;

        if probabilities.len() != batch.len() {
            return Err(ScoringError::ScoringFailed(format!(
                "classifier returned {} predictions for {} inputs",
                probabilities.len(),
                batch.len()
            )));
        }

        probabilities
            .iter()
            .map(|pair| {
                let p = pair[POSITIVE_CLASS];
                if !p.is_finite()
                    || p < -PROBABILITY_EPSILON
                    || p > 1.0 + PROBABILITY_EPSILON
                {
                    return Err(ScoringError::ScoringFailed(format!(
                        "classifier returned probability {} outside [0, 1]",
                        p
                    )));
                }
                Ok(self.decide(p.clamp(0.0, 1.0)))
            })
            .collect()
    }
}
