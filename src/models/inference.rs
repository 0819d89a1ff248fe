//! Binary classifier seam and its ONNX Runtime implementation

use crate::models::loader::LoadedModel;
use anyhow::{anyhow, bail, Context, Result};
use ort::memory::Allocator;
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType};
use std::sync::Mutex;
use tracing::debug;

/// Class probabilities `[P(class=0), P(class=1)]` for one input row
pub type ClassProbabilities = [f64; 2];

/// Index of the fraud class in [`ClassProbabilities`]
pub const POSITIVE_CLASS: usize = 1;

/// A trained binary classifier.
pub trait Classifier: Send + Sync {
    /// Score a batch of feature vectors, one probability pair per row.
    fn predict_proba(&self, batch: &[Vec<f64>]) -> Result<Vec<ClassProbabilities>>;

    /// Short identifier for logs
    fn name(&self) -> &str {
        "classifier"
    }
}

/// Classifier backed by an ONNX Runtime session
pub struct OnnxClassifier {
    /// `Session::run` needs exclusive access
    model: Mutex<LoadedModel>,
    name: String,
}

impl OnnxClassifier {
    pub fn new(model: LoadedModel) -> Self {
        let name = model.name.clone();
        Self {
            model: Mutex::new(model),
            name,
        }
    }

    /// Extract class probabilities from model output.
    /// Handles both tensor outputs and seq(map) (zipmap) outputs.
    fn extract_probabilities(
        outputs: &ort::session::SessionOutputs,
        output_name: &str,
        model_name: &str,
        rows: usize,
    ) -> Result<Vec<ClassProbabilities>> {
        if let Some(output) = outputs.get(output_name) {
            if let Some(probs) = Self::extract_from_value(output, model_name, rows)? {
                return Ok(probs);
            }
        }

        // Fall back to any non-label output
        for (name, output) in outputs.iter() {
            if name.contains("label") {
                continue;
            }
            if let Some(probs) = Self::extract_from_value(&output, model_name, rows)? {
                debug!(model = %model_name, output = %name, "Extracted probabilities (fallback)");
                return Ok(probs);
            }
        }

        bail!("model '{}' produced no probability output", model_name)
    }

    fn extract_from_value(
        output: &ort::value::DynValue,
        model_name: &str,
        rows: usize,
    ) -> Result<Option<Vec<ClassProbabilities>>> {
        let dtype = output.dtype();

        if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
            let dims: Vec<i64> = shape.iter().copied().collect();
            return Self::probabilities_from_tensor(&dims, data, rows).map(Some);
        }

        if DynSequenceValueType::can_downcast(&dtype) {
            return Self::probabilities_from_sequence_map(output, model_name, rows).map(Some);
        }

        Ok(None)
    }

    /// `[batch, 2]` holds both classes; `[batch, 1]` or `[batch]` holds P(class=1).
    fn probabilities_from_tensor(
        dims: &[i64],
        data: &[f32],
        rows: usize,
    ) -> Result<Vec<ClassProbabilities>> {
        let width = match dims {
            [batch, classes] if *batch as usize == rows => *classes as usize,
            [batch] if *batch as usize == rows => 1,
            _ => bail!("unexpected probability tensor shape {:?} for {} rows", dims, rows),
        };
        if data.len() != rows * width {
            bail!("probability tensor holds {} values, expected {}", data.len(), rows * width);
        }

        match width {
            1 => Ok(data.iter().map(|&p| [1.0 - p as f64, p as f64]).collect()),
            2 => Ok(data
                .chunks_exact(2)
                .map(|c| [c[0] as f64, c[1] as f64])
                .collect()),
            n => bail!("expected a binary classifier, got {} classes", n),
        }
    }

    /// seq(map(int64, float)), one map per row
    fn probabilities_from_sequence_map(
        output: &ort::value::DynValue,
        model_name: &str,
        rows: usize,
    ) -> Result<Vec<ClassProbabilities>> {
        let allocator = Allocator::default();

        let sequence = output
            .downcast_ref::<DynSequenceValueType>()
            .map_err(|e| anyhow!("Failed to downcast to sequence: {}", e))?;
        let maps = sequence.try_extract_sequence::<DynMapValueType>(&allocator)?;

        if maps.len() != rows {
            bail!("model '{}' returned {} maps for {} rows", model_name, maps.len(), rows);
        }

        maps.iter()
            .map(|map_value| {
                let kv_pairs = map_value.try_extract_key_values::<i64, f32>()?;
                let lookup = |class: i64| {
                    kv_pairs
                        .iter()
                        .find(|(k, _)| *k == class)
                        .map(|(_, p)| *p as f64)
                };
                match (lookup(0), lookup(1)) {
                    (Some(p0), Some(p1)) => Ok([p0, p1]),
                    (None, Some(p1)) => Ok([1.0 - p1, p1]),
                    (Some(p0), None) => Ok([p0, 1.0 - p0]),
                    (None, None) => Err(anyhow!("No class probability found in map")),
                }
            })
            .collect()
    }
}

impl Classifier for OnnxClassifier {
    fn predict_proba(&self, batch: &[Vec<f64>]) -> Result<Vec<ClassProbabilities>> {
        use ort::value::Tensor;

        let Some(first) = batch.first() else {
            return Ok(Vec::new());
        };
        let width = first.len();
        if batch.iter().any(|row| row.len() != width) {
            bail!("ragged feature batch");
        }

        // Prepare input tensor - shape [rows, width]
        let shape = vec![batch.len() as i64, width as i64];
        let data: Vec<f32> = batch.iter().flatten().map(|&v| v as f32).collect();
        let input_tensor =
            Tensor::from_array((shape, data)).context("Failed to create input tensor")?;

        let mut guard = self
            .model
            .lock()
            .map_err(|e| anyhow!("Lock error: {}", e))?;
        let model = &mut *guard;

        let outputs = model
            .session
            .run(ort::inputs![&model.input_name => input_tensor])?;

        let probs =
            Self::extract_probabilities(&outputs, &model.output_name, &model.name, batch.len())?;

        debug!(model = %model.name, rows = batch.len(), "ONNX inference complete");
        Ok(probs)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
