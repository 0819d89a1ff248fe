//! Fitted per-column scalers and the adapter that guards their input width

use crate::error::ScoringError;
use crate::feature_encoder::EncodedFeatureRow;
use crate::schema::FeatureSchema;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// An externally fitted scaler.
///
/// Implementations transform every column independently with the parameters
/// they were fitted with; they know nothing about column meaning.
pub trait FeatureScaler: Send + Sync {
    /// Number of columns the scaler was fitted on
    fn n_features(&self) -> usize;

    /// Column names seen at fit time, if the artifact recorded them
    fn feature_names(&self) -> Option<&[String]> {
        None
    }

    /// Transform a batch of rows
    fn transform(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>>;
}

/// Scaler parameters exported from training
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FittedScaler {
    /// `(x - mean) / scale`
    Standard {
        n_features_in: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        feature_names_in: Option<Vec<String>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mean: Option<Vec<f64>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scale: Option<Vec<f64>>,
    },
    /// `x * scale + min`
    MinMax {
        n_features_in: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        feature_names_in: Option<Vec<String>>,
        min: Vec<f64>,
        scale: Vec<f64>,
    },
}

impl FittedScaler {
    /// Load scaler parameters from a JSON artifact
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scaler from {}", path.display()))?;
        Self::from_json_str(&data)
            .with_context(|| format!("Invalid scaler artifact {}", path.display()))
    }

    pub fn from_json_str(data: &str) -> Result<Self> {
        let scaler: FittedScaler =
            serde_json::from_str(data).context("Failed to parse scaler parameters")?;
        scaler.validate()?;
        Ok(scaler)
    }

    /// Check parameter vector lengths and values
    pub fn validate(&self) -> Result<()> {
        let n = self.n_features();
        if n == 0 {
            bail!("scaler was fitted on zero features");
        }
        if let Some(names) = self.feature_names() {
            check_len("feature_names_in", names.len(), n)?;
        }

        match self {
            FittedScaler::Standard { mean, scale, .. } => {
                if let Some(mean) = mean {
                    check_len("mean", mean.len(), n)?;
                    check_finite("mean", mean)?;
                }
                if let Some(scale) = scale {
                    check_len("scale", scale.len(), n)?;
                    check_finite("scale", scale)?;
                    if let Some(i) = scale.iter().position(|&s| s == 0.0) {
                        bail!("scale[{}] is zero", i);
                    }
                }
            }
            FittedScaler::MinMax { min, scale, .. } => {
                check_len("min", min.len(), n)?;
                check_len("scale", scale.len(), n)?;
                check_finite("min", min)?;
                check_finite("scale", scale)?;
            }
        }
        Ok(())
    }

    fn transform_row(&self, row: &[f64]) -> Vec<f64> {
        match self {
            FittedScaler::Standard { mean, scale, .. } => row
                .iter()
                .enumerate()
                .map(|(i, &x)| {
                    let centered = mean.as_ref().map_or(x, |m| x - m[i]);
                    scale.as_ref().map_or(centered, |s| centered / s[i])
                })
                .collect(),
            FittedScaler::MinMax { min, scale, .. } => row
                .iter()
                .zip(min.iter().zip(scale))
                .map(|(&x, (&m, &s))| x * s + m)
                .collect(),
        }
    }
}

impl FeatureScaler for FittedScaler {
    fn n_features(&self) -> usize {
        match self {
            FittedScaler::Standard { n_features_in, .. }
            | FittedScaler::MinMax { n_features_in, .. } => *n_features_in,
        }
    }

    fn feature_names(&self) -> Option<&[String]> {
        match self {
            FittedScaler::Standard {
                feature_names_in, ..
            }
            | FittedScaler::MinMax {
                feature_names_in, ..
            } => feature_names_in.as_deref(),
        }
    }

    fn transform(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        let n = self.n_features();
        rows.iter()
            .enumerate()
            .map(|(i, row)| {
                if row.len() != n {
                    bail!("row {} has {} values, scaler expects {}", i, row.len(), n);
                }
                Ok(self.transform_row(row))
            })
            .collect()
    }
}

fn check_len(field: &str, len: usize, expected: usize) -> Result<()> {
    if len != expected {
        bail!("{} has {} entries, expected {}", field, len, expected);
    }
    Ok(())
}

fn check_finite(field: &str, values: &[f64]) -> Result<()> {
    if let Some(i) = values.iter().position(|v| !v.is_finite()) {
        bail!("{}[{}] is not finite", field, i);
    }
    Ok(())
}

/// Applies a fitted scaler to encoded rows of one schema.
///
/// The row width is checked against the scaler on every call; the scaler
/// itself is verified against the schema once, at construction.
pub struct ScalerAdapter {
    scaler: Box<dyn FeatureScaler>,
}

impl ScalerAdapter {
    pub fn new(scaler: Box<dyn FeatureScaler>, schema: &FeatureSchema) -> Result<Self, ScoringError> {
        if scaler.n_features() != schema.len() {
            return Err(ScoringError::SchemaMismatch(format!(
                "scaler was fitted on {} columns, the {} schema has {}",
                scaler.n_features(),
                schema.variant(),
                schema.len()
            )));
        }
        if let Some(names) = scaler.feature_names() {
            schema.verify_names(names)?;
        }
        Ok(Self { scaler })
    }

    pub fn n_features(&self) -> usize {
        self.scaler.n_features()
    }

    /// Scale one encoded row.
    pub fn transform(&self, row: &EncodedFeatureRow) -> Result<Vec<f64>, ScoringError> {
        let mut scaled = self.transform_rows(std::slice::from_ref(row))?;
        scaled.pop().ok_or_else(|| {
            ScoringError::SchemaMismatch("scaler returned no rows".to_string())
        })
    }

    /// Scale several encoded rows in one call.
    pub fn transform_rows(&self, rows: &[EncodedFeatureRow]) -> Result<Vec<Vec<f64>>, ScoringError> {
        let n = self.scaler.n_features();
        if let Some(row) = rows.iter().find(|r| r.len() != n) {
            return Err(ScoringError::SchemaMismatch(format!(
                "feature row has {} values, scaler expects {}",
                row.len(),
                n
            )));
        }

        let input: Vec<Vec<f64>> = rows.iter().map(|r| r.as_slice().to_vec()).collect();
        let output = self
            .scaler
            .transform(&input)
            .map_err(|e| ScoringError::ScoringFailed(format!("scaler transform failed: {:#}", e)))?;

        if output.len() != rows.len() || output.iter().any(|r| r.len() != n) {
            return Err(ScoringError::SchemaMismatch(format!(
                "scaler output shape does not match its input ({} rows of {})",
                rows.len(),
                n
            )));
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaVariant;

    fn legacy_standard() -> FittedScaler {
        FittedScaler::Standard {
            n_features_in: 9,
            feature_names_in: None,
            mean: Some(vec![1.0; 9]),
            scale: Some(vec![2.0; 9]),
        }
    }

    #[test]
    fn test_standard_transform() {
        let scaler = legacy_standard();
        let out = scaler.transform(&[vec![3.0; 9]]).unwrap();
        assert_eq!(out, vec![vec![1.0; 9]]);
    }

    #[test]
    fn test_standard_without_mean() {
        let scaler = FittedScaler::Standard {
            n_features_in: 2,
            feature_names_in: None,
            mean: None,
            scale: Some(vec![2.0, 4.0]),
        };
        let out = scaler.transform(&[vec![4.0, 4.0]]).unwrap();
        assert_eq!(out[0], vec![2.0, 1.0]);
    }

    #[test]
    fn test_min_max_transform() {
        let scaler = FittedScaler::MinMax {
            n_features_in: 2,
            feature_names_in: None,
            min: vec![-1.0, 0.0],
            scale: vec![0.5, 0.1],
        };
        let out = scaler.transform(&[vec![4.0, 10.0]]).unwrap();
        assert_eq!(out[0], vec![1.0, 1.0]);
    }

    #[test]
    fn test_parse_artifact_json() {
        let json = r#"{"kind":"standard","n_features_in":2,"mean":[0.5,1.0],"scale":[1.0,2.0]}"#;
        let scaler = FittedScaler::from_json_str(json).unwrap();
        assert_eq!(scaler.n_features(), 2);
        assert!(scaler.feature_names().is_none());

        let bad = r#"{"kind":"standard","n_features_in":3,"mean":[0.5,1.0]}"#;
        assert!(FittedScaler::from_json_str(bad).is_err());

        let zero = r#"{"kind":"standard","n_features_in":1,"scale":[0.0]}"#;
        assert!(FittedScaler::from_json_str(zero).is_err());
    }

    #[test]
    fn test_adapter_rejects_width_mismatch_at_construction() {
        let schema = FeatureSchema::new(SchemaVariant::Drained);
        let err = ScalerAdapter::new(Box::new(legacy_standard()), &schema)
            .err()
            .unwrap();
        assert!(matches!(err, ScoringError::SchemaMismatch(_)));
    }

    #[test]
    fn test_adapter_verifies_feature_names() {
        let schema = FeatureSchema::new(SchemaVariant::Legacy);
        let mut names: Vec<String> = schema.names().iter().map(|s| s.to_string()).collect();
        names.swap(7, 8);
        let scaler = FittedScaler::Standard {
            n_features_in: 9,
            feature_names_in: Some(names),
            mean: None,
            scale: None,
        };
        let err = ScalerAdapter::new(Box::new(scaler), &schema).err().unwrap();
        assert!(matches!(err, ScoringError::SchemaMismatch(_)));
    }

    #[test]
    fn test_adapter_rejects_row_of_wrong_size() {
        let schema = FeatureSchema::new(SchemaVariant::Legacy);
        let adapter = ScalerAdapter::new(Box::new(legacy_standard()), &schema).unwrap();

        let row = EncodedFeatureRow::from_values(vec![0.0; 10]);
        let err = adapter.transform(&row).unwrap_err();
        assert!(matches!(err, ScoringError::SchemaMismatch(_)));

        let row = EncodedFeatureRow::from_values(vec![1.0; 9]);
        assert_eq!(adapter.transform(&row).unwrap(), vec![0.0; 9]);
    }
}
