//! Configuration management for the fraud scoring service

use crate::pipeline::DEFAULT_THRESHOLD;
use crate::schema::SchemaVariant;
use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default configuration file, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Environment variable naming an alternative configuration file
pub const CONFIG_PATH_ENV: &str = "FRAUD_SCORER_CONFIG";

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub nats: NatsConfig,
    pub models: ModelsConfig,
    #[serde(default)]
    pub schema: SchemaConfig,
    pub detection: DetectionConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

/// NATS connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NatsConfig {
    /// NATS server URL
    pub url: String,
    /// Subject for incoming transactions
    pub transaction_subject: String,
    /// Subject for predictions when the request carries no reply subject
    pub prediction_subject: String,
}

/// Model and scaler artifacts
#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    /// ONNX classifier
    pub model_path: PathBuf,
    /// JSON export of the fitted scaler
    pub scaler_path: PathBuf,
    /// Number of threads for ONNX inference (default: 1)
    #[serde(default = "default_onnx_threads")]
    pub onnx_threads: usize,
}

fn default_onnx_threads() -> usize {
    1
}

/// Which column layout the artifacts were fitted on
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchemaConfig {
    #[serde(default)]
    pub variant: SchemaVariant,
    /// Feature names the classifier was trained on; the variant's default when absent
    #[serde(default)]
    pub selected_features: Option<Vec<String>>,
}

/// Detection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    /// Probability at or above which a transaction is fraud
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Maximum transactions scored concurrently
    pub workers: usize,
    /// Seconds between metrics summaries (0 disables)
    #[serde(default = "default_metrics_interval")]
    pub metrics_interval_secs: u64,
}

fn default_metrics_interval() -> u64 {
    30
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl AppConfig {
    /// Load configuration from `$FRAUD_SCORER_CONFIG` or the default path
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from_path(path)
    }

    /// Load configuration from a specific path, with `FRAUD_SCORER__SECTION__KEY` overrides
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Environment::with_prefix("FRAUD_SCORER").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let t = self.detection.threshold;
        if !(t > 0.0 && t <= 1.0) {
            bail!("detection.threshold must lie in (0, 1], got {}", t);
        }
        if self.pipeline.workers == 0 {
            bail!("pipeline.workers must be at least 1");
        }
        if self.models.onnx_threads == 0 {
            bail!("models.onnx_threads must be at least 1");
        }
        if let Some(selected) = &self.schema.selected_features {
            if selected.is_empty() {
                bail!("schema.selected_features must not be empty");
            }
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            nats: NatsConfig {
                url: "nats://localhost:4222".to_string(),
                transaction_subject: "transactions.score".to_string(),
                prediction_subject: "fraud.predictions".to_string(),
            },
            models: ModelsConfig {
                model_path: PathBuf::from("model_artifacts/fraud_detection_model.onnx"),
                scaler_path: PathBuf::from("model_artifacts/scaler.json"),
                onnx_threads: 1,
            },
            schema: SchemaConfig::default(),
            detection: DetectionConfig {
                threshold: DEFAULT_THRESHOLD,
            },
            pipeline: PipelineConfig {
                workers: 4,
                metrics_interval_secs: 30,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.nats.url, "nats://localhost:4222");
        assert_eq!(config.detection.threshold, 0.5);
        assert_eq!(config.schema.variant, SchemaVariant::Legacy);
        assert!(config.schema.selected_features.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_threshold_validation() {
        let mut config = AppConfig::default();
        config.detection.threshold = 0.0;
        assert!(config.validate().is_err());
        config.detection.threshold = 1.2;
        assert!(config.validate().is_err());
        config.detection.threshold = f64::NAN;
        assert!(config.validate().is_err());
        config.detection.threshold = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
[nats]
url = "nats://nats:4222"
transaction_subject = "tx.in"
prediction_subject = "tx.out"

[models]
model_path = "artifacts/model.onnx"
scaler_path = "artifacts/scaler.json"

[schema]
variant = "drained"
selected_features = ["amount", "isDrained"]

[detection]
threshold = 0.9

[pipeline]
workers = 8

[logging]
level = "debug"
format = "json"
"#
        )
        .unwrap();

        let config = AppConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.nats.transaction_subject, "tx.in");
        assert_eq!(config.models.onnx_threads, 1);
        assert_eq!(config.models.scaler_path, PathBuf::from("artifacts/scaler.json"));
        assert_eq!(config.schema.variant, SchemaVariant::Drained);
        assert_eq!(
            config.schema.selected_features,
            Some(vec!["amount".to_string(), "isDrained".to_string()])
        );
        assert_eq!(config.detection.threshold, 0.9);
        assert_eq!(config.pipeline.metrics_interval_secs, 30);
    }

    #[test]
    fn test_shipped_config_follows_variant_selection() {
        use crate::pipeline::PipelineSettings;
        use crate::schema::FeatureSchema;

        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join(DEFAULT_CONFIG_PATH);
        let mut config = AppConfig::load_from_path(&path).unwrap();
        assert!(config.schema.selected_features.is_none());

        config.schema.variant = SchemaVariant::Drained;
        let settings = PipelineSettings::from_config(&config);
        let selection = FeatureSchema::new(SchemaVariant::Drained)
            .resolve_selection(&settings.selected_feature_names())
            .unwrap();
        assert!(selection.names().iter().any(|n| n == "isDrained"));
        assert!(selection.indices().contains(&9));

        config.schema.variant = SchemaVariant::Legacy;
        let settings = PipelineSettings::from_config(&config);
        let selection = FeatureSchema::new(SchemaVariant::Legacy)
            .resolve_selection(&settings.selected_feature_names())
            .unwrap();
        assert_eq!(selection.indices(), &[0, 1, 3, 4, 8]);
    }
}
