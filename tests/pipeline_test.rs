//! Integration tests: encode -> scale -> select -> score with stub artifacts.

use fraud_scoring::{
    config::AppConfig,
    error::ErrorKind,
    models::{
        inference::{ClassProbabilities, Classifier},
        loader::{ArtifactState, ScoringArtifacts},
        scaler::{FeatureScaler, FittedScaler},
    },
    schema::FeatureColumn,
    EncodedFeatureRow, FeatureSchema, PipelineSettings, RawTransaction, SchemaVariant,
    ScoringError, ScoringPipeline, ScoringResponse, SharedPipeline, TransactionForm,
    TransactionType, Verdict,
};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Classifier stub returning a fixed fraud probability and counting calls
struct StubClassifier {
    probability: f64,
    calls: AtomicUsize,
}

impl StubClassifier {
    fn new(probability: f64) -> Arc<Self> {
        Arc::new(Self {
            probability,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Classifier for StubClassifier {
    fn predict_proba(&self, batch: &[Vec<f64>]) -> anyhow::Result<Vec<ClassProbabilities>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(batch
            .iter()
            .map(|_| [1.0 - self.probability, self.probability])
            .collect())
    }
}

/// Classifier stub that always fails
struct FailingClassifier;

impl Classifier for FailingClassifier {
    fn predict_proba(&self, _batch: &[Vec<f64>]) -> anyhow::Result<Vec<ClassProbabilities>> {
        anyhow::bail!("session run failed")
    }
}

/// Scaler that claims the right width but drops a column on output
struct TruncatingScaler(usize);

impl FeatureScaler for TruncatingScaler {
    fn n_features(&self) -> usize {
        self.0
    }

    fn transform(&self, rows: &[Vec<f64>]) -> anyhow::Result<Vec<Vec<f64>>> {
        Ok(rows.iter().map(|r| r[..r.len() - 1].to_vec()).collect())
    }
}

fn identity_scaler(variant: SchemaVariant) -> Box<FittedScaler> {
    Box::new(FittedScaler::Standard {
        n_features_in: FeatureSchema::new(variant).len(),
        feature_names_in: None,
        mean: None,
        scale: None,
    })
}

fn build(variant: SchemaVariant, classifier: Arc<dyn Classifier>) -> ScoringPipeline {
    let settings = PipelineSettings {
        variant,
        ..Default::default()
    };
    ScoringPipeline::new(
        &settings,
        ScoringArtifacts {
            classifier,
            scaler: identity_scaler(variant),
        },
    )
    .unwrap()
}

fn drained_transfer_form() -> TransactionForm {
    TransactionForm {
        transaction_id: Some("tx_drain".to_string()),
        tx_type: Some("TRANSFER".to_string()),
        amount: Some(500000.0),
        old_balance_org: Some(500000.0),
        new_balance_orig: Some(0.0),
        old_balance_dest: Some(200000.0),
        new_balance_dest: Some(700000.0),
    }
}

#[test]
fn drained_transfer_is_flagged() {
    let classifier = StubClassifier::new(0.95);
    let pipeline = build(SchemaVariant::Drained, classifier.clone());
    let tx = RawTransaction::try_from(&drained_transfer_form()).unwrap();

    let row = pipeline.encoder().encode(&tx).unwrap();
    let schema = pipeline.schema();
    let value = |c: FeatureColumn| row.as_slice()[schema.position(c).unwrap()];
    assert_eq!(value(FeatureColumn::IsDrained), 1.0);
    assert_eq!(value(FeatureColumn::Type(TransactionType::Transfer)), 1.0);
    assert_eq!(value(FeatureColumn::Type(TransactionType::CashOut)), 0.0);
    assert_eq!(value(FeatureColumn::Type(TransactionType::Debit)), 0.0);
    assert_eq!(value(FeatureColumn::Type(TransactionType::Payment)), 0.0);

    let result = pipeline.score(&tx).unwrap();
    assert!(result.is_fraud);
    assert_eq!(result.verdict(), Verdict::Fraud);
    assert_eq!(result.probability, 0.95);
    assert_eq!(result.probability_label(), "95.00%");
    assert_eq!(classifier.calls(), 1);
}

#[test]
fn unknown_type_never_reaches_classifier() {
    let classifier = StubClassifier::new(0.95);
    let pipeline = build(SchemaVariant::Legacy, classifier.clone());
    let mut form = drained_transfer_form();
    form.tx_type = Some("WIRE".to_string());

    let err = pipeline.score_form(&form).unwrap_err();
    assert!(matches!(err, ScoringError::InvalidInput(_)));

    match pipeline.respond(&form) {
        ScoringResponse::Error {
            kind,
            fatal,
            transaction_id,
            ..
        } => {
            assert_eq!(kind, ErrorKind::InvalidInput);
            assert!(!fatal);
            assert_eq!(transaction_id.as_deref(), Some("tx_drain"));
        }
        other => panic!("expected an error response, got {:?}", other),
    }
    assert_eq!(classifier.calls(), 0);
}

#[test]
fn missing_field_never_reaches_classifier() {
    let classifier = StubClassifier::new(0.1);
    let pipeline = build(SchemaVariant::Legacy, classifier.clone());
    let mut form = drained_transfer_form();
    form.old_balance_org = None;

    let err = pipeline.score_form(&form).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(classifier.calls(), 0);
}

#[test]
fn wrong_row_width_is_schema_mismatch() {
    let classifier = StubClassifier::new(0.95);
    let pipeline = build(SchemaVariant::Legacy, classifier.clone());

    let row = EncodedFeatureRow::from_values(vec![0.0; 10]);
    let err = pipeline.prepare_row(&row).unwrap_err();

    assert!(matches!(err, ScoringError::SchemaMismatch(_)));
    assert!(err.is_fatal());
    assert_eq!(classifier.calls(), 0);
}

#[test]
fn misshapen_scaler_output_is_schema_mismatch() {
    let classifier = StubClassifier::new(0.95);
    let pipeline = ScoringPipeline::new(
        &PipelineSettings::default(),
        ScoringArtifacts {
            classifier: classifier.clone(),
            scaler: Box::new(TruncatingScaler(9)),
        },
    )
    .unwrap();
    let tx = RawTransaction::try_from(&drained_transfer_form()).unwrap();

    let err = pipeline.score(&tx).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SchemaMismatch);
    assert_eq!(classifier.calls(), 0);
}

#[test]
fn scaler_for_other_variant_is_rejected() {
    let settings = PipelineSettings {
        variant: SchemaVariant::Drained,
        ..Default::default()
    };
    let result = ScoringPipeline::new(
        &settings,
        ScoringArtifacts {
            classifier: StubClassifier::new(0.5),
            scaler: identity_scaler(SchemaVariant::Legacy),
        },
    );
    assert!(matches!(result.err(), Some(ScoringError::SchemaMismatch(_))));
}

#[test]
fn classifier_failure_is_scoring_failed() {
    let pipeline = build(SchemaVariant::Legacy, Arc::new(FailingClassifier));
    let response = pipeline.respond(&drained_transfer_form());

    match response {
        ScoringResponse::Error { kind, message, fatal, .. } => {
            assert_eq!(kind, ErrorKind::ScoringFailed);
            assert!(message.contains("session run failed"));
            assert!(!fatal);
        }
        other => panic!("expected an error response, got {:?}", other),
    }
}

#[test]
fn threshold_boundary() {
    let at = build(SchemaVariant::Legacy, StubClassifier::new(0.5));
    let below = build(SchemaVariant::Legacy, StubClassifier::new(0.4999));
    let tx = RawTransaction::try_from(&drained_transfer_form()).unwrap();

    assert!(at.score(&tx).unwrap().is_fraud);
    let safe = below.score(&tx).unwrap();
    assert!(!safe.is_fraud);
    assert_eq!(safe.verdict(), Verdict::Safe);
}

#[test]
fn scoring_is_deterministic() {
    let pipeline = build(SchemaVariant::Drained, StubClassifier::new(0.37));
    let tx = RawTransaction::new(
        TransactionType::CashOut,
        181.0,
        181.0,
        0.0,
        21182.0,
        0.0,
    )
    .unwrap();

    assert_eq!(pipeline.prepare(&tx).unwrap(), pipeline.prepare(&tx).unwrap());
    assert_eq!(pipeline.score(&tx).unwrap(), pipeline.score(&tx).unwrap());
}

#[test]
fn standard_scaling_is_applied_before_selection() {
    let schema = FeatureSchema::new(SchemaVariant::Legacy);
    let names: Vec<String> = schema.names().iter().map(|s| s.to_string()).collect();
    let scaler = FittedScaler::Standard {
        n_features_in: 9,
        feature_names_in: Some(names),
        mean: Some(vec![100.0, 100.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.5]),
        scale: Some(vec![50.0, 50.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 0.5]),
    };
    let pipeline = ScoringPipeline::new(
        &PipelineSettings::default(),
        ScoringArtifacts {
            classifier: StubClassifier::new(0.1),
            scaler: Box::new(scaler),
        },
    )
    .unwrap();

    let tx = RawTransaction::new(TransactionType::Transfer, 200.0, 150.0, 0.0, 3.0, 4.0).unwrap();
    let selected = pipeline.prepare(&tx).unwrap();

    // amount, oldbalanceOrg, oldbalanceDest, newbalanceDest, type_TRANSFER
    assert_eq!(selected, vec![2.0, 1.0, 3.0, 4.0, 1.0]);
}

#[test]
fn shared_pipeline_loads_once_under_concurrency() {
    let shared = SharedPipeline::new();
    let settings = PipelineSettings::default();
    let loads = AtomicUsize::new(0);

    std::thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                let pipeline = shared
                    .get_or_init(&settings, || {
                        loads.fetch_add(1, Ordering::SeqCst);
                        Ok(ScoringArtifacts {
                            classifier: StubClassifier::new(0.2),
                            scaler: identity_scaler(SchemaVariant::Legacy),
                        })
                    })
                    .unwrap();
                assert_eq!(pipeline.threshold(), 0.5);
            });
        }
    });

    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert_eq!(shared.state(), ArtifactState::Ready);
    assert!(shared.get().is_some());
}

#[test]
fn missing_model_file_fails_startup() {
    let dir = tempfile::tempdir().unwrap();
    let scaler_path = dir.path().join("scaler.json");
    let mut file = std::fs::File::create(&scaler_path).unwrap();
    write!(
        file,
        r#"{{"kind":"standard","n_features_in":9,"mean":[0,0,0,0,0,0,0,0,0],"scale":[1,1,1,1,1,1,1,1,1]}}"#
    )
    .unwrap();

    let mut config = AppConfig::default();
    config.models.scaler_path = scaler_path;
    config.models.model_path = dir.path().join("missing.onnx");

    let shared = SharedPipeline::new();
    let err = shared.get_or_load(&config).err().unwrap();

    assert_eq!(err.kind(), ErrorKind::ArtifactLoadFailed);
    assert!(err.message().contains("missing.onnx"));
    assert_eq!(shared.state(), ArtifactState::LoadFailed);
}

#[test]
fn corrupt_scaler_fails_startup() {
    let dir = tempfile::tempdir().unwrap();
    let scaler_path = dir.path().join("scaler.json");
    std::fs::write(&scaler_path, b"\x80\x04\x95 not json").unwrap();

    let mut config = AppConfig::default();
    config.models.scaler_path = scaler_path;

    let err = SharedPipeline::new().get_or_load(&config).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::ArtifactLoadFailed);
}
