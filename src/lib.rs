//! Transaction Fraud Scoring Library
//!
//! Scores a single payment transaction for fraud: the transaction is encoded
//! into the exact feature row a fitted scaler expects, scaled, reduced to the
//! features the classifier was trained on, and classified against a fixed
//! probability threshold.

pub mod config;
pub mod consumer;
pub mod error;
pub mod feature_encoder;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod producer;
pub mod schema;
pub mod types;

pub use config::AppConfig;
pub use consumer::TransactionConsumer;
pub use error::{ErrorKind, ScoringError};
pub use feature_encoder::{EncodedFeatureRow, FeatureEncoder};
pub use models::loader::SharedPipeline;
pub use pipeline::{PipelineSettings, ScoringPipeline};
pub use producer::PredictionProducer;
pub use schema::{FeatureSchema, SchemaVariant};
pub use types::{
    prediction::{PredictionResult, ScoringResponse, Verdict},
    transaction::{RawTransaction, TransactionForm, TransactionType},
};
