//! Type definitions for the fraud scoring pipeline

pub mod prediction;
pub mod transaction;

pub use prediction::{PredictionResult, ScoringResponse, Verdict};
pub use transaction::{RawTransaction, TransactionForm, TransactionType};
