//! Prediction results and the structured response sent back to callers

use crate::error::{ErrorKind, ScoringError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Binary verdict for a scored transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Safe,
    Fraud,
}

impl Verdict {
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Safe => "SAFE",
            Verdict::Fraud => "FRAUD",
        }
    }

    /// Advice shown next to the verdict
    pub fn guidance(&self) -> &'static str {
        match self {
            Verdict::Safe => "The model considers this transaction normal activity.",
            Verdict::Fraud => "It is recommended not to proceed with this transaction.",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Fraud probability and the thresholded decision
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// P(fraud), in [0, 1]
    pub probability: f64,
    pub is_fraud: bool,
    /// Cutoff the decision was made with
    pub threshold: f64,
}

impl PredictionResult {
    /// A probability equal to the threshold counts as fraud.
    pub fn from_probability(probability: f64, threshold: f64) -> Self {
        Self {
            probability,
            is_fraud: probability >= threshold,
            threshold,
        }
    }

    pub fn verdict(&self) -> Verdict {
        if self.is_fraud {
            Verdict::Fraud
        } else {
            Verdict::Safe
        }
    }

    pub fn probability_percent(&self) -> f64 {
        self.probability * 100.0
    }

    /// e.g. `95.00%`
    pub fn probability_label(&self) -> String {
        format!("{:.2}%", self.probability_percent())
    }

    pub fn summary(&self) -> String {
        match self.verdict() {
            Verdict::Fraud => format!(
                "Transaction flagged as FRAUD (probability: {})",
                self.probability_label()
            ),
            Verdict::Safe => format!(
                "Transaction considered SAFE (fraud probability: {})",
                self.probability_label()
            ),
        }
    }
}

/// Outcome of one scoring request, as sent to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ScoringResponse {
    Ok {
        response_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        transaction_id: Option<String>,
        probability: f64,
        probability_percent: String,
        is_fraud: bool,
        verdict: Verdict,
        summary: String,
        guidance: String,
        threshold: f64,
        scored_at: DateTime<Utc>,
    },
    Error {
        response_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        transaction_id: Option<String>,
        kind: ErrorKind,
        message: String,
        /// Deployment problem rather than bad input
        fatal: bool,
    },
}

impl ScoringResponse {
    pub fn from_result(
        transaction_id: Option<String>,
        result: Result<PredictionResult, ScoringError>,
    ) -> Self {
        let response_id = uuid::Uuid::new_v4().to_string();
        match result {
            Ok(prediction) => ScoringResponse::Ok {
                response_id,
                transaction_id,
                probability: prediction.probability,
                probability_percent: prediction.probability_label(),
                is_fraud: prediction.is_fraud,
                verdict: prediction.verdict(),
                summary: prediction.summary(),
                guidance: prediction.verdict().guidance().to_string(),
                threshold: prediction.threshold,
                scored_at: Utc::now(),
            },
            Err(e) => ScoringResponse::Error {
                response_id,
                transaction_id,
                kind: e.kind(),
                message: e.message().to_string(),
                fatal: e.is_fatal(),
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ScoringResponse::Ok { .. })
    }

    pub fn transaction_id(&self) -> Option<&str> {
        match self {
            ScoringResponse::Ok { transaction_id, .. }
            | ScoringResponse::Error { transaction_id, .. } => transaction_id.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_is_inclusive() {
        assert!(PredictionResult::from_probability(0.5, 0.5).is_fraud);
        assert!(!PredictionResult::from_probability(0.4999999, 0.5).is_fraud);
        assert!(PredictionResult::from_probability(1.0, 0.5).is_fraud);
        assert!(!PredictionResult::from_probability(0.0, 0.5).is_fraud);
    }

    #[test]
    fn test_probability_label() {
        let result = PredictionResult::from_probability(0.95, 0.5);
        assert_eq!(result.probability_label(), "95.00%");
        assert_eq!(result.verdict(), Verdict::Fraud);
        assert_eq!(
            result.summary(),
            "Transaction flagged as FRAUD (probability: 95.00%)"
        );

        let result = PredictionResult::from_probability(0.01234, 0.5);
        assert_eq!(result.probability_label(), "1.23%");
        assert_eq!(result.verdict(), Verdict::Safe);
    }

    #[test]
    fn test_ok_response_serialization() {
        let response = ScoringResponse::from_result(
            Some("tx_123".to_string()),
            Ok(PredictionResult::from_probability(0.95, 0.5)),
        );
        let json: serde_json::Value = serde_json::to_value(&response).unwrap();

        assert_eq!(json["status"], "ok");
        assert_eq!(json["transaction_id"], "tx_123");
        assert_eq!(json["verdict"], "fraud");
        assert_eq!(json["probability_percent"], "95.00%");
        assert_eq!(json["probability"], 0.95);
    }

    #[test]
    fn test_error_response_serialization() {
        let response = ScoringResponse::from_result(
            None,
            Err(ScoringError::InvalidInput("unknown transaction type 'WIRE'".into())),
        );
        assert!(!response.is_ok());

        let json = serde_json::to_string(&response).unwrap();
        let back: ScoringResponse = serde_json::from_str(&json).unwrap();
        match back {
            ScoringResponse::Error {
                kind,
                message,
                fatal,
                transaction_id,
                ..
            } => {
                assert_eq!(kind, ErrorKind::InvalidInput);
                assert_eq!(message, "unknown transaction type 'WIRE'");
                assert!(!fatal);
                assert!(transaction_id.is_none());
            }
            other => panic!("unexpected response {:?}", other),
        }
    }
}
