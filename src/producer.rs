//! NATS message producer for scoring responses

use crate::types::prediction::ScoringResponse;
use anyhow::Result;
use async_nats::{Client, Subject};
use tracing::debug;

/// Publishes scoring responses, to the request's reply subject when it has one
#[derive(Clone)]
pub struct PredictionProducer {
    client: Client,
    subject: String,
}

impl PredictionProducer {
    pub fn new(client: Client, subject: &str) -> Self {
        Self {
            client,
            subject: subject.to_string(),
        }
    }

    /// Publish a response
    pub async fn publish(&self, response: &ScoringResponse, reply: Option<Subject>) -> Result<()> {
        let payload = serde_json::to_vec(response)?;
        let target = reply.unwrap_or_else(|| Subject::from(self.subject.as_str()));

        debug!(
            subject = %target,
            transaction_id = response.transaction_id().unwrap_or("-"),
            ok = response.is_ok(),
            "Publishing scoring response"
        );

        self.client.publish(target, payload.into()).await?;
        Ok(())
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}
