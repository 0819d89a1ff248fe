//! NATS message consumer for incoming scoring requests

use crate::types::transaction::TransactionForm;
use anyhow::Result;
use async_nats::{Client, Message, Subscriber};
use tracing::info;

/// Consumer for receiving transactions from NATS
pub struct TransactionConsumer {
    client: Client,
    subject: String,
}

impl TransactionConsumer {
    pub fn new(client: Client, subject: &str) -> Self {
        Self {
            client,
            subject: subject.to_string(),
        }
    }

    /// Subscribe to the transaction subject
    pub async fn subscribe(&self) -> Result<Subscriber> {
        let subscriber = self.client.subscribe(self.subject.clone()).await?;
        info!(subject = %self.subject, "Subscribed to transaction subject");
        Ok(subscriber)
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}

/// Parse a message payload as a transaction form
pub fn decode_form(message: &Message) -> serde_json::Result<TransactionForm> {
    serde_json::from_slice(&message.payload)
}

/// Best-effort `transaction_id` from a payload that failed to decode
pub fn transaction_id_hint(payload: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(payload).ok()?;
    value
        .get("transaction_id")
        .and_then(|v| v.as_str())
        .map(str::to_string)
}
