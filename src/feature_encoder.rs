//! Feature encoding for payment fraud model inference.
//!
//! Turns one transaction into the full feature row the scaler was fitted on:
//! raw balances, drop-first one-hot indicators for the transaction type and,
//! for the drained schema, the `isDrained` flag. Values are laid out in
//! schema order.

use crate::error::ScoringError;
use crate::schema::{FeatureColumn, FeatureSchema};
use crate::types::transaction::{RawTransaction, TransactionForm};
use std::sync::Arc;

/// Absolute tolerance for "sender balance equals amount"
pub const DRAINED_TOLERANCE: f64 = 0.01;

/// Full-width feature row, one value per schema column
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedFeatureRow {
    values: Vec<f64>,
}

impl EncodedFeatureRow {
    /// Wrap values that are already in schema order
    pub fn from_values(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_values(self) -> Vec<f64> {
        self.values
    }
}

/// True when the transaction emptied the sender's account.
pub fn is_drained(tx: &RawTransaction) -> bool {
    (tx.old_balance_org - tx.amount).abs() < DRAINED_TOLERANCE
}

/// Encodes transactions against a fixed schema.
pub struct FeatureEncoder {
    schema: Arc<FeatureSchema>,
}

impl FeatureEncoder {
    pub fn new(schema: Arc<FeatureSchema>) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Encode a validated transaction.
    ///
    /// Amounts are checked again here since `RawTransaction` fields are public.
    pub fn encode(&self, tx: &RawTransaction) -> Result<EncodedFeatureRow, ScoringError> {
        tx.validate()?;

        let values = self
            .schema
            .columns()
            .iter()
            .map(|column| Self::column_value(*column, tx))
            .collect();

        Ok(EncodedFeatureRow { values })
    }

    /// Validate a raw submission and encode it.
    pub fn encode_form(&self, form: &TransactionForm) -> Result<EncodedFeatureRow, ScoringError> {
        let tx = RawTransaction::try_from(form)?;
        self.encode(&tx)
    }

    fn column_value(column: FeatureColumn, tx: &RawTransaction) -> f64 {
        match column {
            FeatureColumn::Amount => tx.amount,
            FeatureColumn::OldBalanceOrg => tx.old_balance_org,
            FeatureColumn::NewBalanceOrig => tx.new_balance_orig,
            FeatureColumn::OldBalanceDest => tx.old_balance_dest,
            FeatureColumn::NewBalanceDest => tx.new_balance_dest,
            FeatureColumn::Type(t) => indicator(tx.tx_type == t),
            FeatureColumn::IsDrained => indicator(is_drained(tx)),
        }
    }

    pub fn feature_count(&self) -> usize {
        self.schema.len()
    }

    pub fn feature_names(&self) -> Vec<&'static str> {
        self.schema.names()
    }
}

fn indicator(flag: bool) -> f64 {
    if flag {
        1.0
    } else {
        0.0
    }
}
