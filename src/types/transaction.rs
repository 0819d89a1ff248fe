//! Transaction data structures for payment fraud scoring

use crate::error::ScoringError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Payment transaction category
///
/// Declaration order is the category order used when the one-hot columns
/// were fitted. `CashIn` is the reference category and has no column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    CashIn,
    CashOut,
    Debit,
    Payment,
    Transfer,
}

impl TransactionType {
    pub const ALL: [TransactionType; 5] = [
        TransactionType::CashIn,
        TransactionType::CashOut,
        TransactionType::Debit,
        TransactionType::Payment,
        TransactionType::Transfer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::CashIn => "CASH_IN",
            TransactionType::CashOut => "CASH_OUT",
            TransactionType::Debit => "DEBIT",
            TransactionType::Payment => "PAYMENT",
            TransactionType::Transfer => "TRANSFER",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = ScoringError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransactionType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ScoringError::InvalidInput(format!("unknown transaction type '{}'", s)))
    }
}

/// A submission as received from the form/display layer.
///
/// Every field is optional here so that an incomplete submission can be
/// reported field by field instead of failing to parse.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionForm {
    /// Caller-supplied identifier, echoed back in the response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,

    #[serde(rename = "type", default)]
    pub tx_type: Option<String>,

    #[serde(default)]
    pub amount: Option<f64>,

    /// Sender balance before the transaction
    #[serde(rename = "oldbalanceOrg", default)]
    pub old_balance_org: Option<f64>,

    /// Sender balance after the transaction
    #[serde(rename = "newbalanceOrig", default)]
    pub new_balance_orig: Option<f64>,

    /// Recipient balance before the transaction
    #[serde(rename = "oldbalanceDest", default)]
    pub old_balance_dest: Option<f64>,

    /// Recipient balance after the transaction
    #[serde(rename = "newbalanceDest", default)]
    pub new_balance_dest: Option<f64>,
}

/// A validated transaction: known type, all amounts present, finite and non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawTransaction {
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub amount: f64,
    #[serde(rename = "oldbalanceOrg")]
    pub old_balance_org: f64,
    #[serde(rename = "newbalanceOrig")]
    pub new_balance_orig: f64,
    #[serde(rename = "oldbalanceDest")]
    pub old_balance_dest: f64,
    #[serde(rename = "newbalanceDest")]
    pub new_balance_dest: f64,
}

impl RawTransaction {
    /// Build a transaction, validating every amount.
    pub fn new(
        tx_type: TransactionType,
        amount: f64,
        old_balance_org: f64,
        new_balance_orig: f64,
        old_balance_dest: f64,
        new_balance_dest: f64,
    ) -> Result<Self, ScoringError> {
        let tx = Self {
            tx_type,
            amount,
            old_balance_org,
            new_balance_orig,
            old_balance_dest,
            new_balance_dest,
        };
        tx.validate()?;
        Ok(tx)
    }

    /// Amounts in form order, paired with their wire names
    pub fn amounts(&self) -> [(&'static str, f64); 5] {
        [
            ("amount", self.amount),
            ("oldbalanceOrg", self.old_balance_org),
            ("newbalanceOrig", self.new_balance_orig),
            ("oldbalanceDest", self.old_balance_dest),
            ("newbalanceDest", self.new_balance_dest),
        ]
    }

    /// Check that every amount is finite and non-negative.
    pub fn validate(&self) -> Result<(), ScoringError> {
        for (name, value) in self.amounts() {
            if !value.is_finite() {
                return Err(ScoringError::InvalidInput(format!(
                    "field '{}' is not a finite number",
                    name
                )));
            }
            if value < 0.0 {
                return Err(ScoringError::InvalidInput(format!(
                    "field '{}' must not be negative (got {})",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

impl TryFrom<&TransactionForm> for RawTransaction {
    type Error = ScoringError;

    fn try_from(form: &TransactionForm) -> Result<Self, Self::Error> {
        let tx_type = form
            .tx_type
            .as_deref()
            .ok_or_else(|| missing("type"))?
            .parse::<TransactionType>()?;

        RawTransaction::new(
            tx_type,
            form.amount.ok_or_else(|| missing("amount"))?,
            form.old_balance_org.ok_or_else(|| missing("oldbalanceOrg"))?,
            form.new_balance_orig.ok_or_else(|| missing("newbalanceOrig"))?,
            form.old_balance_dest.ok_or_else(|| missing("oldbalanceDest"))?,
            form.new_balance_dest.ok_or_else(|| missing("newbalanceDest"))?,
        )
    }
}

fn missing(field: &str) -> ScoringError {
    ScoringError::InvalidInput(format!("missing required field '{}'", field))
}
