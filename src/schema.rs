//! Feature schemas: the ordered column lists a scaler/model pair was fitted on.
//!
//! Column order is part of the artifact contract. A schema is built once at
//! startup and never mutated; the selection indices are resolved from it by
//! name so a renamed or missing column fails loudly instead of shifting
//! every feature by one.

use crate::error::ScoringError;
use crate::types::transaction::TransactionType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single named numeric column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureColumn {
    Amount,
    OldBalanceOrg,
    NewBalanceOrig,
    OldBalanceDest,
    NewBalanceDest,
    /// One-hot indicator for a non-reference transaction type
    Type(TransactionType),
    IsDrained,
}

impl FeatureColumn {
    /// Column name as used at training time
    pub fn name(&self) -> &'static str {
        match self {
            FeatureColumn::Amount => "amount",
            FeatureColumn::OldBalanceOrg => "oldbalanceOrg",
            FeatureColumn::NewBalanceOrig => "newbalanceOrig",
            FeatureColumn::OldBalanceDest => "oldbalanceDest",
            FeatureColumn::NewBalanceDest => "newbalanceDest",
            FeatureColumn::Type(t) => match t {
                TransactionType::CashIn => "type_CASH_IN",
                TransactionType::CashOut => "type_CASH_OUT",
                TransactionType::Debit => "type_DEBIT",
                TransactionType::Payment => "type_PAYMENT",
                TransactionType::Transfer => "type_TRANSFER",
            },
            FeatureColumn::IsDrained => "isDrained",
        }
    }
}

impl fmt::Display for FeatureColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Model generation, each with its own column layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaVariant {
    /// 9 columns: balances plus drop-first type indicators
    #[default]
    Legacy,
    /// 10 columns: `Legacy` plus a trailing `isDrained`
    Drained,
}

impl SchemaVariant {
    /// Features the classifier of this generation was trained on
    pub fn default_selection(&self) -> Vec<String> {
        let names: &[&str] = match self {
            SchemaVariant::Legacy => &[
                "amount",
                "oldbalanceOrg",
                "oldbalanceDest",
                "newbalanceDest",
                "type_TRANSFER",
            ],
            SchemaVariant::Drained => &[
                "amount",
                "oldbalanceOrg",
                "newbalanceOrig",
                "type_TRANSFER",
                "isDrained",
            ],
        };
        names.iter().map(|s| s.to_string()).collect()
    }
}

impl fmt::Display for SchemaVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaVariant::Legacy => f.write_str("legacy"),
            SchemaVariant::Drained => f.write_str("drained"),
        }
    }
}

/// Ordered list of named columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSchema {
    variant: SchemaVariant,
    columns: Vec<FeatureColumn>,
}

impl FeatureSchema {
    pub fn new(variant: SchemaVariant) -> Self {
        let mut columns = vec![
            FeatureColumn::Amount,
            FeatureColumn::OldBalanceOrg,
            FeatureColumn::NewBalanceOrig,
            FeatureColumn::OldBalanceDest,
            FeatureColumn::NewBalanceDest,
        ];
        // Reference category is dropped; the rest keep category order.
        columns.extend(
            TransactionType::ALL
                .into_iter()
                .skip(1)
                .map(FeatureColumn::Type),
        );
        if variant == SchemaVariant::Drained {
            columns.push(FeatureColumn::IsDrained);
        }
        Self { variant, columns }
    }

    pub fn variant(&self) -> SchemaVariant {
        self.variant
    }

    pub fn columns(&self) -> &[FeatureColumn] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name()).collect()
    }

    pub fn position(&self, column: FeatureColumn) -> Option<usize> {
        self.columns.iter().position(|c| *c == column)
    }

    pub fn position_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name() == name)
    }

    /// Resolve feature names to positions in this schema.
    pub fn resolve_selection(&self, names: &[String]) -> Result<FeatureSelection, ScoringError> {
        if names.is_empty() {
            return Err(ScoringError::SchemaMismatch(
                "feature selection is empty".to_string(),
            ));
        }

        let mut indices = Vec::with_capacity(names.len());
        for name in names {
            let idx = self.position_of(name).ok_or_else(|| {
                ScoringError::SchemaMismatch(format!(
                    "selected feature '{}' is not a column of the {} schema",
                    name, self.variant
                ))
            })?;
            if indices.contains(&idx) {
                return Err(ScoringError::SchemaMismatch(format!(
                    "selected feature '{}' listed twice",
                    name
                )));
            }
            indices.push(idx);
        }

        Ok(FeatureSelection {
            names: names.to_vec(),
            indices,
        })
    }

    /// Verify that `names` lists exactly this schema's columns, in order.
    pub fn verify_names<S: AsRef<str>>(&self, names: &[S]) -> Result<(), ScoringError> {
        if names.len() != self.len() {
            return Err(ScoringError::SchemaMismatch(format!(
                "expected {} columns for the {} schema, artifact lists {}",
                self.len(),
                self.variant,
                names.len()
            )));
        }
        for (i, (expected, actual)) in self.columns.iter().zip(names).enumerate() {
            if expected.name() != actual.as_ref() {
                return Err(ScoringError::SchemaMismatch(format!(
                    "column {} is '{}' in the artifact but '{}' in the {} schema",
                    i,
                    actual.as_ref(),
                    expected.name(),
                    self.variant
                )));
            }
        }
        Ok(())
    }
}

/// Selected feature names and their resolved schema positions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSelection {
    names: Vec<String>,
    indices: Vec<usize>,
}

impl FeatureSelection {
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Project a full-width row onto the selected positions.
    pub fn project(&self, values: &[f64]) -> Result<Vec<f64>, ScoringError> {
        self.indices
            .iter()
            .map(|&i| {
                values.get(i).copied().ok_or_else(|| {
                    ScoringError::SchemaMismatch(format!(
                        "selection index {} out of range for a row of {} values",
                        i,
                        values.len()
                    ))
                })
            })
            .collect()
    }
}
