// Farm Transaction Entity
// One line of a farmer's income/expense ledger.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Income,
    Expense,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Income => "income",
            TransactionKind::Expense => "expense",
        }
    }
}

impl FromStr for TransactionKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "income" => Ok(TransactionKind::Income),
            "expense" => Ok(TransactionKind::Expense),
            other => Err(AppError::validation(
                "kind",
                format!("'{}' is not income or expense", other),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub user_id: String,
    pub date: NaiveDate,
    pub description: String,

    /// Always positive; `kind` carries the sign
    pub amount: f64,
    pub kind: TransactionKind,

    /// e.g. "Feed", "Vaccines", "Egg sales"
    pub category: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NewTransaction {
    pub date: NaiveDate,
    #[serde(default)]
    pub description: String,
    pub amount: f64,
    pub kind: TransactionKind,
    pub category: String,
}

impl NewTransaction {
    pub fn validate(&self) -> Result<(), AppError> {
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(AppError::validation("amount", "must be a positive number"));
        }
        if self.category.trim().is_empty() {
            return Err(AppError::validation("category", "is required"));
        }
        Ok(())
    }
}
