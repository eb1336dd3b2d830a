// Financial Service Entity
// A credit, insurance or subsidy product listed by a provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialService {
    pub id: String,

    /// Provider who listed it (owner of the row)
    pub user_id: String,
    pub title: String,
    pub description: String,

    /// e.g. "loan", "insurance", "subsidy"
    pub category: String,
    pub provider_name: String,

    /// Annual percentage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interest_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenure: Option<String>,

    pub eligibility_criteria: Vec<String>,
    pub tags: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied on create and on edit
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FinancialServiceInput {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub category: String,
    pub provider_name: String,
    #[serde(default)]
    pub interest_rate: Option<f64>,
    #[serde(default)]
    pub max_amount: Option<f64>,
    #[serde(default)]
    pub tenure: Option<String>,
    #[serde(default)]
    pub eligibility_criteria: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub contact_email: Option<String>,
}

impl FinancialServiceInput {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.title.trim().is_empty() {
            return Err(AppError::validation("title", "is required"));
        }
        if self.category.trim().is_empty() {
            return Err(AppError::validation("category", "is required"));
        }
        if self.provider_name.trim().is_empty() {
            return Err(AppError::validation("provider_name", "is required"));
        }
        if let Some(rate) = self.interest_rate {
            if !(0.0..=100.0).contains(&rate) {
                return Err(AppError::validation("interest_rate", "must be between 0 and 100"));
            }
        }
        if let Some(max) = self.max_amount {
            if max <= 0.0 {
                return Err(AppError::validation("max_amount", "must be positive"));
            }
        }
        Ok(())
    }
}
