// Loan Application Entity
// A farmer's credit request moving through a four-state status field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

// ============================================================================
// STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    /// Submitted, nobody has looked at it yet
    Pending,

    /// A provider picked it up
    Reviewing,

    /// Terminal
    Approved,

    /// Terminal
    Rejected,
}

impl LoanStatus {
    pub const ALL: [LoanStatus; 4] = [
        LoanStatus::Pending,
        LoanStatus::Reviewing,
        LoanStatus::Approved,
        LoanStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Pending => "pending",
            LoanStatus::Reviewing => "reviewing",
            LoanStatus::Approved => "approved",
            LoanStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LoanStatus::Approved | LoanStatus::Rejected)
    }

    /// Whether moving to `next` follows pending → reviewing → approved|rejected.
    ///
    /// Skipping review (pending → approved|rejected) counts as forward.
    /// Re-setting the current status is not a transition and is always allowed.
    pub fn is_forward_to(&self, next: LoanStatus) -> bool {
        if *self == next {
            return true;
        }
        match self {
            LoanStatus::Pending => true,
            LoanStatus::Reviewing => next.is_terminal(),
            LoanStatus::Approved | LoanStatus::Rejected => false,
        }
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoanStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(LoanStatus::Pending),
            "reviewing" => Ok(LoanStatus::Reviewing),
            "approved" => Ok(LoanStatus::Approved),
            "rejected" => Ok(LoanStatus::Rejected),
            other => Err(AppError::validation(
                "status",
                format!("'{}' is not one of pending, reviewing, approved, rejected", other),
            )),
        }
    }
}

// ============================================================================
// APPLICATION
// ============================================================================

/// Stored loan application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanApplication {
    pub id: String,

    /// Applicant (owner of the row)
    pub user_id: String,

    /// Requested amount in rupees
    pub amount: f64,
    pub purpose: String,

    /// Free text, e.g. "12 months"
    pub duration: String,
    pub farm_type: String,
    pub farm_size: String,
    pub annual_revenue: String,
    pub collateral: String,
    pub status: LoanStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing_loans: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_info: Option<String>,

    /// Reviewer's note, set alongside a status change
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Applicant-supplied fields for a new application
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NewLoanApplication {
    pub amount: f64,
    pub purpose: String,
    #[serde(default)]
    pub duration: String,
    pub farm_type: String,
    pub farm_size: String,
    #[serde(default)]
    pub annual_revenue: String,
    #[serde(default)]
    pub collateral: String,
    #[serde(default)]
    pub contact_number: Option<String>,
    #[serde(default)]
    pub existing_loans: Option<String>,
    #[serde(default)]
    pub additional_info: Option<String>,
}

impl NewLoanApplication {
    pub fn validate(&self) -> Result<(), AppError> {
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(AppError::validation("amount", "must be a positive number"));
        }
        if self.purpose.trim().is_empty() {
            return Err(AppError::validation("purpose", "is required"));
        }
        if self.farm_type.trim().is_empty() {
            return Err(AppError::validation("farm_type", "is required"));
        }
        if self.farm_size.trim().is_empty() {
            return Err(AppError::validation("farm_size", "is required"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        use LoanStatus::*;

        assert!(Pending.is_forward_to(Reviewing));
        assert!(Pending.is_forward_to(Approved));
        assert!(Pending.is_forward_to(Rejected));
        assert!(Reviewing.is_forward_to(Approved));
        assert!(Reviewing.is_forward_to(Rejected));

        assert!(!Reviewing.is_forward_to(Pending));
        assert!(!Approved.is_forward_to(Rejected));
        assert!(!Rejected.is_forward_to(Reviewing));

        // Same status is a no-op
        assert!(Approved.is_forward_to(Approved));
    }

    #[test]
    fn test_status_parsing_is_closed() {
        for status in LoanStatus::ALL {
            assert_eq!(status.as_str().parse::<LoanStatus>().unwrap(), status);
        }
        assert!("cancelled".parse::<LoanStatus>().is_err());
        assert!("Approved".parse::<LoanStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&LoanStatus::Reviewing).unwrap();
        assert_eq!(json, "\"reviewing\"");
    }

    #[test]
    fn test_validation_rejects_missing_fields() {
        let mut app = NewLoanApplication {
            amount: 50000.0,
            purpose: "Equipment".to_string(),
            farm_type: "Broiler Farm".to_string(),
            farm_size: "Small (< 5,000 birds)".to_string(),
            ..Default::default()
        };
        assert!(app.validate().is_ok());

        app.amount = 0.0;
        assert!(app.validate().is_err());

        app.amount = 1000.0;
        app.purpose = "   ".to_string();
        assert!(app.validate().is_err());
    }
}
