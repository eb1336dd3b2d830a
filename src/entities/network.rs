// Network Entities
// Community posts, farmer and expert directories, events and job listings.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

fn require(field: &'static str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::validation(field, "is required"));
    }
    Ok(())
}

// ============================================================================
// POSTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkPost {
    pub id: String,
    pub user_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NewNetworkPost {
    pub content: String,
}

impl NewNetworkPost {
    pub fn validate(&self) -> Result<(), AppError> {
        require("content", &self.content)
    }
}

// ============================================================================
// FARMER DIRECTORY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Farmer {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub location: String,
    pub farm_type: String,
    pub farm_size: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specialization: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NewFarmer {
    pub name: String,
    pub location: String,
    pub farm_type: String,
    #[serde(default)]
    pub farm_size: String,
    #[serde(default)]
    pub specialization: Option<String>,
}

impl NewFarmer {
    pub fn validate(&self) -> Result<(), AppError> {
        require("name", &self.name)?;
        require("location", &self.location)?;
        require("farm_type", &self.farm_type)
    }
}

// ============================================================================
// EXPERT DIRECTORY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expert {
    pub id: String,
    pub user_id: String,
    pub name: String,

    /// e.g. "Veterinary", "Nutrition", "Hatchery management"
    pub expertise: String,
    pub experience_years: i64,
    pub location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NewExpert {
    pub name: String,
    pub expertise: String,
    #[serde(default)]
    pub experience_years: i64,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub contact: Option<String>,
}

impl NewExpert {
    pub fn validate(&self) -> Result<(), AppError> {
        require("name", &self.name)?;
        require("expertise", &self.expertise)?;
        if self.experience_years < 0 {
            return Err(AppError::validation("experience_years", "must not be negative"));
        }
        Ok(())
    }
}

// ============================================================================
// EVENTS
// ============================================================================

/// Community event (melas, vaccination camps, trade fairs)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkEvent {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub event_date: NaiveDate,
    pub location: String,
    pub organizer: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NewNetworkEvent {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub event_date: NaiveDate,
    pub location: String,
    #[serde(default)]
    pub organizer: String,
}

impl NewNetworkEvent {
    pub fn validate(&self) -> Result<(), AppError> {
        require("title", &self.title)?;
        require("location", &self.location)
    }
}

// ============================================================================
// JOBS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobListing {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub company: String,
    pub location: String,

    /// e.g. "full_time", "part_time", "contract"
    pub job_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub salary_range: Option<String>,
    pub description: String,
    pub requirements: Vec<String>,
    pub contact_email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NewJobListing {
    pub title: String,
    pub company: String,
    pub location: String,
    #[serde(default)]
    pub job_type: String,
    #[serde(default)]
    pub salary_range: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub requirements: Vec<String>,
    pub contact_email: String,
}

impl NewJobListing {
    pub fn validate(&self) -> Result<(), AppError> {
        require("title", &self.title)?;
        require("company", &self.company)?;
        require("location", &self.location)?;
        if !self.contact_email.contains('@') {
            return Err(AppError::validation("contact_email", "is not an email address"));
        }
        Ok(())
    }
}
