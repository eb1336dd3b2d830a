// Training Resource Entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrainingFormat {
    Video,
    Article,
    Course,
    Webinar,
}

impl TrainingFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrainingFormat::Video => "video",
            TrainingFormat::Article => "article",
            TrainingFormat::Course => "course",
            TrainingFormat::Webinar => "webinar",
        }
    }
}

impl FromStr for TrainingFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video" => Ok(TrainingFormat::Video),
            "article" => Ok(TrainingFormat::Article),
            "course" => Ok(TrainingFormat::Course),
            "webinar" => Ok(TrainingFormat::Webinar),
            other => Err(AppError::validation(
                "format",
                format!("'{}' is not video, article, course or webinar", other),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingResource {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: String,

    /// e.g. "Biosecurity", "Feed management"
    pub category: String,
    pub format: TrainingFormat,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NewTrainingResource {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub category: String,
    pub format: TrainingFormat,
    pub url: String,
    #[serde(default)]
    pub duration_minutes: Option<i64>,
}

impl NewTrainingResource {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.title.trim().is_empty() {
            return Err(AppError::validation("title", "is required"));
        }
        if self.category.trim().is_empty() {
            return Err(AppError::validation("category", "is required"));
        }
        if !(self.url.starts_with("https://") || self.url.starts_with("http://")) {
            return Err(AppError::validation("url", "must be an http(s) link"));
        }
        if matches!(self.duration_minutes, Some(m) if m <= 0) {
            return Err(AppError::validation("duration_minutes", "must be positive"));
        }
        Ok(())
    }
}
