// Marketplace Listing Entity
// Birds, eggs, feed and equipment offered by sellers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    Active,
    Sold,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingStatus::Active => "active",
            ListingStatus::Sold => "sold",
        }
    }
}

impl FromStr for ListingStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ListingStatus::Active),
            "sold" => Ok(ListingStatus::Sold),
            other => Err(AppError::validation(
                "status",
                format!("'{}' is not active or sold", other),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketplaceListing {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: String,

    /// e.g. "Broilers", "Layers", "Eggs", "Feed", "Equipment"
    pub category: String,

    /// Price per unit in rupees
    pub price: f64,
    pub quantity: i64,

    /// e.g. "kg", "tray", "bird"
    pub unit: String,
    pub location: String,

    /// Public URLs in the marketplace bucket
    pub image_urls: Vec<String>,
    pub status: ListingStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NewMarketplaceListing {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub category: String,
    pub price: f64,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub location: String,
}

fn default_quantity() -> i64 {
    1
}

impl NewMarketplaceListing {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.title.trim().is_empty() {
            return Err(AppError::validation("title", "is required"));
        }
        if self.category.trim().is_empty() {
            return Err(AppError::validation("category", "is required"));
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(AppError::validation("price", "must not be negative"));
        }
        if self.quantity <= 0 {
            return Err(AppError::validation("quantity", "must be at least 1"));
        }
        Ok(())
    }
}

/// Ordering applied to fetched listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingSort {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
}

/// In-memory filter over fetched listings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListingFilter {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub sort: ListingSort,
    #[serde(default)]
    pub include_sold: bool,
}

impl ListingFilter {
    pub fn matches(&self, listing: &MarketplaceListing) -> bool {
        if !self.include_sold && listing.status == ListingStatus::Sold {
            return false;
        }
        if let Some(category) = &self.category {
            if !listing.category.eq_ignore_ascii_case(category) {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            if !listing.title.to_lowercase().contains(&needle)
                && !listing.description.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        true
    }

    /// Filter then sort a fetched list
    pub fn apply(&self, listings: Vec<MarketplaceListing>) -> Vec<MarketplaceListing> {
        let mut kept: Vec<MarketplaceListing> =
            listings.into_iter().filter(|l| self.matches(l)).collect();

        match self.sort {
            ListingSort::Newest => kept.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            ListingSort::PriceAsc => kept.sort_by(|a, b| a.price.total_cmp(&b.price)),
            ListingSort::PriceDesc => kept.sort_by(|a, b| b.price.total_cmp(&a.price)),
        }

        kept
    }
}
