// Role Resolver
// Reads the role tag from server-side user metadata and derives capability flags.
//
// The role is a closed set: unknown strings never grant anything.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

/// Metadata key holding the role string
pub const ROLE_METADATA_KEY: &str = "role";

// ============================================================================
// ROLE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// No role chosen yet (the empty role string)
    #[default]
    Unassigned,

    /// Poultry farmer
    Farmer,

    /// Buyer of birds, eggs and feed
    Buyer,

    /// Seller / dealer on the marketplace
    Seller,

    /// Bank, NBFC or cooperative offering credit products
    FinancialProvider,

    /// Publishes training resources
    Trainer,

    /// Platform administrator
    Admin,
}

impl Role {
    pub const ALL: [Role; 7] = [
        Role::Unassigned,
        Role::Farmer,
        Role::Buyer,
        Role::Seller,
        Role::FinancialProvider,
        Role::Trainer,
        Role::Admin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Unassigned => "",
            Role::Farmer => "farmer",
            Role::Buyer => "buyer",
            Role::Seller => "seller",
            Role::FinancialProvider => "financial_provider",
            Role::Trainer => "trainer",
            Role::Admin => "admin",
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            can_sell: matches!(self, Role::Farmer | Role::Seller),
            is_financial_provider: matches!(self, Role::FinancialProvider),
            is_trainer: matches!(self, Role::Trainer),
            is_admin: matches!(self, Role::Admin),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" => Ok(Role::Unassigned),
            "farmer" => Ok(Role::Farmer),
            "buyer" => Ok(Role::Buyer),
            "seller" => Ok(Role::Seller),
            "financial_provider" | "financial-provider" => Ok(Role::FinancialProvider),
            "trainer" => Ok(Role::Trainer),
            "admin" => Ok(Role::Admin),
            other => Err(AppError::validation(
                "role",
                format!("unknown role '{}'", other),
            )),
        }
    }
}

// ============================================================================
// CAPABILITIES
// ============================================================================

/// Boolean capability flags derived from a role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Capabilities {
    pub can_sell: bool,
    pub is_financial_provider: bool,
    pub is_trainer: bool,
    pub is_admin: bool,
}

/// Role plus the flags derived from it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ResolvedRole {
    pub role: Role,
    pub capabilities: Capabilities,
}

impl ResolvedRole {
    fn from_role(role: Role) -> Self {
        ResolvedRole {
            role,
            capabilities: role.capabilities(),
        }
    }
}

/// Resolve the role for a signed-in user.
///
/// `metadata` is the user's metadata object; `None` means there is no session.
/// A user flagged as admin in `admin_users` short-circuits to `Admin` without
/// looking at metadata.
pub fn resolve_role(metadata: Option<&serde_json::Value>, flagged_admin: bool) -> ResolvedRole {
    let Some(metadata) = metadata else {
        return ResolvedRole::default();
    };

    if flagged_admin {
        return ResolvedRole::from_role(Role::Admin);
    }

    let raw = metadata
        .get(ROLE_METADATA_KEY)
        .and_then(|v| v.as_str())
        .unwrap_or_default();

    let role = match raw.parse::<Role>() {
        Ok(role) => role,
        Err(_) => {
            tracing::warn!(role = raw, "unknown role in user metadata, treating as unassigned");
            Role::Unassigned
        }
    };

    ResolvedRole::from_role(role)
}
