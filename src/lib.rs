// 22POULTRY - Core Library
// Exposes all modules for use in the operator CLI, the API server, and tests

pub mod error;
pub mod roles;
pub mod entities;
pub mod db;
pub mod session;
pub mod policy;
pub mod storage;
pub mod workflow;      // Loan application workflow
pub mod financial;     // Financial services + farm ledger
pub mod marketplace;
pub mod training;
pub mod network;       // Community posts, directories, events, jobs
pub mod profile;
pub mod admin;
pub mod config;
pub mod logging;

#[cfg(feature = "server")]
pub mod api;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use error::{AppError, AppResult};
pub use roles::{resolve_role, Capabilities, ResolvedRole, Role};
pub use db::{open_database, setup_database, Event, Table};
pub use session::{authenticate, create_user, issue_token, Session};
pub use policy::{apply_policies, PolicySet};
pub use storage::BucketStore;
pub use workflow::{
    bulk_update_status, list_applications, submit_application, update_application_status,
    BulkOutcome, TransitionPolicy,
};
pub use entities::{LoanApplication, LoanStatus, NewLoanApplication};
pub use config::Settings;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
