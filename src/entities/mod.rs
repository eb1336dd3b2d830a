// Entity Models
// Row types for every table plus the input shapes accepted on create/update.
//
// Each entity has:
// - A UUID id and the owning user's id
// - Creation timestamp (RFC 3339 in storage)
// - A `New*`/input type with `validate()`

pub mod loan_application;
pub mod financial_service;
pub mod transaction;
pub mod marketplace;
pub mod network;
pub mod training;
pub mod profile;

pub use loan_application::{LoanApplication, LoanStatus, NewLoanApplication};
pub use financial_service::{FinancialService, FinancialServiceInput};
pub use transaction::{NewTransaction, Transaction, TransactionKind};
pub use marketplace::{
    ListingFilter, ListingSort, ListingStatus, MarketplaceListing, NewMarketplaceListing,
};
pub use network::{
    Expert, Farmer, JobListing, NetworkEvent, NetworkPost, NewExpert, NewFarmer,
    NewJobListing, NewNetworkEvent, NewNetworkPost,
};
pub use training::{NewTrainingResource, TrainingFormat, TrainingResource};
pub use profile::{Profile, ProfileUpdate};
