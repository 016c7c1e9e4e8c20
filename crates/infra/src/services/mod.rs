//! Application services over the stores.
//!
//! Each service owns the store handle it needs plus the deadline applied to
//! every store call it makes.

pub mod credentials;
pub mod directory;
pub mod ledger;

pub use credentials::{CredentialError, CredentialStore};
pub use directory::{DirectoryError, OrganizationDirectory};
pub use ledger::{CatalogError, LedgerError, SubscriptionLedger, read_plan_catalog};
