//! Organizations and memberships.
//!
//! Pure domain rules (no IO, no HTTP, no storage). The organization directory
//! service in `saasbill-infra` persists these and resolves roles from them.

pub mod membership;
pub mod organization;

pub use membership::Membership;
pub use organization::{MAX_ORG_NAME_LEN, Organization};
