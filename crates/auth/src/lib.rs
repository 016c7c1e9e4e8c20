//! `saasbill-auth`: credential and authorization primitives.
//!
//! This crate is intentionally decoupled from HTTP and storage: it hashes and
//! verifies passwords, issues and validates session tokens, and decides whether
//! a resolved role may perform an action. Persistence lives in `saasbill-infra`.

pub mod authorize;
pub mod claims;
pub mod password;
pub mod roles;
pub mod token;
pub mod user;

pub use authorize::{AuthzError, RoleResolver, authorize_member, authorize_role};
pub use claims::{SessionClaims, TokenValidationError, validate_claims};
pub use password::{HashCost, PasswordError, PasswordHasher};
pub use roles::{OWNER_OR_ADMIN, Role};
pub use token::{Hs256SessionTokens, SessionToken, TokenError, TokenIssuer, TokenValidator};
pub use user::{MIN_PASSWORD_LEN, User, normalize_email, validate_password};
