//! Errors raised while building users, organizations, memberships, plans and
//! subscriptions from caller input.

use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

/// Rejection of a value before it reaches a store.
///
/// Every variant carries a message fit to show a client as error details.
/// Missing records and duplicates are reported by the store, not here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Bad caller input: an empty organization name, a malformed email, an
    /// unknown role or plan interval.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A computed value left its valid range, e.g. a billing period end past
    /// the representable calendar.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// A user, organization, plan or subscription id that is not a UUID.
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    /// The message alone, without the `validation failed:` style prefix.
    pub fn detail(&self) -> &str {
        match self {
            Self::Validation(m) | Self::InvariantViolation(m) | Self::InvalidId(m) => m,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_drops_the_variant_prefix() {
        let err = DomainError::validation("organization name must not be empty");
        assert_eq!(err.to_string(), "validation failed: organization name must not be empty");
        assert_eq!(err.detail(), "organization name must not be empty");
        assert_eq!(DomainError::invalid_id("nope").detail(), "nope");
    }
}
