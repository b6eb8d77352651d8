//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, conflicts). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// One or more request parameters failed validation.
    ///
    /// Carries *every* violated constraint, not just the first one found, so
    /// callers can fix a request in a single round trip.
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (domain-level).
    ///
    /// Also returned for resources owned by another principal, so that
    /// existence is not leaked across ownership boundaries.
    #[error("not found")]
    NotFound,

    /// A conflict occurred (e.g. duplicate name, rejected state transition).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Authorization failure at the domain boundary.
    #[error("unauthorized")]
    Unauthorized,

    /// The artifact existed but its retention window has elapsed.
    #[error("gone: artifact expired")]
    Gone,

    /// The job has not reached a downloadable state yet.
    #[error("not ready: job is not completed")]
    NotReady,
}

impl DomainError {
    /// Single-message validation failure.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(vec![msg.into()])
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }
}
