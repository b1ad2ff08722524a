//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Deterministic business failures only. A command that fails with any of
/// these leaves state untouched; retrying it unchanged will fail again.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed or out-of-range input.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The operation is not allowed in the aggregate's current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A lifecycle event is not defined for the current state.
    #[error("invalid transition: {event} is not allowed from {from}")]
    InvalidTransition { from: String, event: String },

    /// Not enough available consigned units.
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: i64, available: i64 },

    /// The operation conflicts with existing data.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A uniqueness constraint would be broken.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// A settlement period intersects one that is still in force.
    #[error("overlapping period: {0}")]
    OverlappingPeriod(String),

    /// No unsettled sales fall inside the requested period.
    #[error("no unsettled sales in period")]
    NoSalesInPeriod,

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("not found")]
    NotFound,
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn invalid_transition(from: impl core::fmt::Display, event: impl core::fmt::Display) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            event: event.to_string(),
        }
    }

    pub fn insufficient_stock(requested: i64, available: i64) -> Self {
        Self::InsufficientStock {
            requested,
            available,
        }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn duplicate(msg: impl Into<String>) -> Self {
        Self::DuplicateKey(msg.into())
    }

    pub fn overlapping(msg: impl Into<String>) -> Self {
        Self::OverlappingPeriod(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    /// Stable machine-readable code, used by adapters (HTTP bodies, logs).
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::Validation(_) => "validation_error",
            DomainError::InvalidState(_) => "invalid_state",
            DomainError::InvalidTransition { .. } => "invalid_transition",
            DomainError::InsufficientStock { .. } => "insufficient_stock",
            DomainError::Conflict(_) => "conflict",
            DomainError::DuplicateKey(_) => "duplicate_key",
            DomainError::OverlappingPeriod(_) => "overlapping_period",
            DomainError::NoSalesInPeriod => "no_sales_in_period",
            DomainError::InvariantViolation(_) => "invariant_violation",
            DomainError::InvalidId(_) => "invalid_id",
            DomainError::NotFound => "not_found",
        }
    }
}
