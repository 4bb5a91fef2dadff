//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every entry point reports one of these kinds. The transport layer maps
/// them onto status codes; nothing below it knows about HTTP.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Bad input shape or range, reported against a single field.
    #[error("{field}: {message}")]
    Validation { field: String, message: String },

    /// The resource does not exist or is outside the caller's visible scope.
    #[error("{0}")]
    NotFound(String),

    /// Authenticated, but the policy denies the operation.
    #[error("{0}")]
    AccessDenied(String),

    /// Duplicate key, exhausted number allocation, or a delete blocked by a
    /// referencing row.
    #[error("{0}")]
    Conflict(String),

    /// An outbound collaborator (email, renderer, file store) failed.
    #[error("external service failure: {0}")]
    External(String),
}

impl DomainError {
    pub fn validation(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: msg.into(),
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn access_denied(msg: impl Into<String>) -> Self {
        Self::AccessDenied(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn external(msg: impl Into<String>) -> Self {
        Self::External(msg.into())
    }

    /// Stable machine-readable code for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::AccessDenied(_) => "access_denied",
            Self::Conflict(_) => "conflict",
            Self::External(_) => "external_service_failure",
        }
    }
}
