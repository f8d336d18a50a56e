//! Shared error type across the RBAC crates.

use thiserror::Error;

/// Stable error codes surfaced to configuration loaders and API callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Malformed or semantically invalid configuration.
    InvalidConfig,
    /// A structural matcher (regex, CIDR, string matcher) failed to compile.
    InvalidMatcher,
    /// An expression condition failed to parse or compile.
    InvalidExpression,
    /// Unsupported configuration version.
    UnsupportedVersion,
    /// Internal error.
    Internal,
}

impl ErrorCode {
    /// String representation used in JSON responses and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InvalidConfig => "INVALID_CONFIG",
            ErrorCode::InvalidMatcher => "INVALID_MATCHER",
            ErrorCode::InvalidExpression => "INVALID_EXPRESSION",
            ErrorCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, RbacError>;

/// Unified error type used by core and engine.
///
/// Every variant is a construction-time failure. Evaluation never produces
/// an `RbacError`; faults there degrade to a non-match.
#[derive(Debug, Error)]
pub enum RbacError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("invalid matcher in policy {policy}: {reason}")]
    InvalidMatcher { policy: String, reason: String },
    #[error("invalid expression in policy {policy}: {reason}")]
    InvalidExpression { policy: String, reason: String },
    #[error("unsupported config version")]
    UnsupportedVersion,
    #[error("internal: {0}")]
    Internal(String),
}

impl RbacError {
    /// Map the error to a stable code.
    pub fn code(&self) -> ErrorCode {
        match self {
            RbacError::InvalidConfig(_) => ErrorCode::InvalidConfig,
            RbacError::InvalidMatcher { .. } => ErrorCode::InvalidMatcher,
            RbacError::InvalidExpression { .. } => ErrorCode::InvalidExpression,
            RbacError::UnsupportedVersion => ErrorCode::UnsupportedVersion,
            RbacError::Internal(_) => ErrorCode::Internal,
        }
    }
}
