//! Error types for the model test workspace

use thiserror::Error;

/// Result type alias for model test operations
pub type Result<T> = std::result::Result<T, Error>;

/// Structured error code, suitable for mapping onto a transport status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Request failed validation
    InvalidArgument,
    /// A referenced entity does not exist
    NotFound,
    /// A uniqueness constraint was violated
    AlreadyExists,
    /// The operation is not supported for the referenced entity
    Unsupported,
    /// The caller lacks the required permission
    PermissionDenied,
    /// An internal invariant was violated
    Internal,
}

/// Errors surfaced by the model test service
#[derive(Debug, Error)]
pub enum Error {
    /// Request failed validation
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A regex field in a request failed to compile
    #[error("Invalid regex in `{field}`: {message}")]
    InvalidRegex {
        /// The request field holding the regex
        field: String,
        /// Compiler error detail
        message: String,
    },

    /// A referenced project, split, model, collection, test, or group is missing
    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate test name or duplicate creation
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Operation not supported, e.g. targeting a production split
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// The caller lacks the required permission on the project
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Invariant violation, e.g. more than one row matches an overwrite identity
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// The structured code for this error
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidArgument(_) | Self::InvalidRegex { .. } => ErrorCode::InvalidArgument,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::AlreadyExists(_) => ErrorCode::AlreadyExists,
            Self::Unsupported(_) => ErrorCode::Unsupported,
            Self::PermissionDenied(_) => ErrorCode::PermissionDenied,
            Self::Internal(_) | Self::Serialization(_) | Self::Io(_) => ErrorCode::Internal,
        }
    }
}
