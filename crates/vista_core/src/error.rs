//! Error types shared by every Vista crate
//!
//! Each variant of [`SceneError`] is one kind of failure. Callers that only
//! care about the kind can match on [`SceneError::kind`], which returns a
//! fieldless [`ErrorKind`] tag.

use std::fmt;
use thiserror::Error;

/// The error taxonomy for scene, persistence and collaboration operations
#[derive(Debug, Error)]
pub enum SceneError {
    /// An argument did not have the expected shape
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The referenced node, file or server resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The operation would violate a structural invariant
    #[error("Not allowed: {0}")]
    NotAllowed(String),

    /// The store is already bound to a tree
    #[error("Store is already bound to a scene")]
    AlreadyBound,

    /// The store, session or connection has not been set up yet
    #[error("Not initialized: {0}")]
    NotInitialized(String),

    /// A persisted document was malformed
    #[error("Parse error: {0}")]
    Parse(String),

    /// A resource could not be opened
    #[error("Failed to open {path}: {reason}")]
    OpenFailure { path: String, reason: String },

    /// A resource could not be read
    #[error("Failed to read {path}: {reason}")]
    ReadFailure { path: String, reason: String },

    /// A resource could not be written
    #[error("Failed to write {path}: {reason}")]
    WriteFailure { path: String, reason: String },

    /// The server could not be reached
    #[error("Connection failed: {0}")]
    ConnectionFailure(String),

    /// The server declined the credentials
    #[error("Authentication failed: {0}")]
    AuthFailure(String),

    /// The server reported an error
    #[error("Server error: {0}")]
    ServerFailure(String),

    /// Local and remote state disagree
    #[error("Out of sync: {0}")]
    OutOfSync(String),

    /// External code still holds references into the tree
    #[error("{count} node(s) still hold user data")]
    OutstandingReferences { count: usize },

    /// The request did not complete in time
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// The request was cancelled before it completed
    #[error("Operation cancelled")]
    Cancelled,
}

/// Fieldless tag naming the kind of a [`SceneError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidParameter,
    NotFound,
    NotAllowed,
    AlreadyBound,
    NotInitialized,
    ParseError,
    OpenFailure,
    ReadFailure,
    WriteFailure,
    ConnectionFailure,
    AuthFailure,
    ServerFailure,
    OutOfSync,
    OutstandingReferences,
    Timeout,
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl SceneError {
    /// Get the kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidParameter(_) => ErrorKind::InvalidParameter,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::NotAllowed(_) => ErrorKind::NotAllowed,
            Self::AlreadyBound => ErrorKind::AlreadyBound,
            Self::NotInitialized(_) => ErrorKind::NotInitialized,
            Self::Parse(_) => ErrorKind::ParseError,
            Self::OpenFailure { .. } => ErrorKind::OpenFailure,
            Self::ReadFailure { .. } => ErrorKind::ReadFailure,
            Self::WriteFailure { .. } => ErrorKind::WriteFailure,
            Self::ConnectionFailure(_) => ErrorKind::ConnectionFailure,
            Self::AuthFailure(_) => ErrorKind::AuthFailure,
            Self::ServerFailure(_) => ErrorKind::ServerFailure,
            Self::OutOfSync(_) => ErrorKind::OutOfSync,
            Self::OutstandingReferences { .. } => ErrorKind::OutstandingReferences,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Check if retrying the same call later may succeed
    ///
    /// Server-side failures are recoverable. Everything else is a caller or
    /// data error that will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ConnectionFailure
                | ErrorKind::ServerFailure
                | ErrorKind::OutOfSync
                | ErrorKind::Timeout
                | ErrorKind::Cancelled
        )
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn not_allowed(msg: impl Into<String>) -> Self {
        Self::NotAllowed(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }
}

/// Result type alias
pub type SceneResult<T> = Result<T, SceneError>;
