//! Error types for xidb core.

use thiserror::Error;

/// Result type for core operations.
pub type XdbResult<T> = Result<T, XdbError>;

/// The category an [`XdbError`] belongs to.
///
/// Callers branch on the kind, never on message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or missing required input.
    InvalidArgument,
    /// The lookup or update target does not exist, or is soft-deleted.
    NotFound,
    /// A non-idempotent create collided with an existing unique key.
    AlreadyExists,
    /// A concurrent-modification race was detected by the backend.
    Conflict,
    /// The caller's deadline or the default timeout elapsed, or the caller
    /// cancelled.
    DeadlineExceeded,
    /// The backend refused the operation.
    PermissionDenied,
    /// Backend or driver failure not classifiable above.
    Internal,
    /// The configured backend lacks the requested capability.
    NotImplemented,
}

/// Errors produced by the record store, the query engine, and the backends.
#[derive(Debug, Error)]
pub enum XdbError {
    /// Malformed or missing required input.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// What was wrong with the input.
        message: String,
    },

    /// No live record exists at `(xid, path)`.
    #[error("record not found: xid {xid} at path {path}")]
    NotFound {
        /// The identifier looked up.
        xid: String,
        /// The path looked up.
        path: String,
    },

    /// A unique key is already taken.
    #[error("already exists: {message}")]
    AlreadyExists {
        /// Which key collided.
        message: String,
    },

    /// A concurrent modification was detected.
    #[error("conflict: {message}")]
    Conflict {
        /// Description of the race.
        message: String,
    },

    /// Another process holds the store directory.
    #[error("store locked: another process has exclusive access")]
    StoreLocked,

    /// The deadline elapsed before the backend finished.
    #[error("deadline exceeded during {operation}")]
    DeadlineExceeded {
        /// The store operation that timed out.
        operation: &'static str,
    },

    /// The caller cancelled the operation.
    #[error("{operation} cancelled by caller")]
    Cancelled {
        /// The store operation that was cancelled.
        operation: &'static str,
    },

    /// The backend refused the operation.
    #[error("permission denied: {message}")]
    PermissionDenied {
        /// Why access was refused.
        message: String,
    },

    /// Byte-store failure.
    #[error("storage error: {0}")]
    Storage(#[from] xidb_storage::StorageError),

    /// A record or cursor could not be encoded or decoded.
    #[error("codec error: {message}")]
    Codec {
        /// Description of the failure.
        message: String,
    },

    /// The record log is structurally damaged.
    #[error("log corruption: {message}")]
    Corruption {
        /// Description of the damage.
        message: String,
    },

    /// A log frame failed its checksum.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Checksum stored in the frame.
        expected: u32,
        /// Checksum computed over the frame.
        actual: u32,
    },

    /// Unclassified backend failure.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the failure.
        message: String,
    },

    /// The backend does not support the requested capability.
    #[error("not implemented: {capability}")]
    NotImplemented {
        /// The missing capability.
        capability: &'static str,
    },
}

impl XdbError {
    /// Returns the category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::Conflict { .. } | Self::StoreLocked => ErrorKind::Conflict,
            Self::DeadlineExceeded { .. } | Self::Cancelled { .. } => ErrorKind::DeadlineExceeded,
            Self::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Self::Storage(_)
            | Self::Codec { .. }
            | Self::Corruption { .. }
            | Self::ChecksumMismatch { .. }
            | Self::Internal { .. } => ErrorKind::Internal,
            Self::NotImplemented { .. } => ErrorKind::NotImplemented,
        }
    }

    /// Returns true if the caller can fix the request and try again.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::InvalidArgument | ErrorKind::NotFound | ErrorKind::AlreadyExists
        )
    }

    /// Returns true if the same request may succeed when retried later.
    ///
    /// The store itself never retries.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::DeadlineExceeded | ErrorKind::Conflict | ErrorKind::Internal
        )
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a not found error for `(xid, path)`.
    pub fn not_found(xid: impl Into<String>, path: impl Into<String>) -> Self {
        Self::NotFound {
            xid: xid.into(),
            path: path.into(),
        }
    }

    /// Creates an already exists error.
    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::AlreadyExists {
            message: message.into(),
        }
    }

    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Creates a log corruption error.
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::Corruption {
            message: message.into(),
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}
