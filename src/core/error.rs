use thiserror::Error;

// ---------------------------------------------------------------------------
// Storage errors
// ---------------------------------------------------------------------------

/// Errors originating from an object store backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {path}")]
    NotFound { path: String },

    #[error("PUT failed for path {path}: {reason}")]
    PutFailed { path: String, reason: String },

    #[error("GET failed for path {path}: {reason}")]
    GetFailed { path: String, reason: String },

    #[error("DELETE failed for path {path}: {reason}")]
    DeleteFailed { path: String, reason: String },

    #[error("LIST failed for prefix {prefix}: {reason}")]
    ListFailed { prefix: String, reason: String },

    #[error("retries exhausted for path {path}")]
    RetriesExhausted { path: String },

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}

// ---------------------------------------------------------------------------
// Library errors (naming, versioning, catalog, upload)
// ---------------------------------------------------------------------------

/// Errors surfaced by the subtitle library to its callers.
///
/// Undecodable keys have no variant: they are skipped while scanning and
/// never reach a caller.
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("invalid address: {reason}")]
    InvalidAddress { reason: String },

    #[error("not found: {what}")]
    NotFound { what: String },

    #[error("version allocation under {prefix} kept conflicting after {attempts} attempts")]
    VersionConflict { prefix: String, attempts: u32 },

    #[error("upload too large: {size_bytes} bytes exceeds limit {max_bytes} bytes")]
    PayloadTooLarge { size_bytes: u64, max_bytes: u64 },

    #[error("invalid archive: {reason}")]
    Archive { reason: String },

    #[error(transparent)]
    Store(#[from] StorageError),
}

impl LibraryError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        LibraryError::InvalidAddress {
            reason: reason.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        LibraryError::NotFound { what: what.into() }
    }

    /// Map a LibraryError to its HTTP status code.
    pub fn status_code(&self) -> u16 {
        match self {
            LibraryError::InvalidAddress { .. } => 400,
            LibraryError::NotFound { .. } => 404,
            LibraryError::VersionConflict { .. } => 409,
            LibraryError::PayloadTooLarge { .. } => 413,
            LibraryError::Archive { .. } => 422,
            LibraryError::Store(e) if e.is_not_found() => 404,
            LibraryError::Store(_) => 502,
        }
    }

    /// Return the error code string for JSON responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            LibraryError::InvalidAddress { .. } => "invalid_address",
            LibraryError::NotFound { .. } => "not_found",
            LibraryError::VersionConflict { .. } => "version_conflict",
            LibraryError::PayloadTooLarge { .. } => "payload_too_large",
            LibraryError::Archive { .. } => "invalid_archive",
            LibraryError::Store(e) if e.is_not_found() => "not_found",
            LibraryError::Store(_) => "storage_error",
        }
    }
}
