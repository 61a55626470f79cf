//! Error types for cstable

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CsTableError>;

#[derive(Error, Debug)]
pub enum CsTableError {
    /// Value/size mismatch against a declared type, or a level outside `[0, max]`.
    #[error("Illegal argument: {0}")]
    IllegalArgument(String),

    /// A decode tried to read past the declared length of a stream.
    #[error("Buffer overflow: need {needed} bytes, {remaining} remaining")]
    BufferOverflow { needed: usize, remaining: usize },

    /// Unknown column name or id.
    #[error("Index error: {0}")]
    Index(String),

    /// Protocol misuse (e.g. committing inconsistent columns).
    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CsTableError {
    pub(crate) fn overflow(needed: usize, remaining: usize) -> Self {
        CsTableError::BufferOverflow { needed, remaining }
    }

    /// Stable error code, suitable for logs and callers matching on kinds.
    pub fn code(&self) -> &'static str {
        match self {
            CsTableError::IllegalArgument(_) => "ILLEGAL_ARGUMENT",
            CsTableError::BufferOverflow { .. } => "BUFFER_OVERFLOW",
            CsTableError::Index(_) => "INDEX_ERROR",
            CsTableError::Runtime(_) => "RUNTIME_ERROR",
            CsTableError::InvalidFormat(_) => "INVALID_FORMAT",
            CsTableError::Io(_) => "IO_ERROR",
            CsTableError::Json(_) => "JSON_ERROR",
        }
    }
}
