//! Error types for the storage layer and the application boundary.

use thiserror::Error;

/// Errors raised by a single storage backend.
///
/// These never cross the [`crate::db::Storage`] policy boundary: the policy logs them and
/// degrades to the other backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No connection target is configured, or the connection could not be opened.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors surfaced to callers of admin operations.
#[derive(Debug, Error)]
pub enum AppError {
    /// The request was rejected before anything was touched.
    #[error("{0}")]
    Validation(String),

    /// A local write with no fallback failed (e.g. the memory file).
    #[error("failed to save {what}: {reason}")]
    Persistence { what: &'static str, reason: String },

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
