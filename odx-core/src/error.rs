//! Error types for core operations.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in core operations.
///
/// None of these are ever surfaced to the user. Callers treat a failed
/// storage call as "state unchanged", a failed injection as "page left
/// unaffected", and a failed tab query as "no pages".
#[derive(Debug, Error)]
pub enum CoreError {
    /// The persisted record could not be read or written.
    #[error("storage operation failed: {0}")]
    Storage(String),

    /// A tab/page query failed (window gone, context unavailable).
    #[error("tab query failed: {0}")]
    Tabs(String),

    /// Script or asset injection was refused or failed.
    #[error("injection failed: {0}")]
    Injection(String),

    /// A value on the persisted record could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An I/O error occurred during persistence.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
