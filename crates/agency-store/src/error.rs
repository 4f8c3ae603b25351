//! Error types for the agency store.

/// Errors returned by [`Store`](crate::Store) wire-level operations.
///
/// A transaction whose preconditions fail is not an error; it is reported
/// through [`ApplyResult`](crate::ApplyResult).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A query or transaction did not have the expected shape.
    #[error("malformed request: {0}")]
    Malformed(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        StoreError::Malformed(message.into())
    }
}
