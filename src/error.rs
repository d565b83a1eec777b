//! Error taxonomy for the retrieval core.
//!
//! Only truly unrecoverable failures surface to callers: an embedding
//! provider that cannot produce a query vector, or a record store that
//! cannot be reached. A vector index failure is recovered locally via the
//! relational fallback and never becomes an error here.

/// Failure of a retrieval-core operation.
#[derive(Debug)]
pub enum RagError {
    /// The embedding provider could not be reached or returned malformed
    /// output. Fatal for any operation needing a fresh vector.
    EmbeddingUnavailable(String),
    /// The relational store failed. Fatal; it is the system of record and
    /// has no fallback.
    StoreUnavailable(String),
    /// The caller supplied an empty query, empty workspace id, or an
    /// otherwise unusable argument.
    InvalidInput(String),
}

impl std::fmt::Display for RagError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RagError::EmbeddingUnavailable(e) => {
                write!(f, "embedding provider unavailable: {}", e)
            }
            RagError::StoreUnavailable(e) => write!(f, "record store unavailable: {}", e),
            RagError::InvalidInput(e) => write!(f, "invalid input: {}", e),
        }
    }
}

impl std::error::Error for RagError {}
