//! Crate-wide error taxonomy.
//!
//! One closed enum covering every behavioral error kind the core surfaces,
//! rather than a type per component. Lower-level errors (HTTP, JSON, I/O)
//! are folded in via `#[from]` so callers only ever match on this enum.

/// Errors produced by any operation in this crate.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input violates a documented invariant: empty content, bad enum value,
    /// out-of-range timestamp, invalid importance, disallowed update field.
    #[error("validation error: {0}")]
    Validation(String),

    /// Embedding generation failed or was refused.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// The vector store backend is unreachable or returned an error.
    #[error("storage error: {0}")]
    Storage(String),

    /// A search-time failure: invalid filter, connection issue.
    #[error("retrieval error: {0}")]
    Retrieval(String),

    /// `get_by_id` (or an operation that assumes existence) found nothing.
    #[error("memory not found: {0}")]
    MemoryNotFound(String),

    /// A write was attempted against a read-only store.
    #[error("cannot write in read-only mode: {0}. Restart without --read-only (or unset CODEMEM_READ_ONLY) to enable writes.")]
    ReadOnly(String),

    /// A cooperative operation exceeded its deadline.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// Adding a dependency edge would close a cycle in the repository DAG.
    #[error("dependency cycle: adding {from} -> {to} would create a cycle")]
    DependencyCycle {
        /// Source repository of the rejected edge.
        from: String,
        /// Target repository of the rejected edge.
        to: String,
    },

    /// Registering a repository at an already-registered path.
    #[error("repository already registered at path: {0}")]
    DuplicatePath(String),

    /// Wrapped HTTP transport error from the vector-store backend.
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// Wrapped JSON (de)serialization error.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Wrapped filesystem I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
