//! Error taxonomy for the indexing and query pipeline.
//!
//! Each variant maps to a distinct caller-visible outcome: `Input` and
//! `NotFound` are client errors, `Fetch` and `Embedding` are upstream
//! failures, and `IndexingIncomplete` is a retryable "not ready yet"
//! state rather than a hard error.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed repository URL, empty question, or a question over the
    /// configured length ceilings. Never retried.
    #[error("invalid input: {0}")]
    Input(String),

    /// The repository could not be cloned (unreachable, not found, or
    /// the destination could not be prepared).
    #[error("failed to fetch repository: {0}")]
    Fetch(String),

    /// The embedding provider failed. At batch granularity this is
    /// recovered inside the indexing run; for a single question it is
    /// fatal to that query.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// The answer-generation provider failed.
    #[error("generation failed: {0}")]
    Generation(String),

    /// Retrieval returned no chunks for an indexed repository.
    #[error("no relevant chunks found for {0}")]
    NotFound(String),

    /// The repository was processed but no records are visible yet
    /// (empty repository, all batches dropped, or store lag). Callers
    /// should poll rather than treat this as a failure.
    #[error("repository {0} is still being indexed")]
    IndexingIncomplete(String),

    /// Index store failure (connection, SQL, corrupt vector blob).
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
