//! Core data models flowing through the indexing and retrieval pipeline.

use serde::{Deserialize, Serialize};

/// A classified source file read from the working tree.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Path relative to the working-tree root.
    pub relative_path: String,
    /// Language tag derived from the file extension (`py`, `rs`, ...).
    pub language: String,
    /// Best-effort decoded text content.
    pub content: String,
}

/// A bounded text segment derived from one source file.
///
/// This is also the line-delimited JSON spool format: one record per
/// line with exactly these fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub content: String,
    /// Display path: `{owner}/{name}/{relative path}`.
    pub filepath: String,
    /// Owning repository key: `{owner}/{name}`.
    pub repo: String,
    pub language: String,
    /// Zero-based sequence index among chunks of the same file.
    pub chunk_id: i64,
}

/// A chunk plus its embedding vector, as persisted in the index store.
#[derive(Debug, Clone)]
pub struct IndexedChunk {
    /// Store-assigned record id.
    pub id: String,
    pub repo: String,
    pub filepath: String,
    pub language: String,
    pub chunk_index: i64,
    pub content: String,
    pub embedding: Vec<f32>,
}
