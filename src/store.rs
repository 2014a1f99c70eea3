//! Index store boundary and the SQLite implementation.
//!
//! The [`IndexStore`] trait is the persistence and retrieval capability
//! the orchestrators depend on: upsert chunk records keyed by repository
//! identity, report whether a repository has any records, and answer
//! repository-scoped nearest-neighbor queries. It is injected as an
//! explicit dependency so tests can substitute a fake.
//!
//! [`SqliteStore`] persists embeddings as little-endian `f32` BLOBs and
//! ranks a repository's vectors by cosine similarity — ranking lives
//! inside the store, not in the orchestrators.

use std::path::Path;
use std::str::FromStr;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::models::IndexedChunk;
use crate::repo::RepoId;

/// Persistence and retrieval capability for indexed chunks.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Persist chunk records. No uniqueness is enforced beyond what the
    /// orchestrator guarantees.
    async fn upsert_chunks(&self, chunks: &[IndexedChunk]) -> Result<u64>;

    /// True iff at least one record exists for the repository.
    async fn exists_for_repo(&self, repo: &RepoId) -> Result<bool>;

    /// Up to `k` records for the repository, ranked by similarity to
    /// the query vector.
    async fn nearest_neighbors(
        &self,
        repo: &RepoId,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<IndexedChunk>>;

    /// Delete every record for the repository. Returns the count removed.
    async fn clear_repo(&self, repo: &RepoId) -> Result<u64>;
}

/// SQLite-backed store (WAL journal mode).
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `path` and run
    /// migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        crate::migrate::run_migrations(&pool).await?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl IndexStore for SqliteStore {
    async fn upsert_chunks(&self, chunks: &[IndexedChunk]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let now = chrono::Utc::now().timestamp();

        for chunk in chunks {
            let blob = vec_to_blob(&chunk.embedding);
            sqlx::query(
                r#"
                INSERT INTO chunks (id, repo, filepath, language, chunk_index, content, embedding, dims, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    repo = excluded.repo,
                    filepath = excluded.filepath,
                    language = excluded.language,
                    chunk_index = excluded.chunk_index,
                    content = excluded.content,
                    embedding = excluded.embedding,
                    dims = excluded.dims,
                    created_at = excluded.created_at
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.repo)
            .bind(&chunk.filepath)
            .bind(&chunk.language)
            .bind(chunk.chunk_index)
            .bind(&chunk.content)
            .bind(&blob)
            .bind(chunk.embedding.len() as i64)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(chunks.len() as u64)
    }

    async fn exists_for_repo(&self, repo: &RepoId) -> Result<bool> {
        let exists: i64 = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM chunks WHERE repo = ?)")
            .bind(repo.key())
            .fetch_one(&self.pool)
            .await?;
        Ok(exists != 0)
    }

    async fn nearest_neighbors(
        &self,
        repo: &RepoId,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<IndexedChunk>> {
        let rows = sqlx::query(
            "SELECT id, repo, filepath, language, chunk_index, content, embedding FROM chunks WHERE repo = ?",
        )
        .bind(repo.key())
        .fetch_all(&self.pool)
        .await?;

        let mut scored: Vec<(f32, IndexedChunk)> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let embedding = blob_to_vec(&blob);
                let score = cosine_similarity(query, &embedding);
                (
                    score,
                    IndexedChunk {
                        id: row.get("id"),
                        repo: row.get("repo"),
                        filepath: row.get("filepath"),
                        language: row.get("language"),
                        chunk_index: row.get("chunk_index"),
                        content: row.get("content"),
                        embedding,
                    },
                )
            })
            .collect();

        // Score desc, then id asc so ties are deterministic.
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.id.cmp(&b.1.id))
        });
        scored.truncate(k);

        Ok(scored.into_iter().map(|(_, chunk)| chunk).collect())
    }

    async fn clear_repo(&self, repo: &RepoId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM chunks WHERE repo = ?")
            .bind(repo.key())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// In-memory [`IndexStore`] for tests. Vector search is brute-force
/// cosine similarity over all stored vectors, like the SQLite backend.
#[derive(Default)]
pub struct MemoryStore {
    chunks: std::sync::RwLock<Vec<IndexedChunk>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IndexStore for MemoryStore {
    async fn upsert_chunks(&self, chunks: &[IndexedChunk]) -> Result<u64> {
        let mut stored = self.chunks.write().unwrap();
        for chunk in chunks {
            stored.retain(|c| c.id != chunk.id);
            stored.push(chunk.clone());
        }
        Ok(chunks.len() as u64)
    }

    async fn exists_for_repo(&self, repo: &RepoId) -> Result<bool> {
        let key = repo.key();
        Ok(self.chunks.read().unwrap().iter().any(|c| c.repo == key))
    }

    async fn nearest_neighbors(
        &self,
        repo: &RepoId,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<IndexedChunk>> {
        let key = repo.key();
        let stored = self.chunks.read().unwrap();
        let mut scored: Vec<(f32, IndexedChunk)> = stored
            .iter()
            .filter(|c| c.repo == key)
            .map(|c| (cosine_similarity(query, &c.embedding), c.clone()))
            .collect();
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.id.cmp(&b.1.id))
        });
        scored.truncate(k);
        Ok(scored.into_iter().map(|(_, c)| c).collect())
    }

    async fn clear_repo(&self, repo: &RepoId) -> Result<u64> {
        let key = repo.key();
        let mut stored = self.chunks.write().unwrap();
        let before = stored.len();
        stored.retain(|c| c.repo != key);
        Ok((before - stored.len()) as u64)
    }
}
