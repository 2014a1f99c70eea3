//! Indexing orchestration.
//!
//! One indexing run drives Fetch → Scan → Chunk → Embed → Persist for a
//! single repository identity. The run's working tree is an ephemeral
//! workspace deleted on every exit path; batches the embedding provider
//! rejects are dropped without failing the run; only chunks that
//! received an embedding are persisted.
//!
//! The [`Indexer`] also holds the per-identity claim set: at most one
//! live run per repository per process, so concurrent lazy triggers
//! cannot duplicate records.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::chunk::chunk_file;
use crate::config::Config;
use crate::embedding::EmbeddingGateway;
use crate::error::Error;
use crate::fetch::{Fetcher, Workspace};
use crate::models::{ChunkRecord, IndexedChunk};
use crate::repo::RepoId;
use crate::scan;
use crate::store::IndexStore;

/// Phase of an indexing run. Any phase may transition to `Failed`;
/// `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    NotStarted,
    Fetching,
    Scanning,
    Chunking,
    Embedding,
    Persisting,
    Done,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::NotStarted => "not-started",
            Phase::Fetching => "fetching",
            Phase::Scanning => "scanning",
            Phase::Chunking => "chunking",
            Phase::Embedding => "embedding",
            Phase::Persisting => "persisting",
            Phase::Done => "done",
            Phase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Counters reported by a completed run. Run state is transient: status
/// after completion is re-derived from the store, never from this.
#[derive(Debug, Clone, Default)]
pub struct IndexReport {
    pub files_scanned: u64,
    pub chunks_produced: u64,
    pub chunks_persisted: u64,
}

struct IndexingRun {
    repo: RepoId,
    phase: Phase,
    report: IndexReport,
}

impl IndexingRun {
    fn new(repo: RepoId) -> Self {
        Self {
            repo,
            phase: Phase::NotStarted,
            report: IndexReport::default(),
        }
    }

    fn enter(&mut self, phase: Phase) {
        self.phase = phase;
        tracing::info!(repo = %self.repo, phase = %phase, "indexing phase");
    }
}

/// Coordinates indexing runs and enforces one live run per repository
/// identity within this process.
pub struct Indexer {
    config: Arc<Config>,
    store: Arc<dyn IndexStore>,
    gateway: Arc<EmbeddingGateway>,
    fetcher: Arc<dyn Fetcher>,
    // Guarded map operations only; the lock is never held across await.
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl Indexer {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn IndexStore>,
        gateway: Arc<EmbeddingGateway>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            config,
            store,
            gateway,
            fetcher,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Whether a run for this identity is currently live in this process.
    pub fn is_running(&self, repo: &RepoId) -> bool {
        self.in_flight.lock().unwrap().contains(&repo.key())
    }

    /// Run the full pipeline synchronously. Returns an error if another
    /// run for the same identity is already live.
    pub async fn run(&self, repo: &RepoId, url: &str) -> Result<IndexReport, Error> {
        let _claim = self.claim(repo)?;
        self.run_pipeline(repo, url).await
    }

    /// Trigger a background run unless one for this identity is
    /// already live. Returns immediately; callers poll the store for
    /// completion. The claim is taken here, before spawning, so two
    /// concurrent triggers cannot both start a run.
    pub fn spawn(self: &Arc<Self>, repo: RepoId, url: String) {
        let claim = match self.claim(&repo) {
            Ok(claim) => claim,
            Err(_) => {
                tracing::debug!(repo = %repo, "indexing already in flight");
                return;
            }
        };

        let indexer = Arc::clone(self);
        tokio::spawn(async move {
            let _claim = claim;
            match indexer.run_pipeline(&repo, &url).await {
                Ok(report) => {
                    tracing::info!(
                        repo = %repo,
                        persisted = report.chunks_persisted,
                        "background indexing finished"
                    );
                }
                Err(e) => {
                    tracing::error!(repo = %repo, error = %e, "background indexing failed");
                }
            }
        });
    }

    fn claim(&self, repo: &RepoId) -> Result<Claim, Error> {
        let mut in_flight = self.in_flight.lock().unwrap();
        if !in_flight.insert(repo.key()) {
            return Err(Error::IndexingIncomplete(repo.key()));
        }
        Ok(Claim {
            in_flight: Arc::clone(&self.in_flight),
            key: repo.key(),
        })
    }

    async fn run_pipeline(&self, repo: &RepoId, url: &str) -> Result<IndexReport, Error> {
        let mut run = IndexingRun::new(repo.clone());

        let result = self.drive(&mut run, url).await;
        match &result {
            Ok(report) => {
                tracing::info!(
                    repo = %repo,
                    files = report.files_scanned,
                    chunks = report.chunks_produced,
                    persisted = report.chunks_persisted,
                    "indexing complete"
                );
            }
            Err(e) => {
                run.enter(Phase::Failed);
                tracing::error!(repo = %repo, error = %e, "indexing failed");
            }
        }
        result
    }

    async fn drive(&self, run: &mut IndexingRun, url: &str) -> Result<IndexReport, Error> {
        // The workspace outlives every phase below and is deleted on
        // drop, whichever exit path is taken.
        run.enter(Phase::Fetching);
        let workspace = Workspace::create()?;
        let tree = self.fetcher.fetch(url, &workspace.clone_dest()).await?;

        run.enter(Phase::Scanning);
        let paths = scan::scan_tree(&tree);
        let files: Vec<_> = paths
            .iter()
            .filter_map(|path| scan::read_source_file(&tree, path))
            .collect();
        run.report.files_scanned = files.len() as u64;

        run.enter(Phase::Chunking);
        let mut records: Vec<ChunkRecord> = Vec::new();
        for file in &files {
            records.extend(chunk_file(&run.repo, file, &self.config.chunking));
        }
        run.report.chunks_produced = records.len() as u64;

        if let Some(spool_path) = &self.config.indexing.spool_path {
            if let Err(e) = crate::jsonl::write_records(spool_path, &records) {
                tracing::warn!(error = %e, "could not write chunk spool");
            }
        }

        run.enter(Phase::Embedding);
        let texts: Vec<String> = records.iter().map(|r| r.content.clone()).collect();
        let embeddings = self.gateway.embed_chunks(&texts).await;

        run.enter(Phase::Persisting);
        let indexed: Vec<IndexedChunk> = records
            .into_iter()
            .zip(embeddings)
            .filter_map(|(record, embedding)| {
                embedding.map(|embedding| IndexedChunk {
                    id: Uuid::new_v4().to_string(),
                    repo: record.repo,
                    filepath: record.filepath,
                    language: record.language,
                    chunk_index: record.chunk_id,
                    content: record.content,
                    embedding,
                })
            })
            .collect();

        if !indexed.is_empty() {
            run.report.chunks_persisted = self.store.upsert_chunks(&indexed).await?;
        }

        run.enter(Phase::Done);
        Ok(run.report.clone())
    }
}

/// Releases the in-flight claim for a repository identity when dropped,
/// so the claim cannot leak on any exit path of the run.
struct Claim {
    in_flight: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl Drop for Claim {
    fn drop(&mut self) {
        self.in_flight.lock().unwrap().remove(&self.key);
    }
}
