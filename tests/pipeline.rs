//! End-to-end pipeline tests.
//!
//! Drives the indexing and query orchestrators against a real SQLite
//! store on a temp file, with fake fetcher/embedding/generation
//! collaborators so no network or git remote is involved.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use tempfile::TempDir;

use unrepo::config::{Config, EmbeddingConfig};
use unrepo::embedding::{EmbeddingClient, EmbeddingGateway};
use unrepo::error::Error;
use unrepo::fetch::Fetcher;
use unrepo::generate::Generator;
use unrepo::index::Indexer;
use unrepo::query::{QueryEngine, QueryOutcome};
use unrepo::repo::RepoId;
use unrepo::store::{IndexStore, SqliteStore};

/// Fetcher that materializes a fixed file tree instead of cloning.
struct TreeFetcher {
    files: Vec<(&'static str, &'static str)>,
}

#[async_trait]
impl Fetcher for TreeFetcher {
    async fn fetch(&self, _url: &str, dest: &Path) -> Result<PathBuf, Error> {
        for (relative, content) in &self.files {
            let path = dest.join(relative);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| Error::Fetch(e.to_string()))?;
            }
            std::fs::write(&path, content).map_err(|e| Error::Fetch(e.to_string()))?;
        }
        Ok(dest.to_path_buf())
    }
}

/// Embedder producing deterministic vectors; can fail chosen batches.
struct ScriptedEmbedder {
    fail_batches: Vec<usize>,
    batches_seen: AtomicUsize,
}

impl ScriptedEmbedder {
    fn reliable() -> Self {
        Self {
            fail_batches: Vec::new(),
            batches_seen: AtomicUsize::new(0),
        }
    }

    fn failing(batches: Vec<usize>) -> Self {
        Self {
            fail_batches: batches,
            batches_seen: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EmbeddingClient for ScriptedEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> AnyResult<Vec<Vec<f32>>> {
        let batch = self.batches_seen.fetch_add(1, Ordering::SeqCst);
        if self.fail_batches.contains(&batch) {
            anyhow::bail!("scripted batch failure");
        }
        Ok(texts
            .iter()
            .map(|t| {
                let len = t.chars().count() as f32;
                vec![len, 1.0, 0.5]
            })
            .collect())
    }

    fn model_name(&self) -> &str {
        "scripted"
    }

    fn dims(&self) -> usize {
        3
    }
}

struct CannedGenerator;

#[async_trait]
impl Generator for CannedGenerator {
    async fn generate(&self, _prompt: &str) -> AnyResult<String> {
        Ok("This repository prints greetings.".to_string())
    }
}

struct Pipeline {
    _tmp: TempDir,
    store: Arc<SqliteStore>,
    indexer: Arc<Indexer>,
    engine: Arc<QueryEngine>,
}

async fn pipeline(embedder: ScriptedEmbedder, files: Vec<(&'static str, &'static str)>) -> Pipeline {
    let tmp = TempDir::new().unwrap();
    let config = Arc::new(Config::default());

    let store = Arc::new(SqliteStore::open(&tmp.path().join("index.sqlite")).await.unwrap());
    let embed_config = EmbeddingConfig {
        batch_size: 2,
        max_retries: 0,
        pacing_ms: 0,
        ..EmbeddingConfig::default()
    };
    let gateway = Arc::new(EmbeddingGateway::new(Arc::new(embedder), embed_config));
    let fetcher = Arc::new(TreeFetcher { files });
    let indexer = Arc::new(Indexer::new(
        config.clone(),
        store.clone(),
        gateway.clone(),
        fetcher,
    ));
    let engine = Arc::new(QueryEngine::new(
        config,
        store.clone(),
        gateway,
        indexer.clone(),
        Arc::new(CannedGenerator),
    ));

    Pipeline {
        _tmp: tmp,
        store,
        indexer,
        engine,
    }
}

const REPO_URL: &str = "https://github.com/octo/app";

fn repo() -> RepoId {
    RepoId::parse(REPO_URL).unwrap()
}

#[tokio::test]
async fn indexing_persists_embedded_chunks_with_repo_identity() {
    // Scenario A: one file with two paragraphs.
    let p = pipeline(
        ScriptedEmbedder::reliable(),
        vec![("greet.py", "def hello():\n    print('hi')\n\ndef bye():\n    print('bye')")],
    )
    .await;

    let report = p.indexer.run(&repo(), REPO_URL).await.unwrap();
    assert_eq!(report.files_scanned, 1);
    assert!(report.chunks_persisted >= 1);
    assert_eq!(report.chunks_produced, report.chunks_persisted);

    assert!(p.store.exists_for_repo(&repo()).await.unwrap());
    let hits = p
        .store
        .nearest_neighbors(&repo(), &[10.0, 1.0, 0.5], 10)
        .await
        .unwrap();
    assert!(!hits.is_empty());
    for chunk in &hits {
        assert_eq!(chunk.repo, "octo/app");
        assert!(chunk.filepath.starts_with("octo/app/"));
        assert!(!chunk.embedding.is_empty());
    }
}

#[tokio::test]
async fn excluded_and_unknown_files_are_not_indexed() {
    let p = pipeline(
        ScriptedEmbedder::reliable(),
        vec![
            ("a.py", "print('indexed')"),
            ("b.exe", "not text"),
            ("node_modules/c.py", "print('excluded')"),
        ],
    )
    .await;

    let report = p.indexer.run(&repo(), REPO_URL).await.unwrap();
    assert_eq!(report.files_scanned, 1);

    let hits = p
        .store
        .nearest_neighbors(&repo(), &[1.0, 1.0, 0.5], 10)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].filepath, "octo/app/a.py");
}

#[tokio::test]
async fn failed_batch_drops_its_chunks_but_run_completes() {
    // Six single-chunk files at batch size 2: fail the middle batch.
    let p = pipeline(
        ScriptedEmbedder::failing(vec![1]),
        vec![
            ("a.py", "aaa"),
            ("b.py", "bbb"),
            ("c.py", "ccc"),
            ("d.py", "ddd"),
            ("e.py", "eee"),
            ("f.py", "fff"),
        ],
    )
    .await;

    let report = p.indexer.run(&repo(), REPO_URL).await.unwrap();
    assert_eq!(report.chunks_produced, 6);
    assert_eq!(report.chunks_persisted, 4);

    let hits = p
        .store
        .nearest_neighbors(&repo(), &[3.0, 1.0, 0.5], 10)
        .await
        .unwrap();
    assert_eq!(hits.len(), 4);
}

#[tokio::test]
async fn query_on_unindexed_repo_reports_indexing_then_answers() {
    // Scenario B.
    let p = pipeline(
        ScriptedEmbedder::reliable(),
        vec![("main.py", "print('hello world')")],
    )
    .await;

    let first = p.engine.ask("what does it print?", REPO_URL).await.unwrap();
    assert!(matches!(first, QueryOutcome::Indexing));

    // Poll until the background run has persisted records.
    let mut indexed = false;
    for _ in 0..100 {
        if p.store.exists_for_repo(&repo()).await.unwrap() {
            indexed = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert!(indexed, "background indexing never produced records");

    let second = p.engine.ask("what does it print?", REPO_URL).await.unwrap();
    match second {
        QueryOutcome::Answer { answer, citations } => {
            assert!(!answer.is_empty());
            assert!(!citations.is_empty());
            for citation in &citations {
                assert!(
                    citation.starts_with("octo/app/"),
                    "citation '{}' not repo-scoped",
                    citation
                );
            }
        }
        QueryOutcome::Indexing => panic!("expected an answer after indexing completed"),
    }
}

#[tokio::test]
async fn invalid_inputs_are_rejected_without_side_effects() {
    // Scenario C.
    let p = pipeline(ScriptedEmbedder::reliable(), vec![("a.py", "x = 1")]).await;

    let err = p.engine.ask("", REPO_URL).await.unwrap_err();
    assert!(matches!(err, Error::Input(_)));

    let err = p
        .engine
        .ask(&"why ".repeat(2000), REPO_URL)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Input(_)));

    let err = p
        .engine
        .ask("ok question", "https://github.com/only-owner")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Input(_)));

    // Nothing was fetched, embedded, or persisted.
    assert!(!p.store.exists_for_repo(&repo()).await.unwrap());
}

#[tokio::test]
async fn reindexing_via_clear_replaces_records() {
    let p = pipeline(
        ScriptedEmbedder::reliable(),
        vec![("a.py", "version one of the file")],
    )
    .await;

    p.indexer.run(&repo(), REPO_URL).await.unwrap();
    let first = p
        .store
        .nearest_neighbors(&repo(), &[1.0, 1.0, 0.5], 50)
        .await
        .unwrap()
        .len();

    p.store.clear_repo(&repo()).await.unwrap();
    p.indexer.run(&repo(), REPO_URL).await.unwrap();
    let second = p
        .store
        .nearest_neighbors(&repo(), &[1.0, 1.0, 0.5], 50)
        .await
        .unwrap()
        .len();

    assert_eq!(first, second);
}
