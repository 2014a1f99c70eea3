//! Query orchestration.
//!
//! [`QueryEngine::ask`] is the full question-answering path: input
//! validation, lazy indexing trigger, question embedding, repo-scoped
//! retrieval, context assembly, and generation. Validation happens
//! before any network call, and a question over the length ceilings is
//! rejected rather than truncated — truncating a question would change
//! its meaning, unlike truncating a stored chunk.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::config::Config;
use crate::embedding::{estimate_tokens, EmbeddingGateway};
use crate::error::Error;
use crate::generate::{build_prompt, Generator};
use crate::index::Indexer;
use crate::repo::RepoId;
use crate::store::IndexStore;

/// Result of a query: an answer with citations, or a signal that the
/// repository is still being indexed and the caller should retry.
#[derive(Debug)]
pub enum QueryOutcome {
    Answer {
        answer: String,
        /// Sorted, de-duplicated display paths of the chunks that
        /// contributed context.
        citations: Vec<String>,
    },
    Indexing,
}

pub struct QueryEngine {
    config: Arc<Config>,
    store: Arc<dyn IndexStore>,
    gateway: Arc<EmbeddingGateway>,
    indexer: Arc<Indexer>,
    generator: Arc<dyn Generator>,
}

impl QueryEngine {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn IndexStore>,
        gateway: Arc<EmbeddingGateway>,
        indexer: Arc<Indexer>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        Self {
            config,
            store,
            gateway,
            indexer,
            generator,
        }
    }

    /// Answer a question about a repository, triggering a background
    /// indexing run first if the repository has no records yet.
    pub async fn ask(&self, question: &str, repo_url: &str) -> Result<QueryOutcome, Error> {
        let repo = self.validate(question, repo_url)?;

        if !self.store.exists_for_repo(&repo).await? {
            self.indexer.spawn(repo.clone(), repo_url.trim().to_string());
            return Ok(QueryOutcome::Indexing);
        }

        let query_vec = self.gateway.embed_query(question).await?;

        let hits = self
            .store
            .nearest_neighbors(&repo, &query_vec, self.config.query.top_k)
            .await?;
        if hits.is_empty() {
            return Err(Error::NotFound(repo.key()));
        }

        let context = hits
            .iter()
            .map(|chunk| format!("{} (from {})", chunk.content, chunk.filepath))
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = build_prompt(&context, question);
        let answer = self
            .generator
            .generate(&prompt)
            .await
            .map_err(|e| Error::Generation(e.to_string()))?;

        let citations: BTreeSet<String> = hits.into_iter().map(|c| c.filepath).collect();

        Ok(QueryOutcome::Answer {
            answer,
            citations: citations.into_iter().collect(),
        })
    }

    /// Whether the repository is fully indexed (has visible records).
    pub async fn is_indexed(&self, repo: &RepoId) -> Result<bool, Error> {
        Ok(self.store.exists_for_repo(repo).await?)
    }

    fn validate(&self, question: &str, repo_url: &str) -> Result<RepoId, Error> {
        if question.trim().is_empty() {
            return Err(Error::Input("question cannot be empty".to_string()));
        }
        if repo_url.trim().is_empty() {
            return Err(Error::Input("repo URL cannot be empty".to_string()));
        }

        let repo = RepoId::parse(repo_url)?;

        let limits = &self.config.query;
        let chars = question.chars().count();
        if chars > limits.max_question_chars {
            return Err(Error::Input(format!(
                "question is {} characters; the limit is {}",
                chars, limits.max_question_chars
            )));
        }
        let tokens = estimate_tokens(question);
        if tokens > limits.max_question_tokens {
            return Err(Error::Input(format!(
                "question is ~{} tokens; the limit is {}",
                tokens, limits.max_question_tokens
            )));
        }

        Ok(repo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingConfig;
    use crate::embedding::EmbeddingClient;
    use crate::fetch::Fetcher;
    use crate::models::IndexedChunk;
    use crate::store::MemoryStore;
    use anyhow::Result as AnyResult;
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingClient for CountingEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> AnyResult<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
        fn model_name(&self) -> &str {
            "fake"
        }
        fn dims(&self) -> usize {
            2
        }
    }

    struct EchoGenerator;

    #[async_trait]
    impl Generator for EchoGenerator {
        async fn generate(&self, prompt: &str) -> AnyResult<String> {
            Ok(format!("answer based on {} chars", prompt.len()))
        }
    }

    /// Fetcher that writes a tiny tree; counts invocations.
    struct CountingFetcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Fetcher for CountingFetcher {
        async fn fetch(&self, _url: &str, dest: &Path) -> Result<PathBuf, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::fs::create_dir_all(dest).unwrap();
            std::fs::write(dest.join("main.py"), "print('hello')\n\nprint('bye')").unwrap();
            Ok(dest.to_path_buf())
        }
    }

    struct Harness {
        engine: QueryEngine,
        store: Arc<MemoryStore>,
        embedder: Arc<CountingEmbedder>,
        fetcher: Arc<CountingFetcher>,
    }

    fn harness() -> Harness {
        let config = Arc::new(Config::default());
        let store = Arc::new(MemoryStore::new());
        let embedder = Arc::new(CountingEmbedder {
            calls: AtomicUsize::new(0),
        });
        let embed_config = EmbeddingConfig {
            pacing_ms: 0,
            max_retries: 0,
            ..EmbeddingConfig::default()
        };
        let gateway = Arc::new(EmbeddingGateway::new(embedder.clone(), embed_config));
        let fetcher = Arc::new(CountingFetcher {
            calls: AtomicUsize::new(0),
        });
        let indexer = Arc::new(Indexer::new(
            config.clone(),
            store.clone(),
            gateway.clone(),
            fetcher.clone(),
        ));
        let engine = QueryEngine::new(
            config,
            store.clone(),
            gateway,
            indexer,
            Arc::new(EchoGenerator),
        );
        Harness {
            engine,
            store,
            embedder,
            fetcher,
        }
    }

    fn seeded_chunk(id: &str, filepath: &str) -> IndexedChunk {
        IndexedChunk {
            id: id.to_string(),
            repo: "octo/app".to_string(),
            filepath: filepath.to_string(),
            language: "py".to_string(),
            chunk_index: 0,
            content: "def handler(): pass".to_string(),
            embedding: vec![1.0, 0.0],
        }
    }

    #[tokio::test]
    async fn test_empty_question_rejected_before_any_call() {
        let h = harness();
        let err = h
            .engine
            .ask("   ", "https://github.com/octo/app")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Input(_)));
        assert_eq!(h.embedder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_over_length_question_rejected_before_any_call() {
        let h = harness();
        let long = "why ".repeat(2000);
        let err = h
            .engine
            .ask(&long, "https://github.com/octo/app")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Input(_)));
        assert_eq!(h.embedder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_malformed_url_rejected() {
        let h = harness();
        let err = h
            .engine
            .ask("what does this do?", "https://example.com/octo/app")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Input(_)));
    }

    #[tokio::test]
    async fn test_unindexed_repo_reports_indexing() {
        let h = harness();
        let outcome = h
            .engine
            .ask("what does this do?", "https://github.com/octo/app")
            .await
            .unwrap();
        assert!(matches!(outcome, QueryOutcome::Indexing));
    }

    #[tokio::test]
    async fn test_indexed_repo_answers_with_sorted_deduped_citations() {
        let h = harness();
        h.store
            .upsert_chunks(&[
                seeded_chunk("c1", "octo/app/src/b.py"),
                seeded_chunk("c2", "octo/app/src/a.py"),
                seeded_chunk("c3", "octo/app/src/a.py"),
            ])
            .await
            .unwrap();

        let outcome = h
            .engine
            .ask("what does this do?", "https://github.com/octo/app")
            .await
            .unwrap();

        match outcome {
            QueryOutcome::Answer { answer, citations } => {
                assert!(!answer.is_empty());
                assert_eq!(citations, vec!["octo/app/src/a.py", "octo/app/src/b.py"]);
            }
            QueryOutcome::Indexing => panic!("expected an answer"),
        }
    }
}
