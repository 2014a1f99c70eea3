//! # unrepo CLI
//!
//! ```bash
//! unrepo --config ./unrepo.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `unrepo init` | Create the SQLite database and schema |
//! | `unrepo index <repo-url>` | Index a repository end to end |
//! | `unrepo query <repo-url> "<question>"` | Ask a question (indexes first if needed) |
//! | `unrepo status <repo-url>` | Show whether a repository is indexed |
//! | `unrepo load <chunks.jsonl>` | Embed and persist spooled chunk records |
//! | `unrepo clear <repo-url>` | Delete a repository's records |
//! | `unrepo serve` | Start the HTTP API |

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use unrepo::config::{self, Config};
use unrepo::embedding::{EmbeddingGateway, GeminiEmbedder};
use unrepo::fetch::GitFetcher;
use unrepo::generate::GeminiGenerator;
use unrepo::index::Indexer;
use unrepo::query::{QueryEngine, QueryOutcome};
use unrepo::repo::RepoId;
use unrepo::store::{IndexStore, SqliteStore};
use unrepo::{jsonl, server};

/// unrepo — ask natural-language questions about any public GitHub
/// repository.
#[derive(Parser)]
#[command(
    name = "unrepo",
    about = "Ask natural-language questions about any public GitHub repository",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Missing file means defaults.
    #[arg(long, global = true, default_value = "./unrepo.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the chunks table. Idempotent.
    Init,

    /// Clone, scan, chunk, embed, and persist one repository.
    Index {
        /// Repository URL: https://github.com/owner/repo
        repo_url: String,
    },

    /// Ask a question about a repository, indexing it first if needed.
    Query {
        /// Repository URL: https://github.com/owner/repo
        repo_url: String,
        /// The question to answer.
        question: String,
    },

    /// Show whether a repository has indexed records.
    Status {
        /// Repository URL: https://github.com/owner/repo
        repo_url: String,
    },

    /// Embed and persist chunk records from a JSONL spool file.
    Load {
        /// Path to a line-delimited JSON file of chunk records.
        path: PathBuf,
    },

    /// Delete every indexed record for a repository.
    Clear {
        /// Repository URL: https://github.com/owner/repo
        repo_url: String,
    },

    /// Start the HTTP API.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("unrepo=info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            SqliteStore::open(&cfg.store.path).await?;
            println!("Database initialized at {}", cfg.store.path.display());
        }
        Commands::Index { repo_url } => {
            let repo = RepoId::parse(&repo_url)?;
            let app = App::build(cfg).await?;

            if app.store.exists_for_repo(&repo).await? {
                let removed = app.store.clear_repo(&repo).await?;
                println!("cleared {} stale records for {}", removed, repo);
            }

            let report = app.indexer.run(&repo, &repo_url).await?;
            println!("index {}", repo);
            println!("  files scanned: {}", report.files_scanned);
            println!("  chunks produced: {}", report.chunks_produced);
            println!("  chunks persisted: {}", report.chunks_persisted);
            println!("ok");
        }
        Commands::Query { repo_url, question } => {
            let repo = RepoId::parse(&repo_url)?;
            let app = App::build(cfg).await?;

            if !app.store.exists_for_repo(&repo).await? {
                println!("{} is not indexed yet; indexing now...", repo);
                let report = app.indexer.run(&repo, &repo_url).await?;
                if report.chunks_persisted == 0 {
                    return Err(unrepo::error::Error::IndexingIncomplete(repo.key()).into());
                }
            }

            match app.engine.ask(&question, &repo_url).await? {
                QueryOutcome::Answer { answer, citations } => {
                    println!("{}", answer);
                    println!();
                    println!("citations:");
                    for citation in citations {
                        println!("  {}", citation);
                    }
                }
                QueryOutcome::Indexing => {
                    println!("{} is still being indexed; retry shortly", repo);
                }
            }
        }
        Commands::Status { repo_url } => {
            let repo = RepoId::parse(&repo_url)?;
            let store = SqliteStore::open(&cfg.store.path).await?;
            let status = if store.exists_for_repo(&repo).await? {
                "indexed"
            } else {
                "indexing"
            };
            println!("{}: {}", repo, status);
        }
        Commands::Load { path } => {
            let app = App::build(cfg).await?;
            let records = jsonl::read_records(&path)?;
            println!("load {}", path.display());
            println!("  records read: {}", records.len());

            let texts: Vec<String> = records.iter().map(|r| r.content.clone()).collect();
            let embeddings = app.gateway.embed_chunks(&texts).await;

            let indexed: Vec<unrepo::models::IndexedChunk> = records
                .into_iter()
                .zip(embeddings)
                .filter_map(|(record, embedding)| {
                    embedding.map(|embedding| unrepo::models::IndexedChunk {
                        id: uuid::Uuid::new_v4().to_string(),
                        repo: record.repo,
                        filepath: record.filepath,
                        language: record.language,
                        chunk_index: record.chunk_id,
                        content: record.content,
                        embedding,
                    })
                })
                .collect();

            let persisted = app.store.upsert_chunks(&indexed).await?;
            println!("  chunks persisted: {}", persisted);
            println!("ok");
        }
        Commands::Clear { repo_url } => {
            let repo = RepoId::parse(&repo_url)?;
            let store = SqliteStore::open(&cfg.store.path).await?;
            let removed = store.clear_repo(&repo).await?;
            println!("cleared {} records for {}", removed, repo);
        }
        Commands::Serve => {
            let bind = cfg.server.bind.clone();
            let app = App::build(cfg).await?;
            server::run_server(&bind, app.engine).await?;
        }
    }

    Ok(())
}

/// Wired-up application: the store, gateway, indexer, and query engine
/// share one configuration and one set of provider clients.
struct App {
    store: Arc<dyn IndexStore>,
    gateway: Arc<EmbeddingGateway>,
    indexer: Arc<Indexer>,
    engine: Arc<QueryEngine>,
}

impl App {
    async fn build(cfg: Config) -> anyhow::Result<Self> {
        let cfg = Arc::new(cfg);
        let store: Arc<dyn IndexStore> = Arc::new(SqliteStore::open(&cfg.store.path).await?);
        let embedder = Arc::new(GeminiEmbedder::new(&cfg.embedding)?);
        let gateway = Arc::new(EmbeddingGateway::new(embedder, cfg.embedding.clone()));
        let fetcher = Arc::new(GitFetcher);
        let indexer = Arc::new(Indexer::new(
            cfg.clone(),
            store.clone(),
            gateway.clone(),
            fetcher,
        ));
        let generator = Arc::new(GeminiGenerator::new(&cfg.generation)?);
        let engine = Arc::new(QueryEngine::new(
            cfg.clone(),
            store.clone(),
            gateway.clone(),
            indexer.clone(),
            generator,
        ));

        Ok(Self {
            store,
            gateway,
            indexer,
            engine,
        })
    }
}
