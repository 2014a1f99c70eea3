//! HTTP API.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/query` | Ask a question about a repository |
//! | `GET`  | `/repos/{owner}/{name}/status` | Indexing status |
//! | `GET`  | `/ping` | Liveness check |
//!
//! `POST /query` returns `200` with an answer and citations, or `202`
//! with `{"status": "indexing"}` while the repository is being ingested
//! — callers poll until records are visible.
//!
//! # Error Contract
//!
//! All error responses share one envelope:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question cannot be empty" } }
//! ```
//!
//! Codes: `bad_request` (400), `not_found` (404), `fetch_failed` (502),
//! `embedding_failed` (502), `generation_failed` (502), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted: the API backs a
//! browser frontend served from a different origin.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::error::Error;
use crate::query::{QueryEngine, QueryOutcome};
use crate::repo::RepoId;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    engine: Arc<QueryEngine>,
}

/// Start the HTTP server on `bind` and serve until the process exits.
pub async fn run_server(bind: &str, engine: Arc<QueryEngine>) -> anyhow::Result<()> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/query", post(handle_query))
        .route("/repos/{owner}/{name}/status", get(handle_status))
        .route("/ping", get(handle_ping))
        .layer(cors)
        .with_state(AppState { engine });

    tracing::info!(bind, "HTTP server listening");

    let listener = tokio::net::TcpListener::bind(bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn classify_error(err: Error) -> AppError {
    let message = err.to_string();
    let (status, code) = match err {
        Error::Input(_) => (StatusCode::BAD_REQUEST, "bad_request"),
        Error::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        Error::Fetch(_) => (StatusCode::BAD_GATEWAY, "fetch_failed"),
        Error::Embedding(_) => (StatusCode::BAD_GATEWAY, "embedding_failed"),
        Error::Generation(_) => (StatusCode::BAD_GATEWAY, "generation_failed"),
        // IndexingIncomplete is handled before this point; treat a
        // stray one as retryable anyway.
        Error::IndexingIncomplete(_) => (StatusCode::ACCEPTED, "indexing"),
        Error::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    };
    AppError {
        status,
        code,
        message,
    }
}

// ============ POST /query ============

#[derive(Deserialize)]
struct QueryRequest {
    question: String,
    repo_url: String,
}

#[derive(Serialize)]
struct QueryResponse {
    answer: String,
    citations: Vec<String>,
}

#[derive(Serialize)]
struct IndexingResponse {
    status: &'static str,
}

async fn handle_query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Response, AppError> {
    match state.engine.ask(&request.question, &request.repo_url).await {
        Ok(QueryOutcome::Answer { answer, citations }) => {
            Ok(Json(QueryResponse { answer, citations }).into_response())
        }
        Ok(QueryOutcome::Indexing) | Err(Error::IndexingIncomplete(_)) => Ok((
            StatusCode::ACCEPTED,
            Json(IndexingResponse { status: "indexing" }),
        )
            .into_response()),
        Err(e) => Err(classify_error(e)),
    }
}

// ============ GET /repos/{owner}/{name}/status ============

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
}

async fn handle_status(
    State(state): State<AppState>,
    Path((owner, name)): Path<(String, String)>,
) -> Result<Json<StatusResponse>, AppError> {
    let repo = RepoId::parse(&format!("https://github.com/{}/{}", owner, name))
        .map_err(classify_error)?;

    let indexed = state.engine.is_indexed(&repo).await.map_err(classify_error)?;

    Ok(Json(StatusResponse {
        status: if indexed { "indexed" } else { "indexing" },
    }))
}

// ============ GET /ping ============

#[derive(Serialize)]
struct PingResponse {
    message: &'static str,
}

async fn handle_ping() -> Json<PingResponse> {
    Json(PingResponse { message: "pong" })
}
