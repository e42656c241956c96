// src/api.rs
//! HTTP surface: CRUD over stored entities plus pipeline triggers.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::CorsLayer;

use crate::error::{GithubError, LlmError, PipelineError, StoreError};
use crate::github::{Owner, RepoFetcher};
use crate::model::{NewsItem, NewsSource, PostArtifact, RepositoryRecord, StoredNews};
use crate::pipeline::posts::{save_post, UpdateReport};
use crate::pipeline::{Orchestrator, Pipeline, PipelineOutput};
use crate::rebuild::RebuildHook;
use crate::scheduler::update_and_rebuild;
use crate::store::{OrderDirection, OrderField};

#[derive(Clone)]
pub struct AppState {
    orch: Orchestrator,
    github: Arc<dyn RepoFetcher>,
    rebuild: Option<RebuildHook>,
}

impl AppState {
    pub fn new(orch: Orchestrator, github: Arc<dyn RepoFetcher>) -> Self {
        Self {
            orch,
            github,
            rebuild: None,
        }
    }

    pub fn with_rebuild(mut self, hook: RebuildHook) -> Self {
        self.rebuild = Some(hook);
        self
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/repos", get(list_repos).post(create_repo))
        .route(
            "/repos/{id}",
            get(get_repo).put(update_repo).delete(delete_repo),
        )
        .route("/github/sync", post(github_sync))
        .route("/posts", get(list_posts))
        .route("/posts/update-all", post(update_all_posts))
        .route("/posts/{id}", get(get_post).post(generate_post).put(evaluate_post))
        .route("/news", get(list_news))
        .route("/news/search", post(search_news))
        .route("/news/digest", post(digest_news))
        .route("/sources", get(list_sources))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

// ---------- errors ----------

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

#[derive(Serialize)]
struct ErrorEnvelope<'a> {
    error: ErrorBody<'a>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: &'a str,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::warn!(target: "api", status = %self.status, code = self.code, message = %self.message, "request failed");
        }
        let body = ErrorEnvelope {
            error: ErrorBody {
                code: self.code,
                message: &self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => Self::new(StatusCode::NOT_FOUND, "not_found", err.to_string()),
            StoreError::AlreadyExists { .. } => Self::new(StatusCode::CONFLICT, "conflict", err.to_string()),
            _ => Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", err.to_string()),
        }
    }
}

impl From<LlmError> for ApiError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::RateLimited { .. } => {
                Self::new(StatusCode::TOO_MANY_REQUESTS, "rate_limited", err.to_string())
            }
            LlmError::BatchTimeout { .. } => {
                Self::new(StatusCode::GATEWAY_TIMEOUT, "batch_timeout", err.to_string())
            }
            _ => Self::new(StatusCode::BAD_GATEWAY, "upstream_error", err.to_string()),
        }
    }
}

impl From<GithubError> for ApiError {
    fn from(err: GithubError) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, "upstream_error", err.to_string())
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Store(e) => e.into(),
            PipelineError::Llm(e) => e.into(),
            PipelineError::Github(e) => e.into(),
            PipelineError::Fetch(e) => Self::new(StatusCode::BAD_GATEWAY, "upstream_error", e.to_string()),
            PipelineError::InvalidPayload(_) | PipelineError::UnknownCapability(_) => {
                Self::bad_request(err.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rej: JsonRejection) -> Self {
        Self::bad_request(rej.body_text())
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ---------- repositories ----------

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    #[serde(default)]
    order_by: Option<OrderField>,
    #[serde(default)]
    direction: Option<OrderDirection>,
}

async fn list_repos(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> ApiResult<Json<Vec<RepositoryRecord>>> {
    let store = &state.orch.context().store;
    let repos = store
        .list_repos(q.order_by.unwrap_or_default(), q.direction.unwrap_or_default())
        .await?;
    Ok(Json(repos))
}

async fn get_repo(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<RepositoryRecord>> {
    Ok(Json(state.orch.context().store.get_repo(id).await?))
}

async fn create_repo(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<RepositoryRecord>)> {
    let Json(payload) = body?;
    let repo = RepositoryRecord::from_payload(&payload)?;
    let created = state.orch.context().store.create_repo(repo).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_repo(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<RepositoryRecord>> {
    let Json(payload) = body?;
    let repo = RepositoryRecord::from_payload(&payload)?;
    if repo.id != id {
        return Err(ApiError::bad_request(format!(
            "path id {id} does not match body id {}",
            repo.id
        )));
    }
    Ok(Json(state.orch.context().store.update_repo(repo).await?))
}

async fn delete_repo(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<StatusCode> {
    state.orch.context().store.delete_repo(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Serialize)]
struct SyncReport {
    owners: Vec<String>,
    created: usize,
    updated: usize,
}

async fn github_sync(State(state): State<AppState>) -> ApiResult<Json<SyncReport>> {
    let cfg = &state.orch.context().config.github;
    let user = cfg.user.trim();
    if user.is_empty() {
        return Err(ApiError::bad_request("github.user is not configured"));
    }

    let mut owners = vec![Owner::User(user.to_string())];
    if cfg.include_orgs {
        owners.extend(state.github.list_organizations(user).await?.into_iter().map(Owner::Org));
    }

    let store = &state.orch.context().store;
    let mut report = SyncReport::default();
    for owner in &owners {
        for repo in state.github.fetch_repositories(owner).await? {
            match store.get_repo(repo.id).await {
                Ok(_) => {
                    store.update_repo(repo).await?;
                    report.updated += 1;
                }
                Err(StoreError::NotFound { .. }) => {
                    store.create_repo(repo).await?;
                    report.created += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
        report.owners.push(owner.login().to_string());
    }

    tracing::info!(
        target: "api",
        owners = report.owners.len(),
        created = report.created,
        updated = report.updated,
        "github sync finished"
    );
    Ok(Json(report))
}

// ---------- posts ----------

async fn list_posts(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> ApiResult<Json<Vec<PostArtifact>>> {
    let store = &state.orch.context().store;
    let posts = store
        .list_posts(q.order_by.unwrap_or_default(), q.direction.unwrap_or_default())
        .await?;
    Ok(Json(posts))
}

async fn get_post(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<PostArtifact>> {
    Ok(Json(state.orch.context().store.get_post(id).await?))
}

async fn generate_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<(StatusCode, Json<PostArtifact>)> {
    let repo = state.orch.context().store.get_repo(id).await?;
    let payload = serde_json::to_value(&repo).map_err(|e| ApiError::bad_request(e.to_string()))?;
    match state.orch.run(Pipeline::Post, &payload).await? {
        PipelineOutput::Article(article) => {
            let post = save_post(&state.orch, &repo, article).await?;
            Ok((StatusCode::CREATED, Json(post)))
        }
        other => Err(unexpected_output(Pipeline::Post, &other)),
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum EvalOutcome {
    Regenerated { post: PostArtifact },
    Skipped,
}

async fn evaluate_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<EvalOutcome>> {
    let repo = state.orch.context().store.get_repo(id).await?;
    let payload = serde_json::to_value(&repo).map_err(|e| ApiError::bad_request(e.to_string()))?;
    match state.orch.run(Pipeline::Eval, &payload).await? {
        PipelineOutput::Article(article) => {
            let post = save_post(&state.orch, &repo, article).await?;
            Ok(Json(EvalOutcome::Regenerated { post }))
        }
        PipelineOutput::Skipped => Ok(Json(EvalOutcome::Skipped)),
        other => Err(unexpected_output(Pipeline::Eval, &other)),
    }
}

async fn update_all_posts(State(state): State<AppState>) -> ApiResult<Json<UpdateReport>> {
    let report = update_and_rebuild(&state.orch, state.rebuild.as_ref()).await?;
    Ok(Json(report))
}

fn unexpected_output(mode: Pipeline, out: &PipelineOutput) -> ApiError {
    ApiError::new(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        format!("{mode} produced unexpected output: {out:?}"),
    )
}

// ---------- news ----------

#[derive(Debug, Default, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    dry_run: bool,
}

#[derive(Debug, Serialize)]
struct NewsRun {
    mode: Pipeline,
    items: Vec<NewsItem>,
    saved: usize,
}

async fn run_news_mode(state: &AppState, mode: Pipeline, persist: bool) -> ApiResult<Json<NewsRun>> {
    let items = match state.orch.run(mode, &Value::Null).await? {
        PipelineOutput::News(items) => items,
        other => return Err(unexpected_output(mode, &other)),
    };
    let saved = if persist {
        state.orch.persist_news(&items).await?.len()
    } else {
        0
    };
    Ok(Json(NewsRun { mode, items, saved }))
}

/// SRCS, or TEST with `?dry_run=true` (nothing is persisted then).
async fn search_news(
    State(state): State<AppState>,
    Query(q): Query<SearchQuery>,
) -> ApiResult<Json<NewsRun>> {
    if q.dry_run {
        run_news_mode(&state, Pipeline::Test, false).await
    } else {
        run_news_mode(&state, Pipeline::Srcs, true).await
    }
}

async fn digest_news(State(state): State<AppState>) -> ApiResult<Json<NewsRun>> {
    run_news_mode(&state, Pipeline::News, true).await
}

async fn list_news(State(state): State<AppState>) -> ApiResult<Json<Vec<StoredNews>>> {
    Ok(Json(state.orch.context().store.list_news().await?))
}

async fn list_sources(State(state): State<AppState>) -> ApiResult<Json<Vec<NewsSource>>> {
    Ok(Json(state.orch.context().store.list_news_sources().await?))
}
