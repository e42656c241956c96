//! Error types shared across the pipeline.
//!
//! Each collaborator gets its own enum; [`PipelineError`] is what the
//! orchestrator and the content tools return to the HTTP layer.

use std::time::Duration;

use thiserror::Error;

/// Errors raised by the LLM adapters.
#[derive(Error, Debug)]
pub enum LlmError {
    /// The provider rejected the call with HTTP 429.
    #[error("rate limited by provider (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// The provider answered with a non-success status.
    #[error("provider error ({status}): {message}")]
    Provider { status: u16, message: String },

    /// The request never produced an HTTP response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The provider answered, but the body did not have the expected shape.
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    /// A response call returned no assistant message item.
    #[error("response contained no assistant message")]
    NoMessage,

    /// A batch job did not reach a terminal state before the maximum wait.
    #[error("batch {batch_id} not finished after {waited:?}")]
    BatchTimeout { batch_id: String, waited: Duration },

    /// A batch job reached a terminal state other than `completed`.
    #[error("batch {batch_id} ended with status '{status}'")]
    BatchFailed { batch_id: String, status: String },
}

impl LlmError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, LlmError::RateLimited { .. })
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        LlmError::Transport(err.to_string())
    }
}

/// Errors raised by the persistence store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A uniqueness constraint was violated.
    #[error("{entity} already exists: {key}")]
    AlreadyExists { entity: &'static str, key: String },

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("snapshot io: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding: {0}")]
    Snapshot(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists { .. })
    }
}

/// Errors raised by plain HTTP GETs (README, feeds).
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("invalid url '{0}'")]
    InvalidUrl(String),

    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },
}

/// Errors raised by the GitHub metadata fetcher.
#[derive(Error, Debug)]
pub enum GithubError {
    #[error("GitHub API returned {status} for {url}")]
    Status { status: u16, url: String },

    #[error("GitHub request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Errors surfaced by the orchestrator and the content tools.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("github error: {0}")]
    Github(#[from] GithubError),

    /// The payload handed to a mode is missing fields or has invalid values.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// A capability name outside the known table was requested.
    #[error("unknown capability '{0}'")]
    UnknownCapability(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
